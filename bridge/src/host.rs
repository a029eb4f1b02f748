use std::{
    collections::BTreeMap,
    io::ErrorKind,
    net::SocketAddr,
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use anyhow::Context;
use chrono::{DateTime, Utc};
use ensto_common::{
    clock::TimeConverter,
    config::{ControlConfig, NetworkConfig},
    BridgeConfig, DeviceSession, SessionConfig,
};
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use tokio::{net::TcpListener, sync::Mutex};
use tracing::{debug, info, warn};

use crate::api;
use crate::simulator::SimulatedThermostat;

pub type SharedSession = Arc<Mutex<DeviceSession<SimulatedThermostat>>>;

const INDICATION_PERIOD: Duration = Duration::from_secs(1);

#[derive(Clone)]
pub struct AppState {
    pub devices: Arc<BTreeMap<String, SharedSession>>,
    pub mqtt: AsyncClient,
}

#[derive(Clone)]
struct AppStore {
    config_path: Arc<PathBuf>,
}

impl AppStore {
    fn new() -> Self {
        let data_dir = std::env::var("ENSTO_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.ensto"));
        Self::with_data_dir(data_dir)
    }

    fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            config_path: Arc::new(data_dir.join("bridge.json")),
        }
    }

    async fn load_config(&self) -> anyhow::Result<BridgeConfig> {
        match tokio::fs::read(self.config_path.as_ref()).await {
            Ok(raw) => serde_json::from_slice::<BridgeConfig>(&raw)
                .with_context(|| format!("invalid config at {}", self.config_path.display())),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(BridgeConfig::default()),
            Err(err) => Err(err.into()),
        }
    }
}

/// Environment wins over the stored network settings.
fn apply_env_overrides(network: &mut NetworkConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(host) = lookup("MQTT_HOST") {
        network.mqtt_host = host;
    }
    if let Some(port) = lookup("MQTT_PORT").and_then(|value| value.parse::<u16>().ok()) {
        network.mqtt_port = port;
    }
    if let Some(user) = lookup("MQTT_USER") {
        network.mqtt_user = user;
    }
    if let Some(pass) = lookup("MQTT_PASS") {
        network.mqtt_pass = pass;
    }
    if let Some(port) = lookup("BRIDGE_HTTP_PORT").and_then(|value| value.parse::<u16>().ok()) {
        network.http_port = port;
    }
}

pub fn state_topic(address: &str) -> String {
    format!("ensto/{address}/state")
}

/// Fires once immediately, then whenever `every` has passed since the last
/// firing.
#[derive(Debug, Clone, Copy)]
struct Cadence {
    every: chrono::Duration,
    last: Option<DateTime<Utc>>,
}

impl Cadence {
    fn new(every_ms: u64) -> Self {
        Self {
            every: chrono::Duration::milliseconds(every_ms.min(i64::MAX as u64) as i64),
            last: None,
        }
    }

    fn starting_at(mut self, now: DateTime<Utc>) -> Self {
        self.last = Some(now);
        self
    }

    fn due(&mut self, now: DateTime<Utc>) -> bool {
        let due = self.last.map_or(true, |last| now - last >= self.every);
        if due {
            self.last = Some(now);
        }
        due
    }
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = AppStore::new();
    let mut config = store.load_config().await.unwrap_or_else(|err| {
        warn!("failed to load bridge config from store: {err:#}");
        BridgeConfig::default()
    });
    apply_env_overrides(&mut config.network, |key| std::env::var(key).ok());
    config.sanitize();

    let mut mqtt_options = MqttOptions::new(
        "ensto-bridge-rust",
        config.network.mqtt_host.clone(),
        config.network.mqtt_port,
    );
    if !config.network.mqtt_user.is_empty() {
        mqtt_options.set_credentials(
            config.network.mqtt_user.clone(),
            config.network.mqtt_pass.clone(),
        );
    }
    let (mqtt, eventloop) = AsyncClient::new(mqtt_options, 64);

    let devices = open_devices(&config).await;
    if devices.is_empty() {
        anyhow::bail!("none of the {} configured devices could be opened", config.devices.len());
    }

    let app_state = AppState {
        devices: Arc::new(devices),
        mqtt,
    };

    spawn_mqtt_loop(eventloop);
    for (address, session) in app_state.devices.iter() {
        spawn_device_loop(address.clone(), session.clone(), config.control.clone());
    }
    spawn_state_publish_loop(app_state.clone(), config.control.state_publish_interval_ms);

    let app = api::router(app_state);
    let port = config.network.http_port;
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind bridge server at {addr}"))?;

    info!("bridge listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn open_devices(config: &BridgeConfig) -> BTreeMap<String, SharedSession> {
    let now = Utc::now();
    let session_config = SessionConfig::from_bridge(config, now);
    let clock = TimeConverter::new(session_config.dst_policy);
    let mut devices = BTreeMap::new();

    for entry in &config.devices {
        let device = match SimulatedThermostat::new(entry, clock.to_device_time(now, true), now) {
            Ok(device) => device,
            Err(err) => {
                warn!(address = %entry.address, "failed to build simulated device: {err}");
                continue;
            }
        };
        device.spawn_indications(INDICATION_PERIOD);

        let mut session = match DeviceSession::open(entry.address.clone(), device, session_config).await {
            Ok(session) => session,
            Err(err) => {
                warn!(address = %entry.address, "failed to open device: {err}");
                continue;
            }
        };
        if let Err(err) = session.refresh(now).await {
            warn!(address = %entry.address, "initial refresh failed: {err}");
        }
        devices.insert(entry.address.clone(), Arc::new(Mutex::new(session)));
    }
    devices
}

fn spawn_mqtt_loop(mut eventloop: rumqttc::EventLoop) {
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("mqtt connected");
                }
                Ok(_) => {}
                Err(err) => {
                    warn!("mqtt poll error: {err}");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });
}

async fn run_tick(address: &str, session: &SharedSession) {
    let mut session = session.lock().await;
    let applied = session.drain_inbox();
    if applied > 0 {
        debug!(%address, applied, "indications applied");
    }
    session.tick(Utc::now());
}

/// Each due read takes the session lock on its own, so ticks and API calls
/// get in between them.
async fn run_maintenance(
    address: &str,
    session: &SharedSession,
    refresh: &mut Cadence,
    clock_check: &mut Cadence,
) {
    if refresh.due(Utc::now()) {
        let mut session = session.lock().await;
        if let Err(err) = session.refresh(Utc::now()).await {
            warn!(%address, "refresh failed: {err}");
        }
    }
    if clock_check.due(Utc::now()) {
        let mut session = session.lock().await;
        if let Err(err) = session.read_clock_status(Utc::now()).await {
            warn!(%address, "clock check failed: {err}");
        }
    }
}

/// Ticks and device reads run as separate tasks so a slow read never holds
/// up the tick interval.
fn spawn_device_loop(address: String, session: SharedSession, control: ControlConfig) {
    let period = Duration::from_millis(control.tick_interval_ms);

    let tick_address = address.clone();
    let tick_session = session.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            run_tick(&tick_address, &tick_session).await;
        }
    });

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        let mut refresh = Cadence::new(control.refresh_interval_ms).starting_at(Utc::now());
        let mut clock_check = Cadence::new(control.clock_check_interval_ms);
        loop {
            interval.tick().await;
            run_maintenance(&address, &session, &mut refresh, &mut clock_check).await;
        }
    });
}

fn spawn_state_publish_loop(app_state: AppState, period_ms: u64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(period_ms));
        loop {
            interval.tick().await;

            for (address, session) in app_state.devices.iter() {
                let payload = {
                    let session = session.lock().await;
                    serde_json::to_vec(&session.snapshot(Utc::now()))
                };

                match payload {
                    Ok(body) => {
                        if let Err(err) = app_state
                            .mqtt
                            .publish(state_topic(address), QoS::AtLeastOnce, true, body)
                            .await
                        {
                            warn!(%address, "state publish failed: {err}");
                        }
                    }
                    Err(err) => warn!(%address, "state serialization failed: {err}"),
                }
            }
        }
    });
}
