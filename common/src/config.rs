use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::clock::DstPolicy;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeviceEntry {
    pub address: String,
    /// Identity the simulated transport reports for this address.
    #[serde(default = "default_model_number")]
    pub model_number: String,
    #[serde(default = "default_software_revision")]
    pub software_revision: String,
    /// Delay the simulated transport adds to every read and write.
    #[serde(default)]
    pub response_latency_ms: u64,
}

fn default_model_number() -> String {
    "ECO16BT".to_string()
}

fn default_software_revision() -> String {
    "1.14.0;6.1.0".to_string()
}

impl DeviceEntry {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            model_number: default_model_number(),
            software_revision: default_software_revision(),
            response_latency_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DstRule {
    /// Follow the IANA zone's own transitions.
    Zone,
    /// Fixed EU rule around the zone's standard offset.
    EuropeanUnion,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct TimeConfig {
    pub timezone: String,
    pub dst_rule: DstRule,
    pub dst_shift_minutes: i32,
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            timezone: "Europe/Helsinki".to_string(),
            dst_rule: DstRule::EuropeanUnion,
            dst_shift_minutes: 60,
        }
    }
}

impl TimeConfig {
    pub fn zone(&self) -> Tz {
        self.timezone.parse::<Tz>().unwrap_or(Tz::UTC)
    }

    pub fn policy(&self, now: DateTime<Utc>) -> DstPolicy {
        let zone = DstPolicy::Zone(self.zone());
        match self.dst_rule {
            DstRule::Zone => zone,
            DstRule::EuropeanUnion => DstPolicy::EuropeanUnion {
                standard_offset_minutes: zone.standard_offset_minutes(now),
                shift_minutes: self.dst_shift_minutes,
            },
        }
    }

    pub fn sanitize(&mut self) {
        if self.timezone.parse::<Tz>().is_err() {
            warn!("unknown timezone {:?}, using UTC", self.timezone);
            self.timezone = "UTC".to_string();
        }
        self.dst_shift_minutes = self.dst_shift_minutes.clamp(0, 120);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ControlConfig {
    pub tick_interval_ms: u64,
    pub refresh_interval_ms: u64,
    pub state_publish_interval_ms: u64,
    pub clock_check_interval_ms: u64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1_000,
            refresh_interval_ms: 300_000,
            state_publish_interval_ms: 10_000,
            clock_check_interval_ms: 3_600_000,
        }
    }
}

impl ControlConfig {
    pub fn sanitize(&mut self) {
        self.tick_interval_ms = self.tick_interval_ms.clamp(100, 60_000);
        self.refresh_interval_ms = self.refresh_interval_ms.clamp(10_000, 86_400_000);
        self.state_publish_interval_ms = self.state_publish_interval_ms.clamp(1_000, 3_600_000);
        self.clock_check_interval_ms = self.clock_check_interval_ms.clamp(60_000, 86_400_000);
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct TransportConfig {
    pub timeout_ms: u64,
    /// Pause between selecting a calendar day and reading it back.
    pub calendar_settle_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            calendar_settle_ms: 200,
        }
    }
}

impl TransportConfig {
    pub fn sanitize(&mut self) {
        self.timeout_ms = self.timeout_ms.clamp(100, 120_000);
        self.calendar_settle_ms = self.calendar_settle_ms.min(5_000);
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct EnergyConfig {
    pub history_hours: u32,
    /// Longest time a single sample's relay state is assumed to hold.
    pub max_sample_gap_secs: Option<u64>,
}

impl Default for EnergyConfig {
    fn default() -> Self {
        Self {
            history_hours: 168,
            max_sample_gap_secs: None,
        }
    }
}

impl EnergyConfig {
    pub fn sanitize(&mut self) {
        self.history_hours = self.history_hours.clamp(1, 24 * 366);
        if self.max_sample_gap_secs == Some(0) {
            self.max_sample_gap_secs = None;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct NetworkConfig {
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_user: String,
    pub mqtt_pass: String,
    pub http_port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            mqtt_host: "127.0.0.1".to_string(),
            mqtt_port: 1883,
            mqtt_user: String::new(),
            mqtt_pass: String::new(),
            http_port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BridgeConfig {
    pub devices: Vec<DeviceEntry>,
    #[serde(default)]
    pub time: TimeConfig,
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub energy: EnergyConfig,
    #[serde(default)]
    pub network: NetworkConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            devices: vec![DeviceEntry::new("90:FD:9F:00:00:01")],
            time: TimeConfig::default(),
            control: ControlConfig::default(),
            transport: TransportConfig::default(),
            energy: EnergyConfig::default(),
            network: NetworkConfig::default(),
        }
    }
}

impl BridgeConfig {
    pub fn sanitize(&mut self) {
        let mut seen = std::collections::HashSet::new();
        self.devices.retain(|device| {
            let address = device.address.trim().to_ascii_uppercase();
            !address.is_empty() && seen.insert(address)
        });
        for device in &mut self.devices {
            device.address = device.address.trim().to_ascii_uppercase();
            device.response_latency_ms = device.response_latency_ms.min(5_000);
        }

        self.time.sanitize();
        self.control.sanitize();
        self.transport.sanitize();
        self.energy.sanitize();
    }
}
