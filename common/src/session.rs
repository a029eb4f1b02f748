use std::future::Future;
use std::time::Duration as StdDuration;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::calendar::{encode_day, CalendarDay, CalendarProgram, DayOfWeek};
use crate::characteristics::{
    Field, CALENDAR_CONTROL_UUID, CALENDAR_STORE_TO_FLASH, REAL_TIME_INDICATION_UUID,
};
use crate::clock::{ClockStatus, DstPolicy, TimeConverter};
use crate::codec::{
    AdaptiveControl, BoostConfig, CalendarMode, Characteristic, DaylightSaving, DeviceDateTime,
    DeviceName, ExternalControlConfig, FloorArea, FloorSensorConfig, HeatingPower, ModelNumber,
    MonitoringData, PowerConsumptionHistory, RealTimeIndication, RoomCalibration, SoftwareRevision, VacationConfig,
};
use crate::config::{BridgeConfig, EnergyConfig, TransportConfig};
use crate::energy::{EnergyAggregator, EnergySample, PowerUsageSnapshot};
use crate::error::{check_range, EnstoError, Result};
use crate::framing::{split_for_write, SplitReassembler};
use crate::scheduler::{BoostState, Evaluation, ModeScheduler, VacationState};
use crate::transport::{Notification, Transport, TransportError};
use crate::types::{
    EnergyPrice, ExternalControl, FloorLimits, FloorSensorType, HeatingMode, ModelClass, Offset,
    ThermostatState,
};

/// Oldest firmware that understands the external control frame.
pub const EXTERNAL_CONTROL_FIRMWARE: (u16, u16) = (1, 14);

const INBOX_CAPACITY: usize = 64;
const MAX_SPLIT_PACKETS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub floor_mode: bool,
    pub combination_mode: bool,
    pub external_control: bool,
    pub calendar: bool,
}

impl Capabilities {
    pub fn for_model(model: ModelClass, firmware: Option<(u16, u16)>) -> Self {
        let external_control = firmware.is_some_and(|version| version >= EXTERNAL_CONTROL_FIRMWARE);
        match model {
            ModelClass::Eco16Bt => Self {
                floor_mode: true,
                combination_mode: true,
                external_control,
                calendar: true,
            },
            ModelClass::Elte6Bt | ModelClass::Ephe5Bt => Self {
                floor_mode: false,
                combination_mode: false,
                external_control,
                calendar: true,
            },
            ModelClass::Generic => Self {
                floor_mode: false,
                combination_mode: false,
                external_control,
                calendar: false,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceProfile {
    pub address: String,
    pub model: ModelClass,
    pub model_number: String,
    pub software_revision: Option<SoftwareRevision>,
    pub capabilities: Capabilities,
}

impl DeviceProfile {
    pub fn supports_heating_mode(&self, mode: HeatingMode) -> bool {
        match mode {
            HeatingMode::Room | HeatingMode::Power => true,
            HeatingMode::Floor => self.capabilities.floor_mode,
            HeatingMode::Combination => self.capabilities.combination_mode,
            HeatingMode::ForceControl => self.capabilities.external_control,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionConfig {
    pub transport: TransportConfig,
    pub energy: EnergyConfig,
    pub dst_policy: DstPolicy,
}

impl SessionConfig {
    pub fn from_bridge(config: &BridgeConfig, now: DateTime<Utc>) -> Self {
        Self {
            transport: config.transport,
            energy: config.energy,
            dst_policy: config.time.policy(now),
        }
    }
}

/// Requested vacation window in UTC.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VacationRequest {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub offset: Offset,
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PowerHistoryEntry {
    pub hour_start: DateTime<Utc>,
    pub ratio_percent: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSnapshot {
    pub taken_at: DateTime<Utc>,
    pub profile: DeviceProfile,
    pub thermostat: ThermostatState,
    pub boost: BoostState,
    pub boost_remaining_minutes: u32,
    pub vacation: Option<VacationState>,
    pub calendar_enabled: bool,
    pub external_control: ExternalControl,
    pub applied: Option<Evaluation>,
    pub clock: Option<ClockStatus>,
    pub power_usage: PowerUsageSnapshot,
    /// Last monitoring history read from the device.
    pub monitoring: Option<MonitoringData>,
}

/// Owned state of one connected thermostat. Every device access goes through
/// `&mut self`, so operations on one device are serialized.
pub struct DeviceSession<T> {
    transport: T,
    profile: DeviceProfile,
    config: SessionConfig,
    clock: TimeConverter,
    thermostat: ThermostatState,
    scheduler: ModeScheduler,
    energy: EnergyAggregator,
    inbox: mpsc::Receiver<Notification>,
    device_name: Option<DeviceName>,
    external_frame: Option<ExternalControlConfig>,
    clock_status: Option<ClockStatus>,
    last_evaluation: Option<Evaluation>,
    monitoring: Option<MonitoringData>,
}

fn map_transport_error(uuid: &str, err: TransportError) -> EnstoError {
    match err {
        TransportError::Timeout => EnstoError::TransportTimeout {
            uuid: uuid.to_string(),
        },
        other => EnstoError::Transport {
            uuid: uuid.to_string(),
            message: other.to_string(),
        },
    }
}

async fn bounded<R>(
    uuid: &str,
    timeout: StdDuration,
    call: impl Future<Output = std::result::Result<R, TransportError>>,
) -> Result<R> {
    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(map_transport_error(uuid, err)),
        Err(_) => Err(EnstoError::TransportTimeout {
            uuid: uuid.to_string(),
        }),
    }
}

async fn read_plain<T: Transport, C: Characteristic>(transport: &T, timeout: StdDuration) -> Result<C> {
    let uuid = C::FIELD.uuid();
    let bytes = bounded(uuid, timeout, transport.read_characteristic(uuid)).await?;
    C::decode(&bytes)
}

impl<T: Transport> DeviceSession<T> {
    pub async fn open(address: impl Into<String>, transport: T, config: SessionConfig) -> Result<Self> {
        let address = address.into();
        let timeout = StdDuration::from_millis(config.transport.timeout_ms);

        let ModelNumber(model_number) = read_plain::<T, ModelNumber>(&transport, timeout).await?;
        let software_revision = match read_plain::<T, SoftwareRevision>(&transport, timeout).await {
            Ok(revision) => Some(revision),
            Err(err) if err.is_malformed() => {
                warn!(%address, "{err}; firmware version unknown");
                None
            }
            Err(err) => return Err(err),
        };

        let model = ModelClass::from_model_number(&model_number);
        let firmware = software_revision.as_ref().and_then(SoftwareRevision::version);
        let profile = DeviceProfile {
            address,
            model,
            model_number,
            capabilities: Capabilities::for_model(model, firmware),
            software_revision,
        };

        let (sender, inbox) = mpsc::channel(INBOX_CAPACITY);
        bounded(
            REAL_TIME_INDICATION_UUID,
            timeout,
            transport.subscribe(REAL_TIME_INDICATION_UUID, sender),
        )
        .await?;

        info!(
            address = %profile.address,
            model = %profile.model,
            ?firmware,
            "device session opened"
        );

        Ok(Self {
            transport,
            clock: TimeConverter::new(config.dst_policy),
            energy: EnergyAggregator::new(config.energy),
            profile,
            config,
            thermostat: ThermostatState::default(),
            scheduler: ModeScheduler::new(),
            inbox,
            device_name: None,
            external_frame: None,
            clock_status: None,
            last_evaluation: None,
            monitoring: None,
        })
    }

    pub fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    pub fn thermostat(&self) -> &ThermostatState {
        &self.thermostat
    }

    pub fn scheduler(&self) -> &ModeScheduler {
        &self.scheduler
    }

    pub fn clock(&self) -> &TimeConverter {
        &self.clock
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Unknown until the first refresh; assume the device default of on.
    fn dst_enabled(&self) -> bool {
        self.thermostat.daylight_saving.unwrap_or(true)
    }

    fn timeout(&self) -> StdDuration {
        StdDuration::from_millis(self.config.transport.timeout_ms)
    }

    fn require(&self, supported: bool, operation: &'static str) -> Result<()> {
        if supported {
            Ok(())
        } else {
            Err(EnstoError::UnsupportedCapability {
                operation,
                model: self.profile.model,
            })
        }
    }

    async fn read_bytes(&self, field: Field) -> Result<Vec<u8>> {
        let uuid = field.uuid();
        if !field.is_split() {
            return bounded(uuid, self.timeout(), self.transport.read_characteristic(uuid)).await;
        }

        let mut reassembler = SplitReassembler::new(field);
        for _ in 0..MAX_SPLIT_PACKETS {
            let packet = bounded(uuid, self.timeout(), self.transport.read_characteristic(uuid)).await?;
            if reassembler.push(&packet)? {
                return reassembler.finish();
            }
        }
        Err(EnstoError::malformed(
            field,
            format!("no final packet within {MAX_SPLIT_PACKETS} reads"),
        ))
    }

    async fn write_bytes(&self, field: Field, payload: &[u8]) -> Result<()> {
        let uuid = field.uuid();
        if !field.is_split() {
            return bounded(uuid, self.timeout(), self.transport.write_characteristic(uuid, payload)).await;
        }
        for packet in split_for_write(payload) {
            bounded(uuid, self.timeout(), self.transport.write_characteristic(uuid, &packet)).await?;
        }
        Ok(())
    }

    async fn read<C: Characteristic>(&self) -> Result<C> {
        let bytes = self.read_bytes(C::FIELD).await?;
        C::decode(&bytes)
    }

    /// Malformed payloads leave the field unavailable instead of failing.
    async fn read_available<C: Characteristic>(&self) -> Result<Option<C>> {
        match self.read::<C>().await {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.is_malformed() => {
                warn!(address = %self.profile.address, "{err}; field unavailable");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    async fn write<C: Characteristic>(&self, value: &C) -> Result<()> {
        let bytes = value.encode()?;
        self.write_bytes(C::FIELD, &bytes).await
    }

    async fn select_calendar_day(&self, day: u8) -> Result<()> {
        bounded(
            CALENDAR_CONTROL_UUID,
            self.timeout(),
            self.transport.write_characteristic(CALENDAR_CONTROL_UUID, &[day]),
        )
        .await?;
        let settle = self.config.transport.calendar_settle_ms;
        if settle > 0 {
            tokio::time::sleep(StdDuration::from_millis(settle)).await;
        }
        Ok(())
    }

    /// Reads every characteristic the model supports.
    pub async fn refresh(&mut self, now: DateTime<Utc>) -> Result<()> {
        let capabilities = self.profile.capabilities;

        self.device_name = self.read_available::<DeviceName>().await?;
        self.thermostat.device_name = self.device_name.as_ref().map(|name| name.name.clone());
        self.thermostat.heating_mode = self.read_available::<HeatingMode>().await?;
        self.thermostat.daylight_saving = self
            .read_available::<DaylightSaving>()
            .await?
            .map(|dst| dst.enabled);
        self.thermostat.room_calibration = self
            .read_available::<RoomCalibration>()
            .await?
            .map(|calibration| calibration.0);
        self.thermostat.heating_power_watts = self.read_available::<HeatingPower>().await?.map(|p| p.0);
        self.thermostat.adaptive_control = self.read_available::<AdaptiveControl>().await?.map(|a| a.0);
        self.thermostat.energy_price = self.read_available::<EnergyPrice>().await?;

        if capabilities.floor_mode {
            self.thermostat.floor_sensor = self
                .read_available::<FloorSensorConfig>()
                .await?
                .map(|sensor| sensor.sensor_type);
            self.thermostat.floor_area = self.read_available::<FloorArea>().await?.map(|a| a.0);
        }
        if capabilities.combination_mode {
            self.thermostat.floor_limits = self.read_available::<FloorLimits>().await?;
        }

        if let Some(boost) = self.read_available::<BoostConfig>().await? {
            let state = self.scheduler.boost_mut();
            state.duration_minutes = boost.duration_minutes;
            state.offset = boost.offset;
            state.sync_remaining(boost.enabled, boost.remaining_minutes, now);
        }
        if let Some(vacation) = self.read_available::<VacationConfig>().await? {
            self.adopt_vacation(&vacation);
        }

        if capabilities.calendar {
            if let Some(mode) = self.read_available::<CalendarMode>().await? {
                self.scheduler.set_calendar_enabled(mode.0);
            }
            for day in DayOfWeek::ALL {
                match self.load_calendar_day(day).await {
                    Ok(calendar) => self.scheduler.set_calendar_day(calendar),
                    Err(err) if err.is_malformed() => {
                        warn!(address = %self.profile.address, %day, "{err}; calendar day unavailable");
                    }
                    Err(err) => return Err(err),
                }
            }
        }

        if capabilities.external_control {
            self.external_frame = self.read_available::<ExternalControlConfig>().await?;
            let control = self.external_frame.as_ref().map(ExternalControlConfig::control);
            self.thermostat.external_control = control;
            self.scheduler.set_external_control(control.unwrap_or_default());
        }

        if let Some(DeviceDateTime(device_time)) = self.read_available::<DeviceDateTime>().await? {
            self.note_device_time(device_time, now);
        }

        if let Some(indication) = self.read_available::<RealTimeIndication>().await? {
            self.apply_indication(&indication, now);
        }

        debug!(address = %self.profile.address, "refresh complete");
        Ok(())
    }

    fn adopt_vacation(&mut self, vacation: &VacationConfig) {
        let dst = self.dst_enabled();
        let start = self.clock.to_utc(vacation.start, dst);
        let end = self.clock.to_utc(vacation.end, dst);
        let unchanged = self.scheduler.vacation().is_some_and(|current| {
            current.start == start
                && current.end == end
                && current.offset == vacation.offset
                && current.enabled == vacation.enabled
        });
        if !unchanged {
            self.scheduler.set_vacation(Some(VacationState::new(
                start,
                end,
                vacation.offset,
                vacation.enabled,
            )));
        }
    }

    fn note_device_time(&mut self, device_time: NaiveDateTime, now: DateTime<Utc>) -> ClockStatus {
        let status = self.clock.clock_status(device_time, now, self.dst_enabled());
        if !status.in_sync {
            warn!(
                address = %self.profile.address,
                drift_seconds = status.drift_seconds,
                "device clock drifted; set the time to correct it"
            );
        }
        self.thermostat.device_time = Some(device_time);
        self.clock_status = Some(status);
        status
    }

    fn apply_indication(&mut self, indication: &RealTimeIndication, at: DateTime<Utc>) {
        let state = &mut self.thermostat;
        state.target_temperature = Some(indication.target_temperature);
        state.target_power = Some(indication.target_power);
        state.room_temperature = indication.room_temperature;
        state.floor_temperature = indication.floor_temperature;
        state.relay_on = Some(indication.relay_on);
        state.alarms = indication.alarms();
        state.active_mode = indication.active_mode;
        state.heating_mode = indication.heating_mode;

        let boost = self.scheduler.boost_mut();
        if indication.boost_enabled {
            boost.duration_minutes = indication.boost_duration_minutes;
        }
        boost.sync_remaining(indication.boost_enabled, indication.boost_remaining_minutes, at);

        self.energy.ingest(EnergySample {
            timestamp: at,
            relay_on: indication.relay_on,
            floor_temperature: indication.floor_temperature,
            room_temperature: indication.room_temperature,
        });
    }

    /// Applies every queued notification. Returns how many were applied.
    pub fn drain_inbox(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(notification) = self.inbox.try_recv() {
            if notification.uuid != REAL_TIME_INDICATION_UUID {
                debug!(uuid = %notification.uuid, "ignoring notification");
                continue;
            }
            match RealTimeIndication::decode(&notification.payload) {
                Ok(indication) => {
                    if indication.active_mode.is_none() || indication.heating_mode.is_none() {
                        warn!(
                            address = %self.profile.address,
                            active_mode = notification.payload[RealTimeIndication::ACTIVE_MODE_AT],
                            heating_mode = notification.payload[RealTimeIndication::HEATING_MODE_AT],
                            "indication carries an unknown mode"
                        );
                    }
                    self.apply_indication(&indication, notification.received_at);
                    applied += 1;
                }
                Err(err) => warn!(address = %self.profile.address, "dropping notification: {err}"),
            }
        }
        applied
    }

    pub fn tick(&mut self, now: DateTime<Utc>) -> Evaluation {
        let local = self.clock.to_device_time(now, self.dst_enabled());
        let evaluation = self.scheduler.tick(now, local, &self.thermostat);
        for event in &evaluation.events {
            info!(address = %self.profile.address, ?event, "mode transition");
        }
        self.last_evaluation = Some(evaluation.clone());
        evaluation
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> DeviceSnapshot {
        let boost = *self.scheduler.boost();
        DeviceSnapshot {
            taken_at: now,
            profile: self.profile.clone(),
            thermostat: self.thermostat.clone(),
            boost_remaining_minutes: boost.remaining_minutes(),
            boost,
            vacation: self.scheduler.vacation().copied(),
            calendar_enabled: self.scheduler.calendar_enabled(),
            external_control: self.scheduler.external_control(),
            applied: self.last_evaluation.clone(),
            clock: self.clock_status,
            power_usage: self.energy.snapshot(now, self.thermostat.heating_power_watts),
            monitoring: self.monitoring.clone(),
        }
    }

    pub async fn set_device_name(&mut self, name: &str) -> Result<()> {
        DeviceName::new(name).encode()?;
        let current = match &self.device_name {
            Some(current) => current.clone(),
            None => self.read::<DeviceName>().await?,
        };
        let renamed = current.renamed(name);
        self.write(&renamed).await?;
        self.thermostat.device_name = Some(renamed.name.clone());
        self.device_name = Some(renamed);
        Ok(())
    }

    /// Writes the host clock as device local time together with matching
    /// daylight-saving parameters.
    pub async fn set_device_time(&mut self, now: DateTime<Utc>) -> Result<()> {
        let dst = self.dst_enabled();
        let local = self.clock.to_device_time(now, dst);
        self.write(&DeviceDateTime(local)).await?;
        self.write(&self.clock.daylight_saving(now, dst)).await?;
        self.note_device_time(local, now);
        info!(address = %self.profile.address, %local, "device clock set");
        Ok(())
    }

    /// Reads the device clock and reports drift. Never corrects it.
    pub async fn read_clock_status(&mut self, now: DateTime<Utc>) -> Result<ClockStatus> {
        let DeviceDateTime(device_time) = self.read().await?;
        Ok(self.note_device_time(device_time, now))
    }

    async fn load_calendar_day(&self, day: DayOfWeek) -> Result<CalendarDay> {
        self.select_calendar_day(day.number()).await?;
        let bytes = self.read_bytes(Field::CalendarDay).await?;
        let calendar = CalendarDay::decode(&bytes)?;
        if calendar.day != day {
            return Err(EnstoError::malformed(
                Field::CalendarDay,
                format!("asked for day {}, device answered {}", day.number(), calendar.day.number()),
            ));
        }
        let overlaps = calendar.overlaps();
        if !overlaps.is_empty() {
            warn!(address = %self.profile.address, %day, ?overlaps, "overlapping calendar programs");
        }
        Ok(calendar)
    }

    pub async fn get_calendar_day(&mut self, day: u8) -> Result<CalendarDay> {
        self.require(self.profile.capabilities.calendar, "get_calendar_day")?;
        let day = parse_day(day)?;
        let calendar = self.load_calendar_day(day).await?;
        self.scheduler.set_calendar_day(calendar.clone());
        Ok(calendar)
    }

    /// Selects the day, writes its programs and commits them to flash.
    pub async fn set_calendar_day(&mut self, day: u8, programs: &[CalendarProgram]) -> Result<()> {
        self.require(self.profile.capabilities.calendar, "set_calendar_day")?;
        let day = parse_day(day)?;
        let heating_mode = self.thermostat.heating_mode.unwrap_or(HeatingMode::Room);
        let payload = encode_day(day, programs, heating_mode)?;

        self.select_calendar_day(day.number()).await?;
        self.write_bytes(Field::CalendarDay, &payload).await?;
        bounded(
            CALENDAR_CONTROL_UUID,
            self.timeout(),
            self.transport
                .write_characteristic(CALENDAR_CONTROL_UUID, &[CALENDAR_STORE_TO_FLASH]),
        )
        .await?;

        self.scheduler.set_calendar_day(CalendarDay::decode(&payload)?);
        Ok(())
    }

    pub async fn set_heating_mode(&mut self, mode: HeatingMode) -> Result<()> {
        self.require(self.profile.supports_heating_mode(mode), "set_heating_mode")?;
        self.write(&mode).await?;
        self.thermostat.heating_mode = Some(mode);
        Ok(())
    }

    pub async fn set_room_calibration(&mut self, value: f32) -> Result<()> {
        let calibration = RoomCalibration(value);
        let payload = calibration.encode()?;
        self.write_bytes(Field::RoomCalibration, &payload).await?;
        self.thermostat.room_calibration = Some(RoomCalibration::decode(&payload)?.0);
        Ok(())
    }

    pub async fn set_floor_limits(&mut self, limits: FloorLimits) -> Result<()> {
        self.require(self.profile.capabilities.combination_mode, "set_floor_limits")?;
        self.write(&limits).await?;
        self.thermostat.floor_limits = Some(limits);
        Ok(())
    }

    pub async fn set_floor_sensor(&mut self, sensor_type: FloorSensorType) -> Result<()> {
        self.require(self.profile.capabilities.floor_mode, "set_floor_sensor")?;
        let config = FloorSensorConfig::for_type(sensor_type).ok_or_else(|| {
            EnstoError::validation(
                Field::FloorSensor,
                format!("no parameter set for {} sensors", sensor_type.label()),
            )
        })?;
        self.write(&config).await?;
        self.thermostat.floor_sensor = Some(sensor_type);
        Ok(())
    }

    pub async fn set_heating_power(&mut self, watts: u16) -> Result<()> {
        self.write(&HeatingPower(watts)).await?;
        self.thermostat.heating_power_watts = Some(watts);
        Ok(())
    }

    pub async fn set_floor_area(&mut self, square_meters: u16) -> Result<()> {
        self.require(self.profile.capabilities.floor_mode, "set_floor_area")?;
        self.write(&FloorArea(square_meters)).await?;
        self.thermostat.floor_area = Some(square_meters);
        Ok(())
    }

    pub async fn set_daylight_saving(&mut self, enabled: bool, now: DateTime<Utc>) -> Result<()> {
        self.write(&self.clock.daylight_saving(now, enabled)).await?;
        self.thermostat.daylight_saving = Some(enabled);
        Ok(())
    }

    pub async fn set_adaptive_control(&mut self, enabled: bool) -> Result<()> {
        self.write(&AdaptiveControl(enabled)).await?;
        self.thermostat.adaptive_control = Some(enabled);
        Ok(())
    }

    pub async fn set_boost(
        &mut self,
        enabled: bool,
        duration_minutes: u16,
        offset: Offset,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let config = BoostConfig {
            enabled: enabled && duration_minutes > 0,
            offset,
            duration_minutes,
            remaining_minutes: 0,
        };
        self.write(&config).await?;
        let state = if config.enabled {
            BoostState::start(duration_minutes, offset, now)
        } else {
            BoostState::idle(duration_minutes, offset)
        };
        self.scheduler.set_boost(state);
        Ok(())
    }

    pub async fn set_vacation(&mut self, request: VacationRequest) -> Result<()> {
        if request.end <= request.start {
            return Err(EnstoError::validation(
                Field::VacationTime,
                format!("end {} is not after start {}", request.end, request.start),
            ));
        }
        let dst = self.dst_enabled();
        let config = VacationConfig {
            start: self.clock.to_device_time(request.start, dst),
            end: self.clock.to_device_time(request.end, dst),
            offset: request.offset,
            enabled: request.enabled,
            active: false,
        };
        self.write(&config).await?;
        self.scheduler.set_vacation(Some(VacationState::new(
            request.start,
            request.end,
            request.offset,
            request.enabled,
        )));
        Ok(())
    }

    pub async fn set_calendar_mode(&mut self, enabled: bool) -> Result<()> {
        self.require(self.profile.capabilities.calendar, "set_calendar_mode")?;
        self.write(&CalendarMode(enabled)).await?;
        self.scheduler.set_calendar_enabled(enabled);
        Ok(())
    }

    /// Rewrites only the control fields of the device's current frame.
    pub async fn set_external_control(&mut self, control: ExternalControl) -> Result<()> {
        self.require(self.profile.capabilities.external_control, "set_external_control")?;
        ExternalControlConfig::blank().with_control(control)?;

        let current = match &self.external_frame {
            Some(frame) => frame.clone(),
            None => self.read::<ExternalControlConfig>().await?,
        };
        let updated = current.with_control(control)?;
        self.write(&updated).await?;

        self.external_frame = Some(updated);
        self.thermostat.external_control = Some(control);
        self.scheduler.set_external_control(control);
        Ok(())
    }

    pub async fn set_energy_unit(&mut self, price: EnergyPrice) -> Result<()> {
        self.write(&price).await?;
        self.thermostat.energy_price = Some(price);
        Ok(())
    }

    /// Device-kept hourly on-ratio history, oldest hour first, in UTC.
    pub async fn read_power_history(&mut self) -> Result<Vec<PowerHistoryEntry>> {
        let history: PowerConsumptionHistory = self.read().await?;
        let dst = self.dst_enabled();
        let mut entries: Vec<_> = history
            .hours
            .iter()
            .map(|entry| PowerHistoryEntry {
                hour_start: self.clock.to_utc(history.hour_start(entry), dst),
                ratio_percent: entry.ratio,
            })
            .collect();
        entries.sort_by_key(|entry| entry.hour_start);
        Ok(entries)
    }

    /// Reads the daily, monthly and hourly history and keeps it for snapshots.
    pub async fn read_monitoring_data(&mut self) -> Result<MonitoringData> {
        let data: MonitoringData = self.read().await?;
        debug!(
            address = %self.profile.address,
            anchor = ?data.temperature_anchor,
            "monitoring data read"
        );
        self.monitoring = Some(data.clone());
        Ok(data)
    }
}

fn parse_day(day: u8) -> Result<DayOfWeek> {
    check_range(Field::CalendarControl, day, 1, 7)?;
    DayOfWeek::from_number(day).ok_or_else(|| EnstoError::range(Field::CalendarControl, day, 1, 7))
}
