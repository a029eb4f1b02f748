use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveDateTime, Timelike, Utc};
use ensto_common::characteristics::{
    Field, ADAPTIVE_CONTROL_UUID, BOOST_UUID, CALENDAR_CONTROL_UUID, CALENDAR_DAY_UUID,
    CALENDAR_MODE_UUID, CALENDAR_STORE_TO_FLASH, DATE_TIME_UUID, DAYLIGHT_SAVING_UUID,
    DEVICE_NAME_UUID, ENERGY_UNIT_UUID, EXTERNAL_CONTROL_UUID, FLOOR_AREA_UUID,
    FLOOR_LIMITS_UUID, FLOOR_SENSOR_UUID, HEATING_MODE_UUID, HEATING_POWER_UUID,
    MODEL_NUMBER_UUID, MONITORING_DATA_UUID, POWER_CONSUMPTION_UUID, REAL_TIME_INDICATION_UUID,
    ROOM_CALIBRATION_UUID, SOFTWARE_REVISION_UUID, VACATION_TIME_UUID,
};
use ensto_common::codec::{
    AdaptiveControl, BoostConfig, CalendarMode, Characteristic, DaylightSaving, DeviceDateTime,
    DailyRatio, DeviceName, ExternalControlConfig, FloorArea, FloorSensorConfig, HeatingPower,
    HourlyRatio, HourlyReading, MonitoringData, MonthlyRatio, PowerConsumptionHistory,
    RealTimeIndication, RoomCalibration, VacationConfig,
};
use ensto_common::config::DeviceEntry;
use ensto_common::framing::{reassemble, split_for_read, LAST_PACKET};
use ensto_common::types::{
    ActiveMode, Currency, EnergyPrice, FloorLimits, FloorSensorType, HeatingMode, Offset,
};
use ensto_common::{EnstoError, Notification, Transport, TransportError};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::debug;

const DAY_LEN: usize = 49;

fn codec_failure(err: EnstoError) -> TransportError {
    TransportError::Failed(err.to_string())
}

struct DeviceMemory {
    values: HashMap<String, Vec<u8>>,
    calendar: HashMap<u8, Vec<u8>>,
    selected_day: u8,
    day_reads: VecDeque<Vec<u8>>,
    day_writes: Vec<Vec<u8>>,
    history_reads: VecDeque<Vec<u8>>,
    monitoring_reads: VecDeque<Vec<u8>>,
    clock_base: NaiveDateTime,
    clock_set_at: DateTime<Utc>,
    boost_until: Option<DateTime<Utc>>,
    relay_on: bool,
    room_temperature: f32,
    floor_temperature: f32,
    subscribers: Vec<mpsc::Sender<Notification>>,
}

impl DeviceMemory {
    fn device_time(&self, now: DateTime<Utc>) -> NaiveDateTime {
        self.clock_base + (now - self.clock_set_at)
    }

    fn decoded<C: Characteristic>(&self) -> Option<C> {
        self.values
            .get(C::FIELD.uuid())
            .and_then(|bytes| C::decode(bytes).ok())
    }

    fn boost_remaining_minutes(&self, now: DateTime<Utc>) -> u16 {
        self.boost_until
            .map(|until| (until - now).num_seconds().max(0))
            .map(|secs| ((secs + 59) / 60).min(u16::MAX as i64) as u16)
            .unwrap_or(0)
    }

    fn boost(&self, now: DateTime<Utc>) -> Option<BoostConfig> {
        let mut boost: BoostConfig = self.decoded()?;
        boost.remaining_minutes = self.boost_remaining_minutes(now);
        boost.enabled = boost.remaining_minutes > 0;
        Some(boost)
    }

    fn indication(&self, now: DateTime<Utc>) -> RealTimeIndication {
        let boost = self.boost(now);
        let calendar = self.decoded::<CalendarMode>().is_some_and(|mode| mode.0);
        RealTimeIndication {
            target_temperature: 21.0,
            target_power: 50,
            room_temperature: Some(self.room_temperature),
            floor_temperature: Some(self.floor_temperature),
            relay_on: self.relay_on,
            alarm_code: 0,
            active_mode: Some(if calendar {
                ActiveMode::Calendar
            } else {
                ActiveMode::Manual
            }),
            heating_mode: Some(self.decoded().unwrap_or(HeatingMode::Room)),
            boost_enabled: boost.is_some_and(|b| b.enabled),
            boost_duration_minutes: boost.map_or(0, |b| b.duration_minutes),
            boost_remaining_minutes: boost.map_or(0, |b| b.remaining_minutes),
            potentiometer: 0,
        }
    }

    fn power_history(&self, now: DateTime<Utc>) -> PowerConsumptionHistory {
        let local = self.device_time(now);
        let recorded_at = local
            .date()
            .and_hms_opt(local.hour(), 0, 0)
            .unwrap_or(local);
        let hours = (0..PowerConsumptionHistory::MAX_HOURS as u8)
            .map(|hours_ago| HourlyRatio {
                hours_ago,
                ratio: (hours_ago > 0).then(|| ((hours_ago as u16 * 37) % 101) as u8),
            })
            .collect();
        PowerConsumptionHistory { recorded_at, hours }
    }

    fn monitoring_data(&self, now: DateTime<Utc>) -> MonitoringData {
        let local = self.device_time(now);
        let anchor = local.date().and_hms_opt(local.hour(), 0, 0).unwrap_or(local);
        MonitoringData {
            daily_anchor: Some(local.date()),
            daily: (0..MonitoringData::DAYS as u8)
                .map(|days_ago| DailyRatio {
                    days_ago,
                    ratio: Some(30 + days_ago * 5),
                })
                .collect(),
            monthly_anchor: local.date().with_day(1),
            monthly: (0..MonitoringData::MONTHS as u8)
                .map(|months_ago| MonthlyRatio {
                    months_ago,
                    ratio: (months_ago < 9).then_some(20 + months_ago * 4),
                })
                .collect(),
            temperature_anchor: Some(anchor),
            temperatures: (0..MonitoringData::HOURS as u8)
                .map(|hours_ago| HourlyReading {
                    hours_ago,
                    floor: Some(self.floor_temperature - (hours_ago % 24) as f32 * 0.1),
                    room: Some(self.room_temperature),
                })
                .collect(),
        }
    }

    fn select_day(&mut self, day: u8) {
        self.selected_day = day;
        self.day_writes.clear();
        let stored = self.calendar.get(&day).cloned().unwrap_or_else(|| {
            let mut empty = vec![0; DAY_LEN];
            empty[0] = day;
            empty
        });
        self.day_reads = split_for_read(&stored).into();
    }
}

/// In-memory thermostat speaking the characteristic protocol. Stands in for
/// the radio link on hosts without one.
#[derive(Clone)]
pub struct SimulatedThermostat {
    memory: Arc<Mutex<DeviceMemory>>,
    latency: Duration,
}

impl SimulatedThermostat {
    pub fn new(
        entry: &DeviceEntry,
        local_now: NaiveDateTime,
        now: DateTime<Utc>,
    ) -> ensto_common::Result<Self> {
        let suffix = entry
            .address
            .get(entry.address.len().saturating_sub(5)..)
            .unwrap_or(&entry.address);
        let mut values = HashMap::new();
        let mut seed = |uuid: &str, payload: Vec<u8>| {
            values.insert(uuid.to_string(), payload);
        };

        seed(DEVICE_NAME_UUID, DeviceName::new(format!("Ensto {suffix}")).encode()?);
        seed(MODEL_NUMBER_UUID, entry.model_number.as_bytes().to_vec());
        seed(SOFTWARE_REVISION_UUID, entry.software_revision.as_bytes().to_vec());
        seed(
            DAYLIGHT_SAVING_UUID,
            DaylightSaving {
                enabled: true,
                winter_to_summer_minutes: 60,
                summer_to_winter_minutes: 60,
                timezone_offset_minutes: 120,
            }
            .encode()?,
        );
        seed(HEATING_MODE_UUID, HeatingMode::Room.encode()?);
        seed(
            BOOST_UUID,
            BoostConfig {
                enabled: false,
                offset: Offset::temperature(2.0),
                duration_minutes: 60,
                remaining_minutes: 0,
            }
            .encode()?,
        );
        seed(FLOOR_LIMITS_UUID, FloorLimits { min: 10.0, max: 30.0 }.encode()?);
        seed(ADAPTIVE_CONTROL_UUID, AdaptiveControl(false).encode()?);
        if let Some(sensor) = FloorSensorConfig::for_type(FloorSensorType::Ohm10k) {
            seed(FLOOR_SENSOR_UUID, sensor.encode()?);
        }
        seed(HEATING_POWER_UUID, HeatingPower(1000).encode()?);
        seed(FLOOR_AREA_UUID, FloorArea(10).encode()?);
        seed(ROOM_CALIBRATION_UUID, RoomCalibration(0.0).encode()?);
        seed(
            ENERGY_UNIT_UUID,
            EnergyPrice {
                currency: Currency::Eur,
                price: 0.15,
            }
            .encode()?,
        );
        seed(
            VACATION_TIME_UUID,
            VacationConfig {
                start: local_now,
                end: local_now + ChronoDuration::days(7),
                offset: Offset::temperature(-3.0),
                enabled: false,
                active: false,
            }
            .encode()?,
        );
        seed(CALENDAR_MODE_UUID, CalendarMode(false).encode()?);
        seed(EXTERNAL_CONTROL_UUID, ExternalControlConfig::blank().encode()?);

        Ok(Self {
            memory: Arc::new(Mutex::new(DeviceMemory {
                values,
                calendar: HashMap::new(),
                selected_day: 0,
                day_reads: VecDeque::new(),
                day_writes: Vec::new(),
                history_reads: VecDeque::new(),
                monitoring_reads: VecDeque::new(),
                clock_base: local_now,
                clock_set_at: now,
                boost_until: None,
                relay_on: false,
                room_temperature: 20.5,
                floor_temperature: 23.0,
                subscribers: Vec::new(),
            })),
            latency: Duration::from_millis(entry.response_latency_ms),
        })
    }

    /// Toggles the relay, nudges the temperatures and notifies subscribers.
    /// Returns how many subscribers received the indication.
    pub async fn emit_indication(&self, now: DateTime<Utc>) -> usize {
        let mut memory = self.memory.lock().await;
        memory.relay_on = !memory.relay_on;
        let step = if memory.relay_on { 0.1 } else { -0.1 };
        memory.room_temperature = (memory.room_temperature + step).clamp(18.0, 24.0);
        memory.floor_temperature = (memory.floor_temperature + 2.0 * step).clamp(18.0, 30.0);

        let payload = match memory.indication(now).encode() {
            Ok(payload) => payload,
            Err(err) => {
                debug!("indication not encodable: {err}");
                return 0;
            }
        };

        memory.subscribers.retain(|sender| !sender.is_closed());
        let mut delivered = 0;
        for sender in &memory.subscribers {
            let notification = Notification {
                uuid: REAL_TIME_INDICATION_UUID.to_string(),
                payload: payload.clone(),
                received_at: now,
            };
            if sender.try_send(notification).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    async fn respond_after_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    pub fn spawn_indications(&self, period: Duration) -> JoinHandle<()> {
        let device = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                device.emit_indication(Utc::now()).await;
            }
        })
    }
}

impl Transport for SimulatedThermostat {
    async fn read_characteristic(&self, uuid: &str) -> Result<Vec<u8>, TransportError> {
        self.respond_after_latency().await;
        let now = Utc::now();
        let mut memory = self.memory.lock().await;
        match uuid {
            DATE_TIME_UUID => DeviceDateTime(memory.device_time(now))
                .encode()
                .map_err(codec_failure),
            REAL_TIME_INDICATION_UUID => memory.indication(now).encode().map_err(codec_failure),
            BOOST_UUID => memory
                .boost(now)
                .ok_or_else(|| TransportError::Failed("boost unreadable".to_string()))?
                .encode()
                .map_err(codec_failure),
            CALENDAR_DAY_UUID => memory
                .day_reads
                .pop_front()
                .ok_or_else(|| TransportError::Failed("no calendar day selected".to_string())),
            POWER_CONSUMPTION_UUID => {
                if memory.history_reads.is_empty() {
                    let history = memory.power_history(now).encode().map_err(codec_failure)?;
                    memory.history_reads = split_for_read(&history).into();
                }
                memory
                    .history_reads
                    .pop_front()
                    .ok_or_else(|| TransportError::Failed("empty history".to_string()))
            }
            MONITORING_DATA_UUID => {
                if memory.monitoring_reads.is_empty() {
                    let data = memory.monitoring_data(now).encode().map_err(codec_failure)?;
                    memory.monitoring_reads = split_for_read(&data).into();
                }
                memory
                    .monitoring_reads
                    .pop_front()
                    .ok_or_else(|| TransportError::Failed("empty monitoring data".to_string()))
            }
            _ => memory
                .values
                .get(uuid)
                .cloned()
                .ok_or_else(|| TransportError::Failed(format!("characteristic {uuid} not found"))),
        }
    }

    async fn write_characteristic(&self, uuid: &str, payload: &[u8]) -> Result<(), TransportError> {
        self.respond_after_latency().await;
        let now = Utc::now();
        let mut memory = self.memory.lock().await;
        match uuid {
            DATE_TIME_UUID => {
                let DeviceDateTime(local) = DeviceDateTime::decode(payload).map_err(codec_failure)?;
                memory.clock_base = local;
                memory.clock_set_at = now;
            }
            CALENDAR_CONTROL_UUID => match payload.first() {
                Some(&CALENDAR_STORE_TO_FLASH) => debug!(day = memory.selected_day, "calendar stored"),
                Some(&day) => memory.select_day(day),
                None => return Err(TransportError::Failed("empty calendar control".to_string())),
            },
            CALENDAR_DAY_UUID => {
                memory.day_writes.push(payload.to_vec());
                if payload.first().is_some_and(|header| header & LAST_PACKET != 0) {
                    let packets = std::mem::take(&mut memory.day_writes);
                    let day = reassemble(Field::CalendarDay, &packets).map_err(codec_failure)?;
                    let selected = memory.selected_day;
                    memory.calendar.insert(selected, day);
                }
            }
            BOOST_UUID => {
                let boost = BoostConfig::decode(payload).map_err(codec_failure)?;
                memory.boost_until = boost
                    .enabled
                    .then(|| now + ChronoDuration::minutes(boost.duration_minutes as i64));
                memory.values.insert(uuid.to_string(), payload.to_vec());
            }
            MODEL_NUMBER_UUID
            | SOFTWARE_REVISION_UUID
            | REAL_TIME_INDICATION_UUID
            | POWER_CONSUMPTION_UUID
            | MONITORING_DATA_UUID => {
                return Err(TransportError::Failed(format!("characteristic {uuid} is read-only")));
            }
            _ => {
                let Some(stored) = memory.values.get_mut(uuid) else {
                    return Err(TransportError::Failed(format!("characteristic {uuid} not found")));
                };
                *stored = payload.to_vec();
            }
        }
        Ok(())
    }

    async fn subscribe(&self, uuid: &str, inbox: mpsc::Sender<Notification>) -> Result<(), TransportError> {
        if uuid != REAL_TIME_INDICATION_UUID {
            return Err(TransportError::Failed(format!("characteristic {uuid} does not notify")));
        }
        self.memory.lock().await.subscribers.push(inbox);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use ensto_common::calendar::{CalendarProgram, ClockTime, DayOfWeek};
    use ensto_common::clock::DstPolicy;
    use ensto_common::config::{EnergyConfig, TransportConfig};
    use ensto_common::{DeviceSession, ModelClass, SessionConfig};
    use pretty_assertions::assert_eq;

    fn local_now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, 10)
            .unwrap()
            .and_hms_opt(14, 0, 0)
            .unwrap()
    }

    fn simulator() -> SimulatedThermostat {
        let now = Utc.with_ymd_and_hms(2025, 1, 10, 12, 0, 0).unwrap();
        SimulatedThermostat::new(&DeviceEntry::new("90:FD:9F:00:00:01"), local_now(), now).unwrap()
    }

    fn session_config() -> SessionConfig {
        SessionConfig {
            transport: TransportConfig {
                timeout_ms: 1_000,
                calendar_settle_ms: 0,
            },
            energy: EnergyConfig::default(),
            dst_policy: DstPolicy::EuropeanUnion {
                standard_offset_minutes: 120,
                shift_minutes: 60,
            },
        }
    }

    #[tokio::test]
    async fn session_refreshes_against_simulator() {
        let device = simulator();
        let mut session = DeviceSession::open("90:FD:9F:00:00:01", device, session_config())
            .await
            .unwrap();
        assert_eq!(session.profile().model, ModelClass::Eco16Bt);

        session.refresh(Utc::now()).await.unwrap();
        let state = session.thermostat();
        assert_eq!(state.device_name.as_deref(), Some("Ensto 00:01"));
        assert_eq!(state.heating_mode, Some(HeatingMode::Room));
        assert_eq!(state.floor_sensor, Some(FloorSensorType::Ohm10k));
        assert_eq!(state.heating_power_watts, Some(1000));
        assert!(session.scheduler().calendar().is_loaded());
    }

    #[tokio::test]
    async fn calendar_days_are_kept_per_day() {
        let device = simulator();
        let mut session = DeviceSession::open("90:FD:9F:00:00:01", device, session_config())
            .await
            .unwrap();
        let program = CalendarProgram {
            start: ClockTime::new(22, 0),
            end: ClockTime::new(23, 30),
            offset: Offset::temperature(-2.0),
            enabled: true,
        };

        session.set_calendar_day(6, &[program]).await.unwrap();
        let saturday = session.get_calendar_day(6).await.unwrap();
        assert_eq!(saturday.day, DayOfWeek::Sat);
        assert_eq!(saturday.programs[0], program);

        let sunday = session.get_calendar_day(7).await.unwrap();
        assert!(sunday.programs.iter().all(|p| !p.enabled));
    }

    #[tokio::test]
    async fn indications_toggle_the_relay() {
        let device = simulator();
        let mut session = DeviceSession::open("90:FD:9F:00:00:01", device.clone(), session_config())
            .await
            .unwrap();

        let now = Utc::now();
        assert_eq!(device.emit_indication(now).await, 1);
        session.drain_inbox();
        assert_eq!(session.thermostat().relay_on, Some(true));

        device.emit_indication(now + ChronoDuration::seconds(1)).await;
        session.drain_inbox();
        assert_eq!(session.thermostat().relay_on, Some(false));
        assert!(session.snapshot(now + ChronoDuration::seconds(2)).power_usage.ratio_24h.is_some());
    }

    #[tokio::test]
    async fn read_only_characteristics_reject_writes() {
        let device = simulator();
        let err = device
            .write_characteristic(MODEL_NUMBER_UUID, b"OTHER")
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Failed(_)));
        let model = device.read_characteristic(MODEL_NUMBER_UUID).await.unwrap();
        assert_eq!(model, b"ECO16BT".to_vec());
    }

    #[tokio::test]
    async fn power_history_spans_a_day() {
        let device = simulator();
        let mut session = DeviceSession::open("90:FD:9F:00:00:01", device, session_config())
            .await
            .unwrap();
        let history = session.read_power_history().await.unwrap();
        assert_eq!(history.len(), PowerConsumptionHistory::MAX_HOURS);
        assert_eq!(history.last().unwrap().ratio_percent, None);
        assert!(history.windows(2).all(|pair| pair[0].hour_start < pair[1].hour_start));
    }

    #[tokio::test]
    async fn monitoring_data_spans_many_packets() {
        let device = simulator();
        let mut session = DeviceSession::open("90:FD:9F:00:00:01", device, session_config())
            .await
            .unwrap();
        let data = session.read_monitoring_data().await.unwrap();
        assert_eq!(data.daily.len(), MonitoringData::DAYS);
        assert_eq!(data.monthly[10].ratio, None);
        assert_eq!(data.temperatures.len(), MonitoringData::HOURS);
        assert!(data.temperature_anchor.is_some());

        let again = session.read_monitoring_data().await.unwrap();
        assert_eq!(again.daily, data.daily);
    }
}
