//! Binary payload codec for every characteristic in [`crate::characteristics`].
//!
//! `encode` rejects values outside their domain with [`EnstoError::Range`];
//! `decode` rejects width mismatches and unknown enumeration bytes with
//! [`EnstoError::MalformedPayload`]. The real-time indication is the exception:
//! its mode bytes decode to `None` so the measurements still get through.

use chrono::{Datelike, Days, Duration, Months, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::characteristics::{Field, RATIO_UNSET, TEMPERATURE_UNSET};
use crate::error::{check_range, EnstoError, Result};
use crate::types::{
    ActiveMode, Alarm, Currency, EnergyPrice, ExternalControl, FloorLimits, FloorSensorType,
    HeatingMode, Offset,
};

pub trait Characteristic: Sized {
    const FIELD: Field;

    fn encode(&self) -> Result<Vec<u8>>;
    fn decode(bytes: &[u8]) -> Result<Self>;
}

pub fn encode<C: Characteristic>(value: &C) -> Result<Vec<u8>> {
    value.encode()
}

pub fn decode<C: Characteristic>(bytes: &[u8]) -> Result<C> {
    C::decode(bytes)
}

fn expect_width(field: Field, bytes: &[u8]) -> Result<()> {
    match field.width() {
        Some(width) if bytes.len() != width => Err(EnstoError::malformed(
            field,
            format!("expected {width} bytes, got {}", bytes.len()),
        )),
        _ => Ok(()),
    }
}

fn u16_at(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn i16_at(bytes: &[u8], at: usize) -> i16 {
    i16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn scaled_i16(field: Field, value: f32, scale: f32, min: f32, max: f32) -> Result<i16> {
    check_range(field, value, min, max)?;
    Ok((value * scale).round() as i16)
}

fn scaled_u16(field: Field, value: f32, scale: f32, min: f32, max: f32) -> Result<u16> {
    check_range(field, value, min, max)?;
    Ok((value * scale).round() as u16)
}

fn measured(raw: i16) -> Option<f32> {
    (raw != TEMPERATURE_UNSET).then(|| raw as f32 / 10.0)
}

fn measured_raw(value: Option<f32>) -> i16 {
    value.map_or(TEMPERATURE_UNSET, |v| (v * 10.0).round() as i16)
}

pub(crate) fn check_offset(field: Field, offset: Offset) -> Result<()> {
    check_range(
        field,
        offset.temperature,
        Offset::TEMPERATURE_MIN,
        Offset::TEMPERATURE_MAX,
    )?;
    check_range(field, offset.power, Offset::POWER_MIN, Offset::POWER_MAX)?;
    Ok(())
}

/// Appends the three-byte offset block: temperature in hundredths, then percent.
pub(crate) fn put_offset(out: &mut Vec<u8>, field: Field, offset: Offset) -> Result<()> {
    check_offset(field, offset)?;
    let temperature = (offset.temperature * 100.0).round() as i16;
    out.extend_from_slice(&temperature.to_le_bytes());
    out.push(offset.power as u8);
    Ok(())
}

pub(crate) fn offset_at(bytes: &[u8], at: usize) -> Offset {
    Offset {
        temperature: i16_at(bytes, at) as f32 / 100.0,
        power: bytes[at + 2] as i8,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceName {
    /// Leading byte the device keeps for itself; written back unchanged.
    pub header: u8,
    pub name: String,
}

impl DeviceName {
    pub const MAX_CHARS: usize = 25;

    pub fn new(name: impl Into<String>) -> Self {
        Self {
            header: 0,
            name: name.into(),
        }
    }

    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            header: self.header,
            name: name.into(),
        }
    }
}

impl Characteristic for DeviceName {
    const FIELD: Field = Field::DeviceName;

    fn encode(&self) -> Result<Vec<u8>> {
        let chars = self.name.chars().count() as u32;
        check_range(Self::FIELD, chars, 1, Self::MAX_CHARS as u32)?;
        if self.name.contains('\0') {
            return Err(EnstoError::validation(Self::FIELD, "name contains a NUL character"));
        }

        let mut out = Vec::with_capacity(60);
        out.push(self.header);
        out.extend_from_slice(self.name.as_bytes());
        if out.len() > 60 {
            return Err(EnstoError::validation(
                Self::FIELD,
                format!("encoded name is {} bytes, at most 59 fit", out.len() - 1),
            ));
        }
        out.resize(60, 0);
        Ok(out)
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() || bytes.len() > 60 {
            return Err(EnstoError::malformed(
                Self::FIELD,
                format!("expected 1..=60 bytes, got {}", bytes.len()),
            ));
        }
        let raw = &bytes[1..];
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        let name = std::str::from_utf8(&raw[..end])
            .map_err(|err| EnstoError::malformed(Self::FIELD, format!("name is not UTF-8: {err}")))?;
        Ok(Self {
            header: bytes[0],
            name: name.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelNumber(pub String);

impl Characteristic for ModelNumber {
    const FIELD: Field = Field::ModelNumber;

    fn encode(&self) -> Result<Vec<u8>> {
        Ok(self.0.as_bytes().to_vec())
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(bytes)
            .map_err(|err| EnstoError::malformed(Self::FIELD, err.to_string()))?;
        Ok(Self(text.trim_end_matches('\0').trim().to_string()))
    }
}

/// `application;ble-stack;bootloader`. Only the first two parts are text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SoftwareRevision {
    pub application: String,
    pub ble_stack: Option<String>,
}

impl SoftwareRevision {
    pub fn version(&self) -> Option<(u16, u16)> {
        let mut parts = self.application.trim().split('.');
        let major = parts.next()?.trim().parse().ok()?;
        let minor = parts.next()?.trim().parse().ok()?;
        Some((major, minor))
    }
}

impl Characteristic for SoftwareRevision {
    const FIELD: Field = Field::SoftwareRevision;

    fn encode(&self) -> Result<Vec<u8>> {
        let mut text = self.application.clone();
        if let Some(ble) = &self.ble_stack {
            text.push(';');
            text.push_str(ble);
        }
        Ok(text.into_bytes())
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let mut segments = bytes.split(|&b| b == b';');
        let text = |segment: &[u8]| -> Result<String> {
            std::str::from_utf8(segment)
                .map(|s| s.trim_end_matches('\0').to_string())
                .map_err(|err| EnstoError::malformed(Self::FIELD, err.to_string()))
        };

        let application = text(segments.next().unwrap_or_default())?;
        if application.is_empty() {
            return Err(EnstoError::malformed(Self::FIELD, "empty application revision"));
        }
        let ble_stack = segments.next().map(text).transpose()?;
        Ok(Self {
            application,
            ble_stack,
        })
    }
}

/// Device wall-clock time, second precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceDateTime(pub NaiveDateTime);

impl Characteristic for DeviceDateTime {
    const FIELD: Field = Field::DateTime;

    fn encode(&self) -> Result<Vec<u8>> {
        let year = check_range(Self::FIELD, self.0.year(), 0, 9999)? as u16;
        let mut out = Vec::with_capacity(7);
        out.extend_from_slice(&year.to_le_bytes());
        out.extend_from_slice(&[
            self.0.month() as u8,
            self.0.day() as u8,
            self.0.hour() as u8,
            self.0.minute() as u8,
            self.0.second() as u8,
        ]);
        Ok(out)
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        expect_width(Self::FIELD, bytes)?;
        let year = u16_at(bytes, 0) as i32;
        NaiveDate::from_ymd_opt(year, bytes[2] as u32, bytes[3] as u32)
            .and_then(|date| date.and_hms_opt(bytes[4] as u32, bytes[5] as u32, bytes[6] as u32))
            .map(Self)
            .ok_or_else(|| EnstoError::malformed(Self::FIELD, format!("invalid date/time {bytes:02x?}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaylightSaving {
    pub enabled: bool,
    pub winter_to_summer_minutes: i16,
    pub summer_to_winter_minutes: i16,
    pub timezone_offset_minutes: i16,
}

impl Characteristic for DaylightSaving {
    const FIELD: Field = Field::DaylightSaving;

    fn encode(&self) -> Result<Vec<u8>> {
        check_range(Self::FIELD, self.timezone_offset_minutes, -720, 840)?;
        check_range(Self::FIELD, self.winter_to_summer_minutes, 0, 120)?;
        check_range(Self::FIELD, self.summer_to_winter_minutes, 0, 120)?;

        let mut out = vec![self.enabled as u8, 0];
        out.extend_from_slice(&self.winter_to_summer_minutes.to_le_bytes());
        out.extend_from_slice(&self.summer_to_winter_minutes.to_le_bytes());
        out.extend_from_slice(&self.timezone_offset_minutes.to_le_bytes());
        Ok(out)
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        expect_width(Self::FIELD, bytes)?;
        Ok(Self {
            enabled: bytes[0] != 0,
            winter_to_summer_minutes: i16_at(bytes, 2),
            summer_to_winter_minutes: i16_at(bytes, 4),
            timezone_offset_minutes: i16_at(bytes, 6),
        })
    }
}

impl Characteristic for HeatingMode {
    const FIELD: Field = Field::HeatingMode;

    fn encode(&self) -> Result<Vec<u8>> {
        Ok(vec![self.code()])
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        expect_width(Self::FIELD, bytes)?;
        HeatingMode::from_code(bytes[0]).ok_or_else(|| {
            EnstoError::malformed(Self::FIELD, format!("unknown heating mode {}", bytes[0]))
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoostConfig {
    pub enabled: bool,
    pub offset: Offset,
    pub duration_minutes: u16,
    /// Maintained by the device; ignored on write.
    pub remaining_minutes: u16,
}

impl Characteristic for BoostConfig {
    const FIELD: Field = Field::Boost;

    fn encode(&self) -> Result<Vec<u8>> {
        let mut out = vec![self.enabled as u8];
        put_offset(&mut out, Self::FIELD, self.offset)?;
        out.extend_from_slice(&self.duration_minutes.to_le_bytes());
        out.extend_from_slice(&self.remaining_minutes.to_le_bytes());
        Ok(out)
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        expect_width(Self::FIELD, bytes)?;
        Ok(Self {
            enabled: bytes[0] != 0,
            offset: offset_at(bytes, 1),
            duration_minutes: u16_at(bytes, 4),
            remaining_minutes: u16_at(bytes, 6),
        })
    }
}

impl FloorLimits {
    pub const LOW_RANGE: (f32, f32) = (5.0, 42.0);
    pub const HIGH_RANGE: (f32, f32) = (13.0, 50.0);
    pub const MIN_GAP: f32 = 8.0;

    pub fn validate(&self) -> Result<(u16, u16)> {
        let field = Field::FloorLimits;
        let low = scaled_u16(field, self.min, 100.0, Self::LOW_RANGE.0, Self::LOW_RANGE.1)?;
        let high = scaled_u16(field, self.max, 100.0, Self::HIGH_RANGE.0, Self::HIGH_RANGE.1)?;
        if high < low || high - low < (Self::MIN_GAP * 100.0) as u16 {
            return Err(EnstoError::validation(
                field,
                format!(
                    "high limit {} must be at least {} above low limit {}",
                    self.max,
                    Self::MIN_GAP,
                    self.min
                ),
            ));
        }
        Ok((low, high))
    }
}

impl Characteristic for FloorLimits {
    const FIELD: Field = Field::FloorLimits;

    fn encode(&self) -> Result<Vec<u8>> {
        let (low, high) = self.validate()?;
        let mut out = Vec::with_capacity(4);
        out.extend_from_slice(&low.to_le_bytes());
        out.extend_from_slice(&high.to_le_bytes());
        Ok(out)
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        expect_width(Self::FIELD, bytes)?;
        Ok(Self {
            min: u16_at(bytes, 0) as f32 / 100.0,
            max: u16_at(bytes, 2) as f32 / 100.0,
        })
    }
}

macro_rules! bool_characteristic {
    ($name:ident, $field:expr) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $name(pub bool);

        impl Characteristic for $name {
            const FIELD: Field = $field;

            fn encode(&self) -> Result<Vec<u8>> {
                Ok(vec![self.0 as u8])
            }

            fn decode(bytes: &[u8]) -> Result<Self> {
                expect_width(Self::FIELD, bytes)?;
                Ok(Self(bytes[0] != 0))
            }
        }
    };
}

bool_characteristic!(AdaptiveControl, Field::AdaptiveControl);
bool_characteristic!(CalendarMode, Field::CalendarMode);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FloorSensorConfig {
    pub sensor_type: FloorSensorType,
    pub missing_limit: u16,
    pub b_value: u16,
    pub pull_up: u16,
    pub broken_limit: u16,
    pub resistance_25c: u16,
    pub offset: i16,
}

impl FloorSensorConfig {
    /// Parameter set the vendor app writes for each sensor it offers.
    pub fn for_type(sensor_type: FloorSensorType) -> Option<Self> {
        let (b_value, resistance_25c, offset) = match sensor_type {
            FloorSensorType::Ohm10k => (3800, 10_000, -1),
            FloorSensorType::Ohm12k => (3600, 12_000, -7),
            FloorSensorType::Ohm15k => (3400, 15_000, -5),
            FloorSensorType::Ohm33k => (4100, 33_000, -4),
            FloorSensorType::Ohm47k => (3850, 47_000, -8),
            FloorSensorType::Ohm6k8 | FloorSensorType::Ohm20k => return None,
        };
        Some(Self {
            sensor_type,
            missing_limit: 4007,
            b_value,
            pull_up: 47_000,
            broken_limit: 100,
            resistance_25c,
            offset,
        })
    }
}

impl Characteristic for FloorSensorConfig {
    const FIELD: Field = Field::FloorSensor;

    fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(13);
        out.push(self.sensor_type.code());
        for value in [
            self.missing_limit,
            self.b_value,
            self.pull_up,
            self.broken_limit,
            self.resistance_25c,
        ] {
            out.extend_from_slice(&value.to_le_bytes());
        }
        out.extend_from_slice(&self.offset.to_le_bytes());
        Ok(out)
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        expect_width(Self::FIELD, bytes)?;
        let sensor_type = FloorSensorType::from_code(bytes[0]).ok_or_else(|| {
            EnstoError::malformed(Self::FIELD, format!("unknown sensor type {}", bytes[0]))
        })?;
        Ok(Self {
            sensor_type,
            missing_limit: u16_at(bytes, 1),
            b_value: u16_at(bytes, 3),
            pull_up: u16_at(bytes, 5),
            broken_limit: u16_at(bytes, 7),
            resistance_25c: u16_at(bytes, 9),
            offset: i16_at(bytes, 11),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeatingPower(pub u16);

impl HeatingPower {
    pub const MAX_WATTS: u16 = 9999;
}

impl Characteristic for HeatingPower {
    const FIELD: Field = Field::HeatingPower;

    fn encode(&self) -> Result<Vec<u8>> {
        check_range(Self::FIELD, self.0, 0, Self::MAX_WATTS)?;
        Ok(self.0.to_le_bytes().to_vec())
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        expect_width(Self::FIELD, bytes)?;
        Ok(Self(u16_at(bytes, 0)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FloorArea(pub u16);

impl Characteristic for FloorArea {
    const FIELD: Field = Field::FloorArea;

    fn encode(&self) -> Result<Vec<u8>> {
        Ok(self.0.to_le_bytes().to_vec())
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        expect_width(Self::FIELD, bytes)?;
        Ok(Self(u16_at(bytes, 0)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoomCalibration(pub f32);

impl RoomCalibration {
    pub const MIN: f32 = -5.0;
    pub const MAX: f32 = 5.0;
}

impl Characteristic for RoomCalibration {
    const FIELD: Field = Field::RoomCalibration;

    fn encode(&self) -> Result<Vec<u8>> {
        let raw = scaled_i16(Self::FIELD, self.0, 10.0, Self::MIN, Self::MAX)?;
        Ok(raw.to_le_bytes().to_vec())
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        expect_width(Self::FIELD, bytes)?;
        Ok(Self(i16_at(bytes, 0) as f32 / 10.0))
    }
}

impl Characteristic for EnergyPrice {
    const FIELD: Field = Field::EnergyUnit;

    fn encode(&self) -> Result<Vec<u8>> {
        let price = scaled_u16(Self::FIELD, self.price, 100.0, 0.0, 655.35)?;
        let mut out = vec![self.currency.code(), 0];
        out.extend_from_slice(&price.to_le_bytes());
        Ok(out)
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        expect_width(Self::FIELD, bytes)?;
        let currency = Currency::from_code(bytes[0]).ok_or_else(|| {
            EnstoError::malformed(Self::FIELD, format!("unknown currency {}", bytes[0]))
        })?;
        Ok(Self {
            currency,
            price: u16_at(bytes, 2) as f32 / 100.0,
        })
    }
}

/// Vacation period in device wall-clock time, minute precision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VacationConfig {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub offset: Offset,
    pub enabled: bool,
    /// Reported by the device; ignored on write.
    pub active: bool,
}

fn put_vacation_time(out: &mut Vec<u8>, at: NaiveDateTime) -> Result<()> {
    let year = check_range(Field::VacationTime, at.year(), 2000, 2255)?;
    out.extend_from_slice(&[
        (year - 2000) as u8,
        at.month() as u8,
        at.day() as u8,
        at.hour() as u8,
        at.minute() as u8,
    ]);
    Ok(())
}

fn vacation_time_at(bytes: &[u8], at: usize) -> Result<NaiveDateTime> {
    let b = &bytes[at..at + 5];
    NaiveDate::from_ymd_opt(2000 + b[0] as i32, b[1] as u32, b[2] as u32)
        .and_then(|date| date.and_hms_opt(b[3] as u32, b[4] as u32, 0))
        .ok_or_else(|| EnstoError::malformed(Field::VacationTime, format!("invalid time {b:02x?}")))
}

impl Characteristic for VacationConfig {
    const FIELD: Field = Field::VacationTime;

    fn encode(&self) -> Result<Vec<u8>> {
        if self.end <= self.start {
            return Err(EnstoError::validation(
                Self::FIELD,
                format!("end {} is not after start {}", self.end, self.start),
            ));
        }
        let mut out = Vec::with_capacity(15);
        put_vacation_time(&mut out, self.start)?;
        put_vacation_time(&mut out, self.end)?;
        put_offset(&mut out, Self::FIELD, self.offset)?;
        out.push(self.enabled as u8);
        out.push(self.active as u8);
        Ok(out)
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        expect_width(Self::FIELD, bytes)?;
        Ok(Self {
            start: vacation_time_at(bytes, 0)?,
            end: vacation_time_at(bytes, 5)?,
            offset: offset_at(bytes, 10),
            enabled: bytes[13] != 0,
            active: bytes[14] != 0,
        })
    }
}

/// Real-time indication, notified by the device roughly once per second.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealTimeIndication {
    pub target_temperature: f32,
    pub target_power: u8,
    pub room_temperature: Option<f32>,
    pub floor_temperature: Option<f32>,
    pub relay_on: bool,
    pub alarm_code: u32,
    /// `None` when the device reports a mode this codec does not know.
    pub active_mode: Option<ActiveMode>,
    pub heating_mode: Option<HeatingMode>,
    pub boost_enabled: bool,
    pub boost_duration_minutes: u16,
    pub boost_remaining_minutes: u16,
    pub potentiometer: u8,
}

impl RealTimeIndication {
    pub const ACTIVE_MODE_AT: usize = 12;
    pub const HEATING_MODE_AT: usize = 13;
    /// Written in place of a mode that decoded as unknown.
    const UNKNOWN_MODE: u8 = 0xff;

    pub fn alarms(&self) -> Vec<Alarm> {
        Alarm::from_code(self.alarm_code)
    }
}

impl Characteristic for RealTimeIndication {
    const FIELD: Field = Field::RealTimeIndication;

    fn encode(&self) -> Result<Vec<u8>> {
        let target = scaled_u16(Self::FIELD, self.target_temperature, 10.0, 0.0, 6553.5)?;
        let mut out = Vec::with_capacity(20);
        out.extend_from_slice(&target.to_le_bytes());
        out.push(self.target_power);
        out.extend_from_slice(&measured_raw(self.room_temperature).to_le_bytes());
        out.extend_from_slice(&measured_raw(self.floor_temperature).to_le_bytes());
        out.push(self.relay_on as u8);
        out.extend_from_slice(&self.alarm_code.to_le_bytes());
        out.push(self.active_mode.map_or(Self::UNKNOWN_MODE, ActiveMode::code));
        out.push(self.heating_mode.map_or(Self::UNKNOWN_MODE, HeatingMode::code));
        out.push(self.boost_enabled as u8);
        out.extend_from_slice(&self.boost_duration_minutes.to_le_bytes());
        out.extend_from_slice(&self.boost_remaining_minutes.to_le_bytes());
        out.push(self.potentiometer);
        Ok(out)
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        expect_width(Self::FIELD, bytes)?;
        let active_mode = ActiveMode::from_code(bytes[Self::ACTIVE_MODE_AT]);
        let heating_mode = HeatingMode::from_code(bytes[Self::HEATING_MODE_AT]);
        // Only the two low alarm bytes are defined; the rest is reserved.
        let alarm_code = u16_at(bytes, 8) as u32;

        Ok(Self {
            target_temperature: u16_at(bytes, 0) as f32 / 10.0,
            target_power: bytes[2],
            room_temperature: measured(i16_at(bytes, 3)),
            floor_temperature: measured(i16_at(bytes, 5)),
            relay_on: bytes[7] != 0,
            alarm_code,
            active_mode,
            heating_mode,
            boost_enabled: bytes[14] != 0,
            boost_duration_minutes: u16_at(bytes, 15),
            boost_remaining_minutes: u16_at(bytes, 17),
            potentiometer: bytes[19],
        })
    }
}

/// External (force) control frame. Bytes not owned by the codec are kept as
/// read so that a write only changes the control fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalControlConfig {
    frame: Vec<u8>,
}

const EXT_FRAME_LEN: usize = 19;
const EXT_TEMPERATURE_AT: usize = 8;
const EXT_OFFSET_AT: usize = 12;
const EXT_MODE_AT: usize = 17;
const EXT_MODE_OFF: u8 = 1;
const EXT_MODE_TEMPERATURE: u8 = 5;
const EXT_MODE_CHANGE: u8 = 6;

impl ExternalControlConfig {
    pub const TEMPERATURE_RANGE: (f32, f32) = (5.0, 35.0);
    pub const CHANGE_RANGE: (f32, f32) = (-20.0, 20.0);

    pub fn blank() -> Self {
        let mut frame = vec![0; EXT_FRAME_LEN];
        frame[EXT_MODE_AT] = EXT_MODE_OFF;
        Self { frame }
    }

    /// Old firmware answers with a single byte and has no external control.
    pub fn is_legacy(&self) -> bool {
        self.frame.len() != EXT_FRAME_LEN
    }

    pub fn control(&self) -> ExternalControl {
        if self.is_legacy() {
            return ExternalControl::Off;
        }
        match self.frame[EXT_MODE_AT] {
            EXT_MODE_TEMPERATURE => {
                ExternalControl::Temperature(u16_at(&self.frame, EXT_TEMPERATURE_AT) as f32 / 10.0)
            }
            EXT_MODE_CHANGE => {
                ExternalControl::TemperatureChange(i16_at(&self.frame, EXT_OFFSET_AT) as f32 / 10.0)
            }
            _ => ExternalControl::Off,
        }
    }

    pub fn with_control(&self, control: ExternalControl) -> Result<Self> {
        let field = Field::ExternalControl;
        if self.is_legacy() {
            return Err(EnstoError::validation(
                field,
                "single-byte frame from legacy firmware cannot carry external control",
            ));
        }

        let mut frame = self.frame.clone();
        match control {
            ExternalControl::Off => frame[EXT_MODE_AT] = EXT_MODE_OFF,
            ExternalControl::Temperature(target) => {
                let (min, max) = Self::TEMPERATURE_RANGE;
                let raw = scaled_u16(field, target, 10.0, min, max)?;
                frame[EXT_TEMPERATURE_AT..EXT_TEMPERATURE_AT + 2].copy_from_slice(&raw.to_le_bytes());
                frame[EXT_MODE_AT] = EXT_MODE_TEMPERATURE;
            }
            ExternalControl::TemperatureChange(change) => {
                let (min, max) = Self::CHANGE_RANGE;
                let raw = scaled_i16(field, change, 10.0, min, max)?;
                frame[EXT_OFFSET_AT..EXT_OFFSET_AT + 2].copy_from_slice(&raw.to_le_bytes());
                frame[EXT_MODE_AT] = EXT_MODE_CHANGE;
            }
        }
        Ok(Self { frame })
    }
}

impl Characteristic for ExternalControlConfig {
    const FIELD: Field = Field::ExternalControl;

    fn encode(&self) -> Result<Vec<u8>> {
        Ok(self.frame.clone())
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() == 1 {
            return Ok(Self {
                frame: bytes.to_vec(),
            });
        }
        expect_width(Self::FIELD, bytes)?;
        match bytes[EXT_MODE_AT] {
            0..=2 | EXT_MODE_TEMPERATURE | EXT_MODE_CHANGE => Ok(Self {
                frame: bytes.to_vec(),
            }),
            other => Err(EnstoError::malformed(
                Self::FIELD,
                format!("unknown external control mode {other}"),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HourlyRatio {
    pub hours_ago: u8,
    /// Relay on-ratio for the hour in percent; `None` when the device has no data.
    pub ratio: Option<u8>,
}

/// On-ratio history of the last 25 hours as kept by the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PowerConsumptionHistory {
    /// Device wall-clock hour the history was taken at.
    pub recorded_at: NaiveDateTime,
    pub hours: Vec<HourlyRatio>,
}

impl PowerConsumptionHistory {
    pub const MAX_HOURS: usize = 25;

    pub fn hour_start(&self, entry: &HourlyRatio) -> NaiveDateTime {
        self.recorded_at - Duration::hours(entry.hours_ago as i64)
    }
}

impl Characteristic for PowerConsumptionHistory {
    const FIELD: Field = Field::PowerConsumption;

    fn encode(&self) -> Result<Vec<u8>> {
        let year = check_range(Self::FIELD, self.recorded_at.year(), 2000, 2255)?;
        check_range(Self::FIELD, self.hours.len() as u32, 0, Self::MAX_HOURS as u32)?;

        let mut out = vec![
            self.recorded_at.hour() as u8,
            self.recorded_at.day() as u8,
            self.recorded_at.month() as u8,
            (year - 2000) as u8,
        ];
        for entry in &self.hours {
            out.push(entry.hours_ago);
            out.push(entry.ratio.unwrap_or(RATIO_UNSET));
        }
        out.resize(4 + Self::MAX_HOURS * 2, RATIO_UNSET);
        Ok(out)
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 4 || bytes.len() > 4 + Self::MAX_HOURS * 2 {
            return Err(EnstoError::malformed(
                Self::FIELD,
                format!("expected 4..=54 bytes, got {}", bytes.len()),
            ));
        }
        let recorded_at = NaiveDate::from_ymd_opt(2000 + bytes[3] as i32, bytes[2] as u32, bytes[1] as u32)
            .and_then(|date| date.and_hms_opt(bytes[0] as u32, 0, 0))
            .ok_or_else(|| {
                EnstoError::malformed(Self::FIELD, format!("invalid header {:02x?}", &bytes[..4]))
            })?;

        let hours = bytes[4..]
            .chunks_exact(2)
            .filter(|pair| pair[0] != RATIO_UNSET)
            .map(|pair| HourlyRatio {
                hours_ago: pair[0],
                ratio: (pair[1] != RATIO_UNSET).then_some(pair[1]),
            })
            .collect();

        Ok(Self { recorded_at, hours })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyRatio {
    pub days_ago: u8,
    pub ratio: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyRatio {
    pub months_ago: u8,
    pub ratio: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HourlyReading {
    pub hours_ago: u8,
    pub floor: Option<f32>,
    pub room: Option<f32>,
}

/// Long-term history kept by the device: a week of daily on-ratios, a year of
/// monthly on-ratios and a week of hourly temperatures. Each section is
/// anchored at a device wall-clock date; an anchor the device has not set yet
/// decodes as `None` while the entries are still kept.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringData {
    pub daily_anchor: Option<NaiveDate>,
    pub daily: Vec<DailyRatio>,
    pub monthly_anchor: Option<NaiveDate>,
    pub monthly: Vec<MonthlyRatio>,
    pub temperature_anchor: Option<NaiveDateTime>,
    pub temperatures: Vec<HourlyReading>,
}

impl MonitoringData {
    pub const DAYS: usize = 7;
    pub const MONTHS: usize = 12;
    pub const HOURS: usize = 168;

    // Each ratio section carries one spare slot after its entries.
    const MONTHLY_AT: usize = 3 + (Self::DAYS + 1) * 2;
    const TEMPERATURES_AT: usize = Self::MONTHLY_AT + 2 + (Self::MONTHS + 1) * 2;
    const TEMPERATURE_LEN: usize = 5;

    pub fn day_of(&self, entry: &DailyRatio) -> Option<NaiveDate> {
        self.daily_anchor?
            .checked_sub_days(Days::new(entry.days_ago as u64))
    }

    pub fn month_of(&self, entry: &MonthlyRatio) -> Option<NaiveDate> {
        self.monthly_anchor?
            .checked_sub_months(Months::new(entry.months_ago as u32))
    }

    pub fn hour_of(&self, entry: &HourlyReading) -> Option<NaiveDateTime> {
        self.temperature_anchor?
            .checked_sub_signed(Duration::hours(entry.hours_ago as i64))
    }
}

fn anchor_date(year: u8, month: u8, day: u8) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(2000 + year as i32, month as u32, day as u32)
}

/// Day, month and two-digit year; zeros when the anchor is unset.
fn anchor_bytes(date: Option<NaiveDate>) -> Result<[u8; 3]> {
    let Some(date) = date else {
        return Ok([0; 3]);
    };
    let year = check_range(Field::MonitoringData, date.year(), 2000, 2255)?;
    Ok([date.day() as u8, date.month() as u8, (year - 2000) as u8])
}

fn ratio(raw: u8) -> Option<u8> {
    (raw != RATIO_UNSET).then_some(raw)
}

impl Characteristic for MonitoringData {
    const FIELD: Field = Field::MonitoringData;

    fn encode(&self) -> Result<Vec<u8>> {
        for (section, len, expected) in [
            ("daily", self.daily.len(), Self::DAYS),
            ("monthly", self.monthly.len(), Self::MONTHS),
            ("temperature", self.temperatures.len(), Self::HOURS),
        ] {
            if len != expected {
                return Err(EnstoError::validation(
                    Self::FIELD,
                    format!("{section} section needs {expected} entries, got {len}"),
                ));
            }
        }

        let mut out = Vec::with_capacity(Self::TEMPERATURES_AT + 4 + Self::HOURS * Self::TEMPERATURE_LEN);
        out.extend_from_slice(&anchor_bytes(self.daily_anchor)?);
        for entry in &self.daily {
            out.extend_from_slice(&[entry.days_ago, entry.ratio.unwrap_or(RATIO_UNSET)]);
        }
        out.resize(Self::MONTHLY_AT, RATIO_UNSET);

        out.extend_from_slice(&anchor_bytes(self.monthly_anchor)?[1..]);
        for entry in &self.monthly {
            out.extend_from_slice(&[entry.months_ago, entry.ratio.unwrap_or(RATIO_UNSET)]);
        }
        out.resize(Self::TEMPERATURES_AT, RATIO_UNSET);

        let hour = self.temperature_anchor.map_or(0, |at| at.hour() as u8);
        out.push(hour);
        out.extend_from_slice(&anchor_bytes(self.temperature_anchor.map(|at| at.date()))?);
        for entry in &self.temperatures {
            out.push(entry.hours_ago);
            out.extend_from_slice(&measured_raw(entry.floor).to_le_bytes());
            out.extend_from_slice(&measured_raw(entry.room).to_le_bytes());
        }
        Ok(out)
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        expect_width(Self::FIELD, bytes)?;

        let daily_anchor = anchor_date(bytes[2], bytes[1], bytes[0]);
        let daily = bytes[3..3 + Self::DAYS * 2]
            .chunks_exact(2)
            .map(|pair| DailyRatio {
                days_ago: pair[0],
                ratio: ratio(pair[1]),
            })
            .collect();

        let at = Self::MONTHLY_AT;
        let monthly_anchor = anchor_date(bytes[at + 1], bytes[at], 1);
        let monthly = bytes[at + 2..at + 2 + Self::MONTHS * 2]
            .chunks_exact(2)
            .map(|pair| MonthlyRatio {
                months_ago: pair[0],
                ratio: ratio(pair[1]),
            })
            .collect();

        let at = Self::TEMPERATURES_AT;
        let temperature_anchor = anchor_date(bytes[at + 3], bytes[at + 2], bytes[at + 1])
            .and_then(|date| date.and_hms_opt(bytes[at] as u32, 0, 0));
        let temperatures = bytes[at + 4..]
            .chunks_exact(Self::TEMPERATURE_LEN)
            .map(|entry| HourlyReading {
                hours_ago: entry[0],
                floor: measured(i16_at(entry, 1)),
                room: measured(i16_at(entry, 3)),
            })
            .collect();

        Ok(Self {
            daily_anchor,
            daily,
            monthly_anchor,
            monthly,
            temperature_anchor,
            temperatures,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, 0)
            .unwrap()
    }

    #[test]
    fn room_calibration_round_trips_within_a_tenth() {
        let bytes = RoomCalibration(2.3).encode().unwrap();
        assert_eq!(bytes, vec![23, 0]);
        let decoded = RoomCalibration::decode(&bytes).unwrap();
        assert!((decoded.0 - 2.3).abs() <= 0.05);

        let negative = RoomCalibration(-4.9).encode().unwrap();
        assert_eq!(negative, (-49i16).to_le_bytes().to_vec());
    }

    #[test]
    fn room_calibration_outside_range_is_rejected() {
        let err = RoomCalibration(7.5).encode().unwrap_err();
        assert_eq!(
            err,
            EnstoError::Range {
                field: Field::RoomCalibration,
                value: 7.5,
                min: -5.0,
                max: 5.0,
            }
        );
    }

    #[test]
    fn width_mismatch_is_malformed() {
        assert!(RoomCalibration::decode(&[1]).unwrap_err().is_malformed());
        assert!(BoostConfig::decode(&[0; 7]).unwrap_err().is_malformed());
        assert!(RealTimeIndication::decode(&[0; 21]).unwrap_err().is_malformed());
    }

    #[test]
    fn unknown_heating_mode_is_malformed() {
        assert!(HeatingMode::decode(&[9]).unwrap_err().is_malformed());
        assert_eq!(HeatingMode::decode(&[4]).unwrap(), HeatingMode::Power);
    }

    #[test]
    fn floor_limits_require_an_eight_degree_gap() {
        let too_close = FloorLimits { min: 10.0, max: 17.0 };
        assert!(matches!(
            too_close.encode(),
            Err(EnstoError::Validation { field: Field::FloorLimits, .. })
        ));

        let ok = FloorLimits { min: 10.0, max: 18.0 };
        let bytes = ok.encode().unwrap();
        assert_eq!(bytes, vec![0xe8, 0x03, 0x08, 0x07]);
        assert_eq!(FloorLimits::decode(&bytes).unwrap(), ok);
    }

    #[test]
    fn floor_limits_out_of_range_is_range_error() {
        let low = FloorLimits { min: 4.0, max: 20.0 };
        assert!(matches!(low.encode(), Err(EnstoError::Range { .. })));
        let high = FloorLimits { min: 20.0, max: 51.0 };
        assert!(matches!(high.encode(), Err(EnstoError::Range { .. })));
    }

    #[test]
    fn boost_layout_matches_device() {
        let boost = BoostConfig {
            enabled: true,
            offset: Offset {
                temperature: 2.5,
                power: -10,
            },
            duration_minutes: 30,
            remaining_minutes: 12,
        };
        let bytes = boost.encode().unwrap();
        assert_eq!(bytes, vec![1, 0xfa, 0x00, 0xf6, 30, 0, 12, 0]);
        assert_eq!(BoostConfig::decode(&bytes).unwrap(), boost);
    }

    #[test]
    fn boost_offset_outside_range_is_rejected() {
        let boost = BoostConfig {
            enabled: true,
            offset: Offset::temperature(25.0),
            duration_minutes: 30,
            remaining_minutes: 0,
        };
        assert!(matches!(boost.encode(), Err(EnstoError::Range { .. })));
    }

    #[test]
    fn device_name_keeps_header_and_pads() {
        let mut raw = vec![7u8];
        raw.extend_from_slice("Olohuone".as_bytes());
        raw.resize(60, 0);

        let name = DeviceName::decode(&raw).unwrap();
        assert_eq!(name.header, 7);
        assert_eq!(name.name, "Olohuone");

        let renamed = name.renamed("Kylpyhuone").encode().unwrap();
        assert_eq!(renamed.len(), 60);
        assert_eq!(renamed[0], 7);
        assert_eq!(&renamed[1..11], "Kylpyhuone".as_bytes());
        assert!(renamed[11..].iter().all(|&b| b == 0));
    }

    #[test]
    fn device_name_length_is_limited_to_25_chars() {
        assert!(DeviceName::new("ä".repeat(25)).encode().is_ok());
        assert!(matches!(
            DeviceName::new("a".repeat(26)).encode(),
            Err(EnstoError::Range { .. })
        ));
        assert!(DeviceName::new("").encode().is_err());
    }

    #[test]
    fn software_revision_parses_version() {
        let revision = SoftwareRevision::decode(b"1.14.0;6.1.0;\x01\x02\x03\x04").unwrap();
        assert_eq!(revision.application, "1.14.0");
        assert_eq!(revision.ble_stack.as_deref(), Some("6.1.0"));
        assert_eq!(revision.version(), Some((1, 14)));

        let old = SoftwareRevision::decode(b"1.9.2").unwrap();
        assert_eq!(old.version(), Some((1, 9)));
        assert!(old.version() < Some((1, 14)));
    }

    #[test]
    fn date_time_layout() {
        let bytes = DeviceDateTime(NaiveDate::from_ymd_opt(2025, 3, 30).unwrap().and_hms_opt(4, 5, 6).unwrap())
            .encode()
            .unwrap();
        assert_eq!(bytes, vec![0xe9, 0x07, 3, 30, 4, 5, 6]);
        assert!(DeviceDateTime::decode(&[0xe9, 0x07, 2, 30, 0, 0, 0]).unwrap_err().is_malformed());
    }

    #[test]
    fn vacation_round_trips_and_validates_order() {
        let vacation = VacationConfig {
            start: at(2025, 1, 10, 0, 0),
            end: at(2025, 1, 15, 0, 0),
            offset: Offset {
                temperature: -3.0,
                power: -20,
            },
            enabled: true,
            active: false,
        };
        let bytes = vacation.encode().unwrap();
        assert_eq!(&bytes[..10], &[25, 1, 10, 0, 0, 25, 1, 15, 0, 0]);
        assert_eq!(VacationConfig::decode(&bytes).unwrap(), vacation);

        let reversed = VacationConfig {
            start: vacation.end,
            end: vacation.start,
            ..vacation
        };
        assert!(matches!(reversed.encode(), Err(EnstoError::Validation { .. })));
    }

    #[test]
    fn real_time_indication_decodes_measurements() {
        let mut bytes = vec![0u8; 20];
        bytes[0..2].copy_from_slice(&215u16.to_le_bytes());
        bytes[2] = 35;
        bytes[3..5].copy_from_slice(&204i16.to_le_bytes());
        bytes[5..7].copy_from_slice(&TEMPERATURE_UNSET.to_le_bytes());
        bytes[7] = 1;
        bytes[8] = 0x20;
        bytes[9] = 0x04;
        bytes[11] = 0xff;
        bytes[12] = 2;
        bytes[13] = 2;
        bytes[14] = 1;
        bytes[15..17].copy_from_slice(&60u16.to_le_bytes());
        bytes[17..19].copy_from_slice(&42u16.to_le_bytes());
        bytes[19] = 50;

        let indication = RealTimeIndication::decode(&bytes).unwrap();
        assert_eq!(indication.target_temperature, 21.5);
        assert_eq!(indication.room_temperature, Some(20.4));
        assert_eq!(indication.floor_temperature, None);
        assert!(indication.relay_on);
        assert_eq!(
            indication.alarms(),
            vec![Alarm::FloorSensorMissing, Alarm::DayCalendarNotSet]
        );
        assert_eq!(indication.active_mode, Some(ActiveMode::Calendar));
        assert_eq!(indication.heating_mode, Some(HeatingMode::Room));
        assert_eq!(indication.boost_remaining_minutes, 42);

        bytes[11] = 0;
        assert_eq!(indication.encode().unwrap(), bytes);
    }

    #[test]
    fn real_time_indication_tolerates_unknown_modes() {
        let mut bytes = vec![0u8; 20];
        bytes[3..5].copy_from_slice(&198i16.to_le_bytes());
        bytes[7] = 1;
        bytes[RealTimeIndication::ACTIVE_MODE_AT] = 9;
        bytes[RealTimeIndication::HEATING_MODE_AT] = 9;

        let indication = RealTimeIndication::decode(&bytes).unwrap();
        assert_eq!(indication.active_mode, None);
        assert_eq!(indication.heating_mode, None);
        assert_eq!(indication.room_temperature, Some(19.8));
        assert!(indication.relay_on);
        assert_eq!(indication.encode().unwrap()[RealTimeIndication::ACTIVE_MODE_AT], 0xff);
    }

    #[test]
    fn external_control_preserves_foreign_bytes() {
        let mut raw: Vec<u8> = (100..119).collect();
        raw[EXT_MODE_AT] = 1;
        let config = ExternalControlConfig::decode(&raw).unwrap();
        assert_eq!(config.control(), ExternalControl::Off);

        let updated = config
            .with_control(ExternalControl::Temperature(22.5))
            .unwrap()
            .encode()
            .unwrap();
        assert_eq!(&updated[8..10], &225u16.to_le_bytes());
        assert_eq!(updated[17], 5);
        for index in (0..8).chain(10..17).chain(18..19) {
            assert_eq!(updated[index], raw[index], "byte {index} changed");
        }
    }

    #[test]
    fn external_control_ranges_and_legacy_frame() {
        let blank = ExternalControlConfig::blank();
        assert!(matches!(
            blank.with_control(ExternalControl::Temperature(36.0)),
            Err(EnstoError::Range { .. })
        ));
        let change = blank
            .with_control(ExternalControl::TemperatureChange(-2.5))
            .unwrap();
        assert_eq!(change.control(), ExternalControl::TemperatureChange(-2.5));

        let legacy = ExternalControlConfig::decode(&[40]).unwrap();
        assert!(legacy.is_legacy());
        assert!(legacy.with_control(ExternalControl::Off).is_err());

        let mut bad = vec![0u8; 19];
        bad[EXT_MODE_AT] = 9;
        assert!(ExternalControlConfig::decode(&bad).unwrap_err().is_malformed());
    }

    #[test]
    fn power_consumption_history_skips_unset_slots() {
        let mut bytes = vec![14, 12, 3, 25];
        bytes.extend_from_slice(&[0, 90, 1, 0xff, 2, 40]);
        let history = PowerConsumptionHistory::decode(&bytes).unwrap();

        assert_eq!(history.recorded_at, at(2025, 3, 12, 14, 0));
        assert_eq!(
            history.hours,
            vec![
                HourlyRatio { hours_ago: 0, ratio: Some(90) },
                HourlyRatio { hours_ago: 1, ratio: None },
                HourlyRatio { hours_ago: 2, ratio: Some(40) },
            ]
        );
        assert_eq!(history.hour_start(&history.hours[2]), at(2025, 3, 12, 12, 0));

        let encoded = history.encode().unwrap();
        assert_eq!(encoded.len(), 54);
        assert_eq!(PowerConsumptionHistory::decode(&encoded).unwrap(), history);
    }

    fn monitoring_sample() -> MonitoringData {
        MonitoringData {
            daily_anchor: NaiveDate::from_ymd_opt(2025, 3, 12),
            daily: (0..7)
                .map(|days_ago| DailyRatio {
                    days_ago,
                    ratio: (days_ago != 3).then_some(10 * days_ago),
                })
                .collect(),
            monthly_anchor: NaiveDate::from_ymd_opt(2025, 2, 1),
            monthly: (0..12)
                .map(|months_ago| MonthlyRatio {
                    months_ago,
                    ratio: Some(50 + months_ago),
                })
                .collect(),
            temperature_anchor: Some(at(2025, 3, 12, 14, 0)),
            temperatures: (0..168)
                .map(|hours_ago| HourlyReading {
                    hours_ago,
                    floor: (hours_ago % 2 == 0).then_some(24.5),
                    room: Some(-1.5),
                })
                .collect(),
        }
    }

    #[test]
    fn monitoring_data_maps_unset_values_to_none() {
        let data = monitoring_sample();
        let bytes = data.encode().unwrap();
        assert_eq!(bytes.len(), 891);
        assert_eq!(&bytes[0..3], &[12, 3, 25]);
        assert_eq!(&bytes[19..21], &[2, 25]);
        assert_eq!(&bytes[47..51], &[14, 12, 3, 25]);
        assert_eq!(bytes[3 + 3 * 2 + 1], RATIO_UNSET);
        assert_eq!(&bytes[52..54], &245i16.to_le_bytes());
        assert_eq!(&bytes[57..59], &TEMPERATURE_UNSET.to_le_bytes());

        let decoded = MonitoringData::decode(&bytes).unwrap();
        assert_eq!(decoded, data);
        assert_eq!(decoded.daily[3].ratio, None);
        assert_eq!(decoded.temperatures[1].floor, None);
        assert_eq!(decoded.temperatures[1].room, Some(-1.5));

        assert_eq!(decoded.day_of(&decoded.daily[6]), NaiveDate::from_ymd_opt(2025, 3, 6));
        assert_eq!(decoded.month_of(&decoded.monthly[3]), NaiveDate::from_ymd_opt(2024, 11, 1));
        assert_eq!(decoded.hour_of(&decoded.temperatures[15]), Some(at(2025, 3, 11, 23, 0)));
    }

    #[test]
    fn monitoring_data_without_anchors_keeps_entries() {
        let data = MonitoringData {
            daily_anchor: None,
            monthly_anchor: None,
            temperature_anchor: None,
            ..monitoring_sample()
        };
        let decoded = MonitoringData::decode(&data.encode().unwrap()).unwrap();
        assert_eq!(decoded.temperature_anchor, None);
        assert_eq!(decoded.temperatures.len(), MonitoringData::HOURS);
        assert_eq!(decoded.hour_of(&decoded.temperatures[0]), None);

        assert!(MonitoringData::decode(&[0; 890]).unwrap_err().is_malformed());
        let short = MonitoringData {
            daily: Vec::new(),
            ..monitoring_sample()
        };
        assert!(matches!(short.encode(), Err(EnstoError::Validation { .. })));
    }

    #[test]
    fn room_calibration_covers_its_range_in_tenths() {
        for tenths in -50i16..=50 {
            let value = tenths as f32 / 10.0;
            let bytes = RoomCalibration(value).encode().unwrap();
            assert_eq!(bytes, tenths.to_le_bytes().to_vec(), "encoding {value}");
            assert_eq!(RoomCalibration::decode(&bytes).unwrap().0, value);
        }
        for outside in [-5.1f32, 5.1] {
            assert!(matches!(
                RoomCalibration(outside).encode(),
                Err(EnstoError::Range { .. })
            ));
        }
    }

    #[test]
    fn energy_price_and_floor_sensor_tables() {
        let price = EnergyPrice {
            currency: Currency::Sek,
            price: 1.2,
        };
        let bytes = price.encode().unwrap();
        assert_eq!(bytes, vec![2, 0, 120, 0]);
        assert!(EnergyPrice::decode(&[9, 0, 0, 0]).unwrap_err().is_malformed());

        let sensor = FloorSensorConfig::for_type(FloorSensorType::Ohm10k).unwrap();
        let decoded = FloorSensorConfig::decode(&sensor.encode().unwrap()).unwrap();
        assert_eq!(decoded, sensor);
        assert_eq!(decoded.resistance_25c, 10_000);
        assert!(FloorSensorConfig::for_type(FloorSensorType::Ohm20k).is_none());
    }

    #[test]
    fn heating_power_limit() {
        assert!(HeatingPower(9999).encode().is_ok());
        assert!(matches!(HeatingPower(10_000).encode(), Err(EnstoError::Range { .. })));
    }
}
