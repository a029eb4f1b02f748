use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HeatingMode {
    Floor,
    Room,
    Combination,
    Power,
    ForceControl,
}

impl HeatingMode {
    pub fn code(self) -> u8 {
        match self {
            Self::Floor => 1,
            Self::Room => 2,
            Self::Combination => 3,
            Self::Power => 4,
            Self::ForceControl => 5,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Floor),
            2 => Some(Self::Room),
            3 => Some(Self::Combination),
            4 => Some(Self::Power),
            5 => Some(Self::ForceControl),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Floor => "FLOOR",
            Self::Room => "ROOM",
            Self::Combination => "COMBINATION",
            Self::Power => "POWER",
            Self::ForceControl => "FORCE_CONTROL",
        }
    }

    /// Power mode regulates a duty-cycle percentage instead of a temperature.
    pub fn is_power(self) -> bool {
        self == Self::Power
    }
}

/// Mode the device itself reports as driving its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActiveMode {
    Manual,
    Calendar,
    Vacation,
}

impl ActiveMode {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Manual),
            2 => Some(Self::Calendar),
            3 => Some(Self::Vacation),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::Manual => 1,
            Self::Calendar => 2,
            Self::Vacation => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModelClass {
    Elte6Bt,
    Eco16Bt,
    Ephe5Bt,
    Generic,
}

impl ModelClass {
    /// Classifies the model-number string reported by the device.
    pub fn from_model_number(model_number: &str) -> Self {
        let upper = model_number.to_ascii_uppercase();
        if upper.contains("ECO16") {
            Self::Eco16Bt
        } else if upper.contains("ELTE6") {
            Self::Elte6Bt
        } else if upper.contains("EPHE5") {
            Self::Ephe5Bt
        } else {
            Self::Generic
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Elte6Bt => "ELTE6-BT",
            Self::Eco16Bt => "ECO16-BT",
            Self::Ephe5Bt => "EPHE5-BT",
            Self::Generic => "GENERIC",
        }
    }

    /// Models with a floor sensor input.
    pub fn has_floor_sensor(self) -> bool {
        self == Self::Eco16Bt
    }
}

impl fmt::Display for ModelClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FloorSensorType {
    Ohm6k8,
    Ohm10k,
    Ohm12k,
    Ohm15k,
    Ohm20k,
    Ohm33k,
    Ohm47k,
}

impl FloorSensorType {
    pub fn code(self) -> u8 {
        match self {
            Self::Ohm6k8 => 1,
            Self::Ohm10k => 2,
            Self::Ohm12k => 3,
            Self::Ohm15k => 4,
            Self::Ohm20k => 5,
            Self::Ohm33k => 6,
            Self::Ohm47k => 7,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Ohm6k8),
            2 => Some(Self::Ohm10k),
            3 => Some(Self::Ohm12k),
            4 => Some(Self::Ohm15k),
            5 => Some(Self::Ohm20k),
            6 => Some(Self::Ohm33k),
            7 => Some(Self::Ohm47k),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Ohm6k8 => "6.8 kOhm",
            Self::Ohm10k => "10 kOhm",
            Self::Ohm12k => "12 kOhm",
            Self::Ohm15k => "15 kOhm",
            Self::Ohm20k => "20 kOhm",
            Self::Ohm33k => "33 kOhm",
            Self::Ohm47k => "47 kOhm",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Eur,
    Sek,
    Nok,
    Rub,
    Usd,
}

impl Currency {
    pub fn code(self) -> u8 {
        match self {
            Self::Eur => 1,
            Self::Sek => 2,
            Self::Nok => 3,
            Self::Rub => 4,
            Self::Usd => 5,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Eur),
            2 => Some(Self::Sek),
            3 => Some(Self::Nok),
            4 => Some(Self::Rub),
            5 => Some(Self::Usd),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Alarm {
    SensorFault,
    CombinationLowLimit,
    CombinationHighLimit,
    InvalidVacation,
    InvalidCalendar,
    FloorSensorMissing,
    FloorSensorBroken,
    RoomSensorMissing,
    RoomSensorBroken,
    CombinationFaultySetValues,
    DayCalendarNotSet,
}

impl Alarm {
    const BITS: [(u32, Alarm); 11] = [
        (0x0001, Alarm::SensorFault),
        (0x0002, Alarm::CombinationLowLimit),
        (0x0004, Alarm::CombinationHighLimit),
        (0x0008, Alarm::InvalidVacation),
        (0x0010, Alarm::InvalidCalendar),
        (0x0020, Alarm::FloorSensorMissing),
        (0x0040, Alarm::FloorSensorBroken),
        (0x0080, Alarm::RoomSensorMissing),
        (0x0100, Alarm::RoomSensorBroken),
        (0x0200, Alarm::CombinationFaultySetValues),
        (0x0400, Alarm::DayCalendarNotSet),
    ];

    /// Expands the alarm bitfield. Reserved bits are ignored.
    pub fn from_code(code: u32) -> Vec<Alarm> {
        Self::BITS
            .iter()
            .filter(|(mask, _)| code & mask != 0)
            .map(|(_, alarm)| *alarm)
            .collect()
    }

    pub fn to_code(alarms: &[Alarm]) -> u32 {
        Self::BITS
            .iter()
            .filter(|(_, alarm)| alarms.contains(alarm))
            .fold(0, |code, (mask, _)| code | mask)
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::SensorFault => "Sensor fault (short-circuit)",
            Self::CombinationLowLimit => "Low limit reached in combination mode",
            Self::CombinationHighLimit => "High limit reached in combination mode",
            Self::InvalidVacation => "Invalid vacation configuration",
            Self::InvalidCalendar => "Invalid calendar configuration",
            Self::FloorSensorMissing => "Floor sensor missing",
            Self::FloorSensorBroken => "Floor sensor broken",
            Self::RoomSensorMissing => "Room sensor missing",
            Self::RoomSensorBroken => "Room sensor broken",
            Self::CombinationFaultySetValues => "Combination mode limits less than 8 degrees apart",
            Self::DayCalendarNotSet => "Day calendar is not set",
        }
    }
}

/// Host-driven override of the device target.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", content = "value", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExternalControl {
    #[default]
    Off,
    /// Absolute target, 5..=35 °C.
    Temperature(f32),
    /// Relative change to the current target, -20..=20 °C.
    TemperatureChange(f32),
}

impl ExternalControl {
    pub fn is_active(self) -> bool {
        self != Self::Off
    }
}

/// Temperature and power offsets shared by boost, vacation and calendar
/// programs. Which one applies depends on the heating mode.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Offset {
    pub temperature: f32,
    pub power: i8,
}

impl Offset {
    pub const TEMPERATURE_MIN: f32 = -20.0;
    pub const TEMPERATURE_MAX: f32 = 20.0;
    pub const POWER_MIN: i8 = -100;
    pub const POWER_MAX: i8 = 100;

    pub fn temperature(temperature: f32) -> Self {
        Self {
            temperature,
            power: 0,
        }
    }

    pub fn power(power: i8) -> Self {
        Self {
            temperature: 0.0,
            power,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Setpoint {
    Temperature(f32),
    Power(u8),
}

impl Setpoint {
    pub fn apply(self, offset: Offset) -> Self {
        match self {
            Self::Temperature(value) => Self::Temperature(value + offset.temperature),
            Self::Power(value) => {
                let shifted = (value as i16 + offset.power as i16).clamp(0, 100);
                Self::Power(shifted as u8)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FloorLimits {
    pub min: f32,
    pub max: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnergyPrice {
    pub currency: Currency,
    pub price: f32,
}

/// Last known device configuration and measurements. `None` means the value
/// has not been read yet or the device reported something undecodable.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThermostatState {
    pub device_name: Option<String>,
    pub heating_mode: Option<HeatingMode>,
    pub target_temperature: Option<f32>,
    pub target_power: Option<u8>,
    pub room_temperature: Option<f32>,
    pub floor_temperature: Option<f32>,
    pub relay_on: Option<bool>,
    pub active_mode: Option<ActiveMode>,
    pub alarms: Vec<Alarm>,
    pub floor_sensor: Option<FloorSensorType>,
    pub room_calibration: Option<f32>,
    pub floor_limits: Option<FloorLimits>,
    pub heating_power_watts: Option<u16>,
    pub floor_area: Option<u16>,
    pub daylight_saving: Option<bool>,
    pub adaptive_control: Option<bool>,
    pub external_control: Option<ExternalControl>,
    pub energy_price: Option<EnergyPrice>,
    pub device_time: Option<NaiveDateTime>,
}

impl ThermostatState {
    /// Unmodified target for the current heating mode.
    pub fn base_setpoint(&self) -> Option<Setpoint> {
        match self.heating_mode {
            Some(mode) if mode.is_power() => self.target_power.map(Setpoint::Power),
            _ => self.target_temperature.map(Setpoint::Temperature),
        }
    }
}
