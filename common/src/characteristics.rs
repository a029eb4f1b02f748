//! GATT characteristic table of the Ensto BLE interface.
//!
//! Every multi-byte integer on the wire is little-endian. Widths listed here
//! are the exact payload sizes the codec accepts; `None` marks variable-width
//! fields (strings and split-framed messages).

use std::fmt;

use serde::Serialize;

pub const DEVICE_NAME_UUID: &str = "00002a00-0000-1000-8000-00805f9b34fb";
pub const MODEL_NUMBER_UUID: &str = "00002a24-0000-1000-8000-00805f9b34fb";
pub const SOFTWARE_REVISION_UUID: &str = "00002a28-0000-1000-8000-00805f9b34fb";

pub const DATE_TIME_UUID: &str = "b43f918a-b084-45c8-9b60-df648c4a4a1e";
pub const DAYLIGHT_SAVING_UUID: &str = "e4f66642-ed89-4c73-be57-2158c225bbde";
pub const HEATING_MODE_UUID: &str = "4eb1d6a2-19e0-4809-ba55-4a94e7d9b763";
pub const BOOST_UUID: &str = "ca3c0685-b708-4cd4-a049-5badd10469e7";
pub const FLOOR_LIMITS_UUID: &str = "89b4c78f-6d5e-4cfa-8e81-4eca9738bbfd";
pub const ADAPTIVE_CONTROL_UUID: &str = "c2dc85e9-47bf-4968-9562-d2e1980ed4e4";
pub const FLOOR_SENSOR_UUID: &str = "f561ce1f-61fb-4fa2-8bef-5fecc949b55b";
pub const HEATING_POWER_UUID: &str = "53b7bf87-6cf0-4790-839a-e72d3afbec44";
pub const FLOOR_AREA_UUID: &str = "5c897ab6-354c-443d-9f36-f3f7263868dd";
pub const ROOM_CALIBRATION_UUID: &str = "1eca4351-b264-4db6-9c59-af4341d6ce69";
pub const ENERGY_UNIT_UUID: &str = "ccf1fe7b-d928-45b1-abba-7a915f2f0c64";
pub const CALENDAR_CONTROL_UUID: &str = "8219bc38-a505-4452-8b6c-165e75cff5db";
pub const CALENDAR_DAY_UUID: &str = "20db94b9-bd18-4f84-bf16-de1163adfd8c";
pub const VACATION_TIME_UUID: &str = "6584e9c6-4784-41aa-ac09-c899191048ae";
pub const CALENDAR_MODE_UUID: &str = "636d45fd-d7be-491f-966c-380f8631b2c6";
pub const REAL_TIME_INDICATION_UUID: &str = "66ad3e6b-3135-4ada-bb2b-8b22916b21d4";
pub const POWER_CONSUMPTION_UUID: &str = "c1686f28-fa1b-4791-9eca-35523fb3597e";
pub const EXTERNAL_CONTROL_UUID: &str = "7bd74f74-ffae-452e-bb61-b59b2faf96c9";
pub const MONITORING_DATA_UUID: &str = "ecc794d2-c790-4abd-88a5-79abf9417908";

/// Writing this to the calendar control characteristic stores the calendar in flash.
pub const CALENDAR_STORE_TO_FLASH: u8 = 0;

/// Raw temperature meaning "not measured".
pub const TEMPERATURE_UNSET: i16 = 0x7fff;

/// Raw ratio meaning "no data for this slot".
pub const RATIO_UNSET: u8 = 0xff;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    DeviceName,
    ModelNumber,
    SoftwareRevision,
    DateTime,
    DaylightSaving,
    HeatingMode,
    Boost,
    FloorLimits,
    AdaptiveControl,
    FloorSensor,
    HeatingPower,
    FloorArea,
    RoomCalibration,
    EnergyUnit,
    AlarmCode,
    CalendarControl,
    CalendarDay,
    VacationTime,
    CalendarMode,
    RealTimeIndication,
    ExternalControl,
    PowerConsumption,
    MonitoringData,
}

impl Field {
    pub const ALL: [Field; 23] = [
        Field::DeviceName,
        Field::ModelNumber,
        Field::SoftwareRevision,
        Field::DateTime,
        Field::DaylightSaving,
        Field::HeatingMode,
        Field::Boost,
        Field::FloorLimits,
        Field::AdaptiveControl,
        Field::FloorSensor,
        Field::HeatingPower,
        Field::FloorArea,
        Field::RoomCalibration,
        Field::EnergyUnit,
        Field::AlarmCode,
        Field::CalendarControl,
        Field::CalendarDay,
        Field::VacationTime,
        Field::CalendarMode,
        Field::RealTimeIndication,
        Field::ExternalControl,
        Field::PowerConsumption,
        Field::MonitoringData,
    ];

    /// Characteristic carrying this field. The alarm code travels inside the
    /// real-time indication, so both share a UUID.
    pub fn uuid(self) -> &'static str {
        match self {
            Self::DeviceName => DEVICE_NAME_UUID,
            Self::ModelNumber => MODEL_NUMBER_UUID,
            Self::SoftwareRevision => SOFTWARE_REVISION_UUID,
            Self::DateTime => DATE_TIME_UUID,
            Self::DaylightSaving => DAYLIGHT_SAVING_UUID,
            Self::HeatingMode => HEATING_MODE_UUID,
            Self::Boost => BOOST_UUID,
            Self::FloorLimits => FLOOR_LIMITS_UUID,
            Self::AdaptiveControl => ADAPTIVE_CONTROL_UUID,
            Self::FloorSensor => FLOOR_SENSOR_UUID,
            Self::HeatingPower => HEATING_POWER_UUID,
            Self::FloorArea => FLOOR_AREA_UUID,
            Self::RoomCalibration => ROOM_CALIBRATION_UUID,
            Self::EnergyUnit => ENERGY_UNIT_UUID,
            Self::AlarmCode | Self::RealTimeIndication => REAL_TIME_INDICATION_UUID,
            Self::CalendarControl => CALENDAR_CONTROL_UUID,
            Self::CalendarDay => CALENDAR_DAY_UUID,
            Self::VacationTime => VACATION_TIME_UUID,
            Self::CalendarMode => CALENDAR_MODE_UUID,
            Self::ExternalControl => EXTERNAL_CONTROL_UUID,
            Self::PowerConsumption => POWER_CONSUMPTION_UUID,
            Self::MonitoringData => MONITORING_DATA_UUID,
        }
    }

    pub fn width(self) -> Option<usize> {
        match self {
            Self::DeviceName => Some(60),
            Self::ModelNumber | Self::SoftwareRevision => None,
            Self::DateTime => Some(7),
            Self::DaylightSaving => Some(8),
            Self::HeatingMode => Some(1),
            Self::Boost => Some(8),
            Self::FloorLimits => Some(4),
            Self::AdaptiveControl => Some(1),
            Self::FloorSensor => Some(13),
            Self::HeatingPower => Some(2),
            Self::FloorArea => Some(2),
            Self::RoomCalibration => Some(2),
            Self::EnergyUnit => Some(4),
            Self::AlarmCode => Some(4),
            Self::CalendarControl => Some(1),
            Self::CalendarDay => Some(49),
            Self::VacationTime => Some(15),
            Self::CalendarMode => Some(1),
            Self::RealTimeIndication => Some(20),
            Self::ExternalControl => Some(19),
            Self::PowerConsumption => Some(54),
            // 7 daily ratios, 12 monthly ratios, 168 hourly temperature pairs.
            Self::MonitoringData => Some(19 + 28 + 4 + 168 * 5),
        }
    }

    /// Split-framed fields are transferred as a sequence of headed packets.
    pub fn is_split(self) -> bool {
        matches!(
            self,
            Self::CalendarDay | Self::PowerConsumption | Self::MonitoringData
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::DeviceName => "device_name",
            Self::ModelNumber => "model_number",
            Self::SoftwareRevision => "software_revision",
            Self::DateTime => "date_time",
            Self::DaylightSaving => "daylight_saving",
            Self::HeatingMode => "heating_mode",
            Self::Boost => "boost",
            Self::FloorLimits => "floor_limits",
            Self::AdaptiveControl => "adaptive_control",
            Self::FloorSensor => "floor_sensor",
            Self::HeatingPower => "heating_power",
            Self::FloorArea => "floor_area",
            Self::RoomCalibration => "room_calibration",
            Self::EnergyUnit => "energy_unit",
            Self::AlarmCode => "alarm_code",
            Self::CalendarControl => "calendar_control",
            Self::CalendarDay => "calendar_day",
            Self::VacationTime => "vacation_time",
            Self::CalendarMode => "calendar_mode",
            Self::RealTimeIndication => "real_time_indication",
            Self::ExternalControl => "external_control",
            Self::PowerConsumption => "power_consumption",
            Self::MonitoringData => "monitoring_data",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuids_are_unique_apart_from_the_embedded_alarm_code() {
        let mut seen = std::collections::HashSet::new();
        for field in Field::ALL {
            if field == Field::AlarmCode {
                continue;
            }
            assert!(seen.insert(field.uuid()), "duplicate uuid for {field}");
        }
        assert_eq!(Field::AlarmCode.uuid(), Field::RealTimeIndication.uuid());
    }

    #[test]
    fn split_fields_have_fixed_reassembled_width() {
        assert_eq!(Field::CalendarDay.width(), Some(1 + 6 * 8));
        assert_eq!(Field::PowerConsumption.width(), Some(4 + 25 * 2));
        assert_eq!(Field::MonitoringData.width(), Some(891));
        assert!(Field::CalendarDay.is_split());
        assert!(Field::MonitoringData.is_split());
        assert!(!Field::VacationTime.is_split());
    }
}
