use thiserror::Error;

use crate::characteristics::Field;
use crate::types::ModelClass;

pub type Result<T, E = EnstoError> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EnstoError {
    #[error("{field}: value {value} is outside the allowed range {min}..={max}")]
    Range {
        field: Field,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("{field}: malformed payload: {reason}")]
    MalformedPayload { field: Field, reason: String },
    #[error("{field}: {reason}")]
    Validation { field: Field, reason: String },
    #[error("{operation} is not supported by {model}")]
    UnsupportedCapability {
        operation: &'static str,
        model: ModelClass,
    },
    #[error("no answer from characteristic {uuid} before the deadline")]
    TransportTimeout { uuid: String },
    #[error("transport failure on characteristic {uuid}: {message}")]
    Transport { uuid: String, message: String },
}

impl EnstoError {
    pub fn range(field: Field, value: impl Into<f64>, min: impl Into<f64>, max: impl Into<f64>) -> Self {
        Self::Range {
            field,
            value: value.into(),
            min: min.into(),
            max: max.into(),
        }
    }

    pub fn malformed(field: Field, reason: impl Into<String>) -> Self {
        Self::MalformedPayload {
            field,
            reason: reason.into(),
        }
    }

    pub fn validation(field: Field, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::MalformedPayload { .. })
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::TransportTimeout { .. } | Self::Transport { .. })
    }
}

/// Checks `value` against an inclusive range, reporting the field on failure.
pub(crate) fn check_range<V>(field: Field, value: V, min: V, max: V) -> Result<V>
where
    V: PartialOrd + Copy + Into<f64>,
{
    let as_f64: f64 = value.into();
    if as_f64.is_nan() || value < min || value > max {
        return Err(EnstoError::range(field, value, min, max));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_message_names_field_value_and_bounds() {
        let err = EnstoError::range(Field::RoomCalibration, 7.5f32, -5.0f32, 5.0f32);
        assert_eq!(
            err.to_string(),
            "room_calibration: value 7.5 is outside the allowed range -5..=5"
        );
    }

    #[test]
    fn check_range_rejects_nan() {
        assert!(check_range(Field::RoomCalibration, f32::NAN, -5.0, 5.0).is_err());
        assert_eq!(check_range(Field::HeatingPower, 9999u16, 0, 9999), Ok(9999));
    }

    #[test]
    fn unsupported_capability_names_model() {
        let err = EnstoError::UnsupportedCapability {
            operation: "set_floor_limits",
            model: ModelClass::Elte6Bt,
        };
        assert_eq!(err.to_string(), "set_floor_limits is not supported by ELTE6-BT");
        assert!(!err.is_transport());
    }
}
