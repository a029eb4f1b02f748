pub mod calendar;
pub mod characteristics;
pub mod clock;
pub mod codec;
pub mod config;
pub mod energy;
pub mod error;
pub mod framing;
pub mod scheduler;
pub mod session;
pub mod transport;
pub mod types;

pub use calendar::{CalendarDay, CalendarProgram, ClockTime, DayOfWeek, WeekCalendar};
pub use config::{BridgeConfig, DeviceEntry, TimeConfig};
pub use error::{EnstoError, Result};
pub use scheduler::{BoostState, Evaluation, ModeScheduler, ModeSource, VacationState};
pub use session::{Capabilities, DeviceProfile, DeviceSession, DeviceSnapshot, SessionConfig};
pub use transport::{Notification, Transport, TransportError};
pub use types::{
    ExternalControl, FloorLimits, HeatingMode, ModelClass, Offset, Setpoint, ThermostatState,
};
