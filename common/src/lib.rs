pub mod config;
pub mod error;
pub mod hysteresis;
pub mod payloads;
pub mod status;
pub mod types;

pub use config::{AppConfig, ClientKey, ConfigView, ControlMode, DEFAULT_BASE_URL};
pub use error::DeviceError;
pub use hysteresis::decide;
pub use payloads::{next_period_slot, ControlChange};
pub use status::DeviceStatus;
pub use types::{Action, ActionKind, ControllerState, FanMode, HoldMode, SystemSwitch};
