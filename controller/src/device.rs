use async_trait::async_trait;
use redlink_common::{Action, AppConfig, DeviceError, DeviceStatus, FanMode};

#[async_trait]
pub trait Device: Send + Sync {
    async fn login(&self) -> Result<(), DeviceError>;
    async fn get_status(&self) -> Result<DeviceStatus, DeviceError>;
    async fn set_heat_setpoint(&self, setpoint: f64, hold_minutes: u32) -> Result<(), DeviceError>;
    async fn set_cool_setpoint(&self, setpoint: f64, hold_minutes: u32) -> Result<(), DeviceError>;
    async fn cancel_hold(&self) -> Result<(), DeviceError>;
    async fn set_fan_mode(&self, mode: FanMode) -> Result<(), DeviceError>;

    async fn apply(&self, action: Action, hold_minutes: u32) -> Result<(), DeviceError> {
        match action {
            Action::Heat(setpoint) | Action::HeatIdle(setpoint) => {
                self.set_heat_setpoint(setpoint, hold_minutes).await
            }
            Action::Cool(setpoint) | Action::CoolIdle(setpoint) => {
                self.set_cool_setpoint(setpoint, hold_minutes).await
            }
            Action::Cancel => self.cancel_hold().await,
        }
    }
}

pub trait Connector: Send + Sync + 'static {
    type Device: Device + 'static;

    fn connect(&self, config: &AppConfig) -> Result<Self::Device, DeviceError>;
}
