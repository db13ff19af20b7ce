use redlink_common::DeviceError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("{0}")]
    Configuration(String),
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error("config store error: {0}")]
    Store(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl From<anyhow::Error> for ControllerError {
    fn from(err: anyhow::Error) -> Self {
        Self::Store(format!("{err:#}"))
    }
}
