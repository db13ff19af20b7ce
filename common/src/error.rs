use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("session error: {0}")]
    Session(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid request: {0}")]
    Invalid(String),
}

impl DeviceError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Session(_) | Self::Transport(_))
    }
}
