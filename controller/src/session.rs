use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use redlink_common::DeviceError;
use tracing::debug;

use crate::device::Device;

pub struct Session<D> {
    device: D,
    refresh: Duration,
    last_login_at: Option<Instant>,
}

impl<D: Device> Session<D> {
    pub fn new(device: D, refresh: Duration) -> Self {
        Self {
            device,
            refresh,
            last_login_at: None,
        }
    }

    pub fn set_refresh_interval(&mut self, refresh: Duration) {
        self.refresh = refresh;
    }

    pub async fn ensure_fresh(&mut self, now: Instant) -> Result<(), DeviceError> {
        let due = match self.last_login_at {
            None => true,
            Some(at) => now.saturating_duration_since(at) >= self.refresh,
        };
        if due {
            debug!("logging in");
            self.device.login().await?;
            self.last_login_at = Some(now);
        }
        Ok(())
    }

    pub async fn execute<T, F>(&mut self, now: Instant, op: F) -> Result<T, DeviceError>
    where
        F: for<'a> Fn(&'a D) -> BoxFuture<'a, Result<T, DeviceError>>,
    {
        self.ensure_fresh(now).await?;

        let first = op(&self.device).await;
        match first {
            Err(err) if err.is_retryable() => {
                debug!(error = %err, "device call failed, retrying after re-login");
                self.device.login().await?;
                self.last_login_at = Some(now);
                op(&self.device).await
            }
            other => other,
        }
    }
}
