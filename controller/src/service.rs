use std::{
    any::Any,
    panic::AssertUnwindSafe,
    sync::Arc,
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use redlink_common::{
    decide, Action, ActionKind, AppConfig, ClientKey, ConfigView, ControlMode, ControllerState,
    DeviceError, DeviceStatus, HoldMode,
};
use serde::Serialize;
use serde_json::Value;
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    command::ManualCommand,
    device::{Connector, Device},
    error::ControllerError,
    session::Session,
    store::ConfigStore,
};

const JOIN_TIMEOUT: Duration = Duration::from_secs(5);
const MISSING_IDENTITY: &str = "config missing username/password/device_id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopState {
    Running,
    Stopping,
    Stopped,
}

#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub status: Option<DeviceStatus>,
    pub controller: ControllerSummary,
    pub config: Option<ConfigView>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ControllerSummary {
    pub mode: Option<HoldMode>,
    pub last_action: Option<ActionKind>,
    pub last_action_at: Option<f64>,
}

struct DeviceSlot<D> {
    key: ClientKey,
    session: Session<D>,
}

struct Inner<D> {
    config: Option<AppConfig>,
    slot: Option<DeviceSlot<D>>,
    state: ControllerState,
    last_action_at: Option<DateTime<Utc>>,
    last_status: Option<DeviceStatus>,
    last_error: Option<String>,
}

impl<D> Inner<D> {
    fn record_action(&mut self, action: Action) {
        self.state.apply(Some(action));
        self.last_action_at = Some(Utc::now());
    }

    fn poll_interval(&self) -> Duration {
        self.config
            .as_ref()
            .map(AppConfig::poll_interval)
            .unwrap_or_else(|| AppConfig::default().poll_interval())
    }
}

struct Shared<C: Connector> {
    inner: Mutex<Inner<C::Device>>,
    connector: C,
    store: ConfigStore,
    loop_state: watch::Sender<LoopState>,
}

struct LoopHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

// The loop and manual commands share `inner`, so device calls never overlap.
pub struct HoldService<C: Connector> {
    shared: Arc<Shared<C>>,
    task: Mutex<Option<LoopHandle>>,
    join_timeout: Duration,
}

impl<C: Connector> HoldService<C> {
    pub fn new(connector: C, store: ConfigStore) -> Self {
        let (loop_state, _) = watch::channel(LoopState::Stopped);
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    config: None,
                    slot: None,
                    state: ControllerState::default(),
                    last_action_at: None,
                    last_status: None,
                    last_error: None,
                }),
                connector,
                store,
                loop_state,
            }),
            task: Mutex::new(None),
            join_timeout: JOIN_TIMEOUT,
        }
    }

    pub fn loop_state(&self) -> LoopState {
        *self.shared.loop_state.borrow()
    }

    pub async fn start(&self) -> anyhow::Result<()> {
        let mut task = self.task.lock().await;
        if task.is_some() {
            return Ok(());
        }

        let config = self.shared.store.ensure().await?;
        self.shared.inner.lock().await.config = Some(config);

        let cancel = CancellationToken::new();
        self.shared.loop_state.send_replace(LoopState::Running);
        let handle = tokio::spawn(run_loop(self.shared.clone(), cancel.clone()));
        *task = Some(LoopHandle {
            cancel,
            task: handle,
        });
        Ok(())
    }

    pub async fn stop(&self) {
        let Some(LoopHandle { cancel, task }) = self.task.lock().await.take() else {
            return;
        };

        cancel.cancel();
        self.shared.loop_state.send_replace(LoopState::Stopping);
        match tokio::time::timeout(self.join_timeout, task).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(error = %err, "hold loop task ended abnormally"),
            Err(_) => {
                warn!(timeout = ?self.join_timeout, "hold loop still finishing a cycle");
                return;
            }
        }
        self.shared.loop_state.send_replace(LoopState::Stopped);
    }

    pub async fn snapshot(&self) -> Snapshot {
        let inner = self.shared.inner.lock().await;
        Snapshot {
            status: inner.last_status.clone(),
            controller: ControllerSummary {
                mode: inner.state.mode,
                last_action: inner.state.last_action,
                last_action_at: inner
                    .last_action_at
                    .map(|at| at.timestamp_millis() as f64 / 1000.0),
            },
            config: inner.config.as_ref().map(AppConfig::view),
            error: inner.last_error.clone(),
        }
    }

    pub async fn apply_manual(&self, command: &str, payload: &Value) -> Result<(), ControllerError> {
        let command = ManualCommand::parse(command, payload)?;

        let shared = &self.shared;
        let mut guard = shared.inner.lock().await;
        let inner = &mut *guard;

        let config = shared.store.load().await?;
        inner.config = Some(config.clone());
        if !config.is_identified() {
            return Err(ControllerError::Configuration(MISSING_IDENTITY.to_string()));
        }

        let session = ensure_session(&mut inner.slot, &shared.connector, &config)?;
        let default_hold = config.hold_duration_minutes();
        let now = Instant::now();
        match command {
            ManualCommand::Heat {
                setpoint,
                hold_minutes,
            } => {
                let hold = hold_minutes.unwrap_or(default_hold);
                session
                    .execute(now, move |device| device.set_heat_setpoint(setpoint, hold))
                    .await?
            }
            ManualCommand::Cool {
                setpoint,
                hold_minutes,
            } => {
                let hold = hold_minutes.unwrap_or(default_hold);
                session
                    .execute(now, move |device| device.set_cool_setpoint(setpoint, hold))
                    .await?
            }
            ManualCommand::Fan(mode) => {
                session
                    .execute(now, move |device| device.set_fan_mode(mode))
                    .await?
            }
            ManualCommand::Cancel => session.execute(now, |device| device.cancel_hold()).await?,
        }

        info!(command = command.name(), "manual command applied");
        if let Some(action) = command.action() {
            inner.record_action(action);
        }
        Ok(())
    }
}

async fn run_loop<C: Connector>(shared: Arc<Shared<C>>, cancel: CancellationToken) {
    info!("hold loop started");
    while !cancel.is_cancelled() {
        let pause = shared.run_cycle().await;
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(pause) => {}
        }
    }
    shared.loop_state.send_replace(LoopState::Stopped);
    info!("hold loop stopped");
}

impl<C: Connector> Shared<C> {
    async fn run_cycle(&self) -> Duration {
        let mut inner = self.inner.lock().await;
        let outcome = AssertUnwindSafe(self.cycle(&mut inner)).catch_unwind().await;

        let error = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(err),
            Err(panic) => Some(ControllerError::Unexpected(panic_message(panic))),
        };
        if let Some(err) = error {
            warn!(error = %err, "poll cycle failed");
            inner.last_error = Some(err.to_string());
        }
        inner.poll_interval()
    }

    async fn cycle(&self, inner: &mut Inner<C::Device>) -> Result<(), ControllerError> {
        let config = self.store.load().await?;
        inner.config = Some(config.clone());

        let errors = config.validate();
        if !errors.is_empty() {
            return Err(ControllerError::Configuration(errors.join("; ")));
        }
        if !config.is_identified() {
            return Err(ControllerError::Configuration(MISSING_IDENTITY.to_string()));
        }

        let session = ensure_session(&mut inner.slot, &self.connector, &config)?;
        let status = session
            .execute(Instant::now(), |device| device.get_status())
            .await?;

        let action = match config.control_mode {
            ControlMode::Schedule => status.hold_active().then_some(Action::Cancel),
            _ => decide(
                status.temperature,
                &config,
                &inner.state,
                status.heat_setpoint,
                status.cool_setpoint,
            ),
        };

        if let Some(action) = action {
            info!(action = ?action, "applying hold action");
            let hold = config.hold_duration_minutes();
            session
                .execute(Instant::now(), move |device| device.apply(action, hold))
                .await?;
            inner.record_action(action);
        }

        inner.last_status = Some(status);
        inner.last_error = None;
        Ok(())
    }
}

fn ensure_session<'a, C: Connector>(
    slot: &'a mut Option<DeviceSlot<C::Device>>,
    connector: &C,
    config: &AppConfig,
) -> Result<&'a mut Session<C::Device>, DeviceError> {
    let key = config.client_key();
    let current = match slot.take() {
        Some(current) if current.key == key => current,
        _ => {
            info!(device_id = config.device_id, "building device client");
            DeviceSlot {
                key,
                session: Session::new(connector.connect(config)?, config.login_refresh()),
            }
        }
    };

    let current = slot.insert(current);
    current.session.set_refresh_interval(config.login_refresh());
    Ok(&mut current.session)
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "poll cycle panicked".to_string()
    }
}
