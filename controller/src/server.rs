use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tracing::{info, warn};

use crate::{device::Connector, error::ControllerError, service::HoldService, store::ConfigStore};

struct AppState<C: Connector> {
    service: Arc<HoldService<C>>,
    store: ConfigStore,
}

impl<C: Connector> Clone for AppState<C> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            store: self.store.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Serialize)]
struct OkBody {
    status: &'static str,
}

pub fn router<C: Connector>(service: Arc<HoldService<C>>, store: ConfigStore) -> Router {
    let web_root = format!("{}/web", env!("CARGO_MANIFEST_DIR"));
    Router::new()
        .route("/api/health", get(handle_health))
        .route("/api/status", get(handle_get_status::<C>))
        .route(
            "/api/config",
            get(handle_get_config::<C>).post(handle_post_config::<C>),
        )
        .route("/api/command", post(handle_command::<C>))
        .fallback_service(ServeDir::new(web_root))
        .with_state(AppState { service, store })
}

pub async fn serve<C: Connector>(
    service: Arc<HoldService<C>>,
    store: ConfigStore,
    host: &str,
    port: u16,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind((host, port))
        .await
        .with_context(|| format!("failed to bind controller server at {host}:{port}"))?;
    let addr: SocketAddr = listener.local_addr()?;

    service.start().await?;
    let app = router(service.clone(), store);

    info!("controller listening on http://{addr}");
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    service.stop().await;
    info!(state = ?service.loop_state(), "controller shut down");
    served.context("http server failed")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received ctrl-c, shutting down"),
        _ = terminate => info!("received terminate signal, shutting down"),
    }
}

async fn handle_health() -> impl IntoResponse {
    Json(OkBody { status: "ok" })
}

async fn handle_get_status<C: Connector>(State(state): State<AppState<C>>) -> impl IntoResponse {
    Json(state.service.snapshot().await)
}

async fn handle_get_config<C: Connector>(State(state): State<AppState<C>>) -> impl IntoResponse {
    match state.store.load().await {
        Ok(config) => Json(config.view()).into_response(),
        Err(err) => {
            warn!("failed to load config: {err:#}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &format!("{err:#}"))
        }
    }
}

async fn handle_post_config<C: Connector>(
    State(state): State<AppState<C>>,
    Json(payload): Json<Value>,
) -> impl IntoResponse {
    let Value::Object(changes) = payload else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "config payload must be JSON object",
        );
    };

    match state.store.update(changes).await {
        Ok(config) => Json(config.view()).into_response(),
        Err(err) => {
            warn!(error = %err, "failed to update config");
            error_response(status_for(&err), &err.to_string())
        }
    }
}

async fn handle_command<C: Connector>(
    State(state): State<AppState<C>>,
    Json(payload): Json<Value>,
) -> impl IntoResponse {
    if !payload.is_object() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "command payload must be JSON object",
        );
    }
    let action = payload
        .get("action")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    match state.service.apply_manual(&action, &payload).await {
        Ok(()) => Json(OkBody { status: "ok" }).into_response(),
        Err(err) => {
            warn!(action = %action, error = %err, "manual command failed");
            error_response(status_for(&err), &err.to_string())
        }
    }
}

fn status_for(err: &ControllerError) -> StatusCode {
    match err {
        ControllerError::Validation(_) => StatusCode::BAD_REQUEST,
        ControllerError::Configuration(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use redlink_common::{AppConfig, DeviceError, DeviceStatus, FanMode};
    use serde_json::json;

    use super::*;
    use crate::device::Device;

    struct IdleDevice;

    #[async_trait]
    impl Device for IdleDevice {
        async fn login(&self) -> Result<(), DeviceError> {
            Ok(())
        }

        async fn get_status(&self) -> Result<DeviceStatus, DeviceError> {
            Ok(DeviceStatus::default())
        }

        async fn set_heat_setpoint(&self, _: f64, _: u32) -> Result<(), DeviceError> {
            Ok(())
        }

        async fn set_cool_setpoint(&self, _: f64, _: u32) -> Result<(), DeviceError> {
            Ok(())
        }

        async fn cancel_hold(&self) -> Result<(), DeviceError> {
            Err(DeviceError::Transport("portal unavailable".to_string()))
        }

        async fn set_fan_mode(&self, _: FanMode) -> Result<(), DeviceError> {
            Ok(())
        }
    }

    struct IdleConnector;

    impl Connector for IdleConnector {
        type Device = IdleDevice;

        fn connect(&self, _config: &AppConfig) -> Result<IdleDevice, DeviceError> {
            Ok(IdleDevice)
        }
    }

    async fn spawn_app(config: AppConfig) -> (tempfile::TempDir, String) {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("config.json"));
        store.save(&config).await.unwrap();

        let service = Arc::new(HoldService::new(IdleConnector, store.clone()));
        let app = router(service, store);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (dir, format!("http://{addr}"))
    }

    fn identified() -> AppConfig {
        AppConfig {
            username: "user".to_string(),
            password: "secret".to_string(),
            device_id: 42,
            ..AppConfig::default()
        }
    }

    async fn post(url: String, body: Value) -> (StatusCode, Value) {
        let response = reqwest::Client::new()
            .post(url)
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = StatusCode::from_u16(response.status().as_u16()).unwrap();
        (status, response.json().await.unwrap())
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let (_dir, base) = spawn_app(AppConfig::default()).await;
        let body: Value = reqwest::get(format!("{base}/api/health"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body, json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn config_round_trip_hides_password() {
        let (_dir, base) = spawn_app(identified()).await;

        let (status, body) = post(
            format!("{base}/api/config"),
            json!({"poll_interval_seconds": "30", "password": "new"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["poll_interval_seconds"], 30);
        assert_eq!(body["has_password"], true);
        assert!(body.get("password").is_none());

        let body: Value = reqwest::get(format!("{base}/api/config"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["poll_interval_seconds"], 30);
    }

    #[tokio::test]
    async fn config_rejects_non_object() {
        let (_dir, base) = spawn_app(identified()).await;
        let (status, body) = post(format!("{base}/api/config"), json!([1, 2])).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "config payload must be JSON object");
    }

    #[tokio::test]
    async fn config_update_errors_map_to_status_codes() {
        let (dir, base) = spawn_app(identified()).await;
        let url = format!("{base}/api/config");

        let (status, body) = post(url.clone(), json!({"device_id": "kitchen"})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"]
            .as_str()
            .unwrap()
            .starts_with("config update has invalid field types"));

        std::fs::write(dir.path().join("config.json"), "{not json").unwrap();
        let (status, body) = post(url, json!({"hold_minutes": 30})).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().unwrap().starts_with("config store error"));
    }

    #[tokio::test]
    async fn command_errors_map_to_status_codes() {
        let (_dir, base) = spawn_app(identified()).await;
        let url = format!("{base}/api/command");

        let (status, body) = post(url.clone(), json!({"action": "defrost"})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid action");

        let (status, body) = post(url.clone(), json!({"action": "heat"})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "setpoint is required");

        let (status, _) = post(url.clone(), json!({"action": "cancel"})).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

        let (status, body) = post(url, json!({"action": "heat", "setpoint": 70})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn command_without_identity_is_conflict() {
        let (_dir, base) = spawn_app(AppConfig::default()).await;
        let (status, body) = post(format!("{base}/api/command"), json!({"action": "cancel"})).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "config missing username/password/device_id");
    }

    #[tokio::test]
    async fn status_reflects_manual_command() {
        let (_dir, base) = spawn_app(identified()).await;
        let (status, _) = post(
            format!("{base}/api/command"),
            json!({"action": "cool", "setpoint": "74"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let snapshot: Value = reqwest::get(format!("{base}/api/status"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(snapshot["controller"]["mode"], "cool");
        assert_eq!(snapshot["controller"]["last_action"], "cool");
        assert_eq!(snapshot["config"]["device_id"], 42);
        assert_eq!(snapshot["error"], Value::Null);
    }
}
