use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{Local, Utc};
use redlink_common::{AppConfig, ControlChange, DeviceError, DeviceStatus, FanMode};
use serde_json::Value;
use reqwest::{
    cookie::Jar,
    header::{HeaderMap, HeaderValue, ACCEPT, REFERER},
    redirect, StatusCode,
};
use tracing::debug;

use crate::device::{Connector, Device};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const TOKEN_FIELD: &str = "name=\"__RequestVerificationToken\"";

#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub username: String,
    pub password: String,
    pub device_id: i64,
    pub base_url: String,
    pub time_offset_minutes: i64,
    pub timeout: Duration,
    pub schedule_get_path: Option<String>,
    pub schedule_submit_path: Option<String>,
}

impl ClientSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            username: config.username.clone(),
            password: config.password.clone(),
            device_id: config.device_id,
            base_url: config.base_url.clone(),
            time_offset_minutes: config
                .time_offset_minutes
                .unwrap_or_else(local_time_offset_minutes),
            timeout: config.request_timeout(),
            schedule_get_path: None,
            schedule_submit_path: None,
        }
    }
}

// Minutes to add to local time to reach UTC.
fn local_time_offset_minutes() -> i64 {
    -i64::from(Local::now().offset().local_minus_utc() / 60)
}

#[derive(Debug, Clone)]
struct Endpoints {
    base: String,
    schedule_get: Option<String>,
    schedule_submit: Option<String>,
}

impl Endpoints {
    fn new(base_url: &str) -> Self {
        Self {
            base: base_url.trim_end_matches('/').to_string(),
            schedule_get: None,
            schedule_submit: None,
        }
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base, path.trim_start_matches('/'))
    }

    fn login(&self) -> String {
        self.url_for("/portal/")
    }

    fn check_data_session(&self, device_id: i64) -> String {
        self.url_for(&format!("/portal/Device/CheckDataSession/{device_id}"))
    }

    fn submit_control_changes(&self) -> String {
        self.url_for("/portal/Device/SubmitControlScreenChanges")
    }

    // `{device_id}` in the configured path is filled in.
    fn schedule(&self, device_id: i64) -> Option<String> {
        let path = self.schedule_get.as_deref().filter(|path| !path.is_empty())?;
        Some(self.url_for(&path.replace("{device_id}", &device_id.to_string())))
    }

    fn submit_schedule(&self) -> Option<String> {
        let path = self.schedule_submit.as_deref().filter(|path| !path.is_empty())?;
        Some(self.url_for(path))
    }
}

pub struct RedlinkClient {
    http: reqwest::Client,
    login_http: reqwest::Client,
    endpoints: Endpoints,
    settings: ClientSettings,
}

impl RedlinkClient {
    pub fn new(settings: ClientSettings) -> Result<Self, DeviceError> {
        let jar = Arc::new(Jar::default());
        let http = reqwest::Client::builder()
            .cookie_provider(jar.clone())
            .user_agent(USER_AGENT)
            .timeout(settings.timeout)
            .build()
            .map_err(|err| DeviceError::Transport(format!("failed to build http client: {err}")))?;
        let login_http = reqwest::Client::builder()
            .cookie_provider(jar)
            .user_agent(USER_AGENT)
            .timeout(settings.timeout)
            .redirect(redirect::Policy::none())
            .build()
            .map_err(|err| DeviceError::Transport(format!("failed to build http client: {err}")))?;

        let endpoints = Endpoints {
            schedule_get: settings.schedule_get_path.clone(),
            schedule_submit: settings.schedule_submit_path.clone(),
            ..Endpoints::new(&settings.base_url)
        };
        Ok(Self {
            http,
            login_http,
            endpoints,
            settings,
        })
    }

    fn ajax_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json; q=0.01"));
        headers.insert("x-requested-with", HeaderValue::from_static("XMLHttpRequest"));
        if let Ok(referer) = HeaderValue::from_str(&self.endpoints.login()) {
            headers.insert(REFERER, referer);
        }
        headers
    }

    async fn check_data_session(&self) -> Result<DeviceStatus, DeviceError> {
        let url = self.endpoints.check_data_session(self.settings.device_id);
        let response = self
            .http
            .get(&url)
            .headers(self.ajax_headers())
            .query(&[("_", Utc::now().timestamp_millis())])
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeviceError::Transport(format!("status request returned {status}")));
        }

        let body = response.bytes().await.map_err(transport)?;
        DeviceStatus::from_check_data_session(&body)
            .map_err(|err| DeviceError::Transport(format!("response was not JSON: {err}")))
    }

    async fn submit(&self, change: &ControlChange) -> Result<(), DeviceError> {
        self.check_data_session().await?;

        debug!(device_id = change.device_id, "submitting control change");
        let response = self
            .http
            .post(self.endpoints.submit_control_changes())
            .headers(self.ajax_headers())
            .json(change)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeviceError::Transport(format!("control change returned {status}")));
        }
        Ok(())
    }

    pub async fn get_schedule(&self) -> Result<Value, DeviceError> {
        let url = self
            .endpoints
            .schedule(self.settings.device_id)
            .ok_or_else(|| DeviceError::Invalid("schedule get path is not configured".to_string()))?;
        let response = self
            .http
            .get(&url)
            .headers(self.ajax_headers())
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeviceError::Transport(format!("GET {url} returned {status}")));
        }
        response
            .json()
            .await
            .map_err(|err| DeviceError::Transport(format!("response was not JSON: {err}")))
    }

    pub async fn set_schedule(&self, schedule: &Value) -> Result<(), DeviceError> {
        let url = self.endpoints.submit_schedule().ok_or_else(|| {
            DeviceError::Invalid("schedule submit path is not configured".to_string())
        })?;
        let response = self
            .http
            .post(&url)
            .headers(self.ajax_headers())
            .json(schedule)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeviceError::Transport(format!("POST {url} returned {status}")));
        }
        Ok(())
    }
}

#[async_trait]
impl Device for RedlinkClient {
    async fn login(&self) -> Result<(), DeviceError> {
        let url = self.endpoints.login();
        let page = self.http.get(&url).send().await.map_err(session)?;
        if page.status() != StatusCode::OK {
            return Err(DeviceError::Session(format!(
                "login page returned {}",
                page.status()
            )));
        }
        let html = page.text().await.map_err(session)?;

        let mut form = vec![
            ("timeOffset", self.settings.time_offset_minutes.to_string()),
            ("UserName", self.settings.username.clone()),
            ("Password", self.settings.password.clone()),
            ("RememberMe", "false".to_string()),
        ];
        if let Some(token) = extract_verification_token(&html) {
            form.push(("__RequestVerificationToken", token.to_string()));
        }

        let response = self
            .login_http
            .post(&url)
            .form(&form)
            .send()
            .await
            .map_err(session)?;
        match response.status() {
            StatusCode::OK | StatusCode::FOUND | StatusCode::SEE_OTHER => Ok(()),
            status => Err(DeviceError::Session(format!("login returned {status}"))),
        }
    }

    async fn get_status(&self) -> Result<DeviceStatus, DeviceError> {
        self.check_data_session().await
    }

    async fn set_heat_setpoint(&self, setpoint: f64, hold_minutes: u32) -> Result<(), DeviceError> {
        let change = ControlChange::heat_hold(
            self.settings.device_id,
            setpoint,
            hold_minutes,
            Local::now().time(),
        )?;
        self.submit(&change).await
    }

    async fn set_cool_setpoint(&self, setpoint: f64, hold_minutes: u32) -> Result<(), DeviceError> {
        let change = ControlChange::cool_hold(
            self.settings.device_id,
            setpoint,
            hold_minutes,
            Local::now().time(),
        )?;
        self.submit(&change).await
    }

    async fn cancel_hold(&self) -> Result<(), DeviceError> {
        self.submit(&ControlChange::cancel_hold(self.settings.device_id))
            .await
    }

    async fn set_fan_mode(&self, mode: FanMode) -> Result<(), DeviceError> {
        self.submit(&ControlChange::fan(self.settings.device_id, mode))
            .await
    }
}

pub struct RedlinkConnector;

impl Connector for RedlinkConnector {
    type Device = RedlinkClient;

    fn connect(&self, config: &AppConfig) -> Result<RedlinkClient, DeviceError> {
        RedlinkClient::new(ClientSettings::from_config(config))
    }
}

fn extract_verification_token(html: &str) -> Option<&str> {
    let start = html.find(TOKEN_FIELD)? + TOKEN_FIELD.len();
    let rest = &html[start..];
    let tag = &rest[..rest.find('>').unwrap_or(rest.len())];
    let value_start = tag.find("value=\"")? + "value=\"".len();
    let value = &tag[value_start..];
    let value = &value[..value.find('"')?];
    (!value.is_empty()).then_some(value)
}

fn transport(err: reqwest::Error) -> DeviceError {
    DeviceError::Transport(err.to_string())
}

fn session(err: reqwest::Error) -> DeviceError {
    DeviceError::Session(err.to_string())
}
