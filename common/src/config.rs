use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const DEFAULT_BASE_URL: &str = "https://mytotalconnectcomfort.com";

const BOOL_FIELDS: [&str; 4] = [
    "hysteresis_enabled",
    "enable_heat",
    "enable_cool",
    "override_schedule",
];
const FLOAT_FIELDS: [&str; 4] = ["heat_on_below", "heat_off_at", "cool_on_above", "cool_off_at"];
const INT_FIELDS: [&str; 7] = [
    "device_id",
    "hold_minutes",
    "poll_interval_seconds",
    "login_refresh_seconds",
    "time_offset_minutes",
    "timeout_seconds",
    "bind_port",
];

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ControlMode {
    #[default]
    Hysteresis,
    Schedule,
    Other(String),
}

impl ControlMode {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Hysteresis => "hysteresis",
            Self::Schedule => "schedule",
            Self::Other(value) => value,
        }
    }
}

impl From<String> for ControlMode {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "hysteresis" => Self::Hysteresis,
            "schedule" => Self::Schedule,
            _ => Self::Other(value),
        }
    }
}

impl From<ControlMode> for String {
    fn from(mode: ControlMode) -> Self {
        mode.as_str().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub username: String,
    pub password: String,
    pub device_id: i64,
    pub control_mode: ControlMode,
    pub hysteresis_enabled: bool,
    pub enable_heat: bool,
    pub enable_cool: bool,
    pub override_schedule: bool,
    pub heat_on_below: f64,
    pub heat_off_at: f64,
    pub cool_on_above: f64,
    pub cool_off_at: f64,
    pub hold_minutes: i64,
    pub poll_interval_seconds: i64,
    pub login_refresh_seconds: i64,
    pub base_url: String,
    pub time_offset_minutes: Option<i64>,
    pub timeout_seconds: i64,
    pub bind_host: String,
    pub bind_port: i64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            username: String::new(),
            password: String::new(),
            device_id: 0,
            control_mode: ControlMode::Hysteresis,
            hysteresis_enabled: true,
            enable_heat: true,
            enable_cool: true,
            override_schedule: false,
            heat_on_below: 68.0,
            heat_off_at: 71.0,
            cool_on_above: 76.0,
            cool_off_at: 74.0,
            hold_minutes: 60,
            poll_interval_seconds: 60,
            login_refresh_seconds: 600,
            base_url: DEFAULT_BASE_URL.to_string(),
            time_offset_minutes: None,
            timeout_seconds: 20,
            bind_host: "0.0.0.0".to_string(),
            bind_port: 8000,
        }
    }
}

// Any change here means a cached device client is stale.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ClientKey {
    username: String,
    password: String,
    device_id: i64,
    base_url: String,
    time_offset_minutes: Option<i64>,
    timeout_seconds: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfigView {
    pub username: String,
    pub has_password: bool,
    pub device_id: i64,
    pub control_mode: String,
    pub hysteresis_enabled: bool,
    pub enable_heat: bool,
    pub enable_cool: bool,
    pub override_schedule: bool,
    pub heat_on_below: f64,
    pub heat_off_at: f64,
    pub cool_on_above: f64,
    pub cool_off_at: f64,
    pub hold_minutes: i64,
    pub poll_interval_seconds: i64,
    pub login_refresh_seconds: i64,
    pub base_url: String,
    pub time_offset_minutes: Option<i64>,
    pub timeout_seconds: i64,
    pub bind_host: String,
    pub bind_port: i64,
}

impl AppConfig {
    pub fn from_value(mut value: Value) -> Result<Self, serde_json::Error> {
        if let Value::Object(map) = &mut value {
            coerce_fields(map);
        }
        serde_json::from_value(value)
    }

    pub fn from_slice(raw: &[u8]) -> Result<Self, serde_json::Error> {
        Self::from_value(serde_json::from_slice(raw)?)
    }

    pub fn is_identified(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty() && self.device_id != 0
    }

    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if let ControlMode::Other(_) = self.control_mode {
            errors.push("control_mode must be 'hysteresis' or 'schedule'".to_string());
        }
        if self.heat_on_below >= self.heat_off_at {
            errors.push("heat_on_below must be less than heat_off_at".to_string());
        }
        if self.cool_on_above <= self.cool_off_at {
            errors.push("cool_on_above must be greater than cool_off_at".to_string());
        }
        if self.hold_minutes <= 0 {
            errors.push("hold_minutes must be positive".to_string());
        }
        if self.poll_interval_seconds <= 0 {
            errors.push("poll_interval_seconds must be positive".to_string());
        }
        if self.login_refresh_seconds <= 0 {
            errors.push("login_refresh_seconds must be positive".to_string());
        }
        if self.bind_port <= 0 {
            errors.push("bind_port must be positive".to_string());
        } else if self.bind_port > i64::from(u16::MAX) {
            errors.push("bind_port must be at most 65535".to_string());
        }
        errors
    }

    pub fn client_key(&self) -> ClientKey {
        ClientKey {
            username: self.username.clone(),
            password: self.password.clone(),
            device_id: self.device_id,
            base_url: self.base_url.clone(),
            time_offset_minutes: self.time_offset_minutes,
            timeout_seconds: self.timeout_seconds,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds.max(1).unsigned_abs())
    }

    pub fn login_refresh(&self) -> Duration {
        Duration::from_secs(self.login_refresh_seconds.max(0).unsigned_abs())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds.max(1).unsigned_abs())
    }

    pub fn hold_duration_minutes(&self) -> u32 {
        u32::try_from(self.hold_minutes).unwrap_or(0)
    }

    pub fn view(&self) -> ConfigView {
        ConfigView {
            username: self.username.clone(),
            has_password: !self.password.is_empty(),
            device_id: self.device_id,
            control_mode: self.control_mode.as_str().to_string(),
            hysteresis_enabled: self.hysteresis_enabled,
            enable_heat: self.enable_heat,
            enable_cool: self.enable_cool,
            override_schedule: self.override_schedule,
            heat_on_below: self.heat_on_below,
            heat_off_at: self.heat_off_at,
            cool_on_above: self.cool_on_above,
            cool_off_at: self.cool_off_at,
            hold_minutes: self.hold_minutes,
            poll_interval_seconds: self.poll_interval_seconds,
            login_refresh_seconds: self.login_refresh_seconds,
            base_url: self.base_url.clone(),
            time_offset_minutes: self.time_offset_minutes,
            timeout_seconds: self.timeout_seconds,
            bind_host: self.bind_host.clone(),
            bind_port: self.bind_port,
        }
    }
}

fn coerce_fields(map: &mut Map<String, Value>) {
    map.retain(|_, value| !is_blank(value));

    for key in BOOL_FIELDS {
        if let Some(value) = map.get_mut(key) {
            if let Some(flag) = coerce_bool(value) {
                *value = Value::Bool(flag);
            }
        }
    }

    for key in FLOAT_FIELDS {
        if let Some(value) = map.get_mut(key) {
            if let Some(number) = value.as_str().and_then(|raw| raw.trim().parse::<f64>().ok()) {
                *value = Value::from(number);
            }
        }
    }

    for key in INT_FIELDS {
        if let Some(value) = map.get_mut(key) {
            if let Some(number) = coerce_int(value) {
                *value = Value::from(number);
            }
        }
    }

    if !map.contains_key("control_mode") {
        let hysteresis = map
            .get("hysteresis_enabled")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        let mode = if hysteresis {
            ControlMode::Hysteresis
        } else {
            ControlMode::Schedule
        };
        map.insert("control_mode".to_string(), Value::from(String::from(mode)));
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(raw) => raw.trim().is_empty(),
        _ => false,
    }
}

fn coerce_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(flag) => Some(*flag),
        Value::Number(number) => number.as_f64().map(|n| n != 0.0),
        Value::String(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Some(true),
            "false" | "0" | "no" | "off" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn coerce_int(value: &Value) -> Option<i64> {
    match value {
        Value::String(raw) => raw.trim().parse::<i64>().ok(),
        Value::Number(number) if number.is_f64() => number
            .as_f64()
            .filter(|n| n.fract() == 0.0)
            .map(|n| n as i64),
        _ => None,
    }
}
