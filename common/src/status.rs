use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

const HOLD_PLACEHOLDERS: [&str; 4] = ["null", "none", "--", "--:--"];

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeviceStatus {
    pub temperature: Option<f64>,
    pub humidity: Option<i64>,
    pub cool_setpoint: Option<f64>,
    pub heat_setpoint: Option<f64>,
    pub hold_until: Option<String>,
    pub status_cool: Option<i64>,
    pub status_heat: Option<i64>,
    pub fan_mode: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct CheckDataSession {
    #[serde(rename = "latestData", default)]
    latest_data: LatestData,
}

#[derive(Debug, Default, Deserialize)]
struct LatestData {
    #[serde(rename = "uiData", default)]
    ui_data: UiData,
    #[serde(rename = "fanData", default)]
    fan_data: FanData,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct UiData {
    #[serde(rename = "DispTemperature")]
    disp_temperature: Option<f64>,
    #[serde(rename = "IndoorHumidity", deserialize_with = "lenient_int")]
    indoor_humidity: Option<i64>,
    #[serde(rename = "CoolSetpoint")]
    cool_setpoint: Option<f64>,
    #[serde(rename = "HeatSetpoint")]
    heat_setpoint: Option<f64>,
    #[serde(rename = "TemporaryHoldUntilTime", deserialize_with = "scalar_string")]
    temporary_hold_until_time: Option<String>,
    #[serde(rename = "StatusCool", deserialize_with = "lenient_int")]
    status_cool: Option<i64>,
    #[serde(rename = "StatusHeat", deserialize_with = "lenient_int")]
    status_heat: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FanData {
    #[serde(rename = "fanMode", deserialize_with = "lenient_int")]
    fan_mode: Option<i64>,
}

impl DeviceStatus {
    pub fn from_check_data_session(raw: &[u8]) -> Result<Self, serde_json::Error> {
        let session: CheckDataSession = serde_json::from_slice(raw)?;
        let ui = session.latest_data.ui_data;
        Ok(Self {
            temperature: ui.disp_temperature,
            humidity: ui.indoor_humidity,
            cool_setpoint: ui.cool_setpoint,
            heat_setpoint: ui.heat_setpoint,
            hold_until: ui.temporary_hold_until_time,
            status_cool: ui.status_cool,
            status_heat: ui.status_heat,
            fan_mode: session.latest_data.fan_data.fan_mode,
        })
    }

    pub fn hold_active(&self) -> bool {
        let has_expiry = self.hold_until.as_deref().is_some_and(|until| {
            let until = until.trim();
            !until.is_empty()
                && !HOLD_PLACEHOLDERS
                    .iter()
                    .any(|placeholder| until.eq_ignore_ascii_case(placeholder))
        });
        has_expiry || self.status_heat.unwrap_or(0) != 0 || self.status_cool.unwrap_or(0) != 0
    }
}

fn lenient_int<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(number)) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|n| n.round() as i64)),
        Some(Value::Bool(flag)) => Some(i64::from(flag)),
        Some(Value::String(raw)) => raw.trim().parse().ok(),
        _ => None,
    })
}

fn scalar_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(raw)) => Some(raw),
        Some(Value::Number(number)) => Some(number.to_string()),
        _ => None,
    })
}
