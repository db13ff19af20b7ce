use redlink_common::{Action, FanMode};
use serde_json::Value;

use crate::error::ControllerError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ManualCommand {
    Heat {
        setpoint: f64,
        hold_minutes: Option<u32>,
    },
    Cool {
        setpoint: f64,
        hold_minutes: Option<u32>,
    },
    Fan(FanMode),
    Cancel,
}

impl ManualCommand {
    pub fn parse(command: &str, payload: &Value) -> Result<Self, ControllerError> {
        match command {
            "heat" => Ok(Self::Heat {
                setpoint: setpoint(payload)?,
                hold_minutes: hold_minutes(payload)?,
            }),
            "cool" => Ok(Self::Cool {
                setpoint: setpoint(payload)?,
                hold_minutes: hold_minutes(payload)?,
            }),
            "fan" => fan_mode(payload).map(Self::Fan),
            "cancel" => Ok(Self::Cancel),
            _ => Err(invalid("invalid action")),
        }
    }

    pub fn action(self) -> Option<Action> {
        match self {
            Self::Heat { setpoint, .. } => Some(Action::Heat(setpoint)),
            Self::Cool { setpoint, .. } => Some(Action::Cool(setpoint)),
            Self::Cancel => Some(Action::Cancel),
            Self::Fan(_) => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Heat { .. } => "heat",
            Self::Cool { .. } => "cool",
            Self::Fan(_) => "fan",
            Self::Cancel => "cancel",
        }
    }
}

fn setpoint(payload: &Value) -> Result<f64, ControllerError> {
    let value = field(payload, "setpoint").ok_or_else(|| invalid("setpoint is required"))?;
    number(value)
        .filter(|setpoint| setpoint.is_finite())
        .ok_or_else(|| invalid("setpoint must be a number"))
}

fn hold_minutes(payload: &Value) -> Result<Option<u32>, ControllerError> {
    let Some(value) = field(payload, "hold_minutes") else {
        return Ok(None);
    };
    number(value)
        .filter(|minutes| minutes.fract() == 0.0 && *minutes >= 1.0 && *minutes <= f64::from(u32::MAX))
        .map(|minutes| Some(minutes as u32))
        .ok_or_else(|| invalid("hold_minutes must be a positive integer"))
}

fn fan_mode(payload: &Value) -> Result<FanMode, ControllerError> {
    let value = field(payload, "mode").ok_or_else(|| invalid("mode is required"))?;
    let mode = match value {
        Value::String(raw) => FanMode::parse(raw),
        Value::Number(number) => number.as_i64().and_then(FanMode::from_code),
        _ => None,
    };
    mode.ok_or_else(|| invalid("fan mode must be 'auto' or 'on'"))
}

fn field<'a>(payload: &'a Value, key: &str) -> Option<&'a Value> {
    payload.get(key).filter(|value| match value {
        Value::Null => false,
        Value::String(raw) => !raw.trim().is_empty(),
        _ => true,
    })
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(raw) => raw.trim().parse().ok(),
        _ => None,
    }
}

fn invalid(message: &str) -> ControllerError {
    ControllerError::Validation(message.to_string())
}
