use chrono::{NaiveTime, Timelike};
use serde::Serialize;

use crate::{
    error::DeviceError,
    types::{FanMode, SystemSwitch},
};

const MINUTES_PER_DAY: u32 = 24 * 60;
const MINUTES_PER_SLOT: u32 = 15;

// `None` fields go out as null, which the portal treats as unchanged.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlChange {
    #[serde(rename = "CoolNextPeriod")]
    pub cool_next_period: Option<u32>,
    #[serde(rename = "CoolSetpoint")]
    pub cool_setpoint: Option<i64>,
    #[serde(rename = "DeviceID")]
    pub device_id: i64,
    #[serde(rename = "FanMode")]
    pub fan_mode: Option<u8>,
    #[serde(rename = "HeatNextPeriod")]
    pub heat_next_period: Option<u32>,
    #[serde(rename = "HeatSetpoint")]
    pub heat_setpoint: Option<i64>,
    #[serde(rename = "StatusCool")]
    pub status_cool: u8,
    #[serde(rename = "StatusHeat")]
    pub status_heat: u8,
    #[serde(rename = "SystemSwitch")]
    pub system_switch: Option<u8>,
}

impl ControlChange {
    fn base(device_id: i64) -> Self {
        Self {
            cool_next_period: None,
            cool_setpoint: None,
            device_id,
            fan_mode: None,
            heat_next_period: None,
            heat_setpoint: None,
            status_cool: 0,
            status_heat: 0,
            system_switch: None,
        }
    }

    pub fn heat_hold(
        device_id: i64,
        setpoint: f64,
        hold_minutes: u32,
        now: NaiveTime,
    ) -> Result<Self, DeviceError> {
        let slot = next_period_slot(hold_minutes, now)?;
        Ok(Self {
            heat_setpoint: Some(whole_degrees(setpoint)?),
            heat_next_period: Some(slot),
            status_heat: 1,
            status_cool: 1,
            system_switch: Some(SystemSwitch::Heat.code()),
            ..Self::base(device_id)
        })
    }

    pub fn cool_hold(
        device_id: i64,
        setpoint: f64,
        hold_minutes: u32,
        now: NaiveTime,
    ) -> Result<Self, DeviceError> {
        let slot = next_period_slot(hold_minutes, now)?;
        Ok(Self {
            cool_setpoint: Some(whole_degrees(setpoint)?),
            cool_next_period: Some(slot),
            status_heat: 1,
            status_cool: 1,
            system_switch: Some(SystemSwitch::Cool.code()),
            ..Self::base(device_id)
        })
    }

    pub fn cancel_hold(device_id: i64) -> Self {
        Self::base(device_id)
    }

    pub fn fan(device_id: i64, mode: FanMode) -> Self {
        Self {
            fan_mode: Some(mode.code()),
            ..Self::base(device_id)
        }
    }
}

pub fn next_period_slot(hold_minutes: u32, now: NaiveTime) -> Result<u32, DeviceError> {
    if hold_minutes == 0 {
        return Err(DeviceError::Invalid("hold_minutes must be positive".to_string()));
    }
    let minute_of_day = now.hour() * 60 + now.minute();
    let end = (minute_of_day + hold_minutes % MINUTES_PER_DAY) % MINUTES_PER_DAY;
    Ok(end / MINUTES_PER_SLOT)
}

fn whole_degrees(setpoint: f64) -> Result<i64, DeviceError> {
    if !setpoint.is_finite() {
        return Err(DeviceError::Invalid(format!("setpoint {setpoint} is not a number")));
    }
    Ok(setpoint.trunc() as i64)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn at(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
    }

    #[test]
    fn slot_wraps_past_midnight() {
        assert_eq!(next_period_slot(60, at(23, 30)).unwrap(), 2);
    }

    #[test]
    fn slot_counts_quarter_hours() {
        assert_eq!(next_period_slot(60, at(10, 0)).unwrap(), 44);
        assert_eq!(next_period_slot(30, at(6, 15)).unwrap(), 27);
    }

    #[test]
    fn zero_hold_is_rejected() {
        assert_eq!(
            next_period_slot(0, at(10, 0)),
            Err(DeviceError::Invalid("hold_minutes must be positive".to_string()))
        );
    }

    #[test]
    fn heat_hold_payload() {
        let change = ControlChange::heat_hold(42, 71.6, 60, at(10, 0)).unwrap();
        assert_eq!(
            serde_json::to_value(change).unwrap(),
            json!({
                "CoolNextPeriod": null,
                "CoolSetpoint": null,
                "DeviceID": 42,
                "FanMode": null,
                "HeatNextPeriod": 44,
                "HeatSetpoint": 71,
                "StatusCool": 1,
                "StatusHeat": 1,
                "SystemSwitch": 1,
            })
        );
    }

    #[test]
    fn cool_hold_payload() {
        let change = ControlChange::cool_hold(42, 74.0, 30, at(6, 15)).unwrap();
        assert_eq!(change.cool_setpoint, Some(74));
        assert_eq!(change.cool_next_period, Some(27));
        assert_eq!(change.heat_setpoint, None);
        assert_eq!(change.system_switch, Some(3));
        assert_eq!((change.status_heat, change.status_cool), (1, 1));
    }

    #[test]
    fn cancel_clears_both_flags() {
        let change = ControlChange::cancel_hold(42);
        assert_eq!((change.status_heat, change.status_cool), (0, 0));
        assert_eq!(change.system_switch, None);
        assert_eq!(change.heat_setpoint, None);
    }

    #[test]
    fn fan_payload_only_sets_fan_mode() {
        let change = ControlChange::fan(42, FanMode::On);
        assert_eq!(
            change,
            ControlChange {
                fan_mode: Some(1),
                ..ControlChange::cancel_hold(42)
            }
        );
    }

    #[test]
    fn non_finite_setpoint_is_rejected() {
        assert!(ControlChange::heat_hold(42, f64::NAN, 60, at(10, 0)).is_err());
    }
}
