use crate::{
    config::AppConfig,
    types::{Action, ControllerState, HoldMode},
};

pub fn decide(
    temperature: Option<f64>,
    config: &AppConfig,
    state: &ControllerState,
    reported_heat_setpoint: Option<f64>,
    reported_cool_setpoint: Option<f64>,
) -> Option<Action> {
    let temperature = temperature?;
    if !config.hysteresis_enabled {
        return None;
    }

    match state.mode {
        Some(HoldMode::Heat) => {
            if !config.enable_heat {
                return Some(Action::Cancel);
            }
            if temperature >= config.heat_off_at {
                return Some(Action::HeatIdle(config.heat_on_below));
            }
            return None;
        }
        Some(HoldMode::Cool) => {
            if !config.enable_cool {
                return Some(Action::Cancel);
            }
            if temperature <= config.cool_off_at {
                return Some(Action::CoolIdle(config.cool_on_above));
            }
            return None;
        }
        None => {}
    }

    if config.enable_heat && temperature <= config.heat_on_below {
        return Some(Action::Heat(config.heat_off_at));
    }
    if config.enable_cool && temperature >= config.cool_on_above {
        return Some(Action::Cool(config.cool_off_at));
    }

    if config.enable_heat
        && reported_heat_setpoint == Some(config.heat_off_at)
        && temperature >= config.heat_off_at
    {
        return Some(Action::HeatIdle(config.heat_on_below));
    }
    if config.enable_cool
        && reported_cool_setpoint == Some(config.cool_off_at)
        && temperature <= config.cool_off_at
    {
        return Some(Action::CoolIdle(config.cool_on_above));
    }

    None
}
