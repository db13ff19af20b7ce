use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HoldMode {
    Heat,
    Cool,
}

impl HoldMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Heat => "heat",
            Self::Cool => "cool",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionKind {
    Heat,
    Cool,
    HeatIdle,
    CoolIdle,
    Cancel,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Heat => "heat",
            Self::Cool => "cool",
            Self::HeatIdle => "heat-idle",
            Self::CoolIdle => "cool-idle",
            Self::Cancel => "cancel",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Action {
    Heat(f64),
    Cool(f64),
    HeatIdle(f64),
    CoolIdle(f64),
    Cancel,
}

impl Action {
    pub fn kind(self) -> ActionKind {
        match self {
            Self::Heat(_) => ActionKind::Heat,
            Self::Cool(_) => ActionKind::Cool,
            Self::HeatIdle(_) => ActionKind::HeatIdle,
            Self::CoolIdle(_) => ActionKind::CoolIdle,
            Self::Cancel => ActionKind::Cancel,
        }
    }

    pub fn setpoint(self) -> Option<f64> {
        match self {
            Self::Heat(value) | Self::Cool(value) | Self::HeatIdle(value) | Self::CoolIdle(value) => {
                Some(value)
            }
            Self::Cancel => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ControllerState {
    pub mode: Option<HoldMode>,
    pub last_action: Option<ActionKind>,
}

impl ControllerState {
    pub fn apply(&mut self, action: Option<Action>) {
        let Some(action) = action else {
            return;
        };

        self.mode = match action {
            Action::Heat(_) => Some(HoldMode::Heat),
            Action::Cool(_) => Some(HoldMode::Cool),
            Action::HeatIdle(_) | Action::CoolIdle(_) | Action::Cancel => None,
        };
        self.last_action = Some(action.kind());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FanMode {
    Auto,
    On,
}

impl FanMode {
    pub fn code(self) -> u8 {
        match self {
            Self::Auto => 0,
            Self::On => 1,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" | "0" => Some(Self::Auto),
            "on" | "1" => Some(Self::On),
            _ => None,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Auto),
            1 => Some(Self::On),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemSwitch {
    Off,
    Heat,
    Auto,
    Cool,
}

impl SystemSwitch {
    pub fn code(self) -> u8 {
        match self {
            Self::Off => 0,
            Self::Heat => 1,
            Self::Auto => 2,
            Self::Cool => 3,
        }
    }
}
