//! The authoritative drive command and the partial updates producers send.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which producer authored the current command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InputSource {
    #[default]
    None,
    Gamepad,
    Joystick,
    Keyboard,
}

impl fmt::Display for InputSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputSource::None => write!(f, "NONE"),
            InputSource::Gamepad => write!(f, "GAMEPAD"),
            InputSource::Joystick => write!(f, "JOYSTICK"),
            InputSource::Keyboard => write!(f, "KEYBOARD"),
        }
    }
}

/// Identity of a physical input device, e.g. a gamepad's reported id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalized drive command. `linear` and `angular` are in `[-1, 1]`; the
/// command transport scales them to real units.
///
/// While `e_stop` is set both velocities are zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlCommand {
    pub linear: f32,
    pub angular: f32,
    pub active_input: InputSource,
    pub connected_device: Option<DeviceId>,
    pub e_stop: bool,
}

/// Partial command. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandUpdate {
    pub linear: Option<f32>,
    pub angular: Option<f32>,
    pub active_input: Option<InputSource>,
    /// `Some(None)` clears the tracked device.
    pub connected_device: Option<Option<DeviceId>>,
    pub e_stop: Option<bool>,
}

impl CommandUpdate {
    /// A velocity sample from `source`.
    pub fn drive(linear: f32, angular: f32, source: InputSource) -> Self {
        Self {
            linear: Some(linear),
            angular: Some(angular),
            active_input: Some(source),
            ..Self::default()
        }
    }

    /// Zero velocity, authored by nobody. Sent when a producer lets go.
    pub fn release() -> Self {
        Self::drive(0.0, 0.0, InputSource::None)
    }

    pub fn linear(mut self, linear: f32) -> Self {
        self.linear = Some(linear);
        self
    }

    pub fn angular(mut self, angular: f32) -> Self {
        self.angular = Some(angular);
        self
    }

    pub fn active_input(mut self, source: InputSource) -> Self {
        self.active_input = Some(source);
        self
    }

    pub fn connected_device(mut self, device: Option<DeviceId>) -> Self {
        self.connected_device = Some(device);
        self
    }

    pub fn e_stop(mut self, engaged: bool) -> Self {
        self.e_stop = Some(engaged);
        self
    }

    /// True when the update explicitly sets the emergency-stop flag.
    pub fn touches_e_stop(&self) -> bool {
        self.e_stop.is_some()
    }
}
