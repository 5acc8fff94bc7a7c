//! Input producers: turn normalized device samples into [`CommandUpdate`]s.
//!
//! Raw device polling happens elsewhere; these types only see axis values
//! and pointer offsets. A producer whose input returns to rest still emits a
//! zero command once, so the vehicle never keeps a stale velocity after the
//! operator lets go.

use serde::{Deserialize, Serialize};
use tracing::debug;
use ugv_types::{CommandUpdate, InputSource};

use crate::control::ControlArbiter;

/// Default deadzone applied to every axis.
pub const DEFAULT_DEADZONE: f32 = 0.1;

/// Left stick, vertical.
pub const LINEAR_AXIS: usize = 1;
/// Right stick, horizontal.
pub const ANGULAR_AXIS: usize = 2;

/// One poll of a gamepad's axes, each in `[-1, 1]`, standard mapping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AxisSample {
    pub axes: Vec<f32>,
}

impl AxisSample {
    pub fn new(axes: Vec<f32>) -> Self {
        Self { axes }
    }

    fn axis(&self, index: usize) -> f32 {
        self.axes.get(index).copied().unwrap_or(0.0)
    }
}

fn apply_deadzone(value: f32, deadzone: f32) -> f32 {
    if value.abs() < deadzone { 0.0 } else { value }
}

/// Maps gamepad polls to drive commands.
///
/// Both axes are inverted: stick up drives forward, stick right turns
/// clockwise (negative yaw rate).
#[derive(Debug, Clone)]
pub struct GamepadMapper {
    deadzone: f32,
    driving: bool,
}

impl GamepadMapper {
    pub fn new(deadzone: f32) -> Self {
        Self {
            deadzone,
            driving: false,
        }
    }

    /// Returns the update to publish for `sample`, if any.
    ///
    /// Deflected sticks publish on every poll. The first poll back inside the
    /// deadzone publishes a single release; further idle polls publish
    /// nothing so the gamepad does not override other producers.
    pub fn map(&mut self, sample: &AxisSample) -> Option<CommandUpdate> {
        let linear = apply_deadzone(-sample.axis(LINEAR_AXIS), self.deadzone);
        let angular = apply_deadzone(-sample.axis(ANGULAR_AXIS), self.deadzone);

        if linear != 0.0 || angular != 0.0 {
            self.driving = true;
            Some(CommandUpdate::drive(linear, angular, InputSource::Gamepad))
        } else if self.driving {
            self.driving = false;
            debug!("gamepad sticks released");
            Some(CommandUpdate::release())
        } else {
            None
        }
    }
}

impl Default for GamepadMapper {
    fn default() -> Self {
        Self::new(DEFAULT_DEADZONE)
    }
}

/// On-screen joystick: a handle dragged inside a circle of radius
/// `max_distance` (screen units).
#[derive(Debug, Clone)]
pub struct VirtualJoystick {
    max_distance: f32,
    deadzone: f32,
}

impl VirtualJoystick {
    pub fn new(max_distance: f32, deadzone: f32) -> Self {
        Self {
            max_distance,
            deadzone,
        }
    }

    /// Handle offset `(dx, dy)` from the centre, screen coordinates (y grows
    /// downward). Offsets beyond the rim are pulled back onto it.
    pub fn drag(&self, dx: f32, dy: f32) -> CommandUpdate {
        let distance = (dx * dx + dy * dy).sqrt();
        let (dx, dy) = if distance > self.max_distance {
            let ratio = self.max_distance / distance;
            (dx * ratio, dy * ratio)
        } else {
            (dx, dy)
        };

        let linear = apply_deadzone(-dy / self.max_distance, self.deadzone);
        let angular = apply_deadzone(-dx / self.max_distance, self.deadzone);
        CommandUpdate::drive(linear, angular, InputSource::Joystick)
    }

    /// The handle snapped back to centre.
    pub fn release(&self) -> CommandUpdate {
        CommandUpdate::release()
    }
}

impl Default for VirtualJoystick {
    fn default() -> Self {
        Self::new(60.0, DEFAULT_DEADZONE)
    }
}

/// The operator's stop key. Each press flips the emergency stop.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyboardStop;

impl KeyboardStop {
    /// Engage the stop if it is released, release it if it is engaged.
    /// Returns the new stop state.
    pub fn toggle(&self, arbiter: &mut ControlArbiter) -> bool {
        if arbiter.is_stopped() {
            arbiter.clear_emergency_stop();
        } else {
            arbiter.trigger_emergency_stop();
        }
        arbiter.is_stopped()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gamepad_inverts_axes_and_tags_source() {
        let mut pad = GamepadMapper::default();
        let update = pad.map(&AxisSample::new(vec![0.0, -0.8, 0.5, 0.0])).unwrap();
        assert_eq!(update.linear, Some(0.8));
        assert_eq!(update.angular, Some(-0.5));
        assert_eq!(update.active_input, Some(InputSource::Gamepad));
    }

    #[test]
    fn gamepad_deadzone_is_per_axis() {
        let mut pad = GamepadMapper::new(0.1);
        let update = pad.map(&AxisSample::new(vec![0.0, -0.5, 0.05, 0.0])).unwrap();
        assert_eq!(update.angular, Some(0.0));
        assert_eq!(update.linear, Some(0.5));
    }

    #[test]
    fn gamepad_publishes_single_release() {
        let mut pad = GamepadMapper::default();
        let rest = AxisSample::new(vec![0.0, 0.02, -0.03, 0.0]);
        assert!(pad.map(&rest).is_none(), "idle pad must stay quiet");

        pad.map(&AxisSample::new(vec![0.0, -1.0, 0.0, 0.0])).unwrap();
        let release = pad.map(&rest).unwrap();
        assert_eq!(release, CommandUpdate::release());
        assert!(pad.map(&rest).is_none());
    }

    #[test]
    fn gamepad_tolerates_short_axis_lists() {
        let mut pad = GamepadMapper::default();
        assert!(pad.map(&AxisSample::new(vec![0.7])).is_none());
    }

    #[test]
    fn joystick_normalizes_and_clamps_to_rim() {
        let stick = VirtualJoystick::new(60.0, 0.1);
        let update = stick.drag(0.0, -30.0);
        assert_eq!(update.linear, Some(0.5));
        assert_eq!(update.angular, Some(0.0));

        let update = stick.drag(0.0, -240.0);
        assert_eq!(update.linear, Some(1.0));
        assert_eq!(update.active_input, Some(InputSource::Joystick));
    }

    #[test]
    fn joystick_release_zeroes_command() {
        let stick = VirtualJoystick::default();
        assert_eq!(stick.release(), CommandUpdate::release());
    }

    #[test]
    fn keyboard_toggle_flips_stop() {
        let mut arbiter = ControlArbiter::new();
        let _ = arbiter.update(CommandUpdate::drive(0.6, 0.0, InputSource::Gamepad));
        let key = KeyboardStop;

        assert!(key.toggle(&mut arbiter));
        assert_eq!(arbiter.snapshot().linear, 0.0);

        assert!(!key.toggle(&mut arbiter));
        assert!(!arbiter.snapshot().e_stop);
    }
}
