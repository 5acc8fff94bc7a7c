//! [`ControlArbiter`] – one authoritative drive command from many producers.
//!
//! The virtual joystick, a physical gamepad and the keyboard stop all call
//! [`ControlArbiter::update`] independently. There is no temporal fusion: the
//! most recent accepted update wins and `active_input` records who sent it.
//!
//! # Interlock
//!
//! While `e_stop` is engaged, any update that does not explicitly set
//! `e_stop` is rejected and the command stays as it was. Only
//! [`trigger_emergency_stop`][ControlArbiter::trigger_emergency_stop] and
//! [`clear_emergency_stop`][ControlArbiter::clear_emergency_stop] (or an
//! update that carries `e_stop`) get through.

use tracing::{debug, error, info, warn};
use ugv_types::{CommandUpdate, ControlCommand, DeviceId, HubError, InputSource};

use crate::registry::{IdAllocator, Registry, SubscriptionId};

/// Result of a write against the arbiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum ArbiterOutcome {
    /// The command changed and subscribers were notified.
    Applied,
    /// Dropped because the emergency stop is engaged.
    Interlocked,
    /// A disconnect for a device other than the tracked one.
    Ignored,
}

/// Owns the drive command and applies the emergency-stop interlock.
pub struct ControlArbiter {
    command: ControlCommand,
    listeners: Registry<ControlCommand>,
    ids: IdAllocator,
}

impl ControlArbiter {
    pub fn new() -> Self {
        Self {
            command: ControlCommand::default(),
            listeners: Registry::new("control"),
            ids: IdAllocator::default(),
        }
    }

    /// Merge `update` into the command and notify every subscriber with the
    /// full result.
    ///
    /// Velocities are clamped to `[-1, 1]` (NaN becomes 0). If the merged
    /// command has `e_stop` set, both velocities are forced to 0.
    pub fn update(&mut self, update: CommandUpdate) -> ArbiterOutcome {
        if self.command.e_stop && !update.touches_e_stop() {
            warn!(
                source = %update.active_input.unwrap_or(self.command.active_input),
                "command ignored: emergency stop engaged"
            );
            return ArbiterOutcome::Interlocked;
        }

        let cmd = &mut self.command;
        if let Some(linear) = update.linear {
            cmd.linear = normalize(linear);
        }
        if let Some(angular) = update.angular {
            cmd.angular = normalize(angular);
        }
        if let Some(source) = update.active_input {
            cmd.active_input = source;
        }
        if let Some(device) = update.connected_device {
            cmd.connected_device = device;
        }
        if let Some(e_stop) = update.e_stop {
            cmd.e_stop = e_stop;
        }
        if cmd.e_stop {
            cmd.linear = 0.0;
            cmd.angular = 0.0;
        }

        self.listeners.notify(&self.command);
        ArbiterOutcome::Applied
    }

    /// Engage the emergency stop and zero both velocities, whatever the
    /// current state.
    pub fn trigger_emergency_stop(&mut self) {
        self.command.e_stop = true;
        self.command.linear = 0.0;
        self.command.angular = 0.0;
        error!("EMERGENCY STOP TRIGGERED");
        self.listeners.notify(&self.command);
    }

    /// Release the emergency stop. Velocities stay at zero until a producer
    /// sends a new sample.
    pub fn clear_emergency_stop(&mut self) {
        let _ = self.update(CommandUpdate::default().e_stop(false));
        info!("emergency stop cleared");
    }

    pub fn is_stopped(&self) -> bool {
        self.command.e_stop
    }

    /// Track a newly attached input device.
    pub fn device_connected(&mut self, device: DeviceId) -> ArbiterOutcome {
        info!(device = %device, "input device connected");
        self.update(CommandUpdate::default().connected_device(Some(device)))
    }

    /// Forget `device` if it is the tracked one and hand control back to
    /// nobody. Disconnects for any other device are ignored.
    pub fn device_disconnected(&mut self, device: &DeviceId) -> ArbiterOutcome {
        if self.command.connected_device.as_ref() != Some(device) {
            debug!(device = %device, "disconnect for untracked device ignored");
            return ArbiterOutcome::Ignored;
        }
        info!(device = %device, "input device disconnected");
        self.update(
            CommandUpdate::default()
                .connected_device(None)
                .active_input(InputSource::None),
        )
    }

    /// Register `listener` and replay the current command to it.
    pub fn subscribe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: FnMut(&ControlCommand) -> Result<(), HubError> + Send + 'static,
    {
        let id = self.ids.next_id();
        self.listeners.insert(id, Box::new(listener));
        self.listeners.notify_one(id, &self.command);
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.listeners.remove(id)
    }

    pub fn snapshot(&self) -> &ControlCommand {
        &self.command
    }

    pub fn dispose(&mut self) {
        self.listeners.clear();
        debug!("control arbiter disposed");
    }
}

impl Default for ControlArbiter {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize(v: f32) -> f32 {
    if v.is_nan() { 0.0 } else { v.clamp(-1.0, 1.0) }
}
