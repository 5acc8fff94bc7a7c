//! Collaborators that sit between the hub and the vehicle link.
//!
//! The hub never speaks a vehicle protocol itself. Outbound parameter writes
//! go through a [`ConfigTransport`]; the drive command leaves through a
//! [`CommandBridge`] subscribed to the arbiter. Both can be swapped for a real
//! link without touching the stores.

use std::ops::RangeInclusive;
use std::time::Duration;

use rand::Rng;
use serde_json::json;
use tokio::sync::mpsc::{UnboundedSender, WeakUnboundedSender};
use tracing::{debug, error, trace};
use ugv_types::{ConfigWrite, ControlCommand, HubError};

use crate::hub::HubEvent;

/// Carries parameter writes to the vehicle.
///
/// Implementations deliver the matching [`ConfigAck`][ugv_types::ConfigAck]
/// back to the hub whenever the vehicle answers, in whatever order that
/// happens. There is no way to cancel a forwarded write.
pub trait ConfigTransport: Send {
    fn forward(&mut self, write: ConfigWrite);
}

/// Stand-in for the vehicle's config endpoint: every write is acknowledged
/// after a random delay, so acks routinely overtake each other.
///
/// The link only holds a weak sender, so it never keeps the hub loop alive
/// on its own; acks due after the last [`HubHandle`][crate::HubHandle] is
/// dropped are discarded.
pub struct SimulatedConfigLink {
    events: WeakUnboundedSender<HubEvent>,
    delay_ms: RangeInclusive<u64>,
}

impl SimulatedConfigLink {
    /// Acks are sent to `events` after a uniform delay in `[min, max]`.
    pub fn new(events: &UnboundedSender<HubEvent>, min: Duration, max: Duration) -> Self {
        let lo = min.as_millis() as u64;
        let hi = (max.as_millis() as u64).max(lo);
        Self {
            events: events.downgrade(),
            delay_ms: lo..=hi,
        }
    }

    fn next_delay(&self) -> Duration {
        Duration::from_millis(rand::thread_rng().gen_range(self.delay_ms.clone()))
    }
}

impl ConfigTransport for SimulatedConfigLink {
    fn forward(&mut self, write: ConfigWrite) {
        let delay = self.next_delay();
        let events = self.events.clone();
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            error!(write = %write.id, "no async runtime; write will never be acknowledged");
            return;
        };
        debug!(write = %write.id, path = %write.path, delay_ms = delay.as_millis() as u64, "simulating ack");
        handle.spawn(async move {
            tokio::time::sleep(delay).await;
            let delivered = events
                .upgrade()
                .is_some_and(|tx| tx.send(HubEvent::Ack(write.ack())).is_ok());
            if !delivered {
                trace!(write = %write.id, "hub gone before ack arrived");
            }
        });
    }
}

/// Scales the normalized command into a `geometry_msgs/Twist` and pushes a
/// rosbridge publish frame for `/cmd_vel` whenever the twist changes.
pub struct CommandBridge {
    max_linear: f32,
    max_angular: f32,
    last: Option<(f32, f32)>,
    outbound: UnboundedSender<String>,
}

impl CommandBridge {
    /// `max_linear` (m/s) and `max_angular` (rad/s) are the speeds a full
    /// `1.0` deflection maps to.
    pub fn new(outbound: UnboundedSender<String>, max_linear: f32, max_angular: f32) -> Self {
        Self {
            max_linear,
            max_angular,
            last: None,
            outbound,
        }
    }

    /// Handle one committed command. Suitable as an arbiter listener.
    pub fn on_command(&mut self, cmd: &ControlCommand) -> Result<(), HubError> {
        let twist = if cmd.e_stop {
            (0.0, 0.0)
        } else {
            (cmd.linear * self.max_linear, cmd.angular * self.max_angular)
        };
        if self.last == Some(twist) {
            return Ok(());
        }
        self.outbound
            .send(Self::build_twist_frame(twist.0, twist.1))
            .map_err(|e| HubError::Channel(format!("command link closed: {e}")))?;
        self.last = Some(twist);
        Ok(())
    }

    /// Build the rosbridge JSON frame publishing a twist on `/cmd_vel`.
    pub fn build_twist_frame(linear_velocity: f32, angular_velocity: f32) -> String {
        json!({
            "op": "publish",
            "topic": "/cmd_vel",
            "msg": {
                "linear":  { "x": linear_velocity, "y": 0.0, "z": 0.0 },
                "angular": { "x": 0.0, "y": 0.0, "z": angular_velocity }
            }
        })
        .to_string()
    }
}
