//! `ugv-hub` – the in-process state hubs of the operator console.
//!
//! Producers (sensor bridges, input devices, the UI) write into three
//! independent stores; consumers subscribe to them. Nothing here renders or
//! talks to a vehicle directly.
//!
//! # Modules
//!
//! - [`telemetry`] – [`TelemetryDistributor`]: per-topic fan-out of sensor
//!   data with an always-complete snapshot.
//! - [`control`] – [`ControlArbiter`]: one drive command from many producers,
//!   guarded by the emergency-stop interlock.
//! - [`parameters`] – [`ParameterSynchronizer`]: optimistic parameter writes
//!   reconciled against out-of-order acknowledgements.
//! - [`registry`] – the listener registry the three stores share.
//! - [`input`] – gamepad, on-screen joystick and stop-key producers.
//! - [`mock`] – simulated 50 Hz sensor feed.
//! - [`transport`] – config link and `/cmd_vel` bridge collaborators.
//! - [`link_monitor`] – link status derived from telemetry liveness.
//! - [`hub`] – [`Hub`]: owns the stores and runs the single event loop.

pub mod control;
pub mod hub;
pub mod input;
pub mod link_monitor;
pub mod mock;
pub mod parameters;
pub mod registry;
pub mod telemetry;
pub mod transport;

pub use control::{ArbiterOutcome, ControlArbiter};
pub use hub::{Hub, HubConfig, HubEvent, HubHandle};
pub use input::{AxisSample, GamepadMapper, KeyboardStop, VirtualJoystick};
pub use link_monitor::LinkMonitor;
pub use mock::MockTelemetry;
pub use parameters::{AckOutcome, ParameterSynchronizer};
pub use registry::SubscriptionId;
pub use telemetry::TelemetryDistributor;
pub use transport::{CommandBridge, ConfigTransport, SimulatedConfigLink};
