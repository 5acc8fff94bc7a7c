//! `ugv-types` – shared data model of the operator hub.
//!
//! - [`telemetry`] – topics, their values, snapshots and partial updates.
//! - [`control`] – the drive command and producer updates.
//! - [`params`] – the parameter tree, dotted paths, and write/ack messages.
//!
//! [`HubError`] is the error type used across the workspace.

pub mod control;
pub mod params;
pub mod telemetry;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use control::{CommandUpdate, ControlCommand, DeviceId, InputSource};
pub use params::{ConfigAck, ConfigWrite, ParamPath, ParameterState, ParameterTree, WriteId};
pub use telemetry::{
    Battery, Imu, LinkStatus, OccupancyGrid, Odometry, Point3, TelemetrySnapshot,
    TelemetryUpdate, TelemetryValue, Topic,
};

/// Errors raised by the hub and its collaborators.
///
/// Interlocked control updates and stale confirmations are not errors; the
/// stores report them as outcomes.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HubError {
    #[error("invalid parameter path '{0}': expected 'group.key'")]
    InvalidParamPath(String),

    #[error("unknown parameter '{0}'")]
    UnknownParameter(String),

    #[error("listener failed: {0}")]
    Listener(String),

    #[error("channel error: {0}")]
    Channel(String),

    #[error("configuration error: {0}")]
    Config(String),
}
