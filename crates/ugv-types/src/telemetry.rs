//! Telemetry topics and the values carried on them.
//!
//! A [`TelemetrySnapshot`] always holds a value for each of the seven
//! [`Topic::KNOWN`] topics. Topics outside that set ([`Topic::Other`]) are
//! accepted but only appear in the snapshot once something publishes them.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Default edge length (cells) of the occupancy grid.
pub const DEFAULT_GRID_SIZE: usize = 100;

/// A named telemetry channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Topic {
    /// Inertial attitude.
    Imu,
    /// Pose / odometry.
    Odometry,
    Battery,
    /// Recent trajectory, bounded length.
    Path,
    OccupancyGrid,
    /// Link status to the vehicle.
    Status,
    /// Link round-trip latency in milliseconds.
    Latency,
    /// Any topic outside the fixed set.
    Other(String),
}

impl Topic {
    /// The topics that are present in every snapshot.
    pub const KNOWN: [Topic; 7] = [
        Topic::Imu,
        Topic::Odometry,
        Topic::Battery,
        Topic::Path,
        Topic::OccupancyGrid,
        Topic::Status,
        Topic::Latency,
    ];

    /// Wire name of the topic, e.g. `"occupancyGrid"`.
    pub fn as_str(&self) -> &str {
        match self {
            Topic::Imu => "imu",
            Topic::Odometry => "odometry",
            Topic::Battery => "battery",
            Topic::Path => "path",
            Topic::OccupancyGrid => "occupancyGrid",
            Topic::Status => "status",
            Topic::Latency => "latency",
            Topic::Other(name) => name,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Topic::Other(_))
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Topic {
    fn from(name: &str) -> Self {
        match name {
            "imu" => Topic::Imu,
            "odometry" => Topic::Odometry,
            "battery" => Topic::Battery,
            "path" => Topic::Path,
            "occupancyGrid" => Topic::OccupancyGrid,
            "status" => Topic::Status,
            "latency" => Topic::Latency,
            other => Topic::Other(other.to_string()),
        }
    }
}

impl From<String> for Topic {
    fn from(name: String) -> Self {
        Topic::from(name.as_str())
    }
}

impl From<Topic> for String {
    fn from(topic: Topic) -> Self {
        topic.as_str().to_string()
    }
}

impl FromStr for Topic {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Topic::from(s))
    }
}

/// Attitude in radians.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Imu {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

/// Position in metres and velocity in metres per second.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Odometry {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    #[serde(default)]
    pub vx: f64,
    #[serde(default)]
    pub vy: f64,
    #[serde(default)]
    pub vz: f64,
}

impl Odometry {
    pub fn at(x: f64, y: f64, z: f64) -> Self {
        Self {
            x,
            y,
            z,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Battery {
    pub voltage: f64,
    pub current: f64,
    pub percentage: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Row-major occupancy grid; each cell is an occupancy probability in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OccupancyGrid {
    pub width: usize,
    pub height: usize,
    pub cells: Vec<f32>,
}

impl OccupancyGrid {
    /// A `width × height` grid with every cell free.
    pub fn empty(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            cells: vec![0.0; width * height],
        }
    }

    /// Occupancy at column `x`, row `y`, or `None` when out of bounds.
    pub fn cell(&self, x: usize, y: usize) -> Option<f32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.cells.get(x + y * self.width).copied()
    }
}

impl Default for OccupancyGrid {
    fn default() -> Self {
        Self::empty(DEFAULT_GRID_SIZE, DEFAULT_GRID_SIZE)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LinkStatus {
    Connected,
    #[default]
    Disconnected,
    Error,
}

/// Value carried on a [`Topic`].
///
/// Values are not checked against their topic: whatever a producer publishes
/// is what listeners receive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum TelemetryValue {
    Imu(Imu),
    Odometry(Odometry),
    Battery(Battery),
    Path(Vec<Point3>),
    OccupancyGrid(OccupancyGrid),
    Status(LinkStatus),
    /// Milliseconds.
    Latency(f64),
    Raw(serde_json::Value),
}

impl TelemetryValue {
    /// Default value for a known topic; `None` for [`Topic::Other`].
    pub fn default_for(topic: &Topic) -> Option<Self> {
        let value = match topic {
            Topic::Imu => TelemetryValue::Imu(Imu::default()),
            Topic::Odometry => TelemetryValue::Odometry(Odometry::default()),
            Topic::Battery => TelemetryValue::Battery(Battery::default()),
            Topic::Path => TelemetryValue::Path(Vec::new()),
            Topic::OccupancyGrid => TelemetryValue::OccupancyGrid(OccupancyGrid::default()),
            Topic::Status => TelemetryValue::Status(LinkStatus::default()),
            Topic::Latency => TelemetryValue::Latency(0.0),
            Topic::Other(_) => return None,
        };
        Some(value)
    }
}

/// Latest value of every topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    values: BTreeMap<Topic, TelemetryValue>,
}

impl TelemetrySnapshot {
    pub fn get(&self, topic: &Topic) -> Option<&TelemetryValue> {
        self.values.get(topic)
    }

    /// Replace the value of `topic`. Topics are never removed.
    pub fn insert(&mut self, topic: Topic, value: TelemetryValue) {
        self.values.insert(topic, value);
    }

    pub fn contains(&self, topic: &Topic) -> bool {
        self.values.contains_key(topic)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Topic, &TelemetryValue)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Default for TelemetrySnapshot {
    fn default() -> Self {
        let values = Topic::KNOWN
            .iter()
            .filter_map(|t| TelemetryValue::default_for(t).map(|v| (t.clone(), v)))
            .collect();
        Self { values }
    }
}

/// An ordered subset of topics to merge into the snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetryUpdate {
    entries: Vec<(Topic, TelemetryValue)>,
}

impl TelemetryUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `topic`. Setting a topic twice keeps the later value in the
    /// earlier position.
    pub fn with(mut self, topic: impl Into<Topic>, value: TelemetryValue) -> Self {
        self.set(topic.into(), value);
        self
    }

    pub fn set(&mut self, topic: Topic, value: TelemetryValue) {
        match self.entries.iter_mut().find(|(t, _)| *t == topic) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((topic, value)),
        }
    }

    pub fn imu(self, imu: Imu) -> Self {
        self.with(Topic::Imu, TelemetryValue::Imu(imu))
    }

    pub fn odometry(self, odometry: Odometry) -> Self {
        self.with(Topic::Odometry, TelemetryValue::Odometry(odometry))
    }

    pub fn battery(self, battery: Battery) -> Self {
        self.with(Topic::Battery, TelemetryValue::Battery(battery))
    }

    pub fn path(self, path: Vec<Point3>) -> Self {
        self.with(Topic::Path, TelemetryValue::Path(path))
    }

    pub fn occupancy_grid(self, grid: OccupancyGrid) -> Self {
        self.with(Topic::OccupancyGrid, TelemetryValue::OccupancyGrid(grid))
    }

    pub fn status(self, status: LinkStatus) -> Self {
        self.with(Topic::Status, TelemetryValue::Status(status))
    }

    pub fn latency(self, millis: f64) -> Self {
        self.with(Topic::Latency, TelemetryValue::Latency(millis))
    }

    pub fn topics(&self) -> impl Iterator<Item = &Topic> {
        self.entries.iter().map(|(t, _)| t)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl IntoIterator for TelemetryUpdate {
    type Item = (Topic, TelemetryValue);
    type IntoIter = std::vec::IntoIter<(Topic, TelemetryValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_snapshot_has_every_known_topic() {
        let snap = TelemetrySnapshot::default();
        assert_eq!(snap.len(), Topic::KNOWN.len());
        for topic in Topic::KNOWN.iter() {
            assert!(snap.contains(topic), "missing default for {topic}");
        }
        assert_eq!(
            snap.get(&Topic::Status),
            Some(&TelemetryValue::Status(LinkStatus::Disconnected))
        );
    }

    #[test]
    fn unknown_topic_name_maps_to_other() {
        let topic: Topic = "wheel_temps".parse().unwrap();
        assert_eq!(topic, Topic::Other("wheel_temps".into()));
        assert!(!topic.is_known());
        assert!(TelemetryValue::default_for(&topic).is_none());
    }

    #[test]
    fn topic_serializes_as_wire_name() {
        let json = serde_json::to_string(&Topic::OccupancyGrid).unwrap();
        assert_eq!(json, "\"occupancyGrid\"");
        let back: Topic = serde_json::from_str("\"latency\"").unwrap();
        assert_eq!(back, Topic::Latency);
    }

    #[test]
    fn update_keeps_order_and_replaces_duplicates() {
        let update = TelemetryUpdate::new()
            .latency(10.0)
            .imu(Imu::default())
            .latency(20.0);
        let entries: Vec<_> = update.into_iter().collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0], (Topic::Latency, TelemetryValue::Latency(20.0)));
        assert_eq!(entries[1].0, Topic::Imu);
    }

    #[test]
    fn grid_cell_lookup_is_bounds_checked() {
        let mut grid = OccupancyGrid::empty(4, 3);
        grid.cells[1 + 2 * 4] = 1.0;
        assert_eq!(grid.cell(1, 2), Some(1.0));
        assert_eq!(grid.cell(4, 0), None);
        assert_eq!(grid.cell(0, 3), None);
    }
}
