//! Grouped configuration parameters and the write/ack messages exchanged with
//! the vehicle.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::HubError;

/// Dotted `group.key` address of a parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ParamPath {
    group: String,
    key: String,
}

impl ParamPath {
    pub fn new(group: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            key: key.into(),
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for ParamPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.group, self.key)
    }
}

impl FromStr for ParamPath {
    type Err = HubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('.') {
            Some((group, key)) if !group.is_empty() && !key.is_empty() && !key.contains('.') => {
                Ok(Self::new(group, key))
            }
            _ => Err(HubError::InvalidParamPath(s.to_string())),
        }
    }
}

impl TryFrom<String> for ParamPath {
    type Error = HubError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ParamPath> for String {
    fn from(path: ParamPath) -> Self {
        path.to_string()
    }
}

/// group → key → value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterTree {
    groups: BTreeMap<String, BTreeMap<String, f64>>,
}

impl ParameterTree {
    pub fn empty() -> Self {
        Self {
            groups: BTreeMap::new(),
        }
    }

    /// Builder used to seed a tree.
    pub fn with(mut self, group: &str, key: &str, value: f64) -> Self {
        self.groups
            .entry(group.to_string())
            .or_default()
            .insert(key.to_string(), value);
        self
    }

    pub fn get(&self, path: &ParamPath) -> Option<f64> {
        self.groups.get(path.group())?.get(path.key()).copied()
    }

    pub fn contains(&self, path: &ParamPath) -> bool {
        self.get(path).is_some()
    }

    /// Overwrite an existing entry.
    ///
    /// # Errors
    ///
    /// [`HubError::UnknownParameter`] when the group or key does not exist.
    pub fn set(&mut self, path: &ParamPath, value: f64) -> Result<(), HubError> {
        let slot = self
            .groups
            .get_mut(path.group())
            .and_then(|keys| keys.get_mut(path.key()))
            .ok_or_else(|| HubError::UnknownParameter(path.to_string()))?;
        *slot = value;
        Ok(())
    }

    pub fn group(&self, group: &str) -> Option<&BTreeMap<String, f64>> {
        self.groups.get(group)
    }

    pub fn paths(&self) -> impl Iterator<Item = ParamPath> + '_ {
        self.groups
            .iter()
            .flat_map(|(g, keys)| keys.keys().map(move |k| ParamPath::new(g.clone(), k.clone())))
    }
}

impl Default for ParameterTree {
    fn default() -> Self {
        Self::empty()
            .with("velocity", "max_linear", 2.0)
            .with("velocity", "max_angular", 1.5)
            .with("velocity", "acceleration", 0.5)
            .with("pid", "kp", 1.2)
            .with("pid", "ki", 0.05)
            .with("pid", "kd", 0.4)
            .with("sensors", "lidar_offset_x", 0.2)
            .with("sensors", "lidar_offset_z", 0.1)
    }
}

/// What parameter listeners see: the committed tree and the writes still
/// waiting for the vehicle to confirm them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterState {
    pub tree: ParameterTree,
    pub pending: BTreeMap<ParamPath, f64>,
}

impl ParameterState {
    pub fn is_pending(&self, path: &ParamPath) -> bool {
        self.pending.contains_key(path)
    }
}

/// Monotonic id of a parameter write request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WriteId(pub u64);

impl fmt::Display for WriteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A write forwarded to the vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigWrite {
    pub id: WriteId,
    pub path: ParamPath,
    pub value: f64,
}

impl ConfigWrite {
    /// The acknowledgement the vehicle sends back when it accepts this write.
    pub fn ack(&self) -> ConfigAck {
        ConfigAck {
            id: self.id,
            path: self.path.clone(),
            value: self.value,
        }
    }
}

/// Confirmation that the vehicle applied a [`ConfigWrite`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigAck {
    pub id: WriteId,
    pub path: ParamPath,
    pub value: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_parses_group_and_key() {
        let path: ParamPath = "pid.kp".parse().unwrap();
        assert_eq!(path.group(), "pid");
        assert_eq!(path.key(), "kp");
        assert_eq!(path.to_string(), "pid.kp");
    }

    #[test]
    fn malformed_paths_are_rejected() {
        for bad in ["pid", ".kp", "pid.", "a.b.c", ""] {
            assert!(
                matches!(bad.parse::<ParamPath>(), Err(HubError::InvalidParamPath(_))),
                "{bad:?} should not parse"
            );
        }
    }

    #[test]
    fn default_tree_matches_vehicle_defaults() {
        let tree = ParameterTree::default();
        assert_eq!(tree.get(&"pid.kp".parse().unwrap()), Some(1.2));
        assert_eq!(tree.get(&"velocity.max_linear".parse().unwrap()), Some(2.0));
        assert_eq!(tree.get(&"sensors.lidar_offset_z".parse().unwrap()), Some(0.1));
        assert_eq!(tree.paths().count(), 8);
    }

    #[test]
    fn set_refuses_unknown_entries() {
        let mut tree = ParameterTree::default();
        let missing = ParamPath::new("pid", "kf");
        assert!(matches!(
            tree.set(&missing, 1.0),
            Err(HubError::UnknownParameter(p)) if p == "pid.kf"
        ));
        let kd = ParamPath::new("pid", "kd");
        tree.set(&kd, 0.9).unwrap();
        assert_eq!(tree.get(&kd), Some(0.9));
    }

    #[test]
    fn state_serializes_pending_by_dotted_path() {
        let mut pending = BTreeMap::new();
        pending.insert(ParamPath::new("pid", "kp"), 2.0);
        let state = ParameterState {
            tree: ParameterTree::default(),
            pending,
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["pending"]["pid.kp"], 2.0);
        assert_eq!(json["tree"]["pid"]["kp"], 1.2);
    }
}
