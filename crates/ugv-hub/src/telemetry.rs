//! [`TelemetryDistributor`] – per-topic fan-out of sensor data.
//!
//! Sensor topics arrive at different rates and most consumers care about one
//! of them, so listeners register per [`Topic`] and an
//! [`update`][TelemetryDistributor::update] only reaches the listeners of the
//! topics it carries. Consumers that want a point-in-time read each frame use
//! [`snapshot`][TelemetryDistributor::snapshot] instead.
//!
//! Values are delivered verbatim; nothing here checks a value against the
//! shape its topic normally carries.

use std::collections::HashMap;

use tracing::{debug, trace};
use ugv_types::{HubError, TelemetrySnapshot, TelemetryUpdate, TelemetryValue, Topic};

use crate::registry::{IdAllocator, Registry, SubscriptionId};

/// Owns the latest value of every telemetry topic.
pub struct TelemetryDistributor {
    snapshot: TelemetrySnapshot,
    topics: HashMap<Topic, Registry<TelemetryValue>>,
    owners: HashMap<SubscriptionId, Topic>,
    ids: IdAllocator,
}

impl TelemetryDistributor {
    /// A distributor holding the default value of every known topic.
    pub fn new() -> Self {
        Self {
            snapshot: TelemetrySnapshot::default(),
            topics: HashMap::new(),
            owners: HashMap::new(),
            ids: IdAllocator::default(),
        }
    }

    /// Merge `update` into the snapshot, then notify the listeners of each
    /// topic it carries, in update order.
    ///
    /// Each listener receives only its own topic's new value. Topics not in
    /// `update` stay untouched and their listeners are not called.
    pub fn update(&mut self, update: TelemetryUpdate) {
        let mut touched = Vec::with_capacity(update.len());
        for (topic, value) in update {
            self.snapshot.insert(topic.clone(), value);
            touched.push(topic);
        }
        for topic in touched {
            trace!(topic = %topic, "telemetry update");
            if let (Some(registry), Some(value)) =
                (self.topics.get_mut(&topic), self.snapshot.get(&topic))
            {
                registry.notify(value);
            }
        }
    }

    /// Register `listener` on `topic` and immediately replay the topic's
    /// current value to it.
    ///
    /// A topic outside the known set has no value until first published, so
    /// no replay happens for it.
    pub fn subscribe<F>(&mut self, topic: impl Into<Topic>, listener: F) -> SubscriptionId
    where
        F: FnMut(&TelemetryValue) -> Result<(), HubError> + Send + 'static,
    {
        let topic = topic.into();
        let id = self.ids.next_id();
        let registry = self
            .topics
            .entry(topic.clone())
            .or_insert_with(|| Registry::new("telemetry"));
        registry.insert(id, Box::new(listener));
        if let Some(current) = self.snapshot.get(&topic) {
            registry.notify_one(id, current);
        }
        debug!(topic = %topic, subscription = id.raw(), "telemetry listener registered");
        self.owners.insert(id, topic);
        id
    }

    /// Remove a listener. Unknown or already-removed ids are a no-op.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let Some(topic) = self.owners.remove(&id) else {
            return false;
        };
        self.topics
            .get_mut(&topic)
            .map(|registry| registry.remove(id))
            .unwrap_or(false)
    }

    pub fn snapshot(&self) -> &TelemetrySnapshot {
        &self.snapshot
    }

    pub fn get(&self, topic: &Topic) -> Option<&TelemetryValue> {
        self.snapshot.get(topic)
    }

    /// Number of listeners currently registered on `topic`.
    pub fn listener_count(&self, topic: &Topic) -> usize {
        self.topics.get(topic).map(Registry::len).unwrap_or(0)
    }

    /// Drop every listener. The snapshot survives.
    pub fn dispose(&mut self) {
        self.topics.clear();
        self.owners.clear();
        debug!("telemetry distributor disposed");
    }
}

impl Default for TelemetryDistributor {
    fn default() -> Self {
        Self::new()
    }
}
