//! [`ParameterSynchronizer`] – optimistic parameter writes confirmed by the
//! vehicle.
//!
//! A write first lands in the *pending* set so the UI can show it as
//! syncing; the committed tree only changes when the vehicle acknowledges it.
//! Acknowledgements may arrive in any order, or more than once.
//!
//! Every write carries a [`WriteId`]. The synchronizer remembers the id of the
//! last write it committed for each path, which gives two rules:
//!
//! - an ack older than the last committed write for its path is stale and is
//!   dropped, so a late confirmation never rolls a parameter back;
//! - a pending entry is cleared only by the ack of that same write, so a
//!   newer in-flight write stays visible as pending.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, info, warn};
use ugv_types::{ConfigAck, ConfigWrite, HubError, ParamPath, ParameterState, ParameterTree, WriteId};

use crate::registry::{IdAllocator, Registry, SubscriptionId};
use crate::transport::ConfigTransport;

/// Result of reconciling one acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// Value committed and the pending entry cleared.
    Committed,
    /// Value committed; a newer write to the same path is still pending.
    Superseded,
    /// Older than (or a duplicate of) what is already committed. Dropped.
    Stale,
    /// The path is not in the tree. Dropped.
    Unknown,
}

#[derive(Debug, Clone, Copy)]
struct PendingWrite {
    id: WriteId,
    value: f64,
}

/// Owns the parameter tree and the set of writes awaiting confirmation.
pub struct ParameterSynchronizer {
    tree: ParameterTree,
    pending: BTreeMap<ParamPath, PendingWrite>,
    committed: HashMap<ParamPath, WriteId>,
    next_write: u64,
    transport: Box<dyn ConfigTransport>,
    listeners: Registry<ParameterState>,
    ids: IdAllocator,
}

impl ParameterSynchronizer {
    /// Start from `tree`, forwarding writes through `transport`.
    pub fn new(tree: ParameterTree, transport: Box<dyn ConfigTransport>) -> Self {
        Self {
            tree,
            pending: BTreeMap::new(),
            committed: HashMap::new(),
            next_write: 0,
            transport,
            listeners: Registry::new("parameters"),
            ids: IdAllocator::default(),
        }
    }

    /// Mark `path = value` as pending, notify, and forward the write to the
    /// vehicle. The committed tree is untouched until the ack arrives.
    ///
    /// A second write to a path that is still pending replaces the pending
    /// value.
    ///
    /// # Errors
    ///
    /// [`HubError::UnknownParameter`] if `path` is not in the tree.
    pub fn request_write(&mut self, path: ParamPath, value: f64) -> Result<WriteId, HubError> {
        if !self.tree.contains(&path) {
            return Err(HubError::UnknownParameter(path.to_string()));
        }
        self.next_write += 1;
        let id = WriteId(self.next_write);
        info!(path = %path, value, write = %id, "parameter write requested");

        self.pending.insert(path.clone(), PendingWrite { id, value });
        self.publish();
        self.transport.forward(ConfigWrite { id, path, value });
        Ok(id)
    }

    /// Reconcile an acknowledgement from the vehicle.
    pub fn confirm(&mut self, ack: ConfigAck) -> AckOutcome {
        let ConfigAck { id, path, value } = ack;

        if let Some(last) = self.committed.get(&path)
            && *last >= id
        {
            debug!(path = %path, write = %id, last = %last, "stale confirmation dropped");
            return AckOutcome::Stale;
        }
        if let Err(e) = self.tree.set(&path, value) {
            warn!(write = %id, error = %e, "confirmation for unknown parameter dropped");
            return AckOutcome::Unknown;
        }
        self.committed.insert(path.clone(), id);

        let outcome = match self.pending.get(&path) {
            Some(p) if p.id > id => AckOutcome::Superseded,
            Some(_) => {
                self.pending.remove(&path);
                AckOutcome::Committed
            }
            None => AckOutcome::Committed,
        };
        info!(path = %path, value, write = %id, ?outcome, "parameter confirmed");
        self.publish();
        outcome
    }

    /// Register `listener` and replay the current state to it.
    pub fn subscribe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: FnMut(&ParameterState) -> Result<(), HubError> + Send + 'static,
    {
        let id = self.ids.next_id();
        self.listeners.insert(id, Box::new(listener));
        let state = self.state();
        self.listeners.notify_one(id, &state);
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.listeners.remove(id)
    }

    /// Point-in-time copy of the committed tree and the pending writes.
    pub fn state(&self) -> ParameterState {
        ParameterState {
            tree: self.tree.clone(),
            pending: self
                .pending
                .iter()
                .map(|(path, p)| (path.clone(), p.value))
                .collect(),
        }
    }

    pub fn tree(&self) -> &ParameterTree {
        &self.tree
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn dispose(&mut self) {
        if !self.pending.is_empty() {
            warn!(pending = self.pending.len(), "disposing with unconfirmed parameter writes");
        }
        self.listeners.clear();
    }

    fn publish(&mut self) {
        if self.listeners.is_empty() {
            return;
        }
        let state = self.state();
        self.listeners.notify(&state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Captures forwarded writes so tests can ack them in any order.
    #[derive(Clone, Default)]
    struct CapturingTransport {
        sent: Arc<Mutex<Vec<ConfigWrite>>>,
    }

    impl ConfigTransport for CapturingTransport {
        fn forward(&mut self, write: ConfigWrite) {
            self.sent.lock().unwrap().push(write);
        }
    }

    fn synchronizer() -> (ParameterSynchronizer, CapturingTransport) {
        let transport = CapturingTransport::default();
        let sync = ParameterSynchronizer::new(ParameterTree::default(), Box::new(transport.clone()));
        (sync, transport)
    }

    fn kp() -> ParamPath {
        "pid.kp".parse().unwrap()
    }

    #[test]
    fn write_is_pending_until_confirmed() {
        let (mut sync, transport) = synchronizer();
        sync.request_write(kp(), 2.0).unwrap();

        let state = sync.state();
        assert_eq!(state.pending.get(&kp()), Some(&2.0));
        assert_eq!(state.tree.get(&kp()), Some(1.2));
        assert_eq!(transport.sent.lock().unwrap().len(), 1);
    }

    #[test]
    fn confirmation_commits_and_clears_pending() {
        let (mut sync, transport) = synchronizer();
        sync.request_write(kp(), 2.0).unwrap();
        let ack = transport.sent.lock().unwrap()[0].ack();

        assert_eq!(sync.confirm(ack), AckOutcome::Committed);
        let state = sync.state();
        assert_eq!(state.tree.get(&kp()), Some(2.0));
        assert!(!state.is_pending(&kp()));
    }

    #[test]
    fn older_ack_keeps_newer_pending_entry() {
        let (mut sync, transport) = synchronizer();
        sync.request_write(kp(), 2.0).unwrap();
        sync.request_write(kp(), 3.0).unwrap();
        let sent = transport.sent.lock().unwrap().clone();

        assert_eq!(sync.confirm(sent[0].ack()), AckOutcome::Superseded);
        let state = sync.state();
        assert_eq!(state.tree.get(&kp()), Some(2.0));
        assert_eq!(state.pending.get(&kp()), Some(&3.0));

        assert_eq!(sync.confirm(sent[1].ack()), AckOutcome::Committed);
        assert_eq!(sync.tree().get(&kp()), Some(3.0));
        assert_eq!(sync.pending_count(), 0);
    }

    #[test]
    fn late_ack_never_rolls_back_newer_value() {
        let (mut sync, transport) = synchronizer();
        sync.request_write(kp(), 2.0).unwrap();
        sync.request_write(kp(), 3.0).unwrap();
        let sent = transport.sent.lock().unwrap().clone();

        assert_eq!(sync.confirm(sent[1].ack()), AckOutcome::Committed);
        assert_eq!(sync.confirm(sent[0].ack()), AckOutcome::Stale);
        assert_eq!(sync.tree().get(&kp()), Some(3.0));
        assert_eq!(sync.pending_count(), 0);
    }

    #[test]
    fn duplicate_ack_is_stale() {
        let (mut sync, transport) = synchronizer();
        sync.request_write(kp(), 2.5).unwrap();
        let ack = transport.sent.lock().unwrap()[0].ack();

        assert_eq!(sync.confirm(ack.clone()), AckOutcome::Committed);
        assert_eq!(sync.confirm(ack), AckOutcome::Stale);
    }

    #[test]
    fn unknown_parameter_is_refused() {
        let (mut sync, transport) = synchronizer();
        let err = sync
            .request_write("pid.kf".parse().unwrap(), 1.0)
            .unwrap_err();
        assert_eq!(err, HubError::UnknownParameter("pid.kf".into()));
        assert!(transport.sent.lock().unwrap().is_empty());
        assert_eq!(sync.pending_count(), 0);
    }

    #[test]
    fn ack_for_unknown_path_is_dropped() {
        let (mut sync, _) = synchronizer();
        let ack = ConfigAck {
            id: WriteId(42),
            path: ParamPath::new("arm", "reach"),
            value: 1.0,
        };
        assert_eq!(sync.confirm(ack), AckOutcome::Unknown);
    }

    #[test]
    fn listeners_see_pending_then_committed() {
        let (mut sync, transport) = synchronizer();
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        sync.subscribe(move |state: &ParameterState| {
            sink.lock().unwrap().push(state.clone());
            Ok(())
        });

        sync.request_write(kp(), 2.0).unwrap();
        let ack = transport.sent.lock().unwrap()[0].ack();
        sync.confirm(ack);

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 3);
        assert!(log[0].pending.is_empty());
        assert_eq!(log[1].pending.get(&kp()), Some(&2.0));
        assert_eq!(log[1].tree.get(&kp()), Some(1.2));
        assert!(log[2].pending.is_empty());
        assert_eq!(log[2].tree.get(&kp()), Some(2.0));
    }

    #[test]
    fn writes_to_different_paths_confirm_independently() {
        let (mut sync, transport) = synchronizer();
        let kd: ParamPath = "pid.kd".parse().unwrap();
        sync.request_write(kp(), 2.0).unwrap();
        sync.request_write(kd.clone(), 0.8).unwrap();
        let sent = transport.sent.lock().unwrap().clone();

        assert_eq!(sync.confirm(sent[1].ack()), AckOutcome::Committed);
        let state = sync.state();
        assert_eq!(state.tree.get(&kd), Some(0.8));
        assert_eq!(state.pending.get(&kp()), Some(&2.0));
    }
}
