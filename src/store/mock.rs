use crossbeam_channel::Sender;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::errors::{new_err, ElectionError, ErrorKind};
use crate::store::{
    CoordinationStore, KeyValue, LeaseGrant, LeaseId, ReadResult, Revision, WatchEvent,
    WatchEventType, WatchStream,
};

/// Scriptable in-memory store for unit tests. Lease expiry only happens via `expire_lease`.
#[derive(Clone, Debug, Default)]
pub struct MockStore {
    state: Arc<Mutex<MockStoreState>>,
}

#[derive(Debug, Default)]
struct MockStoreState {
    next_lease_id: LeaseId,
    revision: Revision,
    leases: HashMap<LeaseId, Duration>,
    keys: HashMap<String, KeyValue>,
    watchers: HashMap<u64, (String, Sender<WatchEvent>)>,
    next_watch_id: u64,
    cancelled_watches: HashSet<u64>,
    history: Vec<WatchEvent>,

    unavailable: bool,
    failing_grants: u32,
    failing_claims: u32,
    failing_keep_alives: u32,
    renewals: u32,
    stall_keep_alive_after: Option<u32>,
    keep_alive_stall: Duration,
    revoked: Vec<LeaseId>,
    claims: u32,
}

impl MockStore {
    pub fn new() -> MockStore {
        MockStore::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unavailable = unavailable;
    }

    pub fn fail_next_grants(&self, count: u32) {
        self.state.lock().failing_grants = count;
    }

    pub fn fail_next_claims(&self, count: u32) {
        self.state.lock().failing_claims = count;
    }

    pub fn fail_next_keep_alives(&self, count: u32) {
        self.state.lock().failing_keep_alives = count;
    }

    /// Every keep-alive after the first `renewals` ones blocks for `stall` before answering.
    pub fn stall_keep_alive_after(&self, renewals: u32, stall: Duration) {
        let mut state = self.state.lock();
        state.stall_keep_alive_after = Some(renewals);
        state.keep_alive_stall = stall;
    }

    /// Simulates server-side TTL expiry.
    pub fn expire_lease(&self, lease_id: LeaseId) {
        self.state.lock().remove_lease(lease_id);
    }

    /// Puts a key bound to a fresh lease owned by nobody in the test.
    pub fn occupy(&self, key: &str, value: &str) -> LeaseId {
        let mut state = self.state.lock();
        let lease_id = state.new_lease(Duration::from_secs(60));
        state.put(key, value, lease_id);
        lease_id
    }

    /// Overwrites an existing key, keeping its lease. Emits a put event.
    pub fn rewrite(&self, key: &str, value: &str) {
        let mut state = self.state.lock();
        if let Some(lease) = state.keys.get(key).map(|kv| kv.lease) {
            state.put(key, value, lease);
        }
    }

    pub fn delete(&self, key: &str) {
        self.state.lock().delete(key);
    }

    /// Removes the key without emitting a watch event, like a lost notification.
    pub fn delete_silently(&self, key: &str) {
        let mut state = self.state.lock();
        if state.keys.remove(key).is_some() {
            state.revision += 1;
        }
    }

    /// Ends every open watch as if the server cancelled it.
    pub fn close_watches(&self) {
        self.state.lock().watchers.clear();
    }

    pub fn revoked(&self) -> Vec<LeaseId> {
        self.state.lock().revoked.clone()
    }

    pub fn claims(&self) -> u32 {
        self.state.lock().claims
    }

    pub fn active_watches(&self) -> usize {
        self.state.lock().watchers.len()
    }

    pub fn cancelled_watches(&self) -> usize {
        self.state.lock().cancelled_watches.len()
    }

    pub fn value(&self, key: &str) -> Option<String> {
        self.state.lock().keys.get(key).map(|kv| kv.value.clone())
    }

    fn check_available(&self, operation: &str) -> Result<(), ElectionError> {
        if self.state.lock().unavailable {
            return new_err(
                ErrorKind::StoreUnavailable,
                format!("Mock store rejected {}", operation),
                "store is down".to_string(),
            );
        }
        Ok(())
    }
}

impl MockStoreState {
    fn new_lease(&mut self, ttl: Duration) -> LeaseId {
        self.next_lease_id += 1;
        self.leases.insert(self.next_lease_id, ttl);
        self.next_lease_id
    }

    fn put(&mut self, key: &str, value: &str, lease: LeaseId) {
        self.revision += 1;
        let version = self.keys.get(key).map(|kv| kv.version).unwrap_or(0) + 1;
        self.keys.insert(
            key.to_string(),
            KeyValue {
                key: key.to_string(),
                value: value.to_string(),
                lease,
                version,
                mod_revision: self.revision,
            },
        );
        self.notify(WatchEventType::Put, key, value);
    }

    fn delete(&mut self, key: &str) {
        if self.keys.remove(key).is_some() {
            self.revision += 1;
            self.notify(WatchEventType::Delete, key, "");
        }
    }

    fn remove_lease(&mut self, lease_id: LeaseId) {
        self.leases.remove(&lease_id);
        let bound: Vec<String> = self
            .keys
            .values()
            .filter(|kv| kv.lease == lease_id)
            .map(|kv| kv.key.clone())
            .collect();
        for key in bound {
            self.delete(&key);
        }
    }

    fn notify(&mut self, event_type: WatchEventType, key: &str, value: &str) {
        let event = WatchEvent {
            event_type,
            key: key.to_string(),
            value: value.to_string(),
            revision: self.revision,
        };
        self.history.push(event.clone());
        self.watchers.retain(|_, (watched_key, events_tx)| {
            if watched_key != key {
                return true;
            }
            events_tx.send(event.clone()).is_ok()
        });
    }
}

impl CoordinationStore for MockStore {
    fn grant_lease(&self, ttl: Duration) -> Result<LeaseGrant, ElectionError> {
        self.check_available("lease grant")?;
        let mut state = self.state.lock();
        if state.failing_grants > 0 {
            state.failing_grants -= 1;
            return new_err(
                ErrorKind::StoreUnavailable,
                "Mock lease grant failed".to_string(),
                String::new(),
            );
        }
        let id = state.new_lease(ttl);
        Ok(LeaseGrant { id, ttl })
    }

    fn keep_alive(&self, lease_id: LeaseId) -> Result<Duration, ElectionError> {
        self.check_available("keep-alive")?;
        let stall = {
            let mut state = self.state.lock();
            if state.failing_keep_alives > 0 {
                state.failing_keep_alives -= 1;
                return new_err(
                    ErrorKind::StoreUnavailable,
                    "Mock keep-alive failed".to_string(),
                    String::new(),
                );
            }
            state.renewals += 1;
            match state.stall_keep_alive_after {
                Some(renewals) if state.renewals > renewals => Some(state.keep_alive_stall),
                _ => None,
            }
        };
        if let Some(stall) = stall {
            thread::sleep(stall);
        }
        Ok(self.state.lock().leases.get(&lease_id).cloned().unwrap_or_default())
    }

    fn revoke_lease(&self, lease_id: LeaseId) -> Result<(), ElectionError> {
        self.check_available("lease revoke")?;
        let mut state = self.state.lock();
        state.revoked.push(lease_id);
        state.remove_lease(lease_id);
        Ok(())
    }

    fn put_if_absent(&self, key: &str, value: &str, lease_id: LeaseId) -> Result<bool, ElectionError> {
        self.check_available("transaction")?;
        let mut state = self.state.lock();
        if state.failing_claims > 0 {
            state.failing_claims -= 1;
            return new_err(
                ErrorKind::StoreUnavailable,
                "Mock transaction failed".to_string(),
                String::new(),
            );
        }
        state.claims += 1;
        if state.keys.contains_key(key) || !state.leases.contains_key(&lease_id) {
            return Ok(false);
        }
        state.put(key, value, lease_id);
        Ok(true)
    }

    fn get(&self, key: &str) -> Result<ReadResult, ElectionError> {
        self.check_available("get")?;
        let state = self.state.lock();
        Ok(ReadResult {
            kv: state.keys.get(key).cloned(),
            revision: state.revision,
        })
    }

    fn watch(&self, key: &str, start_revision: Revision) -> Result<WatchStream, ElectionError> {
        self.check_available("watch")?;
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        let mut state = self.state.lock();
        for event in state
            .history
            .iter()
            .filter(|event| event.key == key && event.revision >= start_revision)
        {
            let _ = events_tx.send(event.clone());
        }
        state.next_watch_id += 1;
        let watch_id = state.next_watch_id;
        state.watchers.insert(watch_id, (key.to_string(), events_tx));

        let store_state = self.state.clone();
        Ok(WatchStream::new(events_rx, move || {
            let mut state = store_state.lock();
            state.watchers.remove(&watch_id);
            state.cancelled_watches.insert(watch_id);
        }))
    }
}
