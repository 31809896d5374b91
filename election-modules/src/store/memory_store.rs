use crossbeam_channel::Sender;
use lease_election::{
    new_err, CoordinationStore, ElectionError, ErrorKind, KeyValue, LeaseGrant, LeaseId,
    ReadResult, Revision, WatchEvent, WatchEventType, WatchStream,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::{Duration, Instant};

const EXPIRY_CHECK_PERIOD: Duration = Duration::from_millis(10);
const HISTORY_LIMIT: usize = 1024;

/// In-process coordination store: leases with TTL expiry, revisions, version-gated
/// puts and replayable watches. Participants talk to it through `MemoryStoreClient`
/// handles that can be disconnected to simulate crashes and partitions.
#[derive(Clone, Debug)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryStoreInternal>>,
}

impl MemoryStore {
    /// Creates an empty store and starts its lease expiry thread. The thread exits
    /// once the last store handle is dropped.
    pub fn new() -> MemoryStore {
        let inner = Arc::new(Mutex::new(MemoryStoreInternal::new()));

        let weak_inner = Arc::downgrade(&inner);
        thread::spawn(move || expire_leases_periodically(weak_inner));

        MemoryStore { inner }
    }

    /// New connected client handle.
    pub fn client(&self) -> MemoryStoreClient {
        MemoryStoreClient {
            store: self.clone(),
            connected: Arc::new(AtomicBool::new(true)),
            watch_ids: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn value(&self, key: &str) -> Option<String> {
        let mut inner = self.inner.lock();
        inner.expire_leases(Instant::now());

        inner.keys.get(key).map(|kv| kv.value.clone())
    }

    pub fn revision(&self) -> Revision {
        self.inner.lock().revision
    }

    pub fn lease_count(&self) -> usize {
        let mut inner = self.inner.lock();
        inner.expire_leases(Instant::now());

        inner.leases.len()
    }

    pub fn active_watches(&self) -> usize {
        self.inner.lock().watchers.len()
    }

    /// Ends every open watch on the server side, as after a compaction or leader change.
    pub fn cancel_watches(&self) {
        let mut inner = self.inner.lock();
        let cancelled = inner.watchers.len();
        inner.watchers.clear();

        debug!("Memory store cancelled {} watches", cancelled);
    }

    fn close_watches(&self, watch_ids: &HashSet<u64>) {
        let mut inner = self.inner.lock();
        for id in watch_ids {
            inner.watchers.remove(id);
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        MemoryStore::new()
    }
}

/// Network handle to a `MemoryStore`. Every call fails with `StoreUnavailable`
/// while the handle is disconnected.
#[derive(Clone, Debug)]
pub struct MemoryStoreClient {
    store: MemoryStore,
    connected: Arc<AtomicBool>,
    watch_ids: Arc<Mutex<HashSet<u64>>>,
}

impl MemoryStoreClient {
    /// Cuts the client off: pending watches end and requests fail until `reconnect`.
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);

        let watch_ids: HashSet<u64> = self.watch_ids.lock().drain().collect();
        self.store.close_watches(&watch_ids);

        debug!("Memory store client disconnected, {} watches closed", watch_ids.len());
    }

    pub fn reconnect(&self) {
        self.connected.store(true, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    fn check_connection(&self, operation: &str) -> Result<(), ElectionError> {
        if self.is_connected() {
            Ok(())
        } else {
            new_err(
                ErrorKind::StoreUnavailable,
                format!("Cannot {}", operation),
                "client disconnected".to_string(),
            )
        }
    }
}

impl CoordinationStore for MemoryStoreClient {
    fn grant_lease(&self, ttl: Duration) -> Result<LeaseGrant, ElectionError> {
        self.check_connection("grant lease")?;

        let mut inner = self.store.inner.lock();
        Ok(inner.grant_lease(ttl, Instant::now()))
    }

    fn keep_alive(&self, lease_id: LeaseId) -> Result<Duration, ElectionError> {
        self.check_connection("keep lease alive")?;

        let mut inner = self.store.inner.lock();
        Ok(inner.keep_alive(lease_id, Instant::now()))
    }

    fn revoke_lease(&self, lease_id: LeaseId) -> Result<(), ElectionError> {
        self.check_connection("revoke lease")?;

        let mut inner = self.store.inner.lock();
        inner.revoke_lease(lease_id);
        Ok(())
    }

    fn put_if_absent(&self, key: &str, value: &str, lease_id: LeaseId) -> Result<bool, ElectionError> {
        self.check_connection("claim key")?;

        let mut inner = self.store.inner.lock();
        inner.expire_leases(Instant::now());

        if !inner.leases.contains_key(&lease_id) {
            return new_err(
                ErrorKind::LeaseLost,
                format!("Cannot put {}", key),
                format!("lease {:x} not found", lease_id),
            );
        }

        Ok(inner.put_if_absent(key, value, lease_id))
    }

    fn get(&self, key: &str) -> Result<ReadResult, ElectionError> {
        self.check_connection("read key")?;

        let mut inner = self.store.inner.lock();
        inner.expire_leases(Instant::now());

        Ok(ReadResult {
            kv: inner.keys.get(key).cloned(),
            revision: inner.revision,
        })
    }

    fn watch(&self, key: &str, start_revision: Revision) -> Result<WatchStream, ElectionError> {
        self.check_connection("watch key")?;

        let mut inner = self.store.inner.lock();
        if start_revision <= inner.compacted_revision {
            return new_err(
                ErrorKind::WatchTerminated,
                format!("Cannot watch {}", key),
                format!(
                    "revision {} is compacted (up to {})",
                    start_revision, inner.compacted_revision
                ),
            );
        }

        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        for event in inner
            .history
            .iter()
            .filter(|event| event.key == key && event.revision >= start_revision)
        {
            // Receiver is alive; it is returned below.
            let _ = events_tx.send(event.clone());
        }

        let watch_id = inner.add_watcher(key, events_tx);
        drop(inner);
        self.watch_ids.lock().insert(watch_id);

        let store = self.store.clone();
        let watch_ids = self.watch_ids.clone();
        Ok(WatchStream::new(events_rx, move || {
            watch_ids.lock().remove(&watch_id);
            store.inner.lock().watchers.remove(&watch_id);
        }))
    }
}

fn expire_leases_periodically(inner: Weak<Mutex<MemoryStoreInternal>>) {
    loop {
        thread::sleep(EXPIRY_CHECK_PERIOD);

        match inner.upgrade() {
            Some(inner) => inner.lock().expire_leases(Instant::now()),
            None => {
                trace!("Memory store dropped, lease expiry stopped");
                return;
            }
        }
    }
}

#[derive(Debug)]
struct LeaseRecord {
    ttl: Duration,
    deadline: Instant,
}

#[derive(Debug)]
struct Watcher {
    key: String,
    events_tx: Sender<WatchEvent>,
}

#[derive(Debug)]
struct MemoryStoreInternal {
    revision: Revision,
    compacted_revision: Revision,
    next_lease_id: LeaseId,
    next_watch_id: u64,
    leases: HashMap<LeaseId, LeaseRecord>,
    keys: HashMap<String, KeyValue>,
    history: VecDeque<WatchEvent>,
    watchers: HashMap<u64, Watcher>,
}

impl MemoryStoreInternal {
    fn new() -> MemoryStoreInternal {
        MemoryStoreInternal {
            revision: 1,
            compacted_revision: 0,
            next_lease_id: 0x1000,
            next_watch_id: 1,
            leases: HashMap::new(),
            keys: HashMap::new(),
            history: VecDeque::new(),
            watchers: HashMap::new(),
        }
    }

    fn grant_lease(&mut self, ttl: Duration, now: Instant) -> LeaseGrant {
        let id = self.next_lease_id;
        self.next_lease_id += 1;

        self.leases.insert(
            id,
            LeaseRecord {
                ttl,
                deadline: now + ttl,
            },
        );
        trace!("Memory store granted lease {:x} ttl {:?}", id, ttl);

        LeaseGrant { id, ttl }
    }

    fn keep_alive(&mut self, lease_id: LeaseId, now: Instant) -> Duration {
        self.expire_leases(now);

        match self.leases.get_mut(&lease_id) {
            Some(record) => {
                record.deadline = now + record.ttl;
                record.ttl
            }
            None => Duration::from_secs(0),
        }
    }

    fn revoke_lease(&mut self, lease_id: LeaseId) {
        if self.leases.remove(&lease_id).is_some() {
            self.delete_lease_keys(lease_id);
        }
    }

    fn expire_leases(&mut self, now: Instant) {
        let expired: Vec<LeaseId> = self
            .leases
            .iter()
            .filter(|(_, record)| record.deadline <= now)
            .map(|(id, _)| *id)
            .collect();

        for lease_id in expired {
            debug!("Memory store lease {:x} expired", lease_id);
            self.revoke_lease(lease_id);
        }
    }

    fn put_if_absent(&mut self, key: &str, value: &str, lease_id: LeaseId) -> bool {
        if self.keys.contains_key(key) {
            return false;
        }

        self.revision += 1;
        let kv = KeyValue {
            key: key.to_string(),
            value: value.to_string(),
            lease: lease_id,
            version: 1,
            mod_revision: self.revision,
        };
        self.keys.insert(key.to_string(), kv);
        self.publish(WatchEvent {
            event_type: WatchEventType::Put,
            key: key.to_string(),
            value: value.to_string(),
            revision: self.revision,
        });

        true
    }

    fn delete_lease_keys(&mut self, lease_id: LeaseId) {
        let mut bound_keys: Vec<String> = self
            .keys
            .values()
            .filter(|kv| kv.lease == lease_id)
            .map(|kv| kv.key.clone())
            .collect();
        bound_keys.sort();

        for key in bound_keys {
            self.keys.remove(&key);
            self.revision += 1;
            self.publish(WatchEvent {
                event_type: WatchEventType::Delete,
                key,
                value: String::new(),
                revision: self.revision,
            });
        }
    }

    fn add_watcher(&mut self, key: &str, events_tx: Sender<WatchEvent>) -> u64 {
        let id = self.next_watch_id;
        self.next_watch_id += 1;

        self.watchers.insert(
            id,
            Watcher {
                key: key.to_string(),
                events_tx,
            },
        );

        id
    }

    fn publish(&mut self, event: WatchEvent) {
        let mut gone = Vec::new();
        for (id, watcher) in self.watchers.iter() {
            if watcher.key == event.key && watcher.events_tx.send(event.clone()).is_err() {
                gone.push(*id);
            }
        }
        for id in gone {
            self.watchers.remove(&id);
        }

        self.history.push_back(event);
        while self.history.len() > HISTORY_LIMIT {
            if let Some(oldest) = self.history.pop_front() {
                self.compacted_revision = oldest.revision;
            }
        }
    }
}
