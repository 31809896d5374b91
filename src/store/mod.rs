use crossbeam_channel::Receiver;
use std::fmt;
use std::time::Duration;

use crate::errors::ElectionError;

#[cfg(test)]
pub(crate) mod mock;

/// Store-issued lease identifier.
pub type LeaseId = i64;

/// Store revision. Every mutation of the key space increments it.
pub type Revision = i64;

/// Lease granted by the store.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Display)]
#[display(fmt = "Lease {} ttl {:?}", id, ttl)]
pub struct LeaseGrant {
    pub id: LeaseId,
    pub ttl: Duration,
}

/// Key-value pair as stored, with its lease binding.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Display)]
#[display(fmt = "{}={} (lease {}, version {})", key, value, lease, version)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
    pub lease: LeaseId,

    /// Number of writes since creation. Zero means the key does not exist.
    pub version: i64,
    pub mod_revision: Revision,
}

/// Linearizable read of a single key.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReadResult {
    pub kv: Option<KeyValue>,

    /// Store revision the read was served at.
    pub revision: Revision,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Display)]
pub enum WatchEventType {
    Put,
    Delete,
}

#[derive(Clone, Debug, Eq, PartialEq, Hash, Display)]
#[display(fmt = "{} {} at revision {}", event_type, key, revision)]
pub struct WatchEvent {
    pub event_type: WatchEventType,
    pub key: String,
    pub value: String,
    pub revision: Revision,
}

/// Live watch subscription. The events channel disconnects when the store ends the watch.
/// Dropping the stream cancels the store-side watch.
pub struct WatchStream {
    events_rx: Receiver<WatchEvent>,
    canceller: Option<Box<dyn FnOnce() + Send>>,
}

impl WatchStream {
    pub fn new<C>(events_rx: Receiver<WatchEvent>, canceller: C) -> WatchStream
    where
        C: FnOnce() + Send + 'static,
    {
        WatchStream {
            events_rx,
            canceller: Some(Box::new(canceller)),
        }
    }

    pub fn events_rx(&self) -> &Receiver<WatchEvent> {
        &self.events_rx
    }

    pub fn cancel(mut self) {
        self.cancel_watch();
    }

    fn cancel_watch(&mut self) {
        if let Some(canceller) = self.canceller.take() {
            canceller();
        }
    }
}

impl Drop for WatchStream {
    fn drop(&mut self) {
        self.cancel_watch();
    }
}

impl fmt::Debug for WatchStream {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("WatchStream")
            .field("pending_events", &self.events_rx.len())
            .field("cancelled", &self.canceller.is_none())
            .finish()
    }
}

/// Client-side view of the coordination store. Implementations must map transport and
/// server failures to `ErrorKind::StoreUnavailable`.
pub trait CoordinationStore: Clone + Send + fmt::Debug + 'static {
    /// Requests a new lease with the given time-to-live.
    fn grant_lease(&self, ttl: Duration) -> Result<LeaseGrant, ElectionError>;

    /// Sends a single renewal. Returns the remaining TTL; zero means the lease is unknown or expired.
    fn keep_alive(&self, lease_id: LeaseId) -> Result<Duration, ElectionError>;

    /// Releases the lease and deletes every key bound to it. No-op for an unknown lease.
    fn revoke_lease(&self, lease_id: LeaseId) -> Result<(), ElectionError>;

    /// Transaction: `version(key) == 0` then `put(key, value, lease)`. Returns whether the put ran.
    fn put_if_absent(&self, key: &str, value: &str, lease_id: LeaseId) -> Result<bool, ElectionError>;

    fn get(&self, key: &str) -> Result<ReadResult, ElectionError>;

    /// Subscribes to changes of `key`, replaying events from `start_revision` on.
    fn watch(&self, key: &str, start_revision: Revision) -> Result<WatchStream, ElectionError>;
}
