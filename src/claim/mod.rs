use crate::errors::ElectionError;
use crate::lease::Lease;
use crate::store::{CoordinationStore, KeyValue};

/// Single-shot, version-gated claim of the election key.
#[derive(Clone, Debug)]
pub struct ClaimNegotiator<S: CoordinationStore> {
    store: S,
    key: String,
    identity: String,
}

impl<S: CoordinationStore> ClaimNegotiator<S> {
    pub fn new(store: S, key: String, identity: String) -> ClaimNegotiator<S> {
        ClaimNegotiator {
            store,
            key,
            identity,
        }
    }

    /// Writes the identity bound to `lease` iff the key does not exist.
    /// `Ok(false)` means someone else holds the key; it is not retried here.
    pub fn try_claim(&self, lease: &Lease) -> Result<bool, ElectionError> {
        let claimed = self
            .store
            .put_if_absent(&self.key, &self.identity, lease.id)?;

        if claimed {
            debug!("{} claimed key {} with lease {:x}", self.identity, self.key, lease.id);
        } else {
            debug!("{} lost the claim race for key {}", self.identity, self.key);
        }

        Ok(claimed)
    }

    /// Current claim record, if a leader exists.
    pub fn current_claim(&self) -> Result<Option<KeyValue>, ElectionError> {
        Ok(self.store.get(&self.key)?.kv)
    }
}
