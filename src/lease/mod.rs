use std::time::Duration;

use crate::errors::{new_err, ElectionError, ErrorKind};
use crate::store::{CoordinationStore, LeaseId};

pub mod keep_alive;

/// Lease held by this participant for one election attempt.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Display)]
#[display(fmt = "lease {:x} (ttl {:?})", id, ttl)]
pub struct Lease {
    pub id: LeaseId,
    pub ttl: Duration,
}

/// Wraps store lease grant, renewal and revoke.
#[derive(Clone, Debug)]
pub struct LeaseManager<S: CoordinationStore> {
    store: S,
    ttl: Duration,
}

impl<S: CoordinationStore> LeaseManager<S> {
    pub fn new(store: S, ttl: Duration) -> LeaseManager<S> {
        LeaseManager { store, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn grant(&self) -> Result<Lease, ElectionError> {
        let grant = self.store.grant_lease(self.ttl)?;
        debug!("Lease {:x} granted, ttl {:?}", grant.id, grant.ttl);

        Ok(Lease {
            id: grant.id,
            ttl: grant.ttl,
        })
    }

    /// One renewal round trip. A zero TTL in the reply means the store no longer knows the lease.
    pub fn renew(&self, lease: &Lease) -> Result<Duration, ElectionError> {
        let ttl = self.store.keep_alive(lease.id)?;
        if ttl == Duration::from_secs(0) {
            return new_err(
                ErrorKind::LeaseLost,
                format!("Store rejected renewal of lease {:x}", lease.id),
                "lease unknown or expired".to_string(),
            );
        }

        trace!("Lease {:x} renewed, ttl {:?}", lease.id, ttl);
        Ok(ttl)
    }

    /// Best-effort release. The lease expires on its own if this fails.
    pub fn revoke(&self, lease: &Lease) {
        match self.store.revoke_lease(lease.id) {
            Ok(()) => info!("Lease {:x} revoked", lease.id),
            Err(err) => warn!("Cannot revoke lease {:x}, it will expire: {}", lease.id, err),
        }
    }

    pub(crate) fn store(&self) -> &S {
        &self.store
    }
}
