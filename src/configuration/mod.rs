use crossbeam_channel::Sender;
use std::fmt;
use std::time::Duration;

use crate::election::{ElectionEvent, RetryTimer, Workload};
use crate::errors::{new_err, ElectionError, ErrorKind};
use crate::store::CoordinationStore;

pub const DEFAULT_ELECTION_KEY: &str = "Leader_Key";
pub const DEFAULT_STORE_ENDPOINT: &str = "http://localhost:2379";

/// What a leader does after its lease could not be renewed.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Display)]
pub enum LeaseLossPolicy {
    /// Return to Candidate and contend again.
    Recontend,

    /// Single-term operation: revoke and stop the participant.
    Terminate,
}

impl Default for LeaseLossPolicy {
    fn default() -> Self {
        LeaseLossPolicy::Recontend
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct ElectionTimings {
    pub lease_ttl: Duration,

    /// Must be strictly less than `lease_ttl`.
    pub keep_alive_interval: Duration,

    /// Cadence of the leader workload hook.
    pub workload_interval: Duration,

    /// How long a follower trusts a silent watch before re-reading the key.
    pub watch_recheck_interval: Duration,

    /// Consecutive failed renewals tolerated before the lease counts as lost.
    pub max_missed_renewals: u32,
}

impl Default for ElectionTimings {
    fn default() -> Self {
        ElectionTimings {
            lease_ttl: Duration::from_secs(5),
            keep_alive_interval: Duration::from_secs(2),
            workload_interval: Duration::from_millis(1000),
            watch_recheck_interval: Duration::from_secs(10),
            max_missed_renewals: 1,
        }
    }
}

impl ElectionTimings {
    /// Timings for the given TTL with the keep-alive at half of it.
    pub fn with_lease_ttl(lease_ttl: Duration) -> ElectionTimings {
        ElectionTimings {
            lease_ttl,
            keep_alive_interval: lease_ttl / 2,
            ..ElectionTimings::default()
        }
    }
}

pub struct ElectionConfiguration<S, Rt, W>
where
    S: CoordinationStore,
    Rt: RetryTimer,
    W: Workload,
{
    /// Value written to the election key on a successful claim.
    pub identity: String,
    pub election_key: String,
    pub store: S,
    pub retry_timer: Rt,
    pub workload: W,
    pub timings: ElectionTimings,
    pub lease_loss_policy: LeaseLossPolicy,

    /// Optional observer of state transitions.
    pub events_tx: Option<Sender<ElectionEvent>>,
}

impl<S, Rt, W> ElectionConfiguration<S, Rt, W>
where
    S: CoordinationStore,
    Rt: RetryTimer,
    W: Workload,
{
    pub fn validate(&self) -> Result<(), ElectionError> {
        if self.identity.is_empty() {
            return misconfigured("Participant identity is empty".to_string());
        }

        if self.election_key.is_empty() {
            return misconfigured("Election key is empty".to_string());
        }

        let timings = &self.timings;
        if timings.lease_ttl < Duration::from_millis(1) {
            return misconfigured(format!("Lease TTL is too short: {:?}", timings.lease_ttl));
        }

        if timings.keep_alive_interval.as_nanos() == 0 || timings.keep_alive_interval >= timings.lease_ttl {
            return misconfigured(format!(
                "Keep-alive interval {:?} must be positive and less than lease TTL {:?}",
                timings.keep_alive_interval, timings.lease_ttl
            ));
        }

        if timings.workload_interval.as_nanos() == 0 || timings.watch_recheck_interval.as_nanos() == 0 {
            return misconfigured("Workload and watch re-check intervals must be positive".to_string());
        }

        Ok(())
    }
}

impl<S, Rt, W> fmt::Debug for ElectionConfiguration<S, Rt, W>
where
    S: CoordinationStore,
    Rt: RetryTimer,
    W: Workload,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ElectionConfiguration")
            .field("identity", &self.identity)
            .field("election_key", &self.election_key)
            .field("store", &self.store)
            .field("timings", &self.timings)
            .field("lease_loss_policy", &self.lease_loss_policy)
            .finish()
    }
}

fn misconfigured(text: String) -> Result<(), ElectionError> {
    new_err(ErrorKind::Misconfigured, text, String::new())
}
