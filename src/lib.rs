//! Lease-based leader election over a strongly consistent coordination store.
//!
//! Every participant cycles Candidate -> Leader | Follower: it grants a lease, claims the
//! election key in a single `version == 0` transaction and either keeps the lease alive while
//! running its workload, or watches the key until it is deleted and contends again.

#![warn(missing_debug_implementations, unsafe_code)]

#[macro_use]
extern crate log;
#[macro_use]
extern crate crossbeam_channel;
#[macro_use]
extern crate derive_more;

mod claim;
mod common;
mod configuration;
mod election;
mod errors;
mod lease;
mod store;
mod watcher;

pub use claim::ClaimNegotiator;
pub use configuration::{
    ElectionConfiguration, ElectionTimings, LeaseLossPolicy, DEFAULT_ELECTION_KEY,
    DEFAULT_STORE_ENDPOINT,
};
pub use election::state_machine::ElectionStateMachine;
pub use election::{
    ElectionEvent, LeadershipToken, ParticipantState, RetryTimer, Workload, WorkloadControl,
};
pub use errors::{new_err, ElectionError, ErrorKind};
pub use lease::keep_alive::KeepAliveEvent;
pub use lease::{Lease, LeaseManager};
pub use store::{
    CoordinationStore, KeyValue, LeaseGrant, LeaseId, ReadResult, Revision, WatchEvent,
    WatchEventType, WatchStream,
};
pub use watcher::{VacancyEvent, VacancyOutcome, VacancyWatcher};

/// Running participant. `terminate()` requests a graceful shutdown (lease revoked if leading).
pub type ParticipantWorker = common::Worker;

/// Validates the configuration and runs the election state machine on its own thread.
pub fn start_participant<S, Rt, W>(
    config: ElectionConfiguration<S, Rt, W>,
) -> Result<ParticipantWorker, ElectionError>
where
    S: CoordinationStore,
    Rt: RetryTimer,
    W: Workload,
{
    let state_machine = ElectionStateMachine::new(config)?;

    Ok(common::run_worker(
        election::state_machine::run_participant,
        state_machine,
    ))
}
