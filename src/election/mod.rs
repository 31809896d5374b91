use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::lease::Lease;

pub mod state_machine;


#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Display)]
pub enum ParticipantState {
    Candidate,
    Leader,
    Follower,
    Terminated,
}

/// Election progress as reported to an observer.
#[derive(Clone, Debug, Eq, PartialEq, Display)]
pub enum ElectionEvent {
    #[display(fmt = "{} is a candidate", identity)]
    Candidate { identity: String },

    #[display(fmt = "{} is the leader with {}", identity, lease)]
    Leader { identity: String, lease: Lease },

    #[display(fmt = "{} is a follower (leader: {:?})", identity, leader)]
    Follower {
        identity: String,
        leader: Option<String>,
    },

    #[display(fmt = "{} lost leadership", identity)]
    LeadershipLost { identity: String },

    #[display(fmt = "{} terminated", identity)]
    Terminated { identity: String },
}

impl ElectionEvent {
    pub fn identity(&self) -> &str {
        match self {
            ElectionEvent::Candidate { identity }
            | ElectionEvent::Leader { identity, .. }
            | ElectionEvent::Follower { identity, .. }
            | ElectionEvent::LeadershipLost { identity }
            | ElectionEvent::Terminated { identity } => identity,
        }
    }
}

/// Shared flag telling the workload whether leadership is still confirmed.
/// Cleared by the keep-alive worker the moment the lease cannot be renewed, and lapses
/// on its own at the lease expiry if no renewal confirms the lease in time.
#[derive(Clone, Debug)]
pub struct LeadershipToken {
    held: Arc<AtomicBool>,
    expires_at: Arc<Mutex<Instant>>,
}

impl LeadershipToken {
    pub(crate) fn new_held(expires_at: Instant) -> LeadershipToken {
        LeadershipToken {
            held: Arc::new(AtomicBool::new(true)),
            expires_at: Arc::new(Mutex::new(expires_at)),
        }
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::SeqCst) && Instant::now() < self.expires_at()
    }

    /// Earliest moment the store may drop the lease, as far as this participant knows.
    pub fn expires_at(&self) -> Instant {
        *self.expires_at.lock()
    }

    /// Moves the expiry forward after a confirmed renewal. Never shortens it.
    pub(crate) fn extend(&self, expires_at: Instant) {
        let mut current = self.expires_at.lock();
        if expires_at > *current {
            *current = expires_at;
        }
    }

    pub(crate) fn release(&self) {
        self.held.store(false, Ordering::SeqCst);
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Display)]
pub enum WorkloadControl {
    Continue,

    /// The workload is done: revoke the lease and terminate the participant.
    Stop,
}

/// Application work run while this participant is the leader.
pub trait Workload: Send + 'static {
    fn leadership_acquired(&mut self, _lease: Lease, _token: &LeadershipToken) {}

    /// Called on every workload tick while leadership is held.
    fn tick(&mut self, token: &LeadershipToken) -> WorkloadControl;

    fn leadership_lost(&mut self) {}
}

/// Delay before retrying a state's operation after a store failure.
pub trait RetryTimer: Send + 'static {
    /// `attempt` starts at 1 for the first consecutive failure.
    fn next_retry_delay(&self, attempt: u32) -> Duration;
}
