use crossbeam_channel::{Receiver, Sender};
use std::time::{Duration, Instant};

use crate::election::LeadershipToken;
use crate::errors::{ElectionError, ErrorKind};
use crate::lease::{Lease, LeaseManager};
use crate::store::CoordinationStore;

#[derive(Clone, Debug, Eq, PartialEq, Display)]
pub enum KeepAliveEvent {
    #[display(fmt = "Renewed, ttl {:?}", _0)]
    Renewed(Duration),

    #[display(fmt = "Renewal missed: {}", _0)]
    Missed(ElectionError),

    #[display(fmt = "Lease lost: {}", _0)]
    Lost(ElectionError),
}

#[derive(Debug)]
pub struct KeepAliveParams<S: CoordinationStore> {
    pub lease_manager: LeaseManager<S>,
    pub lease: Lease,
    pub interval: Duration,
    pub max_missed_renewals: u32,

    /// Last moment the lease was known to be alive on the store (the grant request time).
    pub confirmed_at: Instant,
    pub token: LeadershipToken,
    pub keep_alive_event_tx: Sender<KeepAliveEvent>,
}

pub fn keep_lease_alive<S: CoordinationStore>(
    params: KeepAliveParams<S>,
    terminate_worker_rx: Receiver<()>,
) {
    info!("Keep-alive worker started for lease {:x}", params.lease.id);

    let mut tracker = RenewalTracker::new(
        params.lease.ttl,
        params.interval,
        params.max_missed_renewals,
        params.confirmed_at,
    );
    let ticker = crossbeam_channel::tick(params.interval);
    loop {
        select!(
            recv(terminate_worker_rx) -> res => {
                if res.is_err() {
                    error!("Abnormal exit for keep-alive worker");
                }
                break
            },
            recv(ticker) -> _ => {
                let attempt_started = Instant::now();
                let renewal = params.lease_manager.renew(&params.lease);
                let event = tracker.on_renewal(renewal, attempt_started);

                let lost = match &event {
                    KeepAliveEvent::Renewed(ttl) => {
                        params.token.extend(attempt_started + *ttl);
                        false
                    }
                    KeepAliveEvent::Lost(_) => true,
                    KeepAliveEvent::Missed(_) => false,
                };
                if lost {
                    params.token.release();
                }
                if params.keep_alive_event_tx.send(event).is_err() {
                    break
                }
                if lost {
                    break
                }
            },
        );
    }

    info!("Keep-alive worker stopped for lease {:x}", params.lease.id);
}

/// Decides when renewal failures add up to a lost lease.
#[derive(Debug)]
struct RenewalTracker {
    ttl: Duration,
    interval: Duration,
    max_missed_renewals: u32,
    missed: u32,
    confirmed_at: Instant,
}

impl RenewalTracker {
    fn new(ttl: Duration, interval: Duration, max_missed_renewals: u32, confirmed_at: Instant) -> RenewalTracker {
        RenewalTracker {
            ttl,
            interval,
            max_missed_renewals,
            missed: 0,
            confirmed_at,
        }
    }

    fn on_renewal(
        &mut self,
        renewal: Result<Duration, ElectionError>,
        attempt_started: Instant,
    ) -> KeepAliveEvent {
        match renewal {
            Ok(ttl) => {
                self.missed = 0;
                self.confirmed_at = attempt_started;
                KeepAliveEvent::Renewed(ttl)
            }
            Err(err) => {
                if err.is_lease_lost() {
                    return KeepAliveEvent::Lost(err);
                }

                self.missed += 1;
                warn!("Lease renewal failed ({} in a row): {}", self.missed, err);

                if self.missed > self.max_missed_renewals {
                    return KeepAliveEvent::Lost(ElectionError::new(
                        ErrorKind::LeaseLost,
                        format!("Lease renewal failed {} times in a row", self.missed),
                        err.to_string(),
                    ));
                }

                // The store drops the lease at confirmed_at + ttl; the next tick would be too late.
                if Instant::now() + self.interval >= self.confirmed_at + self.ttl {
                    return KeepAliveEvent::Lost(ElectionError::new(
                        ErrorKind::LeaseLost,
                        "Lease cannot be renewed before it expires".to_string(),
                        err.to_string(),
                    ));
                }

                KeepAliveEvent::Missed(err)
            }
        }
    }
}
