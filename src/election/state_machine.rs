use crossbeam_channel::{Receiver, Sender};
use std::fmt;
use std::time::Instant;

use crate::claim::ClaimNegotiator;
use crate::common;
use crate::configuration::{ElectionConfiguration, ElectionTimings, LeaseLossPolicy};
use crate::election::{
    ElectionEvent, LeadershipToken, ParticipantState, RetryTimer, Workload, WorkloadControl,
};
use crate::errors::{ElectionError, ErrorKind};
use crate::lease::keep_alive::{keep_lease_alive, KeepAliveEvent, KeepAliveParams};
use crate::lease::{Lease, LeaseManager};
use crate::store::CoordinationStore;
use crate::watcher::{VacancyOutcome, VacancyWatcher};

enum LeaderExit {
    Shutdown,
    WorkloadStopped,
    LeaseLost(ElectionError),
}

/// Candidate / Leader / Follower cycle of one participant. Owns the current lease;
/// every Candidate entry re-derives leadership from the store.
pub struct ElectionStateMachine<S, Rt, W>
where
    S: CoordinationStore,
    Rt: RetryTimer,
    W: Workload,
{
    identity: String,
    lease_manager: LeaseManager<S>,
    claim_negotiator: ClaimNegotiator<S>,
    vacancy_watcher: VacancyWatcher<S>,
    retry_timer: Rt,
    workload: W,
    timings: ElectionTimings,
    lease_loss_policy: LeaseLossPolicy,
    events_tx: Option<Sender<ElectionEvent>>,

    state: ParticipantState,
    lease: Option<Lease>,
    lease_requested_at: Instant,
    failed_attempts: u32,
}

impl<S, Rt, W> ElectionStateMachine<S, Rt, W>
where
    S: CoordinationStore,
    Rt: RetryTimer,
    W: Workload,
{
    pub fn new(config: ElectionConfiguration<S, Rt, W>) -> Result<ElectionStateMachine<S, Rt, W>, ElectionError> {
        config.validate()?;

        let lease_manager = LeaseManager::new(config.store.clone(), config.timings.lease_ttl);
        let claim_negotiator = ClaimNegotiator::new(
            config.store.clone(),
            config.election_key.clone(),
            config.identity.clone(),
        );
        let vacancy_watcher = VacancyWatcher::new(
            config.store,
            config.election_key,
            config.timings.watch_recheck_interval,
        );

        Ok(ElectionStateMachine {
            identity: config.identity,
            lease_manager,
            claim_negotiator,
            vacancy_watcher,
            retry_timer: config.retry_timer,
            workload: config.workload,
            timings: config.timings,
            lease_loss_policy: config.lease_loss_policy,
            events_tx: config.events_tx,
            state: ParticipantState::Candidate,
            lease: None,
            lease_requested_at: Instant::now(),
            failed_attempts: 0,
        })
    }

    pub fn state(&self) -> ParticipantState {
        self.state
    }

    /// Runs elections until shutdown is requested (or the channel disconnects) or the
    /// participant terminates on its own.
    pub fn run(&mut self, shutdown_rx: &Receiver<()>) {
        info!("Participant {} started", self.identity);

        self.state = ParticipantState::Candidate;
        loop {
            let next_state = match self.state {
                ParticipantState::Candidate => self.run_candidate(shutdown_rx),
                ParticipantState::Leader => self.run_leader(shutdown_rx),
                ParticipantState::Follower => self.run_follower(shutdown_rx),
                ParticipantState::Terminated => break,
            };

            if next_state != self.state {
                info!("Participant {} Status changed to {}", self.identity, next_state);
            }
            self.state = next_state;
        }

        self.release_lease();
        self.notify(ElectionEvent::Terminated {
            identity: self.identity.clone(),
        });

        info!("Participant {} stopped", self.identity);
    }

    fn run_candidate(&mut self, shutdown_rx: &Receiver<()>) -> ParticipantState {
        if common::termination_requested(shutdown_rx) {
            return ParticipantState::Terminated;
        }

        info!("Participant {} Electing a leader", self.identity);
        self.notify(ElectionEvent::Candidate {
            identity: self.identity.clone(),
        });

        // At most one lease per participant.
        self.release_lease();

        self.lease_requested_at = Instant::now();
        let lease = match self.lease_manager.grant() {
            Ok(lease) => lease,
            Err(err) => return self.retry_after_failure(err, shutdown_rx, ParticipantState::Candidate),
        };
        self.lease = Some(lease);

        match self.claim_negotiator.try_claim(&lease) {
            Ok(true) => {
                self.failed_attempts = 0;
                ParticipantState::Leader
            }
            Ok(false) => {
                self.failed_attempts = 0;
                self.release_lease();

                let leader = match self.claim_negotiator.current_claim() {
                    Ok(claim) => claim.map(|kv| kv.value),
                    Err(err) => {
                        warn!("Cannot read the current leader: {}", err);
                        None
                    }
                };
                info!("Participant {} is a follower, leader: {:?}", self.identity, leader);
                self.notify(ElectionEvent::Follower {
                    identity: self.identity.clone(),
                    leader,
                });

                ParticipantState::Follower
            }
            Err(err) => {
                // The transaction may have been applied: freeing the lease drops any stranded claim.
                self.release_lease();
                self.retry_after_failure(err, shutdown_rx, ParticipantState::Candidate)
            }
        }
    }

    fn run_leader(&mut self, shutdown_rx: &Receiver<()>) -> ParticipantState {
        let lease = match self.lease {
            Some(lease) => lease,
            None => {
                error!("Participant {} entered Leader state without a lease", self.identity);
                return ParticipantState::Candidate;
            }
        };

        info!("Participant {} I am the leader ({})", self.identity, lease);
        self.notify(ElectionEvent::Leader {
            identity: self.identity.clone(),
            lease,
        });

        // The store drops the lease no earlier than `ttl` after the grant was requested.
        let token = LeadershipToken::new_held(self.lease_requested_at + lease.ttl);
        let (keep_alive_event_tx, keep_alive_event_rx): (Sender<KeepAliveEvent>, Receiver<KeepAliveEvent>) =
            crossbeam_channel::unbounded();

        let keep_alive_worker = common::run_worker(
            keep_lease_alive,
            KeepAliveParams {
                lease_manager: self.lease_manager.clone(),
                lease,
                interval: self.timings.keep_alive_interval,
                max_missed_renewals: self.timings.max_missed_renewals,
                confirmed_at: self.lease_requested_at,
                token: token.clone(),
                keep_alive_event_tx,
            },
        );

        self.workload.leadership_acquired(lease, &token);

        let exit = self.lead(&token, &keep_alive_event_rx, shutdown_rx);

        token.release();
        if let LeaderExit::LeaseLost(err) = &exit {
            warn!("Participant {} No longer a leader: {}", self.identity, err);
            self.notify(ElectionEvent::LeadershipLost {
                identity: self.identity.clone(),
            });
        }

        // Waits out a renewal still in flight before the lease is revoked.
        keep_alive_worker.terminate_and_join();
        self.workload.leadership_lost();
        self.release_lease();

        match exit {
            LeaderExit::Shutdown => {
                info!("Participant {} Shutdown requested, leadership released", self.identity);
                ParticipantState::Terminated
            }
            LeaderExit::WorkloadStopped => {
                info!("Participant {} Workload finished, leadership released", self.identity);
                ParticipantState::Terminated
            }
            LeaderExit::LeaseLost(_) => match self.lease_loss_policy {
                LeaseLossPolicy::Recontend => ParticipantState::Candidate,
                LeaseLossPolicy::Terminate => ParticipantState::Terminated,
            },
        }
    }

    fn lead(
        &mut self,
        token: &LeadershipToken,
        keep_alive_event_rx: &Receiver<KeepAliveEvent>,
        shutdown_rx: &Receiver<()>,
    ) -> LeaderExit {
        let ticker = crossbeam_channel::tick(self.timings.workload_interval);
        loop {
            // Re-armed every pass: renewals move the expiry forward.
            let expiry = crossbeam_channel::at(token.expires_at());
            select!(
                recv(shutdown_rx) -> _ => return LeaderExit::Shutdown,
                recv(keep_alive_event_rx) -> event_result => {
                    match event_result {
                        Ok(KeepAliveEvent::Renewed(ttl)) => {
                            trace!("Participant {} lease renewed, ttl {:?}", self.identity, ttl);
                        }
                        Ok(KeepAliveEvent::Missed(err)) => {
                            warn!("Participant {} missed a lease renewal: {}", self.identity, err);
                        }
                        Ok(KeepAliveEvent::Lost(err)) => return LeaderExit::LeaseLost(err),
                        Err(err) => {
                            return LeaderExit::LeaseLost(ElectionError::new(
                                ErrorKind::LeaseLost,
                                "Keep-alive worker stopped".to_string(),
                                err.to_string(),
                            ));
                        }
                    }
                },
                recv(ticker) -> _ => {
                    // Loss is reported right after the token is released; never run work past it.
                    if !token.is_held() {
                        continue;
                    }
                    if self.workload.tick(token) == WorkloadControl::Stop {
                        return LeaderExit::WorkloadStopped;
                    }
                },
                recv(expiry) -> _ => {
                    let now = Instant::now();
                    let expires_at = token.expires_at();
                    if now >= expires_at {
                        token.release();
                        return LeaderExit::LeaseLost(ElectionError::new(
                            ErrorKind::LeaseLost,
                            "Lease expired before a renewal confirmed it".to_string(),
                            format!("expired {:?} ago", now - expires_at),
                        ));
                    }
                },
            );
        }
    }

    fn run_follower(&mut self, shutdown_rx: &Receiver<()>) -> ParticipantState {
        match self.vacancy_watcher.wait_for_vacancy(shutdown_rx) {
            Ok(VacancyOutcome::Vacant(event)) => {
                self.failed_attempts = 0;
                info!("Participant {} {}, starting election", self.identity, event);
                ParticipantState::Candidate
            }
            Ok(VacancyOutcome::Shutdown) => ParticipantState::Terminated,
            Err(err) => self.retry_after_failure(err, shutdown_rx, ParticipantState::Follower),
        }
    }

    /// Waits out the retry delay, then resumes `state` unless shutdown arrives first.
    fn retry_after_failure(
        &mut self,
        err: ElectionError,
        shutdown_rx: &Receiver<()>,
        state: ParticipantState,
    ) -> ParticipantState {
        self.failed_attempts += 1;
        let delay = self.retry_timer.next_retry_delay(self.failed_attempts);

        error!(
            "Participant {} {} failed (attempt {}), retrying in {:?}: {}",
            self.identity, state, self.failed_attempts, delay, err
        );

        select!(
            recv(shutdown_rx) -> _ => ParticipantState::Terminated,
            recv(crossbeam_channel::after(delay)) -> _ => state,
        )
    }

    fn release_lease(&mut self) {
        if let Some(lease) = self.lease.take() {
            self.lease_manager.revoke(&lease);
        }
    }

    fn notify(&self, event: ElectionEvent) {
        if let Some(events_tx) = &self.events_tx {
            if events_tx.send(event).is_err() {
                trace!("Election event observer is gone");
            }
        }
    }
}

impl<S, Rt, W> fmt::Debug for ElectionStateMachine<S, Rt, W>
where
    S: CoordinationStore,
    Rt: RetryTimer,
    W: Workload,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ElectionStateMachine")
            .field("identity", &self.identity)
            .field("state", &self.state)
            .field("lease", &self.lease)
            .field("failed_attempts", &self.failed_attempts)
            .finish()
    }
}

/// Worker entry point for `start_participant`.
pub(crate) fn run_participant<S, Rt, W>(
    mut state_machine: ElectionStateMachine<S, Rt, W>,
    terminate_worker_rx: Receiver<()>,
) where
    S: CoordinationStore,
    Rt: RetryTimer,
    W: Workload,
{
    state_machine.run(&terminate_worker_rx);
}

