use crossbeam_channel::Receiver;
use lease_election::{ElectionEvent, ElectionTimings};
use std::thread;
use std::time::{Duration, Instant};


pub const ELECTION_KEY: &str = "Leader_Key";

pub fn sleep_ms(millis: u64) {
    thread::sleep(Duration::from_millis(millis));
}

/// Short timings so lease expiry cases finish in about a second.
pub fn fast_timings() -> ElectionTimings {
    ElectionTimings {
        lease_ttl: Duration::from_millis(1000),
        keep_alive_interval: Duration::from_millis(250),
        workload_interval: Duration::from_millis(50),
        watch_recheck_interval: Duration::from_secs(2),
        max_missed_renewals: 1,
    }
}

/// Longest time a vacancy caused by a silent leader may last.
pub fn failover_bound(timings: &ElectionTimings) -> Duration {
    timings.lease_ttl + timings.keep_alive_interval + Duration::from_millis(500)
}

pub fn wait_for_event<F>(
    events_rx: &Receiver<ElectionEvent>,
    timeout: Duration,
    predicate: F,
) -> ElectionEvent
where
    F: Fn(&ElectionEvent) -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match events_rx.recv_timeout(remaining) {
            Ok(event) => {
                trace!("Case observed: {:?}", event);
                if predicate(&event) {
                    return event;
                }
            }
            Err(_) => panic!("No matching election event within {:?}", timeout),
        }
    }
}

pub fn is_leader(event: &ElectionEvent) -> bool {
    match event {
        ElectionEvent::Leader { .. } => true,
        _ => false,
    }
}

pub fn is_follower(event: &ElectionEvent) -> bool {
    match event {
        ElectionEvent::Follower { .. } => true,
        _ => false,
    }
}

pub fn is_settled(event: &ElectionEvent) -> bool {
    is_leader(event) || is_follower(event)
}

pub fn is_leadership_lost(event: &ElectionEvent) -> bool {
    match event {
        ElectionEvent::LeadershipLost { .. } => true,
        _ => false,
    }
}

pub fn is_terminated(event: &ElectionEvent) -> bool {
    match event {
        ElectionEvent::Terminated { .. } => true,
        _ => false,
    }
}
