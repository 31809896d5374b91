use lease_election::{ElectionEvent, ElectionTimings};
use std::time::{Duration, Instant};

use crate::steps;
use crate::steps::cluster::CaseCluster;

/// Two participants with production timings: one leads, the other follows and takes
/// over as soon as the leader shuts down.
pub fn run() {
    let mut timings = ElectionTimings::default();
    timings.workload_interval = Duration::from_millis(200);
    let mut cluster = CaseCluster::new(timings);

    cluster.start_participant("server-1");
    cluster.wait_for_event("server-1", Duration::from_secs(2), steps::is_leader);

    cluster.start_participant("server-2");
    let follower = cluster.wait_for_event("server-2", Duration::from_secs(2), steps::is_follower);
    assert_eq!(
        follower,
        ElectionEvent::Follower {
            identity: "server-2".to_string(),
            leader: Some("server-1".to_string()),
        }
    );

    // Survive at least one keep-alive round.
    steps::sleep_ms(2500);
    assert_eq!(cluster.current_leader(), Some("server-1".to_string()));
    assert!(cluster.monitor.ticks("server-1") > 0);
    assert_eq!(cluster.monitor.ticks("server-2"), 0);

    let stopped_at = Instant::now();
    cluster.stop("server-1");

    let leader = cluster.wait_for_new_leader("server-1", Duration::from_secs(2));
    assert_eq!(leader, "server-2");
    assert!(stopped_at.elapsed() < timings.lease_ttl);

    cluster.terminate();
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_smoke() {
        crate::cases::smoke::run()
    }
}
