use lease_election::ElectionEvent;
use std::time::{Duration, Instant};

use crate::steps;
use crate::steps::cluster::CaseCluster;

/// A leader that shuts down revokes its lease, so a follower leads well before the TTL.
pub fn run() {
    let timings = steps::fast_timings();
    let mut cluster = CaseCluster::new(timings);

    for identity in &["server-1", "server-2", "server-3"] {
        cluster.start_participant(identity);
        cluster.wait_for_event(identity, Duration::from_secs(2), steps::is_settled);
    }
    let old_leader = cluster.wait_for_leader(Duration::from_secs(1));
    assert_eq!(old_leader, "server-1");

    let stopped_at = Instant::now();
    cluster.stop(&old_leader);
    let new_leader = cluster.wait_for_new_leader(&old_leader, timings.lease_ttl);
    assert!(stopped_at.elapsed() < timings.lease_ttl / 2);

    let remaining = if new_leader == "server-2" { "server-3" } else { "server-2" };
    let expected_leader = Some(new_leader.clone());
    cluster.wait_for_event(remaining, Duration::from_secs(2), |event| match event {
        ElectionEvent::Follower { leader, .. } => *leader == expected_leader,
        _ => false,
    });

    cluster.terminate();
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_graceful_handoff() {
        crate::cases::graceful_handoff::run()
    }
}
