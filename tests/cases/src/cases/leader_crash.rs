use lease_election::ElectionEvent;
use std::time::{Duration, Instant};

use crate::steps;
use crate::steps::cluster::CaseCluster;

/// A leader cut off from the store steps down on its own and a follower leads once the
/// lease expires. After reconnecting the old leader follows the new one.
pub fn run() {
    let timings = steps::fast_timings();
    let mut cluster = CaseCluster::new(timings);

    for identity in &["server-1", "server-2", "server-3"] {
        cluster.start_participant(identity);
    }
    let old_leader = cluster.wait_for_leader(Duration::from_secs(2));
    steps::sleep_ms(500);

    let isolated_at = Instant::now();
    cluster.isolate(&old_leader);

    cluster.wait_for_event(&old_leader, timings.lease_ttl, steps::is_leadership_lost);
    assert!(isolated_at.elapsed() < timings.lease_ttl);

    let new_leader = cluster.wait_for_new_leader(&old_leader, steps::failover_bound(&timings));
    info!("Leader changed {} -> {} after {:?}", old_leader, new_leader, isolated_at.elapsed());

    cluster.restore(&old_leader);
    let expected_leader = Some(new_leader.clone());
    cluster.wait_for_event(&old_leader, Duration::from_secs(3), |event| match event {
        ElectionEvent::Follower { leader, .. } => *leader == expected_leader,
        _ => false,
    });
    assert_eq!(cluster.current_leader(), Some(new_leader));

    cluster.terminate();
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_leader_crash() {
        crate::cases::leader_crash::run()
    }
}
