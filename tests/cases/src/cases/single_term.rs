use std::time::Duration;

use crate::steps;
use crate::steps::cluster::CaseCluster;

/// A workload that stops ends the participant; its lease is revoked and the follower leads.
pub fn run() {
    let mut cluster = CaseCluster::new(steps::fast_timings());

    let workload = cluster.monitor.workload("server-1").with_max_ticks(10);
    cluster.start_with_workload("server-1", workload);
    cluster.wait_for_event("server-1", Duration::from_secs(2), steps::is_leader);
    cluster.start_participant("server-2");
    cluster.wait_for_event("server-2", Duration::from_secs(2), steps::is_follower);

    cluster.wait_for_event("server-1", Duration::from_secs(2), steps::is_terminated);
    cluster.join("server-1");

    let leader = cluster.wait_for_new_leader("server-1", Duration::from_secs(1));
    assert_eq!(leader, "server-2");
    assert_eq!(cluster.monitor.ticks("server-1"), 10);

    cluster.terminate();
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_single_term() {
        crate::cases::single_term::run()
    }
}
