use lease_election::{Lease, LeadershipToken, Workload, WorkloadControl};

/// Leader workload that only reports it is alive. With `max_ticks` set it steps down
/// after that many ticks.
#[derive(Clone, Debug, Default)]
pub struct LoggingWorkload {
    identity: String,
    ticks: u64,
    max_ticks: Option<u64>,
}

impl LoggingWorkload {
    pub fn new(identity: String) -> LoggingWorkload {
        LoggingWorkload {
            identity,
            ticks: 0,
            max_ticks: None,
        }
    }

    pub fn with_max_ticks(mut self, max_ticks: u64) -> LoggingWorkload {
        self.max_ticks = Some(max_ticks);
        self
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}

impl Workload for LoggingWorkload {
    fn leadership_acquired(&mut self, lease: Lease, _token: &LeadershipToken) {
        info!("{}: leading with {}", self.identity, lease);
    }

    fn tick(&mut self, _token: &LeadershipToken) -> WorkloadControl {
        self.ticks += 1;
        info!("{}: Refreshing. Still a leader.", self.identity);

        match self.max_ticks {
            Some(max_ticks) if self.ticks >= max_ticks => WorkloadControl::Stop,
            _ => WorkloadControl::Continue,
        }
    }

    fn leadership_lost(&mut self) {
        info!("{}: leadership released after {} ticks", self.identity, self.ticks);
    }
}
