use lease_election::RetryTimer;
use std::time::Duration;

/// Same delay after every failed attempt.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct FixedRetryTimer {
    fixed_delay_ms: u64,
}

impl FixedRetryTimer {
    pub fn new(fixed_delay_ms: u64) -> FixedRetryTimer {
        FixedRetryTimer { fixed_delay_ms }
    }
}

impl RetryTimer for FixedRetryTimer {
    fn next_retry_delay(&self, _attempt: u32) -> Duration {
        Duration::from_millis(self.fixed_delay_ms)
    }
}
