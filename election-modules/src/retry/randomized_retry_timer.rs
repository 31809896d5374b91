use lease_election::RetryTimer;
use rand::Rng;
use std::time::Duration;

/// Exponential backoff with jitter: the delay doubles per attempt up to `max_delay_ms`
/// and a random value from its upper half is returned, so that participants failing
/// together do not retry in lockstep.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct RandomizedRetryTimer {
    base_delay_ms: u64,
    max_delay_ms: u64,
}

impl RandomizedRetryTimer {
    /// Creates new RandomizedRetryTimer with delays in milliseconds.
    pub fn new(base_delay_ms: u64, max_delay_ms: u64) -> RandomizedRetryTimer {
        if base_delay_ms > max_delay_ms || base_delay_ms == 0 {
            panic!(
                "Invalid params: base_delay_ms : {}, max_delay_ms : {}",
                base_delay_ms, max_delay_ms
            )
        }
        RandomizedRetryTimer {
            base_delay_ms,
            max_delay_ms,
        }
    }

    fn backoff_ms(&self, attempt: u32) -> u64 {
        let exponent = attempt.saturating_sub(1).min(32);

        self.base_delay_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_delay_ms)
    }
}

impl RetryTimer for RandomizedRetryTimer {
    fn next_retry_delay(&self, attempt: u32) -> Duration {
        let upper_ms = self.backoff_ms(attempt);
        let lower_ms = upper_ms / 2;

        let mut rng = rand::thread_rng();
        Duration::from_millis(rng.gen_range(lower_ms..=upper_ms))
    }
}
