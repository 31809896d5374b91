//! Pluggable pieces for `lease-election`: an in-process coordination store, retry timers,
//! a sample workload and, with the `etcd` feature, an etcd v3 store adapter.

#[macro_use]
extern crate log;
extern crate crossbeam_channel;
extern crate lease_election;

mod retry;
mod store;
mod workload;

pub use retry::fixed_retry_timer::FixedRetryTimer;
pub use retry::randomized_retry_timer::RandomizedRetryTimer;
#[cfg(feature = "etcd")]
pub use store::etcd_store::EtcdStore;
pub use store::memory_store::{MemoryStore, MemoryStoreClient};
pub use workload::LoggingWorkload;
