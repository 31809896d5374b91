#[cfg(feature = "etcd")]
pub mod etcd_store;
pub mod memory_store;
