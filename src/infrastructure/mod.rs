pub mod in_memory;
pub mod resolve;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
pub mod sinks;
