//! Response cache for the data API proxy.
//!
//! Entries are keyed by the SHA-256 of the raw request body and live in an
//! embedded sled database. Each record carries its own deadline; reads past
//! the deadline are misses and a background task purges them from disk.

pub mod entry;
pub mod error;
pub mod key;
pub mod policy;
pub mod reclaim;
pub mod store;

pub use entry::CacheEntry;
pub use error::CacheError;
pub use key::{CacheKey, FINGERPRINT_LEN, fingerprint};
pub use policy::{ApiEnvelope, CachePolicy, Cacheability};
pub use reclaim::{DEFAULT_RECLAIM_INTERVAL, spawn_reclaimer};
pub use store::{CacheStore, ReclaimReport, StoreStats};
