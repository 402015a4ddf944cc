//! Media migration: canonical dedup keys, storage backends, the idempotent
//! resolver, and the space-reclaiming pruner.

pub mod canonical;
pub mod prune;
pub mod resolver;
pub mod storage;

pub use canonical::canonicalize;
pub use prune::{PruneMode, PruneSummary};
pub use resolver::{MediaResolver, UrlResolver};
pub use storage::{backend_from_settings, BlobStorage, S3Storage, StorageBackend, StorageError};
