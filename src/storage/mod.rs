// src/storage/mod.rs

pub mod blocks;
pub mod gcs;
pub mod local;

use anyhow::Result;
use std::future::Future;
use std::path::Path;

pub use blocks::{BlockRegistry, BucketBlock, ResolvedBucket};
pub use gcs::GcsBucket;
pub use local::LocalBucket;

/// Destination for finished parquet files. Implemented by the real GCS
/// bucket, a directory-backed bucket, and test doubles.
pub trait BucketStore {
    /// Upload the file at `from` to object key `to`, overwriting any
    /// existing object.
    fn upload_from_path(&self, from: &Path, to: &str) -> impl Future<Output = Result<()>>;
}
