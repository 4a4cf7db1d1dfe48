use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

use super::BucketStore;

/// A bucket backed by a local directory; object keys become relative paths.
#[derive(Debug, Clone)]
pub struct LocalBucket {
    root: PathBuf,
}

impl LocalBucket {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where `key` lives under the root.
    pub fn object_path(&self, key: &str) -> PathBuf {
        key.split('/')
            .filter(|s| !s.is_empty())
            .fold(self.root.clone(), |p, seg| p.join(seg))
    }
}

impl BucketStore for LocalBucket {
    async fn upload_from_path(&self, from: &Path, to: &str) -> Result<()> {
        let dest = self.object_path(to);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let bytes = fs::copy(from, &dest)
            .await
            .with_context(|| format!("copying {} -> {}", from.display(), dest.display()))?;
        info!(object = %to, bytes, root = %self.root.display(), "stored in local bucket");
        Ok(())
    }
}
