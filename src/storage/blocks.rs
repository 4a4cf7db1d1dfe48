use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};
use tracing::info;

use super::{BucketStore, GcsBucket, LocalBucket};

/// A registered bucket reference, looked up by name at run start.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum BucketBlock {
    Gcs {
        bucket: String,
        #[serde(default)]
        prefix: Option<String>,
    },
    Local {
        root: PathBuf,
    },
}

/// Named bucket blocks, read from a YAML file such as
///
/// ```yaml
/// zoom-gcs:
///   type: gcs
///   bucket: dtc_data_lake
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct BlockRegistry {
    blocks: BTreeMap<String, BucketBlock>,
}

impl BlockRegistry {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading blocks file {}", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("parsing blocks file {}", path.display()))
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn insert(&mut self, name: impl Into<String>, block: BucketBlock) {
        self.blocks.insert(name.into(), block);
    }

    pub fn get(&self, name: &str) -> Result<&BucketBlock> {
        self.blocks.get(name).ok_or_else(|| {
            let known: Vec<&str> = self.blocks.keys().map(String::as_str).collect();
            anyhow!("bucket block {:?} is not registered (known: {:?})", name, known)
        })
    }

    /// Look up `name` and build a ready-to-use bucket client.
    pub async fn resolve(&self, name: &str) -> Result<ResolvedBucket> {
        let block = self.get(name)?;
        info!(block = name, ?block, "resolving bucket block");
        match block {
            BucketBlock::Gcs { bucket, prefix } => {
                let gcs = GcsBucket::connect(bucket.clone(), prefix.clone())
                    .await
                    .with_context(|| format!("connecting bucket block {:?}", name))?;
                Ok(ResolvedBucket::Gcs(gcs))
            }
            BucketBlock::Local { root } => Ok(ResolvedBucket::Local(LocalBucket::new(root))),
        }
    }
}

/// A bucket built from a [`BucketBlock`].
pub enum ResolvedBucket {
    Gcs(GcsBucket),
    Local(LocalBucket),
}

impl BucketStore for ResolvedBucket {
    async fn upload_from_path(&self, from: &Path, to: &str) -> Result<()> {
        match self {
            ResolvedBucket::Gcs(b) => b.upload_from_path(from, to).await,
            ResolvedBucket::Local(b) => b.upload_from_path(from, to).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLOCKS: &str = "\
zoom-gcs:
  type: gcs
  bucket: dtc_data_lake_taxi
  prefix: raw
scratch:
  type: local
  root: /tmp/scratch-bucket
";

    #[test]
    fn test_parse_blocks() -> Result<()> {
        let reg = BlockRegistry::from_yaml(BLOCKS)?;
        assert_eq!(
            reg.get("zoom-gcs")?,
            &BucketBlock::Gcs {
                bucket: "dtc_data_lake_taxi".into(),
                prefix: Some("raw".into()),
            }
        );
        assert_eq!(
            reg.get("scratch")?,
            &BucketBlock::Local {
                root: PathBuf::from("/tmp/scratch-bucket"),
            }
        );
        Ok(())
    }

    #[test]
    fn test_unknown_block_fails() -> Result<()> {
        let reg = BlockRegistry::from_yaml(BLOCKS)?;
        let err = reg.get("zoom-s3").unwrap_err();
        assert!(err.to_string().contains("zoom-s3"));
        assert!(BlockRegistry::default().get("zoom-gcs").is_err());
        Ok(())
    }

    #[test]
    fn test_bad_block_type_rejected() {
        assert!(BlockRegistry::from_yaml("x:\n  type: ftp\n  host: a\n").is_err());
    }

    #[test]
    fn test_missing_file_fails() {
        let err = BlockRegistry::from_file("/definitely/not/here/blocks.yaml").unwrap_err();
        assert!(err.to_string().contains("blocks.yaml"));
    }

    #[tokio::test]
    async fn test_resolve_local_block() -> Result<()> {
        let mut reg = BlockRegistry::default();
        reg.insert(
            "scratch",
            BucketBlock::Local {
                root: PathBuf::from("bucket"),
            },
        );
        match reg.resolve("scratch").await? {
            ResolvedBucket::Local(b) => assert_eq!(b.root(), Path::new("bucket")),
            ResolvedBucket::Gcs(_) => panic!("expected a local bucket"),
        }
        assert!(reg.resolve("zoom-gcs").await.is_err());
        Ok(())
    }
}
