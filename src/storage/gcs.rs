use anyhow::{Context, Result};
use google_cloud_storage::{
    client::{Client, ClientConfig},
    http::objects::upload::{Media, UploadObjectRequest, UploadType},
};
use std::path::Path;
use tokio::fs::File;
use tracing::{info, instrument};

use super::BucketStore;

/// A Google Cloud Storage bucket, authenticated with application default
/// credentials.
pub struct GcsBucket {
    client: Client,
    bucket: String,
    prefix: Option<String>,
}

impl GcsBucket {
    pub async fn connect(bucket: impl Into<String>, prefix: Option<String>) -> Result<Self> {
        let cfg = ClientConfig::default()
            .with_auth()
            .await
            .context("authenticating to GCS")?;
        Ok(Self {
            client: Client::new(cfg),
            bucket: bucket.into(),
            prefix,
        })
    }

    /// Full object name for `key`, with the optional prefix applied.
    pub fn object_name(&self, key: &str) -> String {
        object_name(self.prefix.as_deref(), key)
    }
}

fn object_name(prefix: Option<&str>, key: &str) -> String {
    let key = key.trim_start_matches('/');
    match prefix.map(|p| p.trim_matches('/')).filter(|p| !p.is_empty()) {
        Some(p) => format!("{}/{}", p, key),
        None => key.to_string(),
    }
}

/// Open `path` and grab its length for the upload's content length.
async fn open_for_upload(path: &Path) -> Result<(File, u64)> {
    let file = File::open(path)
        .await
        .with_context(|| format!("opening {}", path.display()))?;
    let len = file
        .metadata()
        .await
        .with_context(|| format!("stat {}", path.display()))?
        .len();
    Ok((file, len))
}

impl BucketStore for GcsBucket {
    #[instrument(level = "info", skip(self), fields(bucket = %self.bucket))]
    async fn upload_from_path(&self, from: &Path, to: &str) -> Result<()> {
        let object_name = self.object_name(to);

        // streamed from disk, never fully buffered
        let (file, len) = open_for_upload(from).await?;

        let mut media = Media::new(object_name.clone());
        media.content_type = "application/vnd.apache.parquet".into();
        media.content_length = Some(len);

        let upload_req = UploadObjectRequest {
            bucket: self.bucket.clone(),
            ..Default::default()
        };

        self.client
            .upload_object(&upload_req, file, &UploadType::Simple(media))
            .await
            .with_context(|| format!("uploading gs://{}/{}", self.bucket, object_name))?;

        info!(object = %object_name, bytes = len, "uploaded to GCS");
        Ok(())
    }
}
