// src/config.rs

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::dataset::{DatasetDescriptor, DEFAULT_SOURCE_BASE_URL};

pub const PICKUP_DATETIME_COLUMN: &str = "lpep_pickup_datetime";
pub const DROPOFF_DATETIME_COLUMN: &str = "lpep_dropoff_datetime";

/// Everything a flow run needs to know. Every field has a default, so an
/// empty YAML document (or no file at all) reproduces the green/2020/11 job.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EtlConfig {
    pub color: String,
    pub year: i32,
    /// Processed in this order.
    pub months: Vec<u32>,
    pub source_base_url: String,
    /// Local files land under `<output_root>/data/<color>/`.
    pub output_root: PathBuf,
    /// Name of the bucket block in the blocks file.
    pub bucket_block: String,
    pub datetime_columns: Vec<String>,
    pub http_timeout_secs: Option<u64>,
    /// Extra attempts per task; 0 disables retries.
    pub retries: u32,
    pub retry_delay_secs: u64,
    /// Keep going with the remaining months after one fails.
    pub continue_on_error: bool,
    /// When set, task outcomes are recorded as parquet files here.
    pub history_dir: Option<PathBuf>,
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self {
            color: "green".to_string(),
            year: 2020,
            months: vec![11],
            source_base_url: DEFAULT_SOURCE_BASE_URL.to_string(),
            output_root: PathBuf::from("."),
            bucket_block: "zoom-gcs".to_string(),
            datetime_columns: vec![
                PICKUP_DATETIME_COLUMN.to_string(),
                DROPOFF_DATETIME_COLUMN.to_string(),
            ],
            http_timeout_secs: None,
            retries: 0,
            retry_delay_secs: 0,
            continue_on_error: false,
            history_dir: None,
        }
    }
}

impl EtlConfig {
    /// Read a YAML config from `path`.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        // serde_yaml rejects an empty document, treat it as "all defaults"
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let cfg: Self = serde_yaml::from_str(text)?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.color.trim().is_empty() {
            bail!("color must not be empty");
        }
        if self.color.contains(['/', '\\']) || self.color.contains("..") {
            bail!("color {:?} must not contain path separators", self.color);
        }
        if self.months.is_empty() {
            bail!("months must list at least one month");
        }
        if let Some(m) = self.months.iter().find(|m| !(1..=12).contains(*m)) {
            bail!("month {} is outside 1..=12", m);
        }
        if self.bucket_block.trim().is_empty() {
            bail!("bucket_block must not be empty");
        }
        Ok(())
    }

    /// One descriptor per configured month, in configured order.
    pub fn descriptors(&self) -> Vec<DatasetDescriptor> {
        self.months
            .iter()
            .map(|&m| DatasetDescriptor::new(self.color.clone(), self.year, m))
            .collect()
    }

    pub fn http_timeout(&self) -> Option<Duration> {
        self.http_timeout_secs.map(Duration::from_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_reproduce_green_november() {
        let cfg = EtlConfig::default();
        cfg.validate().unwrap();
        let ds = cfg.descriptors();
        assert_eq!(ds, vec![DatasetDescriptor::new("green", 2020, 11)]);
        assert_eq!(cfg.bucket_block, "zoom-gcs");
        assert_eq!(cfg.retries, 0);
        assert!(!cfg.continue_on_error);
        assert!(cfg.http_timeout().is_none());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() -> Result<()> {
        let cfg = EtlConfig::from_yaml("color: yellow\nmonths: [1, 2, 3]\nretries: 2\n")?;
        assert_eq!(cfg.color, "yellow");
        assert_eq!(cfg.year, 2020);
        assert_eq!(cfg.months, vec![1, 2, 3]);
        assert_eq!(cfg.retries, 2);
        assert_eq!(cfg.bucket_block, "zoom-gcs");
        let months: Vec<u32> = cfg.descriptors().iter().map(|d| d.month()).collect();
        assert_eq!(months, vec![1, 2, 3]);
        Ok(())
    }

    #[test]
    fn test_empty_yaml_is_default() -> Result<()> {
        assert_eq!(EtlConfig::from_yaml("  \n")?, EtlConfig::default());
        Ok(())
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(EtlConfig::from_yaml("colour: green\n").is_err());
    }

    #[test]
    fn test_from_file() -> Result<()> {
        let mut tmp = NamedTempFile::new()?;
        writeln!(tmp, "year: 2019\nhttp_timeout_secs: 30")?;
        let cfg = EtlConfig::from_file(tmp.path())?;
        assert_eq!(cfg.year, 2019);
        assert_eq!(cfg.http_timeout(), Some(Duration::from_secs(30)));
        Ok(())
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut cfg = EtlConfig::default();
        cfg.months = vec![];
        assert!(cfg.validate().is_err());

        cfg.months = vec![11, 13];
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("13"));

        cfg.months = vec![0];
        assert!(cfg.validate().is_err());

        let mut cfg = EtlConfig::default();
        cfg.color = "../etc".into();
        assert!(cfg.validate().is_err());

        cfg.color = " ".into();
        assert!(cfg.validate().is_err());
    }
}
