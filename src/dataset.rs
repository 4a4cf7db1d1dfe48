// src/dataset.rs

use std::fmt;
use std::path::PathBuf;

/// Default release location of the NYC TLC trip data mirror.
pub const DEFAULT_SOURCE_BASE_URL: &str =
    "https://github.com/DataTalksClub/nyc-tlc-data/releases/download";

/// One monthly partition of a taxi trip dataset, e.g. green/2020/11.
///
/// Every path and URL the pipeline touches is derived from these three
/// fields, so re-running a month overwrites its previous output.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DatasetDescriptor {
    color: String,
    year: i32,
    month: u32,
}

impl DatasetDescriptor {
    pub fn new(color: impl Into<String>, year: i32, month: u32) -> Self {
        Self {
            color: color.into(),
            year,
            month,
        }
    }

    pub fn color(&self) -> &str {
        &self.color
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// `<color>_tripdata_<year>-<month:02>`, shared by the source and
    /// destination file names.
    pub fn file_stem(&self) -> String {
        format!("{}_tripdata_{}-{:02}", self.color, self.year, self.month)
    }

    /// Source URL of the gzip-compressed CSV under `base_url`.
    pub fn source_url(&self, base_url: &str) -> String {
        format!(
            "{}/{}/{}.csv.gz",
            base_url.trim_end_matches('/'),
            self.color,
            self.file_stem()
        )
    }

    /// `<stem>.parquet`
    pub fn relative_path(&self) -> PathBuf {
        PathBuf::from(format!("{}.parquet", self.file_stem()))
    }

    /// `data/<color>/<stem>.parquet`
    pub fn nested_path(&self) -> PathBuf {
        PathBuf::from("data")
            .join(&self.color)
            .join(self.relative_path())
    }

    /// Object key in the bucket; mirrors `nested_path` with `/` separators
    /// regardless of platform.
    pub fn remote_key(&self) -> String {
        format!("data/{}/{}.parquet", self.color, self.file_stem())
    }
}

impl fmt::Display for DatasetDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}-{:02}", self.color, self.year, self.month)
    }
}
