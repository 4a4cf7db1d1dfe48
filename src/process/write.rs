use anyhow::{Context, Result};
use arrow::{compute::concat_batches, record_batch::RecordBatch};
use parquet::{
    arrow::{arrow_reader::ParquetRecordBatchReaderBuilder, ArrowWriter},
    basic::{Compression, GzipLevel},
    file::properties::WriterProperties,
};
use std::{
    fs::{self, File},
    path::{Path, PathBuf},
};
use tracing::{info, instrument};

use crate::dataset::DatasetDescriptor;

/// Result of persisting one month locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalArtifact {
    /// `<stem>.parquet`
    pub relative: PathBuf,
    /// `data/<color>/<stem>.parquet`, also the remote key layout.
    pub nested: PathBuf,
    /// `nested` under the output root; the file actually written.
    pub local_path: PathBuf,
    pub rows: usize,
    pub bytes: u64,
}

/// Write `batch` to `<output_root>/data/<color>/<stem>.parquet`.
#[instrument(level = "info", skip(batch, output_root), fields(dataset = %descriptor))]
pub fn write_local(
    batch: &RecordBatch,
    descriptor: &DatasetDescriptor,
    output_root: &Path,
) -> Result<LocalArtifact> {
    let relative = descriptor.relative_path();
    let nested = descriptor.nested_path();
    let local_path = output_root.join(&nested);

    let bytes = write_parquet(batch, &local_path)?;
    info!(
        rows = batch.num_rows(),
        bytes,
        path = %local_path.display(),
        "wrote parquet"
    );

    Ok(LocalArtifact {
        relative,
        nested,
        local_path,
        rows: batch.num_rows(),
        bytes,
    })
}

/// Serialize `batch` as gzip-compressed parquet at `path`, via a temporary
/// sibling that is renamed into place. Returns the file size.
pub fn write_parquet(batch: &RecordBatch, path: &Path) -> Result<u64> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating directory {}", parent.display()))?;
    }

    let temp_path = path.with_extension("parquet.tmp");
    if let Err(e) = write_then_rename(batch, &temp_path, path) {
        // the temp file may or may not exist depending on where we failed
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }

    let bytes = fs::metadata(path)
        .with_context(|| format!("stat {}", path.display()))?
        .len();
    Ok(bytes)
}

fn write_then_rename(batch: &RecordBatch, temp_path: &Path, path: &Path) -> Result<()> {
    let file = File::create(temp_path)
        .with_context(|| format!("creating {}", temp_path.display()))?;

    let props = WriterProperties::builder()
        .set_compression(Compression::GZIP(GzipLevel::default()))
        .build();
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))
        .context("creating parquet writer")?;
    writer.write(batch).context("writing record batch")?;
    writer.close().context("closing parquet writer")?;

    fs::rename(temp_path, path).with_context(|| {
        format!("renaming {} -> {}", temp_path.display(), path.display())
    })
}

/// Read a parquet file back into one record batch.
pub fn read_parquet(path: &Path) -> Result<RecordBatch> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .with_context(|| format!("reading parquet metadata from {}", path.display()))?;
    let schema = builder.schema().clone();
    let reader = builder.build()?;
    let batches = reader
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("reading {}", path.display()))?;
    concat_batches(&schema, &batches).context("concatenating parquet batches")
}
