// src/history/mod.rs

use anyhow::{Context, Result};
use arrow::array::{ArrayRef, StringArray, TimestampMicrosecondArray, UInt32Array};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use glob::glob;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::{
    collections::HashSet,
    fs,
    fs::File,
    path::PathBuf,
    sync::Arc,
};

use crate::runner::{TaskEvent, TaskObserver, TaskState};

/// Task run history backed by one-row parquet files.
pub struct RunHistory {
    history_dir: PathBuf,
}

impl RunHistory {
    /// Open a history store at `history_dir`, creating the directory if needed.
    pub fn new(history_dir: impl Into<PathBuf>) -> Result<Self> {
        let history_dir = history_dir.into();
        fs::create_dir_all(&history_dir)
            .with_context(|| format!("creating history directory {:?}", &history_dir))?;
        Ok(Self { history_dir })
    }

    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("flow_run", DataType::Utf8, false),
            Field::new("task", DataType::Utf8, false),
            Field::new("attempt", DataType::UInt32, false),
            Field::new("state", DataType::Utf8, false),
            Field::new(
                "started",
                DataType::Timestamp(TimeUnit::Microsecond, None),
                false,
            ),
            Field::new(
                "finished",
                DataType::Timestamp(TimeUnit::Microsecond, None),
                true,
            ),
            Field::new("error", DataType::Utf8, true),
        ])
    }

    /// Write `event` as `<flow_run>_<task>_<state>_<ts>.parquet`.
    pub fn record(&self, event: &TaskEvent) -> Result<PathBuf> {
        let ts = event
            .finished
            .unwrap_or(event.started)
            .timestamp_micros();
        let filename = format!(
            "{}_{}_{}_{}.parquet",
            event.flow_run,
            event.task,
            event.state.as_str(),
            ts
        );
        let path = self.history_dir.join(filename);

        let schema = Arc::new(Self::schema());
        let columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from(vec![event.flow_run.clone()])),
            Arc::new(StringArray::from(vec![event.task.clone()])),
            Arc::new(UInt32Array::from(vec![event.attempt])),
            Arc::new(StringArray::from(vec![event.state.as_str()])),
            Arc::new(TimestampMicrosecondArray::from(vec![event
                .started
                .timestamp_micros()])),
            Arc::new(TimestampMicrosecondArray::from(vec![event
                .finished
                .map(|t| t.timestamp_micros())])),
            Arc::new(StringArray::from(vec![event.error.clone()])),
        ];

        let batch = RecordBatch::try_new(schema.clone(), columns)
            .context("building history record batch")?;
        let file =
            File::create(&path).with_context(|| format!("creating history file {:?}", &path))?;
        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();
        let mut writer = ArrowWriter::try_new(file, schema, Some(props))
            .context("creating Arrow writer for history")?;
        writer.write(&batch).context("writing history batch")?;
        writer.close().context("closing history writer")?;
        Ok(path)
    }

    /// Distinct `<flow_run>_<task>` keys recorded with `state`, taken from
    /// file names.
    pub fn load_tasks(&self, state: TaskState) -> Result<HashSet<String>> {
        let mut set = HashSet::new();
        let marker = format!("_{}_", state.as_str());
        let pattern = format!("{}/*{}*.parquet", self.history_dir.display(), marker);
        for path in glob(&pattern)?.flatten() {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if let Some(idx) = stem.rfind(&marker) {
                    set.insert(stem[..idx].to_string());
                }
            }
        }
        Ok(set)
    }
}

impl TaskObserver for RunHistory {
    fn on_event(&self, event: &TaskEvent) -> Result<()> {
        // only terminal attempts are worth a file
        if event.state == TaskState::Running {
            return Ok(());
        }
        self.record(event).map(|_| ())
    }
}
