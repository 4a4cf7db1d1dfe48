// src/pipeline.rs

use anyhow::{bail, Result};
use reqwest::Client;
use std::path::PathBuf;
use tokio::time::Instant;
use tracing::{error, info, info_span, Instrument};

use crate::{
    config::EtlConfig,
    dataset::DatasetDescriptor,
    fetch,
    process::{convert, write},
    runner::TaskRunner,
    storage::BucketStore,
};

/// What one month's run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthOutcome {
    pub dataset: DatasetDescriptor,
    pub rows: usize,
    pub local_path: PathBuf,
    pub remote_key: String,
}

/// Per-month results of a flow run, in configured order.
#[derive(Debug, Default)]
pub struct FlowSummary {
    pub completed: Vec<MonthOutcome>,
    pub failed: Vec<(DatasetDescriptor, String)>,
}

/// The web → parquet → bucket flow: fetch, clean, write locally, upload,
/// once per configured month.
pub struct Pipeline<S> {
    config: EtlConfig,
    client: Client,
    store: S,
    runner: TaskRunner,
}

impl<S: BucketStore> Pipeline<S> {
    pub fn new(config: EtlConfig, client: Client, store: S, runner: TaskRunner) -> Self {
        Self {
            config,
            client,
            store,
            runner,
        }
    }

    /// Run every configured month in order. The first failure aborts the
    /// flow unless `continue_on_error` is set, in which case the failure is
    /// recorded and reported once all months have been attempted.
    pub async fn run(&self) -> Result<FlowSummary> {
        self.config.validate()?;
        let start = Instant::now();
        let mut summary = FlowSummary::default();

        for descriptor in self.config.descriptors() {
            match self.run_month(&descriptor).await {
                Ok(outcome) => summary.completed.push(outcome),
                Err(e) if self.config.continue_on_error => {
                    error!(dataset = %descriptor, "month failed, continuing: {:#}", e);
                    summary.failed.push((descriptor, format!("{:#}", e)));
                }
                Err(e) => return Err(e.context(format!("processing {}", descriptor))),
            }
        }

        info!(
            flow_run = self.runner.flow_run(),
            completed = summary.completed.len(),
            failed = summary.failed.len(),
            elapsed = ?start.elapsed(),
            "flow finished"
        );

        if !summary.failed.is_empty() {
            let names: Vec<String> = summary.failed.iter().map(|(d, _)| d.to_string()).collect();
            bail!("{} month(s) failed: {}", names.len(), names.join(", "));
        }
        Ok(summary)
    }

    /// fetch → clean → write_local → write_remote for one month.
    pub async fn run_month(&self, descriptor: &DatasetDescriptor) -> Result<MonthOutcome> {
        let span = info_span!("month", dataset = %descriptor);
        async {
            let url = descriptor.source_url(&self.config.source_base_url);

            let fetched = self
                .runner
                .run("fetch", || fetch::fetch_dataset(&self.client, &url))
                .await?;

            let cleaned = self
                .runner
                .run_sync("clean", || {
                    convert::clean(&fetched, &self.config.datetime_columns)
                })
                .await?;

            let artifact = self
                .runner
                .run_sync("write_local", || {
                    write::write_local(&cleaned, descriptor, &self.config.output_root)
                })
                .await?;

            let remote_key = descriptor.remote_key();
            self.runner
                .run("write_remote", || {
                    self.store
                        .upload_from_path(&artifact.local_path, &remote_key)
                })
                .await?;

            Ok(MonthOutcome {
                dataset: descriptor.clone(),
                rows: artifact.rows,
                local_path: artifact.local_path,
                remote_key,
            })
        }
        .instrument(span)
        .await
    }
}
