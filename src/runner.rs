// src/runner.rs

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::{future::Future, sync::Arc, time::Duration};
use tokio::time::Instant;
use tracing::{error, info, warn};

/// Lifecycle of one task attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TaskState {
    Running,
    Completed,
    Retrying,
    Failed,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Running => "Running",
            TaskState::Completed => "Completed",
            TaskState::Retrying => "Retrying",
            TaskState::Failed => "Failed",
        }
    }
}

/// What observers are told about a task attempt.
#[derive(Clone, Debug)]
pub struct TaskEvent {
    pub flow_run: String,
    pub task: String,
    /// 1-based
    pub attempt: u32,
    pub state: TaskState,
    pub started: DateTime<Utc>,
    /// `None` while running.
    pub finished: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

/// Hook invoked on every task state change. Observer failures are logged
/// and never fail the task.
pub trait TaskObserver: Send + Sync {
    fn on_event(&self, event: &TaskEvent) -> Result<()>;
}

/// Runs named pipeline steps: logs and times them, retries failed attempts
/// up to `retries` extra times, and reports every state change to the
/// registered observers.
pub struct TaskRunner {
    flow_run: String,
    retries: u32,
    retry_delay: Duration,
    observers: Vec<Arc<dyn TaskObserver>>,
}

impl TaskRunner {
    pub fn new(flow_run: impl Into<String>) -> Self {
        Self {
            flow_run: flow_run.into(),
            retries: 0,
            retry_delay: Duration::ZERO,
            observers: Vec::new(),
        }
    }

    pub fn with_retries(mut self, retries: u32, retry_delay: Duration) -> Self {
        self.retries = retries;
        self.retry_delay = retry_delay;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn TaskObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn flow_run(&self) -> &str {
        &self.flow_run
    }

    /// Run an async task; `task` is called again for each retry.
    pub async fn run<T, F, Fut>(&self, name: &str, mut task: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            let started = Utc::now();
            let clock = Instant::now();
            self.notify(name, attempt, TaskState::Running, started, None, None);
            info!(task = name, attempt, "task started");

            match task().await {
                Ok(value) => {
                    info!(task = name, attempt, elapsed = ?clock.elapsed(), "task completed");
                    self.notify(
                        name,
                        attempt,
                        TaskState::Completed,
                        started,
                        Some(Utc::now()),
                        None,
                    );
                    return Ok(value);
                }
                Err(e) if attempt <= self.retries => {
                    warn!(task = name, attempt, elapsed = ?clock.elapsed(), "task failed, retrying: {:#}", e);
                    self.notify(
                        name,
                        attempt,
                        TaskState::Retrying,
                        started,
                        Some(Utc::now()),
                        Some(format!("{:#}", e)),
                    );
                    if !self.retry_delay.is_zero() {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                    attempt += 1;
                }
                Err(e) => {
                    error!(task = name, attempt, elapsed = ?clock.elapsed(), "task failed: {:#}", e);
                    self.notify(
                        name,
                        attempt,
                        TaskState::Failed,
                        started,
                        Some(Utc::now()),
                        Some(format!("{:#}", e)),
                    );
                    return Err(e.context(format!("task {} failed", name)));
                }
            }
        }
    }

    /// Run a synchronous task under the same policy as [`TaskRunner::run`].
    pub async fn run_sync<T, F>(&self, name: &str, mut task: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        self.run(name, || std::future::ready(task())).await
    }

    fn notify(
        &self,
        task: &str,
        attempt: u32,
        state: TaskState,
        started: DateTime<Utc>,
        finished: Option<DateTime<Utc>>,
        error: Option<String>,
    ) {
        if self.observers.is_empty() {
            return;
        }
        let event = TaskEvent {
            flow_run: self.flow_run.clone(),
            task: task.to_string(),
            attempt,
            state,
            started,
            finished,
            error,
        };
        for obs in &self.observers {
            if let Err(e) = obs.on_event(&event) {
                warn!(task, state = state.as_str(), "task observer failed: {:#}", e);
            }
        }
    }
}
