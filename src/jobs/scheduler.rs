// Background job scheduler: periodic task scans for time-based triggers and
// the resumer that wakes suspended executions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio_cron_scheduler::{Job, JobScheduler as TokioScheduler, JobSchedulerError};
use tracing::{error, info};
use uuid::Uuid;

use crate::store::Stores;
use crate::workflows::engine::WorkflowEngine;
use crate::workflows::triggers::TriggerHandler;

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Scheduler error: {0}")]
    SchedulerError(#[from] JobSchedulerError),
    #[error("Job execution error: {0}")]
    ExecutionError(String),
}

pub type JobResult<T> = Result<T, JobError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// How often the overdue/due-soon task scan runs.
    pub task_scan_interval_minutes: u32,
    /// Window for the TASK_DUE scan.
    pub due_soon_window_days: i64,
    /// How often due wait continuations are polled.
    pub wait_resume_interval_minutes: u32,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            task_scan_interval_minutes: 15,
            due_soon_window_days: 2,
            wait_resume_interval_minutes: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobExecutionLog {
    pub id: Uuid,
    pub job_name: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: JobStatus,
    pub items_processed: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum JobStatus {
    Completed,
    Failed,
    PartialFailure,
}

const MAX_EXECUTION_LOGS: usize = 100;

pub struct JobScheduler {
    scheduler: TokioScheduler,
    stores: Stores,
    engine: Arc<WorkflowEngine>,
    triggers: Arc<TriggerHandler>,
    config: JobConfig,
    execution_logs: Arc<RwLock<Vec<JobExecutionLog>>>,
}

impl JobScheduler {
    pub async fn new(
        stores: Stores,
        engine: Arc<WorkflowEngine>,
        triggers: Arc<TriggerHandler>,
        config: JobConfig,
    ) -> JobResult<Self> {
        let scheduler = TokioScheduler::new().await?;

        Ok(Self {
            scheduler,
            stores,
            engine,
            triggers,
            config,
            execution_logs: Arc::new(RwLock::new(Vec::new())),
        })
    }

    pub async fn start(&self) -> JobResult<()> {
        info!("Starting background job scheduler");

        self.schedule_task_scan().await?;
        self.schedule_wait_resumer().await?;

        self.scheduler.start().await?;

        info!("Background job scheduler started");
        Ok(())
    }

    pub async fn shutdown(&mut self) -> JobResult<()> {
        info!("Shutting down background job scheduler");
        self.scheduler.shutdown().await?;
        Ok(())
    }

    pub async fn recent_logs(&self) -> Vec<JobExecutionLog> {
        self.execution_logs.read().await.clone()
    }

    /// Scan overdue tasks, then tasks coming due inside the window. The two
    /// passes run sequentially; the trigger handler serializes overlapping
    /// scans internally as well.
    async fn schedule_task_scan(&self) -> JobResult<()> {
        let interval = self.config.task_scan_interval_minutes;
        let cron_expr = format!("0 */{} * * * *", interval);

        let triggers = self.triggers.clone();
        let window_days = self.config.due_soon_window_days;
        let logs = self.execution_logs.clone();

        let job = Job::new_async(cron_expr.as_str(), move |_uuid, _lock| {
            let triggers = triggers.clone();
            let logs = logs.clone();

            Box::pin(async move {
                let started_at = Utc::now();
                info!("Running task scan job");

                let mut items_processed = 0;
                let mut errors = Vec::new();

                match triggers.check_overdue_tasks().await {
                    Ok(result) => {
                        items_processed += result.tasks_scanned;
                        errors.extend(result.errors);
                    }
                    Err(e) => errors.push(format!("overdue scan: {}", e)),
                }

                match triggers.check_task_due_dates(window_days).await {
                    Ok(result) => {
                        items_processed += result.tasks_scanned;
                        errors.extend(result.errors);
                    }
                    Err(e) => errors.push(format!("due-date scan: {}", e)),
                }

                let status = if errors.is_empty() {
                    JobStatus::Completed
                } else if items_processed > 0 {
                    JobStatus::PartialFailure
                } else {
                    JobStatus::Failed
                };

                record_log(
                    &logs,
                    JobExecutionLog {
                        id: Uuid::new_v4(),
                        job_name: "Task scan".to_string(),
                        started_at,
                        completed_at: Some(Utc::now()),
                        status,
                        items_processed,
                        errors,
                    },
                )
                .await;
            })
        })?;

        self.scheduler.add(job).await?;
        info!("Scheduled task scan to run every {} minutes", interval);

        Ok(())
    }

    /// Wake WAITING executions whose resume time has passed.
    async fn schedule_wait_resumer(&self) -> JobResult<()> {
        let interval = self.config.wait_resume_interval_minutes;
        let cron_expr = format!("0 */{} * * * *", interval);

        let stores = self.stores.clone();
        let engine = self.engine.clone();
        let logs = self.execution_logs.clone();

        let job = Job::new_async(cron_expr.as_str(), move |_uuid, _lock| {
            let stores = stores.clone();
            let engine = engine.clone();
            let logs = logs.clone();

            Box::pin(async move {
                let started_at = Utc::now();
                info!("Running wait resumer job");

                let mut items_processed = 0;
                let mut errors = Vec::new();

                match stores.executions.due_continuations(Utc::now()).await {
                    Ok(due) => {
                        for continuation in due {
                            items_processed += 1;
                            if let Err(e) =
                                engine.resume_execution(continuation.execution_id).await
                            {
                                error!(
                                    execution = %continuation.execution_id,
                                    "Resume failed: {}",
                                    e
                                );
                                errors.push(format!(
                                    "execution {}: {}",
                                    continuation.execution_id, e
                                ));
                            }
                        }
                    }
                    Err(e) => errors.push(format!("continuation query: {}", e)),
                }

                let status = if errors.is_empty() {
                    JobStatus::Completed
                } else if errors.len() < items_processed {
                    JobStatus::PartialFailure
                } else {
                    JobStatus::Failed
                };

                record_log(
                    &logs,
                    JobExecutionLog {
                        id: Uuid::new_v4(),
                        job_name: "Wait resumer".to_string(),
                        started_at,
                        completed_at: Some(Utc::now()),
                        status,
                        items_processed,
                        errors,
                    },
                )
                .await;
            })
        })?;

        self.scheduler.add(job).await?;
        info!("Scheduled wait resumer to run every {} minutes", interval);

        Ok(())
    }
}

async fn record_log(logs: &Arc<RwLock<Vec<JobExecutionLog>>>, log: JobExecutionLog) {
    let mut logs = logs.write().await;
    logs.push(log);
    if logs.len() > MAX_EXECUTION_LOGS {
        logs.remove(0);
    }
}
