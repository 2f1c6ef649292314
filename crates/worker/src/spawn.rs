//! Launching workers for dispatched jobs.
//!
//! [`ProcessSpawner`] runs each job in a fresh `relay-worker run-job`
//! process and is what the dispatcher uses by default. [`TaskSpawner`] runs
//! jobs on Tokio tasks in the current process, for embedding and tests.

use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use relay_core::FunctionRegistry;
use relay_events::EventTransport;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::job::JobSpec;
use crate::runner::run_job;

/// Subcommand of the worker binary that reads a [`JobSpec`] from stdin.
pub const RUN_JOB_COMMAND: &str = "run-job";

/// Errors raised while launching a worker.
#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("Failed to launch worker: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode job spec: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Starts a worker for a job and returns once it is running.
pub trait JobSpawner: Send + Sync {
    fn spawn(&self, job: JobSpec) -> impl Future<Output = Result<(), SpawnError>> + Send;
}

// ---------------------------------------------------------------------------
// ProcessSpawner
// ---------------------------------------------------------------------------

/// Runs every job in its own worker process.
#[derive(Debug, Clone)]
pub struct ProcessSpawner {
    program: PathBuf,
}

impl ProcessSpawner {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl JobSpawner for ProcessSpawner {
    /// Spawn `<program> run-job`, write the job spec to its stdin and close
    /// it. The child is reaped on a background task; it is not killed if the
    /// dispatcher goes away first.
    async fn spawn(&self, job: JobSpec) -> Result<(), SpawnError> {
        let payload = serde_json::to_vec(&job)?;

        let mut child = Command::new(&self.program)
            .arg(RUN_JOB_COMMAND)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()?;

        let stdin = child.stdin.take();
        let pid = child.id();
        let jid = job.jid.clone();

        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => {
                    tracing::debug!(jid = %jid, pid, "Worker exited");
                }
                Ok(status) => {
                    tracing::warn!(jid = %jid, pid, code = ?status.code(), "Worker exited abnormally");
                }
                Err(e) => {
                    tracing::warn!(jid = %jid, pid, error = %e, "Failed to reap worker");
                }
            }
        });

        if let Some(mut stdin) = stdin {
            stdin.write_all(&payload).await?;
            stdin.shutdown().await?;
        }

        tracing::debug!(jid = %job.jid, pid, program = %self.program.display(), "Worker launched");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// TaskSpawner
// ---------------------------------------------------------------------------

/// Runs jobs on Tokio tasks against a shared registry and transport.
pub struct TaskSpawner<T> {
    registry: Arc<FunctionRegistry>,
    transport: Arc<T>,
}

impl<T> TaskSpawner<T> {
    pub fn new(registry: Arc<FunctionRegistry>, transport: Arc<T>) -> Self {
        Self {
            registry,
            transport,
        }
    }
}

impl<T> Clone for TaskSpawner<T> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            transport: Arc::clone(&self.transport),
        }
    }
}

impl<T: EventTransport + 'static> JobSpawner for TaskSpawner<T> {
    async fn spawn(&self, job: JobSpec) -> Result<(), SpawnError> {
        let registry = Arc::clone(&self.registry);
        let transport = Arc::clone(&self.transport);

        tokio::spawn(async move {
            let jid = job.jid.clone();
            if let Err(e) = run_job(job, registry, transport.as_ref()).await {
                tracing::error!(jid = %jid, error = %e, "Job aborted before completion");
            }
        });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
