//! Asynchronous job runner.
//!
//! [`AsyncRunner::dispatch`] stamps a job with a jid and tag, hands it to a
//! [`JobSpawner`] and returns immediately. The worker then runs
//! [`run_job`], which brackets the invocation with a `<tag>/new` and a
//! `<tag>/ret` event. Progress reported by the function is published as
//! `<tag>/progress` events in between. Whatever the function does, including panicking, ends
//! up in the `ret` payload rather than escaping the worker.

use std::any::Any;
use std::sync::Arc;

use relay_core::jid::gen_jid;
use relay_core::tag::{job_tag, lifecycle_tag};
use relay_core::{
    ClientKind, FailureSummary, FunctionRegistry, JobEventData, LowData, ProgressSink, Stage,
    DEFAULT_USER,
};
use relay_events::{BusConfig, EventConnection, EventError, EventTransport};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::config::RelayConfig;
use crate::job::{JobHandle, JobSpec};
use crate::spawn::{JobSpawner, SpawnError};

/// Failure category reported when a function panics.
pub const PANIC_CATEGORY: &str = "Panic";

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Dispatches jobs for one client kind.
pub struct AsyncRunner<S> {
    client: ClientKind,
    tag_prefix: String,
    unique_jid: bool,
    bus: BusConfig,
    spawner: S,
}

impl<S: JobSpawner> AsyncRunner<S> {
    /// Runner using the client's default tag prefix and plain jids.
    pub fn new(client: ClientKind, bus: BusConfig, spawner: S) -> Self {
        Self {
            client,
            tag_prefix: client.default_tag_prefix().to_string(),
            unique_jid: false,
            bus,
            spawner,
        }
    }

    pub fn from_config(config: &RelayConfig, spawner: S) -> Self {
        Self::new(config.client, config.bus_config(), spawner)
            .with_tag_prefix(config.tag_prefix())
            .with_unique_jid(config.unique_jid)
    }

    pub fn with_tag_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.tag_prefix = prefix.into();
        self
    }

    /// Append `_<pid>` to generated jids.
    pub fn with_unique_jid(mut self, unique: bool) -> Self {
        self.unique_jid = unique;
        self
    }

    /// Start `fun` in a worker and return its tag and jid.
    ///
    /// Returns before the function runs. The name is not checked here; an
    /// unknown function shows up as a failed `ret` event. Only a failure to
    /// launch the worker is reported synchronously.
    pub async fn dispatch(
        &self,
        fun: &str,
        low: LowData,
        user: Option<&str>,
        fire_event: bool,
    ) -> Result<JobHandle, SpawnError> {
        let jid = gen_jid(self.unique_jid);
        let tag = job_tag(&self.tag_prefix, &jid);

        let job = JobSpec {
            client: self.client,
            fun: fun.to_string(),
            low,
            user: user.unwrap_or(DEFAULT_USER).to_string(),
            tag: tag.clone(),
            jid: jid.clone(),
            fire_event,
            bus: self.bus.clone(),
        };

        self.spawner.spawn(job).await?;
        tracing::info!(jid = %jid, tag = %tag, fun, client = %self.client, "Job dispatched");

        Ok(JobHandle { tag, jid })
    }
}

// ---------------------------------------------------------------------------
// Worker side
// ---------------------------------------------------------------------------

/// Run one job to completion and return its final payload.
///
/// With `fire_event` set, `<tag>/new` is published before the invocation and
/// `<tag>/ret` after it. Invocation failures and panics are recorded in the
/// payload. Errors opening the connection or publishing are returned; the
/// connection is released on every path.
pub async fn run_job<T: EventTransport>(
    job: JobSpec,
    registry: Arc<FunctionRegistry>,
    transport: &T,
) -> Result<JobEventData, EventError> {
    let JobSpec {
        client,
        fun,
        low,
        user,
        tag,
        jid,
        fire_event,
        bus,
    } = job;

    let mut data = JobEventData::started(client, &fun, &jid, &user);

    let mut conn = if fire_event {
        let mut conn = transport.connect(&bus, false).await?;
        let payload = serde_json::to_value(&data)?;
        conn.fire_event(&payload, &lifecycle_tag(&tag, Stage::New))
            .await?;
        Some(conn)
    } else {
        None
    };

    let outcome = match conn.as_mut() {
        Some(conn) => {
            let (tx, mut rx) = mpsc::unbounded_channel::<Value>();
            let sink = ProgressSink::new(move |update| {
                let _ = tx.send(update);
            });
            let invocation = invoke_contained(&registry, client, &fun, low, sink);
            tokio::pin!(invocation);

            let progress_tag = lifecycle_tag(&tag, Stage::Progress);
            let outcome = loop {
                tokio::select! {
                    biased;
                    Some(update) = rx.recv() => {
                        publish_progress(conn, &data, update, &progress_tag).await?;
                    }
                    outcome = &mut invocation => break outcome,
                }
            };
            // Updates sent just before the function returned can still be queued.
            while let Ok(update) = rx.try_recv() {
                publish_progress(conn, &data, update, &progress_tag).await?;
            }
            outcome
        }
        None => invoke_contained(&registry, client, &fun, low, ProgressSink::discard()).await,
    };

    match outcome {
        Ok(value) => data.succeed(value),
        Err(summary) => {
            tracing::warn!(jid = %jid, fun = %fun, error = %summary, "Job function failed");
            data.fail(summary);
        }
    }
    data.user = user;

    if let Some(mut conn) = conn.take() {
        let payload = serde_json::to_value(&data)?;
        conn.fire_event(&payload, &lifecycle_tag(&tag, Stage::Ret))
            .await?;
        conn.close().await;
    }

    tracing::debug!(jid = %jid, success = data.success, "Job finished");
    Ok(data)
}

async fn publish_progress<C: EventConnection>(
    conn: &mut C,
    data: &JobEventData,
    update: Value,
    tag: &str,
) -> Result<(), EventError> {
    let payload = serde_json::to_value(data.progress(update))?;
    conn.fire_event(&payload, tag).await
}

/// Invoke on a blocking thread, turning errors and panics into a summary.
async fn invoke_contained(
    registry: &Arc<FunctionRegistry>,
    client: ClientKind,
    fun: &str,
    low: LowData,
    progress: ProgressSink,
) -> Result<Value, FailureSummary> {
    let registry = Arc::clone(registry);
    let name = fun.to_string();
    let outcome =
        tokio::task::spawn_blocking(move || registry.invoke_with_progress(&name, &low, progress))
            .await;

    match outcome {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(FailureSummary::from_call_error(client, fun, &e)),
        Err(join) if join.is_panic() => Err(FailureSummary::new(
            client,
            fun,
            PANIC_CATEGORY,
            panic_message(join.into_panic()),
        )),
        Err(join) => Err(FailureSummary::new(
            client,
            fun,
            PANIC_CATEGORY,
            join.to_string(),
        )),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "function panicked".to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
