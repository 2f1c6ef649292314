//! The bundle handed from the dispatcher to a worker.

use relay_core::{ClientKind, LowData};
use relay_events::BusConfig;
use serde::{Deserialize, Serialize};

/// Everything a worker needs to run one job.
///
/// Serialised as JSON onto the worker's stdin for process-isolated jobs. The
/// bus configuration travels inside the spec so the worker depends on nothing
/// inherited from the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    pub client: ClientKind,
    pub fun: String,
    pub low: LowData,
    pub user: String,
    pub tag: String,
    pub jid: String,
    pub fire_event: bool,
    pub bus: BusConfig,
}

/// What [`dispatch`](crate::runner::AsyncRunner::dispatch) returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    pub tag: String,
    pub jid: String,
}
