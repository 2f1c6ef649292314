//! Relay core: function registry, invoker and job payload types.
//!
//! This crate is pure (no I/O beyond what registered functions do):
//!
//! - [`FunctionRegistry`] - named functions with declared [`Signature`]s,
//!   synchronous [`invoke`](FunctionRegistry::invoke) and documentation
//!   queries.
//! - [`progress`] - progress updates from running functions.
//! - [`low`] - the loosely typed call specification and its reserved keys.
//! - [`jid`] / [`tag`] - job identifiers and event tag construction.
//! - [`JobEventData`] / [`FailureSummary`] - lifecycle event payloads.
//! - [`runners`] - built-in function modules.

pub mod docs;
pub mod error;
pub mod jid;
pub mod job;
pub mod low;
pub mod progress;
pub mod registry;
pub mod runners;
pub mod signature;
pub mod tag;

pub use error::{CallError, FunctionError, InvocationError, RegistryError, ResolutionError};
pub use job::{ClientKind, FailureSummary, JobEventData, JobProgressData, DEFAULT_USER};
pub use low::LowData;
pub use progress::ProgressSink;
pub use registry::{FunctionRegistry, RegisteredFunction};
pub use signature::{BoundArgs, Signature};
pub use tag::Stage;
