//! `relay-worker` library crate.
//!
//! Dispatches jobs and runs them in isolated workers. The binary entrypoint
//! lives in `main.rs`; the modules are exposed for embedding and for the
//! integration tests.
//!
//! - [`runner`] - [`AsyncRunner`](runner::AsyncRunner) and the worker entry
//!   point [`run_job`](runner::run_job).
//! - [`spawn`] - process and task spawners.
//! - [`config`] - environment configuration.
//! - [`cli`] - command-line surface of the binary.

pub mod cli;
pub mod config;
pub mod daemon;
pub mod job;
pub mod runner;
pub mod spawn;

pub use config::{ConfigError, RelayConfig};
pub use job::{JobHandle, JobSpec};
pub use runner::{run_job, AsyncRunner};
pub use spawn::{JobSpawner, ProcessSpawner, SpawnError, TaskSpawner};
