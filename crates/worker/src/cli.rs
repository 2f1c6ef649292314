//! Command-line surface of the `relay-worker` binary.
//!
//! ## Commands
//!
//! - `relay-worker run-job` - run the job spec read from stdin (worker side)
//! - `relay-worker call` - invoke a function synchronously
//! - `relay-worker async` - dispatch a function to a detached worker
//! - `relay-worker listen` - serve the event socket and print events
//! - `relay-worker docs` - print function documentation
//!
//! Function arguments are given as `key=value` for named arguments and bare
//! values for positional ones; values that parse as JSON are used as such.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use relay_core::low::parse_cli_args;
use relay_core::runners::builtin_registry;
use relay_core::FunctionRegistry;
use relay_events::{EventBus, SocketHub, SocketTransport, TransportKind};
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

use crate::config::RelayConfig;
use crate::job::JobSpec;
use crate::runner::{run_job, AsyncRunner};
use crate::spawn::ProcessSpawner;

/// Relay function dispatcher and job worker.
#[derive(Debug, Parser)]
#[command(name = "relay-worker")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the job spec read from stdin. Used by the dispatcher.
    RunJob,
    /// Invoke a function and print its JSON result.
    Call(CallArgs),
    /// Dispatch a function to a worker process and print its tag and jid.
    Async(AsyncArgs),
    /// Serve the event socket and print events as JSON lines.
    Listen(ListenArgs),
    /// Print function documentation.
    Docs(DocsArgs),
}

#[derive(Debug, Args)]
pub struct CallArgs {
    /// Function name, e.g. `test.arg`.
    pub fun: String,

    /// Arguments: `key=value` or positional values.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

#[derive(Debug, Args)]
pub struct AsyncArgs {
    /// Function name, e.g. `test.sleep`.
    pub fun: String,

    /// Arguments: `key=value` or positional values.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,

    /// User recorded on the job's events.
    #[arg(long)]
    pub user: Option<String>,

    /// Run without publishing lifecycle events.
    #[arg(long)]
    pub no_event: bool,
}

#[derive(Debug, Args)]
pub struct ListenArgs {
    /// Only print events under this tag prefix.
    #[arg(long, default_value = "")]
    pub tag: String,
}

#[derive(Debug, Args)]
pub struct DocsArgs {
    /// Function name or module prefix, e.g. `test` or `test.ping`.
    pub prefix: Option<String>,
}

/// Execute a parsed command line.
pub async fn execute(cli: Cli) -> Result<()> {
    match cli.command {
        Command::RunJob => run_job_from_stdin().await,
        Command::Call(args) => call(args, &registry()?),
        Command::Async(args) => dispatch(args).await,
        Command::Listen(args) => listen(args).await,
        Command::Docs(args) => docs(args, &registry()?),
    }
}

fn registry() -> Result<FunctionRegistry> {
    builtin_registry().context("Failed to build the function registry")
}

/// Worker side: read the spec, detach and run it over the socket transport.
async fn run_job_from_stdin() -> Result<()> {
    let mut input = Vec::new();
    tokio::io::stdin()
        .read_to_end(&mut input)
        .await
        .context("Failed to read job spec from stdin")?;
    let job: JobSpec = serde_json::from_slice(&input).context("Invalid job spec")?;

    if let Err(e) = crate::daemon::detach() {
        tracing::debug!(error = %e, "Worker stays in the dispatcher's session");
    }

    if job.fire_event && job.bus.transport != TransportKind::Ipc {
        bail!(
            "Job {} targets the {} transport, which a worker process cannot reach",
            job.jid,
            job.bus.transport
        );
    }

    let jid = job.jid.clone();
    let data = run_job(job, Arc::new(registry()?), &SocketTransport)
        .await
        .with_context(|| format!("Job {jid} could not publish its events"))?;
    tracing::info!(jid = %jid, success = data.success, "Worker finished");
    Ok(())
}

fn call(args: CallArgs, registry: &FunctionRegistry) -> Result<()> {
    let low = parse_cli_args(&args.args);
    let ret = registry
        .invoke(&args.fun, &low)
        .map_err(|e| anyhow::anyhow!("{}: {e}", e.category()))?;
    println!("{}", serde_json::to_string_pretty(&ret)?);
    Ok(())
}

async fn dispatch(args: AsyncArgs) -> Result<()> {
    let config = RelayConfig::from_env()?;
    if config.transport != TransportKind::Ipc {
        bail!("Process workers publish over ipc; RELAY_TRANSPORT is {}", config.transport);
    }

    let spawner = ProcessSpawner::new(config.worker_bin.clone());
    let runner = AsyncRunner::from_config(&config, spawner);
    let handle = runner
        .dispatch(
            &args.fun,
            parse_cli_args(&args.args),
            args.user.as_deref(),
            !args.no_event,
        )
        .await?;
    println!("{}", serde_json::to_string(&handle)?);
    Ok(())
}

async fn listen(args: ListenArgs) -> Result<()> {
    let config = RelayConfig::from_env()?;
    let bus = Arc::new(EventBus::default());
    let mut events = bus.listen(args.tag);
    let hub = SocketHub::bind(&config.bus_config(), Arc::clone(&bus))?;

    let cancel = CancellationToken::new();
    let hub_task = tokio::spawn(hub.run(cancel.clone()));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.next() => match event {
                Some(event) => println!("{}", serde_json::to_string(&event)?),
                None => break,
            },
        }
    }

    cancel.cancel();
    hub_task.await.context("Event hub task failed")?;
    Ok(())
}

fn docs(args: DocsArgs, registry: &FunctionRegistry) -> Result<()> {
    let docs = registry.list_docs(args.prefix.as_deref());
    if docs.is_empty() {
        bail!(
            "No functions match {:?}",
            args.prefix.as_deref().unwrap_or_default()
        );
    }
    for (name, doc) in docs {
        println!("{}", doc_heading(registry, &name)?);
        for line in doc.lines() {
            println!("    {line}");
        }
        println!();
    }
    Ok(())
}

/// `name(params):` line printed above each docstring.
fn doc_heading(registry: &FunctionRegistry, name: &str) -> Result<String> {
    let function = registry.verify(Some(name))?;
    Ok(format!("{name}{}:", function.signature()))
}
