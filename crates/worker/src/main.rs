//! `relay-worker` -- function dispatcher and isolated job worker.
//!
//! The same binary dispatches jobs (`async`) and runs them (`run-job`, started
//! by the dispatcher with the job spec on stdin). Logs go to stderr so that
//! command output on stdout stays machine-readable.
//!
//! # Environment variables
//!
//! | Variable           | Default            | Description                              |
//! |--------------------|--------------------|------------------------------------------|
//! | `RELAY_SOCK_DIR`   | `/var/run/relay`   | Directory holding the event socket       |
//! | `RELAY_TRANSPORT`  | `ipc`              | Event transport (`ipc` or `local`)       |
//! | `RELAY_CLIENT`     | `runner`           | Client kind (`runner` or `wheel`)        |
//! | `RELAY_TAG_PREFIX` | client default     | Tag prefix between `salt` and the jid    |
//! | `RELAY_UNIQUE_JID` | `false`            | Append `_<pid>` to jids                  |
//! | `RELAY_WORKER_BIN` | current executable | Program launched for each job            |

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use relay_worker::cli::{self, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relay_worker=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    cli::execute(Cli::parse()).await
}
