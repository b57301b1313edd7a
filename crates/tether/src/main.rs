// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tether - offline request queue and real-time connection client.
//!
//! This is the binary entry point for operating the client from a shell.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod listen;
mod queue;
mod runtime;
mod shutdown;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tether_config::TetherConfig;
use tether_core::TetherError;

use crate::listen::ListenArgs;
use crate::queue::EnqueueArgs;
use crate::runtime::Runtime;

/// Tether - offline request queue and real-time connection client.
#[derive(Parser, Debug)]
#[command(name = "tether", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the standard locations.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Inspect or operate the offline request queue.
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },
    /// Persist a request for delivery.
    Enqueue {
        /// Target URL.
        url: String,
        /// HTTP method.
        #[arg(long, short = 'X', default_value = "POST")]
        method: String,
        /// Header in `Name: value` form. Repeatable.
        #[arg(long = "header", short = 'H')]
        headers: Vec<String>,
        /// Request body.
        #[arg(long, short = 'd')]
        body: Option<String>,
        /// Attempts before the request is dropped.
        #[arg(long)]
        max_retries: Option<u32>,
        /// Run a drain pass right after queueing.
        #[arg(long)]
        send: bool,
    },
    /// Connect and log real-time traffic until interrupted.
    Listen {
        /// Resource to watch. Repeatable.
        #[arg(long = "resource", short = 'r')]
        resources: Vec<String>,
        /// Announce presence as this user id.
        #[arg(long)]
        user: Option<String>,
        /// Display name for presence (defaults to the user id).
        #[arg(long, requires = "user")]
        name: Option<String>,
    },
    /// Print the effective configuration.
    Config,
}

#[derive(Subcommand, Debug)]
enum QueueAction {
    /// List pending requests in drain order.
    List,
    /// Delete every pending request.
    Clear,
    /// Run one drain pass and print the outcome.
    Drain,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => tether_config::load_and_validate_path(path),
        None => tether_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            tether_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    init_tracing(&config.client.log_level);
    tether_core::metrics::register_metrics();

    if let Err(e) = run(cli.command, config).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run(command: Option<Commands>, config: TetherConfig) -> Result<(), TetherError> {
    let Some(command) = command else {
        println!("tether: use --help for available commands");
        return Ok(());
    };

    if let Commands::Config = command {
        print!("{}", render_config(&config)?);
        return Ok(());
    }

    let runtime = Runtime::build(&config).await?;
    match command {
        Commands::Listen {
            resources,
            user,
            name,
        } => {
            listen::run_listen(
                runtime,
                ListenArgs {
                    resources,
                    user_id: user,
                    user_name: name,
                },
            )
            .await
        }
        Commands::Queue { action } => {
            let result = match action {
                QueueAction::List => queue::run_list(&runtime).await,
                QueueAction::Clear => queue::run_clear(&runtime).await,
                QueueAction::Drain => queue::run_drain(&runtime).await,
            };
            runtime.shutdown().await;
            result
        }
        Commands::Enqueue {
            url,
            method,
            headers,
            body,
            max_retries,
            send,
        } => {
            let result = queue::run_enqueue(
                &runtime,
                EnqueueArgs {
                    url,
                    method,
                    headers,
                    body,
                    max_retries,
                    send,
                },
            )
            .await;
            runtime.shutdown().await;
            result
        }
        Commands::Config => Ok(()),
    }
}

/// TOML rendering of `config` with the auth token masked.
fn render_config(config: &TetherConfig) -> Result<String, TetherError> {
    let mut shown = config.clone();
    if shown.transport.auth_token.is_some() {
        shown.transport.auth_token = Some("<redacted>".to_string());
    }
    toml::to_string_pretty(&shown)
        .map_err(|e| TetherError::Internal(format!("failed to render configuration: {e}")))
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let crates = [
            "tether",
            "tether_bus",
            "tether_queue",
            "tether_realtime",
            "tether_storage",
            "tether_transport",
        ];
        let directives: Vec<String> = crates
            .iter()
            .map(|name| format!("{name}={log_level}"))
            .collect();
        EnvFilter::new(format!("warn,{}", directives.join(",")))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    #[cfg(not(target_env = "msvc"))]
    fn jemalloc_is_active() {
        use tikv_jemalloc_ctl::{epoch, stats};
        epoch::advance().unwrap();
        let allocated = stats::allocated::read().unwrap();
        assert!(allocated > 0, "jemalloc should report non-zero allocation");
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn enqueue_arguments_parse() {
        let cli = Cli::try_parse_from([
            "tether",
            "enqueue",
            "https://api.example.com/tasks",
            "-X",
            "put",
            "-H",
            "Content-Type: application/json",
            "-H",
            "X-Trace: 1",
            "-d",
            "{}",
            "--max-retries",
            "5",
            "--send",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Enqueue {
                url,
                method,
                headers,
                body,
                max_retries,
                send,
            }) => {
                assert_eq!(url, "https://api.example.com/tasks");
                assert_eq!(method, "put");
                assert_eq!(headers.len(), 2);
                assert_eq!(body.as_deref(), Some("{}"));
                assert_eq!(max_retries, Some(5));
                assert!(send);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn listen_name_requires_user() {
        assert!(Cli::try_parse_from(["tether", "listen", "--name", "Ada"]).is_err());
        assert!(Cli::try_parse_from(["tether", "listen", "--user", "u1", "--name", "Ada"]).is_ok());
    }

    #[test]
    fn rendered_config_masks_token() {
        let mut config = TetherConfig::default();
        config.transport.auth_token = Some("super-secret".to_string());
        let rendered = render_config(&config).unwrap();
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("<redacted>"));
        assert!(rendered.contains("[transport]"));
    }

    #[test]
    fn binary_loads_config_defaults() {
        let config = tether_config::load_and_validate_str("").expect("default config should be valid");
        assert_eq!(config.client.name, "tether");
    }
}
