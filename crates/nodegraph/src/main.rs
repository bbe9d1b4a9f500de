//! nodegraph CLI - inspect and maintain a node dependency graph database.
//!
//! The binary is an operator tool over the engine: it lists edges, predicts
//! impact, audits cycles and drains the event queue. Nodes and edges are
//! created by the services that embed the library.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::ImpactTypeArg;

/// nodegraph: node dependency graph engine.
#[derive(Parser)]
#[command(name = "nodegraph")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Graph database path (overrides the config file)
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Configuration file (defaults to ./nodegraph.yaml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Output JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered nodes
    Nodes {
        /// Only nodes in this domain
        #[arg(long)]
        domain: Option<String>,
    },

    /// Show what a node depends on
    Deps {
        /// Node key (e.g. "url-db:docs:42")
        key: String,
    },

    /// Show what depends on a node
    Dependents {
        /// Node key (e.g. "url-db:docs:42")
        key: String,
    },

    /// Show the audit trail of a dependency edge
    History {
        /// Edge id
        edge: i64,
    },

    /// Predict the impact of a change to a node
    Impact {
        /// Node key (e.g. "url-db:docs:42")
        key: String,

        /// Kind of change to simulate
        #[arg(short = 't', long = "type", value_enum, default_value = "delete")]
        impact_type: ImpactTypeArg,

        /// Fail if the impact score is above this value (0-100)
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
        threshold: Option<u8>,
    },

    /// Show a node's neighborhood (served from the graph cache)
    Graph {
        /// Node key (e.g. "url-db:docs:42")
        key: String,
    },

    /// Audit the active graph for cycles
    Cycles {
        /// Only edges between nodes of this domain
        #[arg(long)]
        domain: Option<String>,
    },

    /// Inspect and acknowledge node events
    Events {
        #[command(subcommand)]
        command: EventsCommand,
    },

    /// List the dependency type catalog
    Types,
}

#[derive(Subcommand)]
enum EventsCommand {
    /// Unprocessed events, oldest first
    Pending {
        /// Maximum number of events (1-1000)
        #[arg(short = 'n', long, default_value = "100")]
        limit: i64,
    },

    /// Events of one node, newest first
    Node {
        /// Node key (deleted nodes keep their events)
        key: String,

        /// Maximum number of events (1-100)
        #[arg(short = 'n', long, default_value = "50")]
        limit: i64,
    },

    /// Mark events processed
    Ack {
        /// Event ids
        #[arg(required = true)]
        ids: Vec<i64>,
    },

    /// Event log statistics
    Stats,

    /// Delete processed events older than a retention period
    Cleanup {
        /// Retention in hours (at least the configured minimum)
        #[arg(long, default_value = "168")]
        older_than_hours: i64,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "nodegraph=info",
        1 => "nodegraph=debug",
        _ => "nodegraph=trace",
    };

    // Logs go to stderr so `--json` output stays parseable.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {e}", "error".red().bold());
            // Show cause chain for nested errors
            for cause in e.chain().skip(1) {
                eprintln!("  {}: {cause}", "caused by".dimmed());
            }
            // Bad input exits 2.
            if e.downcast_ref::<nodegraph::Error>()
                .is_some_and(nodegraph::Error::is_client_error)
            {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let json = cli.json;

    if let Commands::Types = cli.command {
        return cli::types::run(json);
    }

    let graph = cli::open(cli.config.as_deref(), cli.database)?;

    match cli.command {
        Commands::Nodes { domain } => cli::nodes::run(&graph, domain.as_deref(), json),
        Commands::Deps { key } => cli::deps::dependencies(&graph, &key, json),
        Commands::Dependents { key } => cli::deps::dependents(&graph, &key, json),
        Commands::History { edge } => cli::deps::history(&graph, edge, json),
        Commands::Impact {
            key,
            impact_type,
            threshold,
        } => cli::impact::run(&graph, &key, impact_type.into(), threshold, json),
        Commands::Graph { key } => cli::graph::run(&graph, &key, json),
        Commands::Cycles { domain } => cli::cycles::run(&graph, domain.as_deref(), json),
        Commands::Events { command } => match command {
            EventsCommand::Pending { limit } => cli::events::pending(&graph, limit, json),
            EventsCommand::Node { key, limit } => cli::events::node(&graph, &key, limit, json),
            EventsCommand::Ack { ids } => cli::events::ack(&graph, &ids, json),
            EventsCommand::Stats => cli::events::stats(&graph, json),
            EventsCommand::Cleanup { older_than_hours } => {
                cli::events::cleanup(&graph, older_than_hours, json)
            }
        },
        Commands::Types => cli::types::run(json),
    }
}
