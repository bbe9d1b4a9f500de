//! CLI command implementations.

mod display;

pub mod cycles;
pub mod deps;
pub mod events;
pub mod graph;
pub mod impact;
pub mod nodes;
pub mod types;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::ValueEnum;
use nodegraph::config::CONFIG_FILE_NAME;
use nodegraph::{ImpactType, NodeGraph, NodeGraphConfig};

/// Open the engine from the config file, with `database` taking precedence
/// over the configured path.
pub fn open(config: Option<&Path>, database: Option<PathBuf>) -> anyhow::Result<NodeGraph> {
    let mut settings = match config {
        Some(path) => NodeGraphConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => NodeGraphConfig::load_or_default(Path::new(CONFIG_FILE_NAME))?,
    };
    if let Some(database) = database {
        settings.storage.database = database;
    }

    let path = settings.storage.database.clone();
    NodeGraph::open(settings)
        .with_context(|| format!("failed to open graph database {}", path.display()))
}

/// Impact type for CLI arguments
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImpactTypeArg {
    /// The node is deleted
    Delete,
    /// The node is updated
    Update,
    /// The node's version changes
    #[value(name = "version-change", alias = "version_change")]
    VersionChange,
}

impl From<ImpactTypeArg> for ImpactType {
    fn from(arg: ImpactTypeArg) -> Self {
        match arg {
            ImpactTypeArg::Delete => Self::Delete,
            ImpactTypeArg::Update => Self::Update,
            ImpactTypeArg::VersionChange => Self::VersionChange,
        }
    }
}
