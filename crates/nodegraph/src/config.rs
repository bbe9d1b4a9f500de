//! Engine configuration, loaded from `nodegraph.yaml`.
//!
//! Every section has defaults, so an empty file (or no file at all) yields a
//! working configuration. Unknown keys are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Default configuration file name.
pub const CONFIG_FILE_NAME: &str = "nodegraph.yaml";

/// Default tool segment for issued keys.
pub const DEFAULT_TOOL_NAME: &str = "url-db";

/// Default database location, relative to the working directory.
pub const DEFAULT_DATABASE_PATH: &str = ".nodegraph/graph.db";

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NodeGraphConfig {
    /// Tool segment of every key this store issues (e.g. "url-db").
    #[serde(rename = "tool-name")]
    pub tool_name: String,

    /// Storage configuration
    pub storage: StorageConfig,

    /// Graph cache configuration
    pub cache: CacheConfig,

    /// Cascade policy
    pub cascade: CascadeConfig,

    /// Event queue limits
    pub events: EventsConfig,
}

/// Storage configuration section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    pub database: PathBuf,

    /// How long a writer waits for SQLite's lock before failing
    #[serde(rename = "busy-timeout-ms")]
    pub busy_timeout_ms: u64,
}

/// Graph cache configuration section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Lifetime of a cached neighborhood
    #[serde(rename = "ttl-seconds")]
    pub ttl_seconds: u64,

    /// Traversal depth of cached neighborhoods
    #[serde(rename = "max-depth")]
    pub max_depth: usize,
}

/// Cascade policy section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CascadeConfig {
    /// Deepest cascade allowed; a cascade that would go further aborts.
    /// Unlimited when absent.
    #[serde(rename = "max-depth", skip_serializing_if = "Option::is_none")]
    pub max_depth: Option<usize>,
}

/// Event queue limits section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EventsConfig {
    /// Pending-events limit used when a request is out of range.
    #[serde(rename = "default-pending-limit")]
    pub default_pending_limit: usize,
    /// Largest pending-events limit accepted.
    #[serde(rename = "max-pending-limit")]
    pub max_pending_limit: usize,
    /// Node-events limit used when a request is out of range.
    #[serde(rename = "default-node-limit")]
    pub default_node_limit: usize,
    /// Largest node-events limit accepted.
    #[serde(rename = "max-node-limit")]
    pub max_node_limit: usize,
    /// Processed events younger than this are never cleaned up.
    #[serde(rename = "min-retention-hours")]
    pub min_retention_hours: u64,
}

impl Default for NodeGraphConfig {
    fn default() -> Self {
        Self {
            tool_name: DEFAULT_TOOL_NAME.to_string(),
            storage: StorageConfig::default(),
            cache: CacheConfig::default(),
            cascade: CascadeConfig::default(),
            events: EventsConfig::default(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from(DEFAULT_DATABASE_PATH),
            busy_timeout_ms: 5_000,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 3_600,
            max_depth: 10,
        }
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            default_pending_limit: 100,
            max_pending_limit: 1_000,
            default_node_limit: 50,
            max_node_limit: 100,
            min_retention_hours: 24,
        }
    }
}

impl StorageConfig {
    /// The busy timeout as a [`Duration`].
    #[must_use]
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

impl CacheConfig {
    /// The entry lifetime as a [`chrono::Duration`].
    #[must_use]
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.ttl_seconds).unwrap_or(i64::MAX))
    }
}

impl EventsConfig {
    /// Clamp a caller-supplied pending-events limit: anything outside
    /// `1..=max_pending_limit` becomes the default.
    #[must_use]
    pub fn pending_limit(&self, requested: i64) -> usize {
        clamp_limit(
            requested,
            self.max_pending_limit,
            self.default_pending_limit,
        )
    }

    /// Clamp a caller-supplied node-events limit: anything outside
    /// `1..=max_node_limit` becomes the default.
    #[must_use]
    pub fn node_limit(&self, requested: i64) -> usize {
        clamp_limit(requested, self.max_node_limit, self.default_node_limit)
    }
}

fn clamp_limit(requested: i64, max: usize, default: usize) -> usize {
    match usize::try_from(requested) {
        Ok(n) if n >= 1 && n <= max => n,
        _ => default,
    }
}

impl NodeGraphConfig {
    /// Configuration with defaults and the given database path.
    pub fn with_database(path: impl Into<PathBuf>) -> Self {
        Self {
            storage: StorageConfig {
                database: path.into(),
                ..StorageConfig::default()
            },
            ..Self::default()
        }
    }

    /// Load configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read and
    /// [`Error::Config`] if it does not parse or fails [`validate`](Self::validate).
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise return the defaults.
    ///
    /// # Errors
    ///
    /// See [`load`](Self::load).
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Save configuration to a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] on serialization failure and [`Error::Io`]
    /// if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            serde_yaml::to_string(self).map_err(|e| Error::Config(format!("YAML error: {e}")))?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check that every value is usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        if self.tool_name.is_empty() {
            return Err(Error::Config("tool-name must not be empty".to_string()));
        }
        if self.tool_name.contains(nodegraph_key::SEPARATOR) {
            return Err(Error::Config(format!(
                "tool-name '{}' must not contain '{}'",
                self.tool_name,
                nodegraph_key::SEPARATOR
            )));
        }
        if self.tool_name.len() > nodegraph_key::MAX_TOOL_LENGTH {
            return Err(Error::Config(format!(
                "tool-name cannot exceed {} characters",
                nodegraph_key::MAX_TOOL_LENGTH
            )));
        }
        if self.cache.ttl_seconds == 0 {
            return Err(Error::Config("cache.ttl-seconds must be positive".to_string()));
        }
        if self.cache.max_depth == 0 {
            return Err(Error::Config("cache.max-depth must be positive".to_string()));
        }

        let events = &self.events;
        for (name, value) in [
            ("default-pending-limit", events.default_pending_limit),
            ("max-pending-limit", events.max_pending_limit),
            ("default-node-limit", events.default_node_limit),
            ("max-node-limit", events.max_node_limit),
        ] {
            if value == 0 {
                return Err(Error::Config(format!("events.{name} must be positive")));
            }
        }
        if events.default_pending_limit > events.max_pending_limit
            || events.default_node_limit > events.max_node_limit
        {
            return Err(Error::Config(
                "event default limits must not exceed their maximums".to_string(),
            ));
        }

        Ok(())
    }
}
