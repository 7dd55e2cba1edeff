use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Why an external source (log reader, remote lister, hypervisor query)
/// could not deliver data.
///
/// Source errors never abort a query. They are attached to the affected
/// tier or unit so the caller can still render everything else.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SourceError {
    /// The lookup did not finish within its deadline.
    #[error("timeout after {secs}s")]
    Timeout { secs: u64 },

    /// The external program is not installed.
    #[error("command not found: {0}")]
    NotFound(String),

    /// The external program could not be started.
    #[error("failed to spawn {program}: {reason}")]
    Spawn { program: String, reason: String },

    /// The external program exited with a non-zero status.
    #[error("exit code {code}: {stderr}")]
    CommandFailed { code: i32, stderr: String },

    /// The source answered but its payload could not be interpreted.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// Local filesystem failure that is not simply "path missing".
    #[error("I/O error on {path}: {reason}")]
    Io { path: PathBuf, reason: String },
}

/// Errors raised while bootstrapping the monitor (configuration, file access).
#[derive(Error, Debug)]
pub enum MonitorError {
    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The configuration file exists but is not valid YAML.
    #[error("Failed to parse config {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// Pass-through for any raw I/O error that does not carry a path.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the monitor crates.
pub type Result<T> = std::result::Result<T, MonitorError>;
