//! Session configuration

use std::path::PathBuf;
use std::time::Duration;
use serde::{Deserialize, Serialize};

/// What `connect` does when the session is already connected
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconnectPolicy {
    /// Ask the engine again and replace the session state on success
    #[default]
    Replace,
    /// Refuse; the caller must disconnect first
    Reject,
}

/// Configuration for a timeline session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineConfig {
    /// Extension appended to the project file name to locate its database
    pub db_extension: String,
    /// Behaviour of `connect` on a connected session
    pub reconnect: ReconnectPolicy,
    /// Upper bound for one engine round trip through the async facade
    pub command_timeout: Option<Duration>,
    /// Toggle the host wait indicator around long-running commands
    pub busy_indicator: bool,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            db_extension: "timeline".to_string(),
            reconnect: ReconnectPolicy::Replace,
            command_timeout: Some(Duration::from_secs(300)),
            busy_indicator: true,
        }
    }
}

/// How to launch an engine hosted in a child process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessEngineConfig {
    /// Engine executable
    pub program: PathBuf,
    /// Arguments passed to the engine
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory, inherited if unset
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    /// How long the engine may take to exit after its stdin closes before it is killed
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace: Duration,
}

fn default_shutdown_grace() -> Duration {
    Duration::from_secs(2)
}

impl ProcessEngineConfig {
    /// Launch `program` with no arguments
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            shutdown_grace: default_shutdown_grace(),
        }
    }

    /// Append an argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Override the exit grace period
    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TimelineConfig::default();
        assert_eq!(config.db_extension, "timeline");
        assert_eq!(config.reconnect, ReconnectPolicy::Replace);
        assert!(config.busy_indicator);
        assert!(config.command_timeout.is_some());
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: TimelineConfig =
            serde_json::from_str(r#"{"reconnect": "reject", "busy_indicator": false}"#).unwrap();

        assert_eq!(config.reconnect, ReconnectPolicy::Reject);
        assert!(!config.busy_indicator);
        assert_eq!(config.db_extension, "timeline");
    }

    #[test]
    fn test_process_engine_config_builder() {
        let config = ProcessEngineConfig::new("/usr/bin/timeline-engine").arg("--stdio");
        assert_eq!(config.args, vec!["--stdio".to_string()]);
        assert!(config.working_dir.is_none());
        assert_eq!(config.shutdown_grace, Duration::from_secs(2));
    }

    #[test]
    fn test_process_engine_config_from_json() {
        let config: ProcessEngineConfig =
            serde_json::from_str(r#"{"program": "timeline-engine"}"#).unwrap();
        assert!(config.args.is_empty());
        assert_eq!(config.shutdown_grace, Duration::from_secs(2));
    }
}
