//! Timeline error types

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while driving a timeline session
#[derive(Debug, Error)]
pub enum TimelineError {
    /// Command requires a connected session
    #[error("Not connected to a timeline")]
    NotConnected,

    /// Connect was issued on a connected session and reconnects are rejected
    #[error("Already connected to a timeline")]
    AlreadyConnected,

    /// The host has no saved document to version
    #[error("No active file: save the project before using the timeline")]
    NoActiveFile,

    /// A path cannot be used for a timeline operation
    #[error("Invalid path {path}: {reason}")]
    InvalidPath {
        /// Offending path
        path: PathBuf,
        /// Why it was rejected
        reason: String,
    },

    /// An argument was rejected before reaching the engine
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The engine answered with an `error` record
    #[error("Engine error: {0}")]
    Engine(String),

    /// The engine answered with something that is not a valid response
    #[error("Malformed engine response: {0}")]
    Malformed(String),

    /// The engine answered with a success record that contradicts the session model
    #[error("Inconsistent engine response: {0}")]
    Inconsistent(String),

    /// The request could not be serialized
    #[error("Failed to encode command: {0}")]
    Encode(#[source] serde_json::Error),

    /// Transport failure
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A host collaborator call failed
    #[error("Host {action} failed: {source}")]
    Host {
        /// Which host primitive failed
        action: HostAction,
        /// Underlying host error
        #[source]
        source: HostError,
    },

    /// The command did not complete within the configured timeout
    #[error("Command timed out after {0:?}")]
    Timeout(Duration),

    /// The background task running the command failed
    #[error("Background task failed: {0}")]
    Background(String),
}

impl TimelineError {
    /// Wrap a host failure for the given primitive
    pub fn host(action: HostAction, source: HostError) -> Self {
        Self::Host { action, source }
    }

    /// True for failures reported by the engine itself as a structured record
    pub fn is_engine_failure(&self) -> bool {
        matches!(self, Self::Engine(_))
    }
}

/// Errors raised while talking to the engine
#[derive(Debug, Error)]
pub enum TransportError {
    /// The engine could not be started
    #[error("Failed to start engine: {0}")]
    Spawn(#[source] std::io::Error),

    /// IO error on the engine channel
    #[error("Engine IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The engine went away mid-conversation
    #[error("Engine exited before answering")]
    EngineExited,

    /// The engine handle was already released
    #[error("Engine handle already released")]
    Released,
}

/// Host primitives the session calls out to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostAction {
    /// Flush the document to disk
    Save,
    /// Discard in-memory state and reload from disk
    Reload,
    /// Open a document from a path
    Open,
}

impl std::fmt::Display for HostAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HostAction::Save => write!(f, "save"),
            HostAction::Reload => write!(f, "reload"),
            HostAction::Open => write!(f, "open"),
        }
    }
}

/// Error reported by the host application
#[derive(Debug, Error)]
#[error("{0}")]
pub struct HostError(pub String);

impl From<std::io::Error> for HostError {
    fn from(err: std::io::Error) -> Self {
        Self(err.to_string())
    }
}

/// Result alias for timeline operations
pub type Result<T, E = TimelineError> = std::result::Result<T, E>;
