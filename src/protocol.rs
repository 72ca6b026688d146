//! Command vocabulary and response decoding for the versioning engine
//!
//! Requests are JSON objects carrying a `command` discriminator plus the
//! command's fields. Responses are JSON objects: a top-level `error` key marks
//! a structured failure no matter what else is present; anything else must
//! decode into the typed reply for the command or it is malformed.

use std::path::PathBuf;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, TimelineError};
use crate::model::{BranchRef, CheckpointHash, CheckpointRef};

/// A command understood by the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "command", rename_all = "kebab-case")]
pub enum Command {
    /// Open (initialising if needed) the database for a project file
    Connect {
        db_path: PathBuf,
        path_to_blend: PathBuf,
    },
    /// Snapshot the project file on the current branch
    CreateCheckpoint {
        db_path: PathBuf,
        path_to_blend: PathBuf,
        message: String,
    },
    /// Materialise a checkpoint into `path_to_blend`
    RestoreCheckpoint {
        db_path: PathBuf,
        path_to_blend: PathBuf,
        hash: CheckpointHash,
    },
    /// Make another branch current and materialise its tip
    SwitchToBranch {
        db_path: PathBuf,
        path_to_blend: PathBuf,
        branch_name: String,
    },
    /// Fork a new branch at the current checkpoint and make it current
    SwitchToNewBranch { db_path: PathBuf, branch_name: String },
    /// Rebuild a project file from a bare database
    BlendFileFromTimeline { db_path: PathBuf },
}

impl Command {
    /// Wire name of the command
    pub fn name(&self) -> &'static str {
        match self {
            Command::Connect { .. } => "connect",
            Command::CreateCheckpoint { .. } => "create-checkpoint",
            Command::RestoreCheckpoint { .. } => "restore-checkpoint",
            Command::SwitchToBranch { .. } => "switch-to-branch",
            Command::SwitchToNewBranch { .. } => "switch-to-new-branch",
            Command::BlendFileFromTimeline { .. } => "blend-file-from-timeline",
        }
    }

    /// Serialize to the engine's wire format
    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(TimelineError::Encode)
    }
}

/// Reply to `connect`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConnectReply {
    pub current_branch_name: String,
    pub branches: Vec<BranchRef>,
    pub current_checkpoint_hash: CheckpointHash,
    pub checkpoints_on_this_branch: Vec<CheckpointRef>,
}

/// Reply to `create-checkpoint`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreateCheckpointReply {
    pub current_checkpoint_hash: CheckpointHash,
    pub checkpoints_on_this_branch: Vec<CheckpointRef>,
}

/// Reply to `restore-checkpoint`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RestoreCheckpointReply {
    pub current_checkpoint_hash: CheckpointHash,
}

/// Reply to `switch-to-branch`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SwitchBranchReply {
    pub current_branch_name: String,
    pub current_checkpoint_hash: CheckpointHash,
    pub checkpoints_on_this_branch: Vec<CheckpointRef>,
}

/// Reply to `switch-to-new-branch`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewBranchReply {
    pub current_branch_name: String,
    pub branches: Vec<BranchRef>,
}

/// Reply to `blend-file-from-timeline`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MaterializeReply {
    pub restored_file_path: PathBuf,
}

/// Decode an engine response into the reply type `R`.
///
/// Returns `Engine` for a structured failure and `Malformed` for anything that
/// is not a JSON object or lacks the reply's fields.
pub fn decode<R: DeserializeOwned>(bytes: &[u8]) -> Result<R> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| TimelineError::Malformed(format!("not valid JSON: {e}")))?;

    let Value::Object(mut record) = value else {
        return Err(TimelineError::Malformed(
            "response is not an object".to_string(),
        ));
    };

    if let Some(error) = record.remove("error") {
        return Err(TimelineError::Engine(describe_error(error)));
    }

    serde_json::from_value(Value::Object(record))
        .map_err(|e| TimelineError::Malformed(e.to_string()))
}

fn describe_error(error: Value) -> String {
    match error {
        Value::String(message) => message,
        Value::Null => "unspecified engine error".to_string(),
        other => other.to_string(),
    }
}
