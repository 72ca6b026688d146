//! Client-side session state
//!
//! The session mirrors what the engine last reported: connection flag, the
//! project file it connected to, current branch and checkpoint, and the
//! branch/checkpoint lists. It only changes by
//! applying a successful reply, and every apply is all-or-nothing: the reply is
//! staged on a copy, checked against the session invariants, then swapped in.

use std::path::{Path, PathBuf};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::error::{Result, TimelineError};
use crate::model::{BranchRef, CheckpointHash, CheckpointRef, Row};
use crate::protocol::{
    ConnectReply, CreateCheckpointReply, NewBranchReply, RestoreCheckpointReply, SwitchBranchReply,
};

/// State of one timeline session, owned by the presentation layer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Session {
    connected: bool,
    project: Option<PathBuf>,
    current_branch: Option<String>,
    current_checkpoint: Option<CheckpointHash>,
    branches: Vec<BranchRef>,
    checkpoints: Vec<CheckpointRef>,
    connected_at: Option<DateTime<Utc>>,
}

impl Session {
    /// A disconnected session
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `connect` has succeeded
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Project file the session connected to
    pub fn project(&self) -> Option<&Path> {
        self.connected.then_some(())?;
        self.project.as_deref()
    }

    /// Current branch name, if connected
    pub fn current_branch(&self) -> Option<&str> {
        self.connected.then_some(())?;
        self.current_branch.as_deref()
    }

    /// Hash of the current checkpoint, if connected
    pub fn current_checkpoint(&self) -> Option<&CheckpointHash> {
        self.connected.then_some(())?;
        self.current_checkpoint.as_ref()
    }

    /// Branches in the database; empty while disconnected
    pub fn branches(&self) -> &[BranchRef] {
        if self.connected {
            &self.branches
        } else {
            &[]
        }
    }

    /// Checkpoints on the current branch; empty while disconnected
    pub fn checkpoints(&self) -> &[CheckpointRef] {
        if self.connected {
            &self.checkpoints
        } else {
            &[]
        }
    }

    /// When the session was last populated by `connect`
    pub fn connected_at(&self) -> Option<DateTime<Utc>> {
        self.connected_at
    }

    /// Look up a checkpoint on the current branch
    pub fn checkpoint(&self, hash: &CheckpointHash) -> Option<&CheckpointRef> {
        self.checkpoints().iter().find(|c| &c.hash == hash)
    }

    /// Branches with the current one marked
    pub fn branch_rows(&self) -> Vec<Row<'_, BranchRef>> {
        let current = self.current_branch();
        self.branches()
            .iter()
            .map(|branch| Row {
                item: branch,
                is_current: current == Some(branch.name.as_str()),
            })
            .collect()
    }

    /// Checkpoints with the current one marked
    pub fn checkpoint_rows(&self) -> Vec<Row<'_, CheckpointRef>> {
        let current = self.current_checkpoint();
        self.checkpoints()
            .iter()
            .map(|checkpoint| Row {
                item: checkpoint,
                is_current: current == Some(&checkpoint.hash),
            })
            .collect()
    }

    /// Fail with `NotConnected` unless connected
    pub fn require_connected(&self) -> Result<()> {
        if self.connected {
            Ok(())
        } else {
            Err(TimelineError::NotConnected)
        }
    }

    /// Check the session invariants
    pub fn validate(&self) -> Result<()> {
        if !self.connected {
            return Ok(());
        }
        if self.project.is_none() {
            return Err(TimelineError::Inconsistent("no connected project".to_string()));
        }

        match &self.current_branch {
            Some(name) if self.branches.iter().any(|b| &b.name == name) => {}
            Some(name) => {
                return Err(TimelineError::Inconsistent(format!(
                    "current branch {name} is not among the known branches"
                )))
            }
            None => return Err(TimelineError::Inconsistent("no current branch".to_string())),
        }

        match &self.current_checkpoint {
            Some(hash) if self.checkpoints.iter().any(|c| &c.hash == hash) => Ok(()),
            Some(hash) => Err(TimelineError::Inconsistent(format!(
                "current checkpoint {hash} is not on the current branch"
            ))),
            None => Err(TimelineError::Inconsistent("no current checkpoint".to_string())),
        }
    }

    pub(crate) fn apply_connect(&mut self, project: &Path, reply: ConnectReply) -> Result<()> {
        self.stage(|next| {
            next.connected = true;
            next.project = Some(project.to_path_buf());
            next.current_branch = Some(reply.current_branch_name);
            next.branches = reply.branches;
            next.current_checkpoint = Some(reply.current_checkpoint_hash);
            next.checkpoints = reply.checkpoints_on_this_branch;
            next.connected_at = Some(Utc::now());
        })
    }

    pub(crate) fn apply_checkpoint_created(&mut self, reply: CreateCheckpointReply) -> Result<()> {
        self.stage(|next| {
            next.current_checkpoint = Some(reply.current_checkpoint_hash);
            next.checkpoints = reply.checkpoints_on_this_branch;
        })
    }

    pub(crate) fn apply_restored(&mut self, reply: RestoreCheckpointReply) -> Result<()> {
        self.stage(|next| {
            next.current_checkpoint = Some(reply.current_checkpoint_hash);
        })
    }

    pub(crate) fn apply_branch_switched(&mut self, reply: SwitchBranchReply) -> Result<()> {
        self.stage(|next| {
            next.current_branch = Some(reply.current_branch_name);
            next.current_checkpoint = Some(reply.current_checkpoint_hash);
            next.checkpoints = reply.checkpoints_on_this_branch;
        })
    }

    pub(crate) fn apply_branch_created(&mut self, reply: NewBranchReply) -> Result<()> {
        self.stage(|next| {
            next.current_branch = Some(reply.current_branch_name);
            next.branches = reply.branches;
        })
    }

    /// Drop all state and return to disconnected
    pub(crate) fn reset(&mut self) {
        *self = Self::new();
    }

    fn stage(&mut self, update: impl FnOnce(&mut Session)) -> Result<()> {
        let mut next = self.clone();
        update(&mut next);
        next.validate()?;

        debug!(
            branch = ?next.current_branch,
            checkpoint = ?next.current_checkpoint.as_ref().map(CheckpointHash::as_str),
            branches = next.branches.len(),
            checkpoints = next.checkpoints.len(),
            "Session updated"
        );

        *self = next;
        Ok(())
    }
}
