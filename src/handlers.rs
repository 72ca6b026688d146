//! Command handlers - one per user-facing timeline operation
//!
//! Every handler follows the same shape:
//!
//! 1. reject if its preconditions do not hold (no engine call is made)
//! 2. run the host-side precondition action, if any
//! 3. one engine round trip
//! 4. on success, apply the reply to the [`Session`]
//! 5. run the host-side postcondition action, if any
//!
//! Handlers that leave the file alone keep the session exactly as it was when
//! step 3 or 4 fails. Restore and branch switch are different: once the engine
//! reports success the file on disk has changed, so the session is brought in
//! line (re-reading the whole state with `connect` if the reply alone does not
//! fit) and the host always reloads.

use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::{ReconnectPolicy, TimelineConfig};
use crate::error::{HostAction, Result, TimelineError};
use crate::host::Host;
use crate::model::CheckpointHash;
use crate::paths;
use crate::protocol::{
    Command, ConnectReply, CreateCheckpointReply, MaterializeReply, NewBranchReply,
    RestoreCheckpointReply, SwitchBranchReply,
};
use crate::session::Session;
use crate::transport::{Engine, Transport};

/// Runs timeline commands against an engine on behalf of a host
pub struct CommandHandlers<E: Engine, H: Host> {
    transport: Transport<E>,
    host: H,
    config: TimelineConfig,
}

impl<E: Engine, H: Host> CommandHandlers<E, H> {
    /// Create handlers with the default configuration
    pub fn new(engine: E, host: H) -> Self {
        Self::with_config(engine, host, TimelineConfig::default())
    }

    /// Create handlers with a custom configuration
    pub fn with_config(engine: E, host: H, config: TimelineConfig) -> Self {
        Self {
            transport: Transport::new(engine),
            host,
            config,
        }
    }

    /// Connect the session to the database of `project`, creating it if needed.
    ///
    /// Later commands only run while the host's active file is `project`.
    pub fn connect(&mut self, session: &mut Session, project: &Path) -> Result<()> {
        if session.is_connected() && self.config.reconnect == ReconnectPolicy::Reject {
            return Err(TimelineError::AlreadyConnected);
        }

        self.load(session, project)?;

        info!(
            project = %project.display(),
            branch = ?session.current_branch(),
            checkpoints = session.checkpoints().len(),
            "Connected to timeline"
        );
        Ok(())
    }

    /// Save the active file and record it as a new checkpoint on the current branch
    pub fn create_checkpoint(
        &mut self,
        session: &mut Session,
        message: &str,
    ) -> Result<CheckpointHash> {
        session.require_connected()?;
        let active = self.active_file(session)?;
        let db_path = self.db_path(&active)?;

        self.busy(|this| {
            this.host
                .save()
                .map_err(|e| TimelineError::host(HostAction::Save, e))?;

            let command = Command::CreateCheckpoint {
                db_path,
                path_to_blend: active,
                message: message.to_string(),
            };
            let reply: CreateCheckpointReply = this.transport.execute(&command)?;
            let hash = reply.current_checkpoint_hash.clone();
            session.apply_checkpoint_created(reply)?;

            info!(checkpoint = %hash, message = message, "Created checkpoint");
            Ok(hash)
        })
    }

    /// Overwrite the active file with a checkpoint and reload it in the host
    pub fn restore_checkpoint(&mut self, session: &mut Session, hash: &CheckpointHash) -> Result<()> {
        session.require_connected()?;
        let active = self.active_file(session)?;
        let db_path = self.db_path(&active)?;

        self.busy(|this| {
            let command = Command::RestoreCheckpoint {
                db_path,
                path_to_blend: active,
                hash: hash.clone(),
            };
            let reply: RestoreCheckpointReply = this.transport.execute(&command)?;

            info!(checkpoint = %hash, "Restored checkpoint");
            let applied = session.apply_restored(reply);
            this.settle(session, applied)
        })
    }

    /// Write a checkpoint to a new file next to the active one.
    ///
    /// The session keeps tracking the active file; returns the new file's path.
    pub fn restore_to_new_file(
        &mut self,
        session: &Session,
        hash: &CheckpointHash,
        name: &str,
    ) -> Result<PathBuf> {
        session.require_connected()?;
        let active = self.active_file(session)?;
        let db_path = self.db_path(&active)?;
        let destination = paths::restore_destination(&active, name, hash)?;

        self.busy(|this| {
            let command = Command::RestoreCheckpoint {
                db_path,
                path_to_blend: destination.clone(),
                hash: hash.clone(),
            };
            let _: RestoreCheckpointReply = this.transport.execute(&command)?;

            info!(
                checkpoint = %hash,
                destination = %destination.display(),
                "Restored checkpoint to new file"
            );
            Ok(destination)
        })
    }

    /// Make `branch` current, materialise its latest checkpoint and reload the host
    pub fn switch_branch(&mut self, session: &mut Session, branch: &str) -> Result<()> {
        session.require_connected()?;
        let branch = branch_name(branch)?;
        let active = self.active_file(session)?;
        let db_path = self.db_path(&active)?;

        self.busy(|this| {
            let command = Command::SwitchToBranch {
                db_path,
                path_to_blend: active,
                branch_name: branch.to_string(),
            };
            let reply: SwitchBranchReply = this.transport.execute(&command)?;

            info!(branch = branch, "Switched branch");
            let applied = session.apply_branch_switched(reply);
            this.settle(session, applied)
        })
    }

    /// Fork a new branch at the current checkpoint and make it current.
    ///
    /// File content is not touched.
    pub fn create_branch(&mut self, session: &mut Session, branch: &str) -> Result<()> {
        session.require_connected()?;
        let branch = branch_name(branch)?;
        let active = self.active_file(session)?;
        let db_path = self.db_path(&active)?;

        self.busy(|this| {
            let command = Command::SwitchToNewBranch {
                db_path,
                branch_name: branch.to_string(),
            };
            let reply: NewBranchReply = this.transport.execute(&command)?;
            session.apply_branch_created(reply)?;

            info!(branch = branch, "Created branch");
            Ok(())
        })
    }

    /// Rebuild a project file from a database and open it in the host.
    ///
    /// Needs no session; returns the path the host opened. A connected
    /// session stays bound to its own project, so commands fail with
    /// `InvalidPath` until the caller reconnects or switches back.
    pub fn materialize_from_database(&mut self, db_path: &Path) -> Result<PathBuf> {
        let db_path = paths::project_file(db_path)?.to_path_buf();

        let command = Command::BlendFileFromTimeline { db_path };
        let reply: MaterializeReply = self.transport.execute(&command)?;

        self.host
            .open(&reply.restored_file_path)
            .map_err(|e| TimelineError::host(HostAction::Open, e))?;

        info!(path = %reply.restored_file_path.display(), "Opened file restored from timeline");
        Ok(reply.restored_file_path)
    }

    /// Forget the session state locally. The engine handle stays open.
    pub fn disconnect(&mut self, session: &mut Session) {
        if session.is_connected() {
            info!("Disconnected from timeline");
        }
        session.reset();
    }

    /// Release the engine handle; later commands fail with a transport error
    pub fn shutdown(&mut self) {
        self.transport.shutdown();
    }

    /// The host collaborator
    pub fn host(&self) -> &H {
        &self.host
    }

    /// The host collaborator, mutably
    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// The engine transport
    pub fn transport(&self) -> &Transport<E> {
        &self.transport
    }

    /// Active configuration
    pub fn config(&self) -> &TimelineConfig {
        &self.config
    }

    fn load(&mut self, session: &mut Session, project: &Path) -> Result<()> {
        let command = Command::Connect {
            db_path: self.db_path(project)?,
            path_to_blend: project.to_path_buf(),
        };
        let reply: ConnectReply = self.transport.execute(&command)?;
        session.apply_connect(project, reply)
    }

    /// Sync the session after the engine rewrote the active file, then reload.
    ///
    /// A reply the session cannot take on its own is followed by a full
    /// `connect`. If that fails as well the session is dropped to disconnected
    /// rather than left describing a file that no longer exists.
    fn settle(&mut self, session: &mut Session, applied: Result<()>) -> Result<()> {
        let synced = match applied {
            Err(TimelineError::Inconsistent(reason)) => {
                warn!(reason = %reason, "Engine reply does not fit the session; refreshing");
                self.refresh(session)
            }
            other => other,
        };
        let reloaded = self.reload();
        synced.and(reloaded)
    }

    fn refresh(&mut self, session: &mut Session) -> Result<()> {
        let project = session.project().map(Path::to_path_buf);
        let result = match project {
            Some(project) => self.load(session, &project),
            None => Err(TimelineError::NotConnected),
        };
        if let Err(e) = &result {
            warn!(error = %e, "Timeline refresh failed; disconnecting");
            session.reset();
        }
        result
    }

    /// The connected project, provided the host is still editing it
    fn active_file(&self, session: &Session) -> Result<PathBuf> {
        let active = self.host.active_file().ok_or(TimelineError::NoActiveFile)?;
        paths::project_file(&active)?;
        match session.project() {
            Some(project) if project == active.as_path() => Ok(active),
            Some(project) => Err(TimelineError::InvalidPath {
                reason: format!("active file is not the connected project {}", project.display()),
                path: active,
            }),
            None => Err(TimelineError::NotConnected),
        }
    }

    fn db_path(&self, project: &Path) -> Result<PathBuf> {
        paths::db_path(project, &self.config.db_extension)
    }

    fn reload(&mut self) -> Result<()> {
        self.host.discard_and_reload().map_err(|e| {
            warn!(error = %e, "Host reload failed after the engine rewrote the active file");
            TimelineError::host(HostAction::Reload, e)
        })
    }

    fn busy<T>(&mut self, op: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let show = self.config.busy_indicator;
        if show {
            self.host.set_busy(true);
        }
        let result = op(self);
        if show {
            self.host.set_busy(false);
        }
        result
    }
}

/// Reject blank names; anything else goes to the engine as given
fn branch_name(name: &str) -> Result<&str> {
    if name.trim().is_empty() {
        return Err(TimelineError::InvalidArgument(
            "branch name must not be empty".to_string(),
        ));
    }
    Ok(name)
}
