//! # Timeline session
//!
//! Branches and checkpoints for large binary project files, driven from the
//! authoring application's side.
//!
//! This crate provides:
//! - The session state the UI renders (current branch/checkpoint, lists)
//! - The command protocol spoken to the versioning engine
//! - Handlers that sequence host saves/reloads around engine calls
//! - Scoped ownership of the engine handle and its response buffers
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │   Presentation (owns Session, renders rows)      │
//! └───────────────────────┬──────────────────────────┘
//!                         │ &mut Session
//!                         ▼
//! ┌──────────────────────────────────────────────────┐
//! │                 CommandHandlers                  │
//! │  host.save() → engine call → apply → host.reload │
//! └───────┬───────────────────────────────┬──────────┘
//!         │                               │
//!         ▼                               ▼
//! ┌────────────────┐           ┌──────────────────────┐
//! │ Host (trait)   │           │ Transport            │
//! │ save / reload  │           │  Command ─▶ JSON     │
//! │ open / busy    │           │  JSON ─▶ Reply/Error │
//! └────────────────┘           └──────────┬───────────┘
//!                                         ▼
//!                              ┌──────────────────────┐
//!                              │ Engine (trait)       │
//!                              │ ProcessEngine, ...   │
//!                              └──────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use timeline_session::{CommandHandlers, ProcessEngine, ProcessEngineConfig, Session};
//!
//! let engine = ProcessEngine::new(ProcessEngineConfig::new("timeline-engine"));
//! let mut handlers = CommandHandlers::new(engine, my_host);
//! let mut session = Session::new();
//!
//! handlers.connect(&mut session, Path::new("/projects/scene.blend"))?;
//! let hash = handlers.create_checkpoint(&mut session, "blocking pass")?;
//! handlers.create_branch(&mut session, "lighting")?;
//! handlers.restore_checkpoint(&mut session, &hash)?;
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod host;
pub mod model;
pub mod paths;
pub mod process;
pub mod protocol;
pub mod session;
pub mod shared;
pub mod transport;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use config::{ProcessEngineConfig, ReconnectPolicy, TimelineConfig};
pub use error::{HostAction, HostError, TimelineError, TransportError};
pub use handlers::CommandHandlers;
pub use host::Host;
pub use model::{BranchRef, CheckpointHash, CheckpointRef, Row};
pub use process::ProcessEngine;
pub use protocol::Command;
pub use session::Session;
pub use shared::SharedTimeline;
pub use transport::{Engine, EngineHandle, ResponseBuffer, Transport};
