//! Async facade for callers that cannot block
//!
//! Every command runs on the blocking pool while holding the single lock that
//! guards the session and the engine handle, so at most one round trip is in
//! flight. A command that outlives its timeout keeps running to completion
//! under the lock; only the caller stops waiting. The session therefore never
//! diverges from what the engine has actually done.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use parking_lot::Mutex;
use tracing::warn;

use crate::error::{Result, TimelineError};
use crate::handlers::CommandHandlers;
use crate::host::Host;
use crate::model::CheckpointHash;
use crate::session::Session;
use crate::transport::Engine;

struct Inner<E: Engine, H: Host> {
    session: Session,
    handlers: CommandHandlers<E, H>,
}

/// Session and handlers shared across tasks
pub struct SharedTimeline<E: Engine, H: Host> {
    inner: Arc<Mutex<Inner<E, H>>>,
    timeout: Option<Duration>,
}

impl<E: Engine, H: Host> Clone for SharedTimeline<E, H> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            timeout: self.timeout,
        }
    }
}

impl<E, H> SharedTimeline<E, H>
where
    E: Engine + Send + 'static,
    H: Host + Send + 'static,
{
    /// Wrap handlers with a fresh, disconnected session
    pub fn new(handlers: CommandHandlers<E, H>) -> Self {
        let timeout = handlers.config().command_timeout;
        Self {
            inner: Arc::new(Mutex::new(Inner {
                session: Session::new(),
                handlers,
            })),
            timeout,
        }
    }

    /// Override the per-command timeout for this handle
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Whether a command is currently in flight
    pub fn is_busy(&self) -> bool {
        self.inner.is_locked()
    }

    /// Copy of the session, or `None` while a command is in flight
    pub fn snapshot(&self) -> Option<Session> {
        self.inner.try_lock().map(|inner| inner.session.clone())
    }

    /// Run `op` with exclusive access to the handlers and the session
    pub async fn run<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut CommandHandlers<E, H>, &mut Session) -> Result<T> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let task = tokio::task::spawn_blocking(move || {
            let mut guard = inner.lock();
            let Inner { session, handlers } = &mut *guard;
            op(handlers, session)
        });

        let joined = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, task).await.map_err(|_| {
                warn!(timeout = ?limit, "Timeline command timed out; it will finish in the background");
                TimelineError::Timeout(limit)
            })?,
            None => task.await,
        };

        joined.map_err(|e| TimelineError::Background(e.to_string()))?
    }

    /// See [`CommandHandlers::connect`]
    pub async fn connect(&self, project: PathBuf) -> Result<()> {
        self.run(move |handlers, session| handlers.connect(session, &project))
            .await
    }

    /// See [`CommandHandlers::create_checkpoint`]
    pub async fn create_checkpoint(&self, message: String) -> Result<CheckpointHash> {
        self.run(move |handlers, session| handlers.create_checkpoint(session, &message))
            .await
    }

    /// See [`CommandHandlers::restore_checkpoint`]
    pub async fn restore_checkpoint(&self, hash: CheckpointHash) -> Result<()> {
        self.run(move |handlers, session| handlers.restore_checkpoint(session, &hash))
            .await
    }

    /// See [`CommandHandlers::restore_to_new_file`]
    pub async fn restore_to_new_file(&self, hash: CheckpointHash, name: String) -> Result<PathBuf> {
        self.run(move |handlers, session| handlers.restore_to_new_file(session, &hash, &name))
            .await
    }

    /// See [`CommandHandlers::switch_branch`]
    pub async fn switch_branch(&self, branch: String) -> Result<()> {
        self.run(move |handlers, session| handlers.switch_branch(session, &branch))
            .await
    }

    /// See [`CommandHandlers::create_branch`]
    pub async fn create_branch(&self, branch: String) -> Result<()> {
        self.run(move |handlers, session| handlers.create_branch(session, &branch))
            .await
    }

    /// See [`CommandHandlers::materialize_from_database`]
    pub async fn materialize_from_database(&self, db_path: PathBuf) -> Result<PathBuf> {
        self.run(move |handlers, _| handlers.materialize_from_database(&db_path))
            .await
    }

    /// See [`CommandHandlers::disconnect`]
    pub async fn disconnect(&self) -> Result<()> {
        self.run(|handlers, session| {
            handlers.disconnect(session);
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::testing::{RecordingHost, ScriptedEngine};
    use serde_json::json;

    const PROJECT: &str = "/proj/a.blend";

    fn connect_reply() -> serde_json::Value {
        json!({
            "current_branch_name": "main",
            "branches": ["main"],
            "current_checkpoint_hash": "h0",
            "checkpoints_on_this_branch": [["h0", "init"]],
        })
    }

    /// Delays every call before delegating to a scripted engine
    struct SlowEngine {
        delay: Duration,
        inner: ScriptedEngine,
    }

    impl Engine for SlowEngine {
        type Buffer = Vec<u8>;

        fn open(&mut self) -> Result<(), TransportError> {
            self.inner.open()
        }

        fn call(&mut self, request: &[u8]) -> Result<Vec<u8>, TransportError> {
            std::thread::sleep(self.delay);
            self.inner.call(request)
        }

        fn release(&mut self, buffer: Vec<u8>) {
            self.inner.release(buffer)
        }

        fn close(&mut self) {
            self.inner.close()
        }
    }

    #[tokio::test]
    async fn test_commands_through_facade() {
        let engine = ScriptedEngine::new()
            .reply_json(connect_reply())
            .reply_json(json!({
                "current_checkpoint_hash": "h1",
                "checkpoints_on_this_branch": [["h1", "wip"], ["h0", "init"]],
            }));
        let timeline =
            SharedTimeline::new(CommandHandlers::new(engine, RecordingHost::new(PROJECT)));

        timeline.connect(PathBuf::from(PROJECT)).await.unwrap();
        let hash = timeline.create_checkpoint("wip".to_string()).await.unwrap();

        let session = timeline.snapshot().unwrap();
        assert_eq!(session.current_checkpoint(), Some(&hash));
        assert_eq!(session.checkpoints().len(), 2);
        assert!(!timeline.is_busy());
    }

    #[tokio::test]
    async fn test_precondition_errors_pass_through() {
        let timeline = SharedTimeline::new(CommandHandlers::new(
            ScriptedEngine::new(),
            RecordingHost::new(PROJECT),
        ));

        let err = timeline.switch_branch("main".to_string()).await.unwrap_err();
        assert!(matches!(err, TimelineError::NotConnected));
    }

    #[tokio::test]
    async fn test_concurrent_commands_are_serialized() {
        let engine = ScriptedEngine::new()
            .reply_json(connect_reply())
            .reply_json(json!({"current_branch_name": "a", "branches": ["main", "a"]}))
            .reply_json(json!({"current_branch_name": "b", "branches": ["main", "a", "b"]}));
        let stats = engine.stats();
        let timeline =
            SharedTimeline::new(CommandHandlers::new(engine, RecordingHost::new(PROJECT)));
        timeline.connect(PathBuf::from(PROJECT)).await.unwrap();

        let (a, b) = tokio::join!(
            timeline.create_branch("a".to_string()),
            timeline.create_branch("b".to_string()),
        );
        a.unwrap();
        b.unwrap();

        let session = timeline.snapshot().unwrap();
        assert_eq!(session.branches().len(), 3);
        session.validate().unwrap();

        let stats = stats.lock();
        assert_eq!(stats.calls, 3);
        assert_eq!(stats.releases, 3);
    }

    #[tokio::test]
    async fn test_timeout_returns_early_but_command_completes() {
        let engine = SlowEngine {
            delay: Duration::from_millis(400),
            inner: ScriptedEngine::new().reply_json(connect_reply()),
        };
        let timeline =
            SharedTimeline::new(CommandHandlers::new(engine, RecordingHost::new(PROJECT)))
                .with_timeout(Some(Duration::from_millis(50)));

        let err = timeline.connect(PathBuf::from(PROJECT)).await.unwrap_err();
        assert!(matches!(err, TimelineError::Timeout(_)));

        let connected = timeline
            .clone()
            .with_timeout(None)
            .run(|_, session| Ok(session.is_connected()))
            .await
            .unwrap();
        assert!(connected);
    }

    #[tokio::test]
    async fn test_disconnect_resets_session() {
        let engine = ScriptedEngine::new().reply_json(connect_reply());
        let timeline =
            SharedTimeline::new(CommandHandlers::new(engine, RecordingHost::new(PROJECT)));

        timeline.connect(PathBuf::from(PROJECT)).await.unwrap();
        timeline.disconnect().await.unwrap();

        assert!(!timeline.snapshot().unwrap().is_connected());
    }
}
