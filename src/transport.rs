//! Engine transport with scoped ownership of the handle and response buffers
//!
//! ```text
//! Transport ──owns──▶ EngineHandle ──opens lazily, closes once──▶ Engine
//!     │
//!     └─ exchange(): call ─▶ ResponseBuffer ─▶ decode ─▶ drop = release
//! ```
//!
//! A response buffer belongs to the engine until it is handed back through
//! [`Engine::release`]. [`ResponseBuffer`] borrows the engine mutably, so a
//! buffer can neither outlive the handle nor be released twice.

use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Result, TransportError};
use crate::protocol::{self, Command};

/// A versioning engine reachable through a request/response primitive
pub trait Engine {
    /// Engine-owned response storage
    type Buffer: AsRef<[u8]>;

    /// Acquire engine resources. Called once, before the first call.
    fn open(&mut self) -> Result<(), TransportError>;

    /// Send one request and block until the engine answers
    fn call(&mut self, request: &[u8]) -> Result<Self::Buffer, TransportError>;

    /// Hand a response buffer back to the engine
    fn release(&mut self, buffer: Self::Buffer);

    /// Release engine resources. Called at most once, after a successful `open`.
    fn close(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandleState {
    Idle,
    Open,
    Released,
}

/// Process-lifetime handle to an engine
pub struct EngineHandle<E: Engine> {
    engine: E,
    state: HandleState,
}

impl<E: Engine> EngineHandle<E> {
    /// Wrap an engine without opening it
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            state: HandleState::Idle,
        }
    }

    /// Open the engine on first use
    pub fn acquire(&mut self) -> Result<&mut E, TransportError> {
        match self.state {
            HandleState::Released => return Err(TransportError::Released),
            HandleState::Idle => {
                self.engine.open()?;
                self.state = HandleState::Open;
                info!("Opened engine handle");
            }
            HandleState::Open => {}
        }
        Ok(&mut self.engine)
    }

    /// Close the engine. Later calls and `acquire` are refused.
    pub fn release(&mut self) {
        if self.state == HandleState::Open {
            self.engine.close();
            info!("Released engine handle");
        }
        self.state = HandleState::Released;
    }

    /// Whether the engine has been opened and not yet released
    pub fn is_open(&self) -> bool {
        self.state == HandleState::Open
    }

    /// Whether the handle has been released
    pub fn is_released(&self) -> bool {
        self.state == HandleState::Released
    }

    /// Borrow the wrapped engine
    pub fn engine(&self) -> &E {
        &self.engine
    }
}

impl<E: Engine> Drop for EngineHandle<E> {
    fn drop(&mut self) {
        self.release();
    }
}

/// A response buffer that goes back to the engine when dropped
pub struct ResponseBuffer<'e, E: Engine> {
    engine: &'e mut E,
    buffer: Option<E::Buffer>,
}

impl<'e, E: Engine> ResponseBuffer<'e, E> {
    /// Take ownership of a buffer the engine just returned
    pub fn new(engine: &'e mut E, buffer: E::Buffer) -> Self {
        Self {
            engine,
            buffer: Some(buffer),
        }
    }

    /// Response bytes
    pub fn bytes(&self) -> &[u8] {
        match &self.buffer {
            Some(buffer) => buffer.as_ref(),
            None => &[],
        }
    }
}

impl<E: Engine> Drop for ResponseBuffer<'_, E> {
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            self.engine.release(buffer);
        }
    }
}

/// Sequential request/response channel to the engine
pub struct Transport<E: Engine> {
    handle: EngineHandle<E>,
}

impl<E: Engine> Transport<E> {
    /// Create a transport; the engine is opened on the first send
    pub fn new(engine: E) -> Self {
        Self {
            handle: EngineHandle::new(engine),
        }
    }

    /// Send raw request bytes and return a copy of the response
    pub fn send(&mut self, request: &[u8]) -> Result<Vec<u8>, TransportError> {
        self.exchange(request, <[u8]>::to_vec)
    }

    /// Send raw request bytes and read the response in place.
    ///
    /// The buffer is released after `read` returns, on every path.
    pub fn exchange<T>(
        &mut self,
        request: &[u8],
        read: impl FnOnce(&[u8]) -> T,
    ) -> Result<T, TransportError> {
        let engine = self.handle.acquire()?;
        let buffer = engine.call(request)?;
        let response = ResponseBuffer::new(engine, buffer);
        let value = read(response.bytes());
        drop(response);
        Ok(value)
    }

    /// Encode a command, send it and decode the reply
    pub fn execute<R: DeserializeOwned>(&mut self, command: &Command) -> Result<R> {
        let request_id = Uuid::new_v4();
        let request = command.encode()?;

        debug!(
            request_id = %request_id,
            command = command.name(),
            size = request.len(),
            "Sending engine command"
        );

        let outcome = self.exchange(&request, protocol::decode::<R>)?;

        match &outcome {
            Ok(_) => debug!(request_id = %request_id, command = command.name(), "Engine command succeeded"),
            Err(e) => warn!(request_id = %request_id, command = command.name(), error = %e, "Engine command failed"),
        }

        outcome
    }

    /// Release the engine handle ahead of drop
    pub fn shutdown(&mut self) {
        self.handle.release();
    }

    /// Whether the engine has been opened and not yet released
    pub fn is_open(&self) -> bool {
        self.handle.is_open()
    }

    /// Borrow the underlying engine
    pub fn engine(&self) -> &E {
        self.handle.engine()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TimelineError;
    use crate::protocol::RestoreCheckpointReply;
    use crate::testing::ScriptedEngine;
    use std::path::PathBuf;

    fn restore_command() -> Command {
        Command::RestoreCheckpoint {
            db_path: PathBuf::from("/p/a.blend.timeline"),
            path_to_blend: PathBuf::from("/p/a.blend"),
            hash: "h1".into(),
        }
    }

    #[test]
    fn test_engine_opened_lazily_once() {
        let engine = ScriptedEngine::new()
            .reply(r#"{"current_checkpoint_hash":"h1"}"#)
            .reply(r#"{"current_checkpoint_hash":"h2"}"#);
        let stats = engine.stats();
        let mut transport = Transport::new(engine);

        assert_eq!(stats.lock().opens, 0);
        assert!(!transport.is_open());

        transport.send(b"{}").unwrap();
        transport.send(b"{}").unwrap();

        assert_eq!(stats.lock().opens, 1);
        assert!(transport.is_open());
    }

    #[test]
    fn test_every_response_released_once() {
        let engine = ScriptedEngine::new()
            .reply(r#"{"current_checkpoint_hash":"h1"}"#)
            .reply(r#"{"error":"no such checkpoint"}"#)
            .reply("garbage");
        let stats = engine.stats();
        let mut transport = Transport::new(engine);

        let ok: RestoreCheckpointReply = transport.execute(&restore_command()).unwrap();
        assert_eq!(ok.current_checkpoint_hash.as_str(), "h1");

        let failed = transport.execute::<RestoreCheckpointReply>(&restore_command());
        assert!(matches!(failed, Err(TimelineError::Engine(_))));

        let malformed = transport.execute::<RestoreCheckpointReply>(&restore_command());
        assert!(matches!(malformed, Err(TimelineError::Malformed(_))));

        let stats = stats.lock();
        assert_eq!(stats.calls, 3);
        assert_eq!(stats.releases, 3);
    }

    #[test]
    fn test_release_happens_after_read() {
        let engine = ScriptedEngine::new().reply("payload");
        let stats = engine.stats();
        let mut transport = Transport::new(engine);

        let releases_seen_while_reading = transport
            .exchange(b"{}", |bytes| {
                assert_eq!(bytes, b"payload");
                stats.lock().releases
            })
            .unwrap();

        assert_eq!(releases_seen_while_reading, 0);
        assert_eq!(stats.lock().releases, 1);
    }

    #[test]
    fn test_transport_failure_leaves_nothing_to_release() {
        let engine = ScriptedEngine::new().fail_next();
        let stats = engine.stats();
        let mut transport = Transport::new(engine);

        let err = transport.send(b"{}").unwrap_err();
        assert!(matches!(err, TransportError::EngineExited));
        assert_eq!(stats.lock().releases, 0);
    }

    #[test]
    fn test_handle_closed_exactly_once() {
        let engine = ScriptedEngine::new().reply("{}");
        let stats = engine.stats();
        {
            let mut transport = Transport::new(engine);
            transport.send(b"{}").unwrap();
            transport.shutdown();
            assert!(matches!(transport.send(b"{}"), Err(TransportError::Released)));
        }

        let stats = stats.lock();
        assert_eq!(stats.closes, 1);
        assert_eq!(stats.calls, 1);
    }

    #[test]
    fn test_unopened_handle_is_never_closed() {
        let engine = ScriptedEngine::new();
        let stats = engine.stats();
        drop(Transport::new(engine));

        let stats = stats.lock();
        assert_eq!(stats.opens, 0);
        assert_eq!(stats.closes, 0);
    }
}
