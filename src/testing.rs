//! Test doubles for the engine and the host
//!
//! [`ScriptedEngine`] answers from a queue of canned responses and counts
//! opens, calls, releases and closes. [`RecordingHost`] simulates the
//! authoring application. Both can share a [`Journal`] so tests can assert the
//! interleaving of engine and host events.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use parking_lot::Mutex;
use serde_json::Value;

use crate::error::{HostAction, HostError, TransportError};
use crate::host::Host;
use crate::transport::Engine;

/// Something observable that happened during a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The engine received a command with this wire name
    Request(String),
    /// A response buffer went back to the engine
    Release,
    /// The host saved the active file
    Save,
    /// The host discarded and reloaded the active file
    Reload,
    /// The host opened a path
    Open(PathBuf),
    /// The host wait indicator changed
    Busy(bool),
}

/// Shared, ordered event log
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<Event>>>);

impl Journal {
    /// Create an empty journal
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event
    pub fn push(&self, event: Event) {
        self.0.lock().push(event);
    }

    /// Snapshot of all events so far
    pub fn events(&self) -> Vec<Event> {
        self.0.lock().clone()
    }

    /// Index of the first occurrence of `event`
    pub fn position(&self, event: &Event) -> Option<usize> {
        self.0.lock().iter().position(|e| e == event)
    }

    /// Number of occurrences of `event`
    pub fn count(&self, event: &Event) -> usize {
        self.0.lock().iter().filter(|e| *e == event).count()
    }
}

/// Counters kept by [`ScriptedEngine`]
#[derive(Debug, Clone, Default)]
pub struct EngineStats {
    pub opens: usize,
    pub calls: usize,
    pub releases: usize,
    pub closes: usize,
    /// Every request received, parsed as JSON (`Null` if it was not JSON)
    pub requests: Vec<Value>,
}

enum Scripted {
    Reply(Vec<u8>),
    Fail,
}

/// Engine double that replays canned responses in order
pub struct ScriptedEngine {
    script: VecDeque<Scripted>,
    stats: Arc<Mutex<EngineStats>>,
    journal: Journal,
}

impl ScriptedEngine {
    /// Create an engine with an empty script
    pub fn new() -> Self {
        Self {
            script: VecDeque::new(),
            stats: Arc::new(Mutex::new(EngineStats::default())),
            journal: Journal::new(),
        }
    }

    /// Queue a raw response
    pub fn reply(mut self, response: impl Into<String>) -> Self {
        self.script.push_back(Scripted::Reply(response.into().into_bytes()));
        self
    }

    /// Queue a JSON response
    pub fn reply_json(self, response: Value) -> Self {
        self.reply(response.to_string())
    }

    /// Queue a transport failure
    pub fn fail_next(mut self) -> Self {
        self.script.push_back(Scripted::Fail);
        self
    }

    /// Record events into a shared journal
    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = journal;
        self
    }

    /// Shared counters, readable after the engine has been moved
    pub fn stats(&self) -> Arc<Mutex<EngineStats>> {
        Arc::clone(&self.stats)
    }
}

impl Default for ScriptedEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for ScriptedEngine {
    type Buffer = Vec<u8>;

    fn open(&mut self) -> Result<(), TransportError> {
        self.stats.lock().opens += 1;
        Ok(())
    }

    fn call(&mut self, request: &[u8]) -> Result<Vec<u8>, TransportError> {
        let parsed: Value = serde_json::from_slice(request).unwrap_or(Value::Null);
        let name = parsed
            .get("command")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        {
            let mut stats = self.stats.lock();
            stats.calls += 1;
            stats.requests.push(parsed);
        }
        self.journal.push(Event::Request(name));

        match self.script.pop_front() {
            Some(Scripted::Reply(bytes)) => Ok(bytes),
            Some(Scripted::Fail) | None => Err(TransportError::EngineExited),
        }
    }

    fn release(&mut self, _buffer: Vec<u8>) {
        self.stats.lock().releases += 1;
        self.journal.push(Event::Release);
    }

    fn close(&mut self) {
        self.stats.lock().closes += 1;
    }
}

/// Host double that records what the session asked it to do
pub struct RecordingHost {
    active_file: Option<PathBuf>,
    journal: Journal,
    failing: Option<HostAction>,
}

impl RecordingHost {
    /// Host with a saved document at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            active_file: Some(path.into()),
            journal: Journal::new(),
            failing: None,
        }
    }

    /// Host with an unsaved document
    pub fn unsaved() -> Self {
        Self {
            active_file: None,
            journal: Journal::new(),
            failing: None,
        }
    }

    /// Make one primitive fail
    pub fn failing(mut self, action: HostAction) -> Self {
        self.failing = Some(action);
        self
    }

    /// Record events into a shared journal
    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = journal;
        self
    }

    /// The journal this host writes to
    pub fn journal(&self) -> Journal {
        self.journal.clone()
    }

    fn check(&self, action: HostAction) -> Result<(), HostError> {
        if self.failing == Some(action) {
            return Err(HostError(format!("simulated {action} failure")));
        }
        Ok(())
    }
}

impl Host for RecordingHost {
    fn active_file(&self) -> Option<PathBuf> {
        self.active_file.clone()
    }

    fn save(&mut self) -> Result<(), HostError> {
        self.check(HostAction::Save)?;
        self.journal.push(Event::Save);
        Ok(())
    }

    fn discard_and_reload(&mut self) -> Result<(), HostError> {
        self.check(HostAction::Reload)?;
        self.journal.push(Event::Reload);
        Ok(())
    }

    fn open(&mut self, path: &Path) -> Result<(), HostError> {
        self.check(HostAction::Open)?;
        self.active_file = Some(path.to_path_buf());
        self.journal.push(Event::Open(path.to_path_buf()));
        Ok(())
    }

    fn set_busy(&mut self, busy: bool) {
        self.journal.push(Event::Busy(busy));
    }
}
