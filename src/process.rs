//! Engine hosted in a child process
//!
//! The engine reads one JSON request per line on stdin and answers with one
//! JSON response per line on stdout. The child is spawned on first use and
//! shut down when the handle is released: stdin is closed, the engine gets
//! `shutdown_grace` to finish writing and exit, and only then is it killed.

use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::ProcessEngineConfig;
use crate::error::TransportError;
use crate::transport::Engine;

struct Running {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

/// Engine speaking line-delimited JSON over a child process's stdio
pub struct ProcessEngine {
    config: ProcessEngineConfig,
    running: Option<Running>,
    exit_status: Option<ExitStatus>,
}

const EXIT_POLL: Duration = Duration::from_millis(10);

impl ProcessEngine {
    /// Configure an engine; nothing is spawned until the first call
    pub fn new(config: ProcessEngineConfig) -> Self {
        Self {
            config,
            running: None,
            exit_status: None,
        }
    }

    /// OS process id of the running engine
    pub fn pid(&self) -> Option<u32> {
        self.running.as_ref().map(|r| r.child.id())
    }

    /// How the last engine process ended, once it has been closed
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit_status
    }
}

/// Poll `child` until it exits or `grace` runs out
fn wait_for_exit(child: &mut Child, grace: Duration) -> std::io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + grace;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        thread::sleep(EXIT_POLL.min(deadline - now));
    }
}

impl Engine for ProcessEngine {
    type Buffer = Vec<u8>;

    fn open(&mut self) -> Result<(), TransportError> {
        let mut command = Command::new(&self.config.program);
        command
            .args(&self.config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        if let Some(dir) = &self.config.working_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(TransportError::Spawn)?;
        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(TransportError::EngineExited);
        };

        info!(
            program = %self.config.program.display(),
            pid = child.id(),
            "Spawned engine process"
        );

        self.running = Some(Running {
            child,
            stdin,
            stdout: BufReader::new(stdout),
        });
        Ok(())
    }

    fn call(&mut self, request: &[u8]) -> Result<Vec<u8>, TransportError> {
        let running = self.running.as_mut().ok_or(TransportError::EngineExited)?;

        running.stdin.write_all(request)?;
        running.stdin.write_all(b"\n")?;
        running.stdin.flush()?;

        let mut response = Vec::new();
        let read = running.stdout.read_until(b'\n', &mut response)?;
        if read == 0 {
            return Err(TransportError::EngineExited);
        }
        if response.last() == Some(&b'\n') {
            response.pop();
        }

        debug!(size = response.len(), "Engine process answered");
        Ok(response)
    }

    fn release(&mut self, buffer: Vec<u8>) {
        drop(buffer);
    }

    fn close(&mut self) {
        let Some(Running { mut child, stdin, stdout }) = self.running.take() else {
            return;
        };

        // EOF on stdin asks the engine to exit.
        drop(stdin);
        drop(stdout);

        let status = match wait_for_exit(&mut child, self.config.shutdown_grace) {
            Ok(Some(status)) => {
                debug!(status = %status, "Engine process exited");
                Some(status)
            }
            Ok(None) => {
                warn!(
                    grace = ?self.config.shutdown_grace,
                    "Engine process did not exit after stdin closed; killing it"
                );
                if let Err(e) = child.kill() {
                    warn!(error = %e, "Failed to stop engine process");
                }
                child.wait().ok()
            }
            Err(e) => {
                warn!(error = %e, "Failed to query engine process");
                None
            }
        };
        self.exit_status = status;
    }
}

impl Drop for ProcessEngine {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::error::TimelineError;
    use crate::protocol::{Command as EngineCommand, RestoreCheckpointReply};
    use crate::transport::Transport;
    use std::path::PathBuf;

    fn echo_engine() -> ProcessEngine {
        ProcessEngine::new(ProcessEngineConfig::new("cat"))
    }

    #[test]
    fn test_round_trip_through_child() {
        let mut transport = Transport::new(echo_engine());

        let first = transport.send(br#"{"current_checkpoint_hash":"h1"}"#).unwrap();
        let second = transport.send(b"{}").unwrap();

        assert_eq!(first, br#"{"current_checkpoint_hash":"h1"}"#.to_vec());
        assert_eq!(second, b"{}".to_vec());
        assert!(transport.engine().pid().is_some());
    }

    #[test]
    fn test_echoed_command_is_malformed_reply() {
        let mut transport = Transport::new(echo_engine());
        let command = EngineCommand::RestoreCheckpoint {
            db_path: PathBuf::from("/p/a.blend.timeline"),
            path_to_blend: PathBuf::from("/p/a.blend"),
            hash: "h1".into(),
        };

        let err = transport.execute::<RestoreCheckpointReply>(&command).unwrap_err();
        assert!(matches!(err, TimelineError::Malformed(_)));
    }

    #[test]
    fn test_shutdown_stops_child() {
        let mut transport = Transport::new(echo_engine());
        transport.send(b"{}").unwrap();

        transport.shutdown();

        assert!(transport.engine().pid().is_none());
        assert!(matches!(transport.send(b"{}"), Err(TransportError::Released)));
    }

    #[test]
    fn test_engine_exits_on_eof_without_being_killed() {
        let mut transport = Transport::new(echo_engine());
        transport.send(b"{}").unwrap();

        transport.shutdown();

        let status = transport.engine().exit_status().unwrap();
        assert!(status.success());
    }

    #[test]
    fn test_engine_ignoring_eof_is_killed_after_grace() {
        let config = ProcessEngineConfig::new("sleep")
            .arg("30")
            .shutdown_grace(Duration::from_millis(50));
        let mut engine = ProcessEngine::new(config);
        engine.open().unwrap();

        let started = Instant::now();
        engine.close();

        assert!(started.elapsed() < Duration::from_secs(10));
        let status = engine.exit_status().unwrap();
        assert!(!status.success());
        assert!(status.code().is_none());
    }

    #[test]
    fn test_missing_program_fails_to_spawn() {
        let engine = ProcessEngine::new(ProcessEngineConfig::new("/nonexistent/timeline-engine"));
        let mut transport = Transport::new(engine);

        assert!(matches!(transport.send(b"{}"), Err(TransportError::Spawn(_))));
        assert!(!transport.is_open());
    }

    #[test]
    fn test_engine_that_exits_is_reported() {
        let engine = ProcessEngine::new(ProcessEngineConfig::new("true"));
        let mut transport = Transport::new(engine);

        let result = transport.send(b"{}");
        assert!(matches!(
            result,
            Err(TransportError::EngineExited) | Err(TransportError::Io(_))
        ));
    }
}
