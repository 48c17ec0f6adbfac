//! Owns one spawned engine process end-to-end: startup handshake, command
//! forwarding, and the reader task that turns the raw stdout stream into
//! parsed messages.

use std::io;
use std::process::Stdio;

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, ChildStdout, Command as ProcessCommand};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::uci::{parse, Command, LineBuffer, Message};
use crate::warn;

use super::{HANDSHAKE_TIMEOUT, SHUTDOWN_GRACE};

/// An [`Engine`] exists only once its process is up, so its life begins in
/// `Handshaking`.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub enum State {
    Handshaking,
    Ready,
    Analyzing,
    Stopped,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to start engine: {0}")]
    Spawn(#[source] io::Error),
    #[error("engine initialization timeout")]
    HandshakeTimeout,
    #[error("engine exited during startup")]
    StartupExit,
    #[error("engine stream error: {0}")]
    Io(#[from] io::Error),
    #[error("engine is not ready (state: {0:?})")]
    NotReady(State),
}

#[derive(Debug)]
pub enum EngineEvent {
    Message(Message),
    /// The output stream closed; the process has exited or is about to.
    Eof,
}

/// A running engine process. Dropping it kills the child; no process
/// outlives its manager across reconnects.
pub struct Engine {
    child: Child,
    stdin: ChildStdin,
    events: mpsc::UnboundedReceiver<EngineEvent>,
    state: State,
}

impl Engine {
    /// Spawns the engine, writes the initialization sequence, and waits for
    /// both handshake acknowledgements. On any failure the process is torn
    /// down before returning.
    pub async fn start(config: &EngineConfig) -> Result<Self, EngineError> {
        debug!(path = %config.engine_path, "spawning engine");
        let mut cmd = ProcessCommand::new(&config.engine_path);
        if !config.weights_path.is_empty() {
            cmd.arg(format!("--weights={}", config.weights_path));
        }
        let mut child = cmd
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(EngineError::Spawn)?;

        let stdin = child.stdin.take().expect("stdin was piped");
        let stdout = child.stdout.take().expect("stdout was piped");
        let (tx, events) = mpsc::unbounded_channel();
        tokio::spawn(read_loop(stdout, tx));

        let mut engine = Self {
            child,
            stdin,
            events,
            state: State::Handshaking,
        };

        let init = [
            Command::Uci,
            Command::SetOption {
                name: "Threads".into(),
                value: config.threads.to_string(),
            },
            Command::SetOption {
                name: "MultiPV".into(),
                value: config.multipv.to_string(),
            },
            Command::UciNewGame,
            Command::IsReady,
        ];
        for cmd in &init {
            engine.send(cmd).await?;
        }

        match timeout(HANDSHAKE_TIMEOUT, engine.handshake()).await {
            Ok(Ok(())) => {
                engine.state = State::Ready;
                info!("engine handshake complete");
                Ok(engine)
            }
            Ok(Err(e)) => {
                engine.kill().await;
                Err(e)
            }
            Err(_) => {
                engine.kill().await;
                Err(EngineError::HandshakeTimeout)
            }
        }
    }

    /// `uciok` and `readyok` may arrive in either order; each is tracked
    /// independently and the engine is ready only once both are in.
    async fn handshake(&mut self) -> Result<(), EngineError> {
        let mut uci_ok = false;
        let mut ready_ok = false;
        while !(uci_ok && ready_ok) {
            match self.events.recv().await {
                Some(EngineEvent::Message(Message::UciOk)) => uci_ok = true,
                Some(EngineEvent::Message(Message::ReadyOk)) => ready_ok = true,
                Some(EngineEvent::Message(_)) => {}
                Some(EngineEvent::Eof) | None => return Err(EngineError::StartupExit),
            }
        }
        Ok(())
    }

    pub fn state(&self) -> State {
        self.state
    }

    async fn send(&mut self, cmd: &Command) -> Result<(), EngineError> {
        debug!(cmd = %cmd, "engine <");
        self.stdin.write_all(format!("{cmd}\n").as_bytes()).await?;
        self.stdin.flush().await?;
        Ok(())
    }

    /// Writes a position and a depth-bounded search. Only valid in `Ready`;
    /// calling while analyzing or stopped is a caller error.
    pub async fn submit_analysis(&mut self, fen: &str, depth: u32) -> Result<(), EngineError> {
        if self.state != State::Ready {
            return Err(EngineError::NotReady(self.state));
        }
        self.send(&Command::Position { fen: fen.to_string() }).await?;
        self.send(&Command::Go { depth }).await?;
        self.state = State::Analyzing;
        Ok(())
    }

    /// Advisory stop; safe in any state, a no-op for an idle engine.
    pub async fn stop(&mut self) -> Result<(), EngineError> {
        self.send(&Command::Stop).await
    }

    /// Marks the current search finished (a best move arrived).
    pub fn search_finished(&mut self) {
        if self.state == State::Analyzing {
            self.state = State::Ready;
        }
    }

    /// Next parsed message or `Eof`, in stream order.
    pub async fn event(&mut self) -> EngineEvent {
        self.events.recv().await.unwrap_or(EngineEvent::Eof)
    }

    /// Asks the engine to quit, grants a grace period, then kills it.
    pub async fn shutdown(mut self) {
        let _ = self.send(&Command::Quit).await;
        if timeout(SHUTDOWN_GRACE, self.child.wait()).await.is_err() {
            let _ = self.child.start_kill();
            let _ = self.child.wait().await;
        }
    }

    /// Collects the exit status after the stream closed. Returns the exit
    /// code when it is nonzero.
    pub async fn reap(mut self) -> Option<i32> {
        match timeout(SHUTDOWN_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => status.code().filter(|&code| code != 0),
            _ => {
                let _ = self.child.start_kill();
                None
            }
        }
    }

    async fn kill(&mut self) {
        let _ = self.child.start_kill();
        let _ = self.child.wait().await;
        self.state = State::Stopped;
    }
}

async fn read_loop(mut stdout: ChildStdout, tx: mpsc::UnboundedSender<EngineEvent>) {
    let mut lines = LineBuffer::new();
    let mut warn = warn::from_fn(|e: parse::Error| {
        tracing::warn!(problem = %e, "skipping malformed engine output");
    });
    let mut buf = [0u8; 4096];
    loop {
        let n = match stdout.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        for line in lines.feed(&buf[..n]) {
            if !forward(&line, &mut warn, &tx) {
                return;
            }
        }
    }
    if let Some(line) = lines.flush() {
        forward(&line, &mut warn, &tx);
    }
    let _ = tx.send(EngineEvent::Eof);
}

/// Returns `false` once the receiving side is gone.
fn forward(
    line: &str,
    warn: &mut impl warn::Sink<parse::Error>,
    tx: &mpsc::UnboundedSender<EngineEvent>,
) -> bool {
    if line.is_empty() {
        return true;
    }
    debug!(line = %line, "engine >");
    match parse::parse(line, warn) {
        Some(msg) => tx.send(EngineEvent::Message(msg)).is_ok(),
        None => true,
    }
}
