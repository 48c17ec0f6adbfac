//! Keeps the bridge connected to a healthy engine.
//!
//! One actor task owns the engine process, the request queue, and the status
//! board, and serializes every interaction with them. Failed starts are
//! retried with capped linear backoff; a periodic poll catches any missed
//! reconnect path. All completions are delivered through channels — nothing
//! here blocks a caller.

use std::cmp;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::status::{EngineStatus, StatusBoard};
use crate::uci::{AnalysisInfo, Message};

use super::process::{Engine, EngineEvent, State};
use super::queue::{AnalysisResult, CallerId, Completion, Dispatch, RequestError, RequestQueue};
use super::{MAX_RETRY, MAX_RETRY_DELAY, POLL_INTERVAL, RETRY_DELAY, TIMEOUT_MARGIN};

enum Cmd {
    /// External trigger (user-initiated connect/test); resets the attempt
    /// counter before trying again.
    Connect,
    EnsureConnected,
    Analyze {
        caller: CallerId,
        fen: String,
        depth: Option<u32>,
        time_limit: Duration,
        done: Completion,
    },
    Cancel {
        caller: CallerId,
    },
    RequestTimeout {
        caller: CallerId,
        seq: u64,
    },
    Shutdown {
        done: oneshot::Sender<()>,
    },
}

/// Cloneable front door to the supervisor task.
#[derive(Clone)]
pub struct BridgeHandle {
    cmds: mpsc::UnboundedSender<Cmd>,
    status: watch::Receiver<EngineStatus>,
    info: broadcast::Sender<AnalysisInfo>,
}

impl BridgeHandle {
    /// Submits an analysis request and waits for its completion: a result,
    /// an error, or a timeout — never silence.
    pub async fn analyze(
        &self,
        caller: CallerId,
        fen: String,
        depth: Option<u32>,
        time_limit: Duration,
    ) -> Result<AnalysisResult, RequestError> {
        let (done, rx) = oneshot::channel();
        self.cmds
            .send(Cmd::Analyze {
                caller,
                fen,
                depth,
                time_limit,
                done,
            })
            .map_err(|_| RequestError::EngineFailed("bridge stopped".into()))?;
        rx.await.unwrap_or(Err(RequestError::Cancelled))
    }

    /// Best-effort cancellation of a caller's outstanding request.
    pub fn cancel(&self, caller: CallerId) {
        let _ = self.cmds.send(Cmd::Cancel { caller });
    }

    /// User-initiated connect: resets the attempt counter and retries even
    /// after automatic retries gave up.
    pub fn connect(&self) {
        let _ = self.cmds.send(Cmd::Connect);
    }

    pub fn status(&self) -> watch::Receiver<EngineStatus> {
        self.status.clone()
    }

    /// Info updates are broadcast per session; there is a single active
    /// analysis at a time.
    pub fn subscribe_info(&self) -> broadcast::Receiver<AnalysisInfo> {
        self.info.subscribe()
    }

    /// Quits the engine (with its grace period) and stops the supervisor.
    pub async fn shutdown(&self) {
        let (done, rx) = oneshot::channel();
        if self.cmds.send(Cmd::Shutdown { done }).is_ok() {
            let _ = rx.await;
        }
    }
}

pub struct Supervisor {
    cmds: mpsc::UnboundedReceiver<Cmd>,
    cmd_tx: mpsc::UnboundedSender<Cmd>,
    config: EngineConfig,
    status: StatusBoard,
    engine: Option<Engine>,
    queue: RequestQueue,
    info_tx: broadcast::Sender<AnalysisInfo>,
    retry_at: Option<time::Instant>,
    /// Rate-limit bookkeeping for connection attempts.
    last_attempt: Option<time::Instant>,
}

impl Supervisor {
    /// Spawns the supervisor task and immediately begins connecting.
    pub fn spawn(config: EngineConfig) -> BridgeHandle {
        let (cmd_tx, cmds) = mpsc::unbounded_channel();
        let (info_tx, _) = broadcast::channel(64);
        let status = StatusBoard::new();
        let handle = BridgeHandle {
            cmds: cmd_tx.clone(),
            status: status.subscribe(),
            info: info_tx.clone(),
        };
        let _ = cmd_tx.send(Cmd::EnsureConnected);
        let supervisor = Self {
            cmds,
            cmd_tx,
            config,
            status,
            engine: None,
            queue: RequestQueue::new(),
            info_tx,
            retry_at: None,
            last_attempt: None,
        };
        tokio::spawn(supervisor.run());
        handle
    }

    async fn run(mut self) {
        let mut tick = time::interval(POLL_INTERVAL);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tick.reset();
        loop {
            tokio::select! {
                cmd = self.cmds.recv() => match cmd {
                    Some(cmd) => {
                        if self.handle_cmd(cmd).await {
                            break;
                        }
                    }
                    None => break,
                },
                event = next_event(&mut self.engine) => self.handle_event(event).await,
                _ = retry_timer(self.retry_at) => {
                    self.retry_at = None;
                    self.ensure_connected(false).await;
                }
                _ = tick.tick() => self.poll().await,
            }
        }
        if let Some(engine) = self.engine.take() {
            engine.shutdown().await;
        }
    }

    /// Returns `true` when the supervisor should stop.
    async fn handle_cmd(&mut self, cmd: Cmd) -> bool {
        match cmd {
            Cmd::Connect => self.ensure_connected(true).await,
            Cmd::EnsureConnected => self.ensure_connected(false).await,
            Cmd::Analyze {
                caller,
                fen,
                depth,
                time_limit,
                done,
            } => self.submit(caller, fen, depth, time_limit, done).await,
            Cmd::Cancel { caller } => self.cancel(caller).await,
            Cmd::RequestTimeout { caller, seq } => {
                if self.queue.on_timeout(caller, seq) {
                    debug!(caller = caller.0, "request timed out");
                }
            }
            Cmd::Shutdown { done } => {
                if let Some(engine) = self.engine.take() {
                    engine.shutdown().await;
                }
                self.queue
                    .fail_all(&RequestError::EngineFailed("bridge shut down".into()));
                self.status.update(|s| {
                    s.connected = false;
                    s.error = None;
                });
                let _ = done.send(());
                return true;
            }
        }
        false
    }

    async fn handle_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Message(Message::Info(info)) => {
                self.queue.on_info(&info);
                let _ = self.info_tx.send(info);
            }
            EngineEvent::Message(Message::BestMove(best_move)) => {
                if let Some(engine) = self.engine.as_mut() {
                    engine.search_finished();
                }
                let next = self.queue.on_best_move(&best_move);
                self.dispatch(next).await;
            }
            EngineEvent::Message(_) => {}
            EngineEvent::Eof => self.on_engine_exit().await,
        }
    }

    /// No-op when already connected and ready, when an attempt happened too
    /// recently, or when automatic attempts are exhausted (unless external).
    async fn ensure_connected(&mut self, external: bool) {
        if self.engine.is_some() && self.status.snapshot().ready {
            return;
        }
        if external {
            self.status.update(|s| s.connection_attempts = 0);
        }
        if let Some(last) = self.last_attempt {
            let since = last.elapsed();
            if since < RETRY_DELAY {
                // rate limited; come back when the window opens
                if self.retry_at.is_none() {
                    self.retry_at = Some(time::Instant::now() + (RETRY_DELAY - since));
                }
                return;
            }
        }
        if !external && self.status.snapshot().connection_attempts >= MAX_RETRY {
            return;
        }

        self.last_attempt = Some(time::Instant::now());
        self.status.update(|s| s.connection_attempts += 1);
        let attempt = self.status.snapshot().connection_attempts;
        info!(attempt, "connecting to engine");

        if let Err(e) = self.config.validate() {
            error!(error = %e, "engine start failed");
            self.status.update(|s| {
                s.connected = false;
                s.error = Some(e.to_string());
            });
            self.schedule_retry();
            return;
        }
        match Engine::start(&self.config).await {
            Ok(engine) => {
                self.engine = Some(engine);
                self.retry_at = None;
                self.status.update(|s| {
                    s.connected = true;
                    s.ready = true;
                    s.error = None;
                    s.connection_attempts = 0;
                });
            }
            Err(e) => {
                warn!(error = %e, "engine start failed");
                self.status.update(|s| {
                    s.connected = false;
                    s.error = Some(e.to_string());
                });
                self.schedule_retry();
            }
        }
    }

    fn schedule_retry(&mut self) {
        let attempts = self.status.snapshot().connection_attempts;
        if attempts < MAX_RETRY {
            let delay = retry_delay(attempts);
            info!(delay_secs = delay.as_secs(), "scheduling reconnect");
            self.retry_at = Some(time::Instant::now() + delay);
        } else {
            error!(attempts, "giving up on automatic reconnects");
            self.status.update(|s| {
                s.error = Some(
                    "failed to connect after multiple attempts; \
                     trigger a reconnect to try again"
                        .into(),
                );
            });
        }
    }

    async fn poll(&mut self) {
        let snapshot = self.status.snapshot();
        if !(snapshot.connected && snapshot.ready) {
            self.ensure_connected(false).await;
        }
    }

    async fn submit(
        &mut self,
        caller: CallerId,
        fen: String,
        depth: Option<u32>,
        time_limit: Duration,
        done: Completion,
    ) {
        // definitely unavailable: reject immediately instead of queueing
        if self.engine.is_none() || !self.status.snapshot().ready {
            let _ = done.send(Err(RequestError::NotReady));
            return;
        }
        let (seq, dispatch) = self.queue.submit(caller, fen, depth, done);
        self.arm_timeout(caller, seq, time_limit);
        self.dispatch(dispatch).await;
    }

    async fn dispatch(&mut self, dispatch: Option<Dispatch>) {
        let Some(dispatch) = dispatch else { return };
        let Some(engine) = self.engine.as_mut() else {
            self.queue.abort_dispatch(
                dispatch.caller,
                RequestError::EngineFailed("engine not running".into()),
            );
            return;
        };
        let depth = dispatch.depth.unwrap_or(self.config.depth);
        if let Err(e) = engine.submit_analysis(&dispatch.fen, depth).await {
            warn!(error = %e, caller = dispatch.caller.0, "analysis dispatch failed");
            self.queue
                .abort_dispatch(dispatch.caller, RequestError::EngineFailed(e.to_string()));
        }
    }

    /// The per-request wall-clock timer, independent of the engine's own
    /// time management. Firing it abandons the one request, nothing else.
    fn arm_timeout(&self, caller: CallerId, seq: u64, time_limit: Duration) {
        let cmds = self.cmd_tx.clone();
        let deadline = time_limit + TIMEOUT_MARGIN;
        tokio::spawn(async move {
            time::sleep(deadline).await;
            let _ = cmds.send(Cmd::RequestTimeout { caller, seq });
        });
    }

    async fn cancel(&mut self, caller: CallerId) {
        let was_active = self.queue.cancel(caller);
        if let Some(engine) = self.engine.as_mut() {
            if engine.state() == State::Analyzing {
                if let Err(e) = engine.stop().await {
                    warn!(error = %e, "stop command failed");
                }
            }
        }
        if was_active {
            debug!(caller = caller.0, "cancelled active analysis");
        }
    }

    async fn on_engine_exit(&mut self) {
        let code = match self.engine.take() {
            Some(engine) => engine.reap().await,
            None => None,
        };
        let error = code.map(|code| format!("engine exited with code {code}"));
        match &error {
            Some(error) => error!(error = %error, "engine process exited"),
            None => info!("engine process exited"),
        }
        self.queue.fail_all(&RequestError::EngineFailed(
            error.clone().unwrap_or_else(|| "engine exited".into()),
        ));
        self.status.update(|s| {
            s.connected = false;
            s.ready = false;
            s.error = error;
        });
        // always re-attempt after a lost session, subject to the same cap
        self.schedule_retry();
    }
}

/// Linear backoff, capped: 5s, 10s, 15s … up to 30s.
fn retry_delay(attempts: u32) -> Duration {
    cmp::min(RETRY_DELAY * attempts, MAX_RETRY_DELAY)
}

async fn next_event(engine: &mut Option<Engine>) -> EngineEvent {
    match engine {
        Some(engine) => engine.event().await,
        None => std::future::pending().await,
    }
}

async fn retry_timer(at: Option<time::Instant>) {
    match at {
        Some(at) => time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_is_linear_and_capped() {
        assert_eq!(retry_delay(0), Duration::ZERO);
        assert_eq!(retry_delay(1), Duration::from_secs(5));
        assert_eq!(retry_delay(2), Duration::from_secs(10));
        assert_eq!(retry_delay(3), Duration::from_secs(15));
        assert_eq!(retry_delay(7), Duration::from_secs(30));
    }
}
