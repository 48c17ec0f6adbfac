//! Single-flight, timeout-bound request tracking.
//!
//! The queue is pure state: it decides what should happen and the supervisor
//! performs the I/O. At most one request exists per caller; dispatch to the
//! engine is serialized FIFO because the engine itself is strictly
//! single-request. A second caller submitting while the engine is busy waits
//! for its turn rather than being rejected.

use std::collections::{HashMap, VecDeque};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::debug;

use crate::uci::AnalysisInfo;

/// Opaque caller identity (a tab id, in the browser-extension deployment).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallerId(pub u64);

#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum RequestError {
    #[error("engine not ready")]
    NotReady,
    #[error("analysis timeout")]
    Timeout,
    #[error("request replaced by a newer one from the same caller")]
    Replaced,
    #[error("analysis cancelled")]
    Cancelled,
    #[error("engine failed: {0}")]
    EngineFailed(String),
}

/// Completed analysis: the best move plus every info snapshot observed while
/// the request was active, in arrival order.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AnalysisResult {
    pub best_move: String,
    pub info: Vec<AnalysisInfo>,
}

pub type Completion = oneshot::Sender<Result<AnalysisResult, RequestError>>;

struct PendingRequest {
    seq: u64,
    fen: String,
    depth: Option<u32>,
    submitted: Instant,
    info: Vec<AnalysisInfo>,
    done: Completion,
}

/// An analysis the supervisor should now forward to the engine.
#[derive(Debug)]
pub struct Dispatch {
    pub caller: CallerId,
    pub fen: String,
    pub depth: Option<u32>,
}

#[derive(Default)]
pub struct RequestQueue {
    pending: HashMap<CallerId, PendingRequest>,
    waiting: VecDeque<CallerId>,
    /// Caller the engine is currently searching for, if its request is
    /// still tracked. Cleared by timeout or cancellation while `searching`
    /// stays set, so a late best move is discarded instead of misdelivered.
    active: Option<CallerId>,
    /// Whether the engine is busy, independent of whether anyone still
    /// wants the result.
    searching: bool,
    next_seq: u64,
}

impl RequestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn has_pending(&self, caller: CallerId) -> bool {
        self.pending.contains_key(&caller)
    }

    /// Records a request. A prior entry for the same caller is completed
    /// with [`RequestError::Replaced`] — it never receives a stale second
    /// completion. Returns the sequence number (for the timeout timer) and
    /// a dispatch when the engine is free.
    pub fn submit(
        &mut self,
        caller: CallerId,
        fen: String,
        depth: Option<u32>,
        done: Completion,
    ) -> (u64, Option<Dispatch>) {
        if let Some(old) = self.pending.remove(&caller) {
            let _ = old.done.send(Err(RequestError::Replaced));
            self.waiting.retain(|c| *c != caller);
            if self.active == Some(caller) {
                // the engine keeps searching the old position; its result
                // will be discarded and the new request dispatched after it
                self.active = None;
            }
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending.insert(
            caller,
            PendingRequest {
                seq,
                fen,
                depth,
                submitted: Instant::now(),
                info: Vec::new(),
                done,
            },
        );
        if self.searching {
            self.waiting.push_back(caller);
            (seq, None)
        } else {
            (seq, self.dispatch(caller))
        }
    }

    fn dispatch(&mut self, caller: CallerId) -> Option<Dispatch> {
        let req = self.pending.get(&caller)?;
        debug!(
            caller = caller.0,
            waited_ms = req.submitted.elapsed().as_millis() as u64,
            "dispatching analysis"
        );
        self.active = Some(caller);
        self.searching = true;
        Some(Dispatch {
            caller,
            fen: req.fen.clone(),
            depth: req.depth,
        })
    }

    /// Attaches an info snapshot to the active request, if one is tracked.
    pub fn on_info(&mut self, info: &AnalysisInfo) {
        if let Some(req) = self.active.and_then(|c| self.pending.get_mut(&c)) {
            req.info.push(info.clone());
        }
    }

    /// Completes the active request with the best move, or discards a stray
    /// result whose request already timed out or was cancelled. Either way
    /// the engine is free again; returns the next dispatch, FIFO.
    pub fn on_best_move(&mut self, best_move: &str) -> Option<Dispatch> {
        self.searching = false;
        match self.active.take() {
            Some(caller) => {
                if let Some(req) = self.pending.remove(&caller) {
                    let _ = req.done.send(Ok(AnalysisResult {
                        best_move: best_move.to_string(),
                        info: req.info,
                    }));
                }
            }
            None => debug!(best_move, "discarding stray best move"),
        }
        self.dispatch_next()
    }

    fn dispatch_next(&mut self) -> Option<Dispatch> {
        while let Some(caller) = self.waiting.pop_front() {
            if self.pending.contains_key(&caller) {
                return self.dispatch(caller);
            }
        }
        None
    }

    /// Fires a timeout. The sequence number guards the race with a best
    /// move that arrived just before the timer: a completed or replaced
    /// request is left alone. The engine is not stopped; a late result for
    /// the removed tag is simply discarded.
    pub fn on_timeout(&mut self, caller: CallerId, seq: u64) -> bool {
        if self.pending.get(&caller).map(|r| r.seq) != Some(seq) {
            return false;
        }
        if let Some(req) = self.pending.remove(&caller) {
            let _ = req.done.send(Err(RequestError::Timeout));
        }
        self.waiting.retain(|c| *c != caller);
        if self.active == Some(caller) {
            self.active = None;
        }
        true
    }

    /// Best-effort cancellation: the entry is removed without a completion
    /// value. Returns whether the engine was searching for this caller.
    pub fn cancel(&mut self, caller: CallerId) -> bool {
        self.waiting.retain(|c| *c != caller);
        let was_active = self.active == Some(caller);
        if was_active {
            self.active = None;
        }
        self.pending.remove(&caller);
        was_active
    }

    /// A dispatch never reached the engine; complete that caller with an
    /// error and free the gate.
    pub fn abort_dispatch(&mut self, caller: CallerId, error: RequestError) {
        if self.active == Some(caller) {
            self.active = None;
            self.searching = false;
        }
        if let Some(req) = self.pending.remove(&caller) {
            let _ = req.done.send(Err(error));
        }
    }

    /// The session died; every pending request completes with an error, no
    /// caller is left hanging.
    pub fn fail_all(&mut self, error: &RequestError) {
        for (_, req) in self.pending.drain() {
            let _ = req.done.send(Err(error.clone()));
        }
        self.waiting.clear();
        self.active = None;
        self.searching = false;
    }
}
