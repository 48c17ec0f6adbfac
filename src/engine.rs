//! The process layer: one engine process, its supervisor, and the request
//! queue that serializes analysis work.

use std::time::Duration;

pub mod process;
pub mod queue;
pub mod supervisor;

pub use process::{Engine, EngineError, EngineEvent, State};
pub use queue::{AnalysisResult, CallerId, RequestError, RequestQueue};
pub use supervisor::{BridgeHandle, Supervisor};

/// Both handshake acknowledgements must arrive within this bound.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// How long a quit command may take before the process is killed.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Consecutive automatic connection attempts before requiring an explicit
/// external trigger.
pub const MAX_RETRY: u32 = 3;

/// Minimum interval between connection attempts; also the backoff base.
pub const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Backoff ceiling.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Self-healing poll period.
pub const POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Slack added to each request's time limit before it is abandoned.
pub const TIMEOUT_MARGIN: Duration = Duration::from_secs(1);
