//! Bridge between a browser chess UI and a locally running UCI engine.
//!
//! The bridge spawns the engine process, speaks its line-oriented text
//! protocol, and exposes analysis over an async request interface: the
//! [`engine::Supervisor`] keeps a healthy engine process alive with bounded
//! retries, and its [`engine::BridgeHandle`] accepts single-flight,
//! timeout-bound analysis requests per caller.

pub mod config;
pub mod engine;
pub mod proto;
pub mod status;
pub mod uci;
pub mod warn;

pub use config::{ConfigError, EngineConfig};
pub use engine::{AnalysisResult, BridgeHandle, CallerId, RequestError, Supervisor};
pub use status::EngineStatus;
