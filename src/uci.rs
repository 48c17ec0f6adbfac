//! The engine wire layer: line reassembly, message types, and the tolerant
//! line parser.

pub mod line;
pub mod msg;
pub mod parse;

pub use line::LineBuffer;
pub use msg::{AnalysisInfo, Command, Message, Score, ScoreKind};
