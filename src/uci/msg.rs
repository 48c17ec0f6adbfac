//! UCI wire types: commands the bridge writes and messages the engine emits.
//!
//! Moves and positions are carried as opaque strings; the bridge does not
//! validate chess semantics.

use std::fmt;

use serde::Serialize;

/// Command written to the engine's stdin, one per line.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Command {
    Uci,
    IsReady,
    SetOption { name: String, value: String },
    UciNewGame,
    Position { fen: String },
    Go { depth: u32 },
    Stop,
    Quit,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Uci => f.write_str("uci"),
            Command::IsReady => f.write_str("isready"),
            Command::SetOption { name, value } => {
                write!(f, "setoption name {} value {}", name, value)
            }
            Command::UciNewGame => f.write_str("ucinewgame"),
            Command::Position { fen } => write!(f, "position fen {}", fen),
            Command::Go { depth } => write!(f, "go depth {}", depth),
            Command::Stop => f.write_str("stop"),
            Command::Quit => f.write_str("quit"),
        }
    }
}

/// One parsed line of engine output.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Message {
    UciOk,
    ReadyOk,
    Info(AnalysisInfo),
    BestMove(String),
    /// Anything the bridge does not understand; ignored, never an error.
    Unknown,
}

/// Fields extracted from an `info depth …` line.
///
/// Every field is optional: a token that fails to parse drops that field
/// only, the rest of the line is still used.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct AnalysisInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seldepth: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nodes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nps: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<Score>,
    /// Principal variation, space-joined.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pv: Option<String>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct Score {
    #[serde(rename = "type")]
    pub kind: ScoreKind,
    pub value: i64,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreKind {
    Cp,
    Mate,
}
