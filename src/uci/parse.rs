//! Tolerant parser for single lines of engine output.
//!
//! The parser is pure and stateless: same line, same result, no I/O. A line
//! the bridge does not recognize becomes [`Message::Unknown`] rather than an
//! error, and a malformed token inside an `info` line drops that one field
//! while the rest of the line is still extracted. Recoverable problems go to
//! a [`Sink`].

use std::num::ParseIntError;
use std::str::FromStr;

use thiserror::Error;

use crate::warn::{OptionExt, ResultExt, Sink};

use super::msg::{AnalysisInfo, Message, Score, ScoreKind};

#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum Error {
    #[error("cannot parse \"{field}\" value \"{value}\": {source}")]
    BadInteger {
        field: &'static str,
        value: String,
        #[source]
        source: ParseIntError,
    },
    #[error("\"{0}\" with no value token")]
    MissingValue(&'static str),
    #[error("unknown score kind \"{0}\"")]
    BadScoreKind(String),
    #[error("\"bestmove\" with no move token")]
    BestMoveNoMove,
}

/// Parses one trimmed line. `None` means the line looked meaningful but was
/// unusable (reported to `warn`); unrecognized chatter is `Some(Unknown)`.
pub fn parse(line: &str, warn: &mut impl Sink<Error>) -> Option<Message> {
    if line.starts_with("info depth") {
        return Some(Message::Info(parse_info(line, warn)));
    }
    if line.contains("uciok") {
        return Some(Message::UciOk);
    }
    if line.contains("readyok") {
        return Some(Message::ReadyOk);
    }
    if line.contains("bestmove") {
        let mut tokens = line.split_whitespace().skip_while(|t| *t != "bestmove");
        tokens.next();
        return match tokens.next() {
            Some(mv) => Some(Message::BestMove(mv.to_string())),
            None => {
                warn.warn(Error::BestMoveNoMove);
                None
            }
        };
    }
    Some(Message::Unknown)
}

fn parse_info(line: &str, warn: &mut impl Sink<Error>) -> AnalysisInfo {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let mut tokens = &tokens[1..];
    let mut info = AnalysisInfo::default();
    while let Some(key) = next(&mut tokens) {
        match key {
            "depth" => info.depth = parse_num("depth", &mut tokens, warn),
            "seldepth" => info.seldepth = parse_num("seldepth", &mut tokens, warn),
            "nodes" => info.nodes = parse_num("nodes", &mut tokens, warn),
            "nps" => info.nps = parse_num("nps", &mut tokens, warn),
            "score" => info.score = parse_score(&mut tokens, warn),
            "pv" => {
                // pv runs to the end of the line; nothing after it is examined
                info.pv = Some(tokens.join(" "));
                tokens = &[];
            }
            _ => {}
        }
    }
    info
}

fn next<'a>(tokens: &mut &[&'a str]) -> Option<&'a str> {
    let result;
    (result, *tokens) = tokens.split_first()?;
    Some(*result)
}

fn parse_num<T>(field: &'static str, tokens: &mut &[&str], warn: &mut impl Sink<Error>) -> Option<T>
where
    T: FromStr<Err = ParseIntError>,
{
    let value = next(tokens).or_warn_with(Error::MissingValue(field), warn)?;
    value.parse().or_warn_map(
        |source| Error::BadInteger {
            field,
            value: value.to_string(),
            source,
        },
        warn,
    )
}

fn parse_score(tokens: &mut &[&str], warn: &mut impl Sink<Error>) -> Option<Score> {
    let kind = match next(tokens).or_warn_with(Error::MissingValue("score"), warn)? {
        "cp" => ScoreKind::Cp,
        "mate" => ScoreKind::Mate,
        other => {
            warn.warn(Error::BadScoreKind(other.to_string()));
            return None;
        }
    };
    let value = parse_num("score", tokens, warn)?;
    Some(Score { kind, value })
}
