//! JSON shapes carried over the outer transport.
//!
//! The transport itself (a reliable, ordered, message-boundary-preserving
//! channel — newline-delimited JSON on stdio in the host binary) is outside
//! the bridge; these types are the contract it carries.

use serde::{Deserialize, Serialize};

use crate::status::EngineStatus;
use crate::uci::AnalysisInfo;

/// Request from the UI side.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Request {
    Init,
    Analyze {
        /// Position to analyze; rejected with an error response when absent.
        fen: Option<String>,
        depth: Option<u32>,
        /// Wall-clock budget in milliseconds; defaults to one second.
        #[serde(rename = "timeLimit")]
        time_limit: Option<u64>,
    },
    Stop,
    Quit,
}

/// Response or event pushed back to the UI side.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Response {
    Status {
        status: EngineStatus,
    },
    Analysis {
        data: AnalysisInfo,
    },
    Bestmove {
        #[serde(rename = "move")]
        mv: String,
    },
    Error {
        error: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_deserialize() {
        assert_eq!(
            serde_json::from_str::<Request>(r#"{"type":"init"}"#).unwrap(),
            Request::Init,
        );
        assert_eq!(
            serde_json::from_str::<Request>(
                r#"{"type":"analyze","fen":"startpos","timeLimit":1000}"#
            )
            .unwrap(),
            Request::Analyze {
                fen: Some("startpos".into()),
                depth: None,
                time_limit: Some(1000),
            },
        );
        assert!(serde_json::from_str::<Request>(r#"{"type":"reboot"}"#).is_err());
    }

    #[test]
    fn responses_serialize() {
        assert_eq!(
            serde_json::to_value(Response::Bestmove { mv: "e2e4".into() }).unwrap(),
            serde_json::json!({"type": "bestmove", "move": "e2e4"}),
        );
        let status = Response::Status {
            status: EngineStatus::default(),
        };
        let value = serde_json::to_value(status).unwrap();
        assert_eq!(value["type"], "status");
        assert_eq!(value["status"]["connected"], false);
    }
}
