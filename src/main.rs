//! Native-messaging host: newline-delimited JSON on stdio, engine bridge
//! behind it.
//!
//! Stdout carries protocol frames only; logs go to stderr.

use std::path::Path;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use arrowhost::proto::{Request, Response};
use arrowhost::{CallerId, EngineConfig, Supervisor};

const DEFAULT_TIME_LIMIT_MS: u64 = 1000;

/// The host serves a single UI connection.
const UI: CallerId = CallerId(0);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.json".to_string());
    let config = EngineConfig::load(Path::new(&config_path))?;
    info!(config = ?config, "starting engine bridge");
    let bridge = Supervisor::spawn(config);

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Response>();
    tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(response) = out_rx.recv().await {
            let mut frame = match serde_json::to_string(&response) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!(error = %e, "dropping unserializable frame");
                    continue;
                }
            };
            frame.push('\n');
            if stdout.write_all(frame.as_bytes()).await.is_err() {
                break;
            }
            let _ = stdout.flush().await;
        }
    });

    // every status change goes to the UI
    let mut status_rx = bridge.status();
    let status_out = out_tx.clone();
    tokio::spawn(async move {
        while status_rx.changed().await.is_ok() {
            let status = status_rx.borrow_and_update().clone();
            if status_out.send(Response::Status { status }).is_err() {
                break;
            }
        }
    });

    // analysis info is broadcast as it streams in
    let mut info_rx = bridge.subscribe_info();
    let info_out = out_tx.clone();
    tokio::spawn(async move {
        loop {
            match info_rx.recv().await {
                Ok(data) => {
                    if info_out.send(Response::Analysis { data }).is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "dropped analysis updates for a slow consumer");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let request = match serde_json::from_str::<Request>(line) {
            Ok(request) => request,
            Err(e) => {
                let _ = out_tx.send(Response::Error {
                    error: format!("error processing command: {e}"),
                });
                continue;
            }
        };
        debug!(request = ?request, "ui >");
        match request {
            Request::Init => bridge.connect(),
            Request::Analyze {
                fen,
                depth,
                time_limit,
            } => {
                let Some(fen) = fen else {
                    let _ = out_tx.send(Response::Error {
                        error: "no FEN position provided".into(),
                    });
                    continue;
                };
                let bridge = bridge.clone();
                let out = out_tx.clone();
                tokio::spawn(async move {
                    let limit =
                        Duration::from_millis(time_limit.unwrap_or(DEFAULT_TIME_LIMIT_MS));
                    let response = match bridge.analyze(UI, fen, depth, limit).await {
                        Ok(result) => Response::Bestmove {
                            mv: result.best_move,
                        },
                        Err(e) => Response::Error {
                            error: e.to_string(),
                        },
                    };
                    let _ = out.send(response);
                });
            }
            Request::Stop => bridge.cancel(UI),
            Request::Quit => break,
        }
    }

    bridge.shutdown().await;
    Ok(())
}
