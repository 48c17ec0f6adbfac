//! End-to-end bridge tests against a stub shell engine speaking just enough
//! UCI over real pipes.

#![cfg(unix)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use tokio::time::timeout;

use arrowhost::{CallerId, EngineConfig, RequestError, Supervisor};

/// A stub engine that completes the handshake and answers every search.
const WELL_BEHAVED: &str = r#"
while read -r line; do
  case "$line" in
    uci) echo "id name stub"; echo "uciok" ;;
    isready) echo "readyok" ;;
    go*) echo "info depth 10 score cp 30 nodes 1000 nps 50000 pv e2e4 e7e5"
         echo "bestmove e2e4" ;;
    quit) exit 0 ;;
  esac
done
"#;

/// Handshakes, then never answers a search.
const SILENT_SEARCH: &str = r#"
while read -r line; do
  case "$line" in
    uci) echo "uciok" ;;
    isready) echo "readyok" ;;
    quit) exit 0 ;;
  esac
done
"#;

/// Handshakes, then dies mid-search with a nonzero code.
const CRASH_ON_GO: &str = r#"
while read -r line; do
  case "$line" in
    uci) echo "uciok" ;;
    isready) echo "readyok" ;;
    go*) exit 3 ;;
    quit) exit 0 ;;
  esac
done
"#;

fn stub_engine(body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    static COUNTER: AtomicU32 = AtomicU32::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let path = std::env::temp_dir().join(format!(
        "arrowhost-stub-{}-{n}.sh",
        std::process::id()
    ));
    std::fs::write(&path, format!("#!/bin/sh{body}")).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

fn stub_config(body: &str) -> EngineConfig {
    EngineConfig {
        engine_path: stub_engine(body).display().to_string(),
        ..EngineConfig::default()
    }
}

async fn wait_ready(bridge: &arrowhost::BridgeHandle) {
    let mut status = bridge.status();
    timeout(Duration::from_secs(5), async {
        loop {
            {
                let snapshot = status.borrow_and_update();
                if snapshot.connected && snapshot.ready {
                    return;
                }
            }
            if status.changed().await.is_err() {
                panic!("supervisor went away before becoming ready");
            }
        }
    })
    .await
    .expect("engine did not become ready in time");
}

#[tokio::test]
async fn handshake_reaches_ready_with_clean_status() {
    let bridge = Supervisor::spawn(stub_config(WELL_BEHAVED));
    wait_ready(&bridge).await;
    let snapshot = bridge.status().borrow().clone();
    assert!(snapshot.connected);
    assert!(snapshot.ready);
    assert_eq!(snapshot.error, None);
    assert_eq!(snapshot.connection_attempts, 0);
    bridge.shutdown().await;
}

#[tokio::test]
async fn analyze_delivers_best_move_and_info() {
    let bridge = Supervisor::spawn(stub_config(WELL_BEHAVED));
    wait_ready(&bridge).await;

    let mut info_rx = bridge.subscribe_info();
    let result = bridge
        .analyze(
            CallerId(1),
            "startpos".into(),
            Some(10),
            Duration::from_secs(5),
        )
        .await
        .expect("analysis should complete");

    assert_eq!(result.best_move, "e2e4");
    let observed = result
        .info
        .iter()
        .find(|info| info.depth == Some(10))
        .expect("at least one info snapshot at depth 10");
    assert_eq!(observed.nodes, Some(1000));
    assert_eq!(observed.nps, Some(50000));
    assert_eq!(observed.pv.as_deref(), Some("e2e4 e7e5"));
    let score = observed.score.expect("score present");
    assert_eq!(score.value, 30);

    // the same snapshot went out on the session broadcast
    let broadcast = timeout(Duration::from_secs(1), info_rx.recv())
        .await
        .expect("broadcast should arrive")
        .unwrap();
    assert_eq!(broadcast.depth, Some(10));

    bridge.shutdown().await;
}

#[tokio::test]
async fn concurrent_callers_are_serialized() {
    let bridge = Supervisor::spawn(stub_config(WELL_BEHAVED));
    wait_ready(&bridge).await;

    let (a, b) = tokio::join!(
        bridge.analyze(
            CallerId(1),
            "fen-a".into(),
            Some(5),
            Duration::from_secs(5),
        ),
        bridge.analyze(
            CallerId(2),
            "fen-b".into(),
            Some(5),
            Duration::from_secs(5),
        ),
    );
    assert_eq!(a.unwrap().best_move, "e2e4");
    assert_eq!(b.unwrap().best_move, "e2e4");
    bridge.shutdown().await;
}

#[tokio::test]
async fn missing_best_move_times_out_after_limit_plus_margin() {
    let bridge = Supervisor::spawn(stub_config(SILENT_SEARCH));
    wait_ready(&bridge).await;

    let limit = Duration::from_millis(200);
    let started = Instant::now();
    let result = bridge
        .analyze(CallerId(1), "startpos".into(), Some(5), limit)
        .await;
    let elapsed = started.elapsed();

    assert_eq!(result, Err(RequestError::Timeout));
    // limit + the fixed one-second margin, never earlier
    assert!(elapsed >= Duration::from_millis(1200), "fired at {elapsed:?}");
    assert!(elapsed < Duration::from_secs(4), "fired at {elapsed:?}");
    bridge.shutdown().await;
}

#[tokio::test]
async fn crash_during_analysis_fails_request_and_status() {
    let bridge = Supervisor::spawn(stub_config(CRASH_ON_GO));
    wait_ready(&bridge).await;

    let result = bridge
        .analyze(
            CallerId(1),
            "startpos".into(),
            Some(5),
            Duration::from_secs(10),
        )
        .await;
    match result {
        Err(RequestError::EngineFailed(message)) => {
            assert!(message.contains("code 3"), "unexpected message: {message}")
        }
        other => panic!("expected engine failure, got {other:?}"),
    }

    let mut status = bridge.status();
    let snapshot = timeout(Duration::from_secs(2), async {
        loop {
            {
                let snapshot = status.borrow_and_update();
                if !snapshot.connected {
                    return snapshot.clone();
                }
            }
            status.changed().await.unwrap();
        }
    })
    .await
    .expect("status should reflect the dead engine");
    assert!(!snapshot.ready);
    assert!(snapshot.error.as_deref().unwrap_or("").contains("code 3"));
    bridge.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn automatic_retries_stop_at_cap_until_external_reconnect() {
    let bridge = Supervisor::spawn(EngineConfig {
        engine_path: "/nonexistent/engine-binary".into(),
        ..EngineConfig::default()
    });
    let mut status = bridge.status();

    // attempts climb through the backoff to the cap, then a terminal error
    loop {
        {
            let snapshot = status.borrow_and_update();
            if snapshot.connection_attempts == 3
                && snapshot
                    .error
                    .as_deref()
                    .unwrap_or("")
                    .contains("multiple attempts")
            {
                break;
            }
        }
        status.changed().await.unwrap();
    }

    // the self-heal poll keeps ticking, but never attempts past the cap
    tokio::time::sleep(Duration::from_secs(90)).await;
    let snapshot = status.borrow_and_update().clone();
    assert_eq!(snapshot.connection_attempts, 3);
    assert!(!snapshot.connected);

    // an explicit reconnect resets the counter and starts attempting again
    bridge.connect();
    loop {
        status.changed().await.unwrap();
        let snapshot = status.borrow_and_update().clone();
        if (1..3).contains(&snapshot.connection_attempts) {
            assert!(snapshot
                .error
                .as_deref()
                .unwrap_or("")
                .contains("failed to start engine"));
            break;
        }
    }
    bridge.shutdown().await;
}

#[tokio::test]
async fn analyze_before_ready_is_rejected_immediately() {
    let bridge = Supervisor::spawn(EngineConfig {
        engine_path: "/nonexistent/engine-binary".into(),
        ..EngineConfig::default()
    });
    let result = bridge
        .analyze(
            CallerId(1),
            "startpos".into(),
            None,
            Duration::from_secs(1),
        )
        .await;
    assert_eq!(result, Err(RequestError::NotReady));
    bridge.shutdown().await;
}
