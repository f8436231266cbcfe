//! Terminal Bridge Integration Tests
//!
//! Tests for the async channel bridge between Tokio runtime and the thread
//! owning the USB session.
//!
//! # Test Scenarios
//! - Command/event message flow
//! - Worker thread lifecycle
//! - Channel closure on either side
//!
//! Run with: `cargo test -p common --test term_bridge_tests`

use common::test_utils::{DEFAULT_TEST_TIMEOUT, printer_endpoints, with_timeout};
use common::{TermCommand, TermEvent, create_term_bridge};
use std::thread;
use std::time::Duration;

// ============================================================================
// Message Flow Tests
// ============================================================================

#[tokio::test]
async fn test_echo_worker() {
    let (bridge, worker) = create_term_bridge();

    // Worker polls between device reads and echoes every write back as data
    let handle = thread::spawn(move || {
        worker
            .send_event(TermEvent::Opened(printer_endpoints()))
            .unwrap();
        loop {
            let Some(cmd) = worker.try_recv_command() else {
                thread::sleep(Duration::from_millis(1));
                continue;
            };
            match cmd {
                TermCommand::Write(data) => worker.send_event(TermEvent::Data(data)).unwrap(),
                TermCommand::Shutdown => {
                    worker.send_event(TermEvent::Closed).unwrap();
                    break;
                }
            }
        }
    });

    let opened = with_timeout(DEFAULT_TEST_TIMEOUT, bridge.recv_event())
        .await
        .expect("timed out")
        .unwrap();
    assert_eq!(opened, TermEvent::Opened(printer_endpoints()));

    for chunk in [&b"ping"[..], &b"pong"[..]] {
        bridge
            .send_command(TermCommand::Write(chunk.to_vec()))
            .await
            .unwrap();
        let event = with_timeout(DEFAULT_TEST_TIMEOUT, bridge.recv_event())
            .await
            .expect("timed out")
            .unwrap();
        assert_eq!(event, TermEvent::Data(chunk.to_vec()));
    }

    bridge.send_command(TermCommand::Shutdown).await.unwrap();
    let closed = with_timeout(DEFAULT_TEST_TIMEOUT, bridge.recv_event())
        .await
        .expect("timed out")
        .unwrap();
    assert_eq!(closed, TermEvent::Closed);

    handle.join().expect("Worker thread panicked");
}

#[tokio::test]
async fn test_error_event_carries_code_and_message() {
    let (bridge, worker) = create_term_bridge();

    thread::spawn(move || {
        worker
            .send_event(TermEvent::Error {
                code: -4,
                message: "Device disconnected or reset: No such device".into(),
            })
            .unwrap();
    });

    let event = with_timeout(DEFAULT_TEST_TIMEOUT, bridge.recv_event())
        .await
        .expect("timed out")
        .unwrap();
    match event {
        TermEvent::Error { code, message } => {
            assert_eq!(code, -4);
            assert!(message.contains("disconnected"));
        }
        other => panic!("unexpected event: {:?}", other),
    }
}

// ============================================================================
// Lifecycle Tests
// ============================================================================

#[tokio::test]
async fn test_recv_fails_after_worker_exits() {
    let (bridge, worker) = create_term_bridge();

    thread::spawn(move || drop(worker))
        .join()
        .expect("Worker thread panicked");

    let result = with_timeout(DEFAULT_TEST_TIMEOUT, bridge.recv_event())
        .await
        .expect("timed out");
    assert!(matches!(result, Err(common::Error::Channel(_))));
    assert!(bridge.send_command(TermCommand::Shutdown).await.is_err());
}

#[test]
fn test_worker_sees_shutdown_when_bridge_dropped() {
    let (bridge, worker) = create_term_bridge();
    let clone = bridge.clone();

    drop(bridge);
    assert_eq!(worker.try_recv_command(), None);

    drop(clone);
    assert_eq!(worker.try_recv_command(), Some(TermCommand::Shutdown));
    assert!(worker.send_event(TermEvent::Closed).is_err());
}

#[test]
fn test_queued_commands_delivered_before_closure() {
    let (bridge, worker) = create_term_bridge();

    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
        .block_on(async {
            bridge
                .send_command(TermCommand::Write(vec![1, 2, 3]))
                .await
                .unwrap();
        });
    drop(bridge);

    assert_eq!(
        worker.try_recv_command(),
        Some(TermCommand::Write(vec![1, 2, 3]))
    );
    assert_eq!(worker.try_recv_command(), Some(TermCommand::Shutdown));
}
