//! Gateway integration tests
//!
//! Each test scripts the server side of the websocket conversation and
//! drives a real shard fleet against it.
//!
//! Run with: cargo test -p integration-tests --test gateway_tests

use std::sync::Arc;
use std::time::Duration;

use concord_common::{ClientConfig, ClientError};
use concord_core::{DispatchContext, EventKind, Snowflake};
use concord_gateway::{EventDispatcher, SessionState};
use integration_tests::{fixtures::*, start_fleet, wait_for_state, CollectingHandler, FakeGateway};
use serde_json::json;

// ============================================================================
// Handshake Tests
// ============================================================================

#[tokio::test]
async fn test_identify_handshake_reaches_connected() {
    let mut gateway = FakeGateway::start().await.expect("Failed to start gateway");
    let fleet = start_fleet(
        ClientConfig::new("test-token"),
        &gateway.url,
        1,
        EventDispatcher::new(4),
    );
    let session = Arc::clone(&fleet.sessions()[0]);
    let session_id = unique_session_id();

    let mut conn = gateway.next_connection().await.unwrap();
    conn.send(hello(30_000)).await.unwrap();

    let identify = conn.recv_op(2).await.unwrap();
    assert_eq!(identify["d"]["token"], "test-token");
    assert_eq!(identify["d"]["shard"], json!([0, 1]));
    assert_eq!(identify["d"]["properties"]["browser"], "concord");
    assert!(identify["d"]["intents"].is_u64());

    conn.send(ready(&session_id, 1)).await.unwrap();
    wait_for_state(&session, SessionState::Connected, Duration::from_secs(2))
        .await
        .unwrap();
    assert_eq!(session.session_id().as_deref(), Some(session_id.as_str()));

    fleet.shutdown().await;
}

#[tokio::test]
async fn test_missing_hello_forces_a_reconnect() {
    let mut gateway = FakeGateway::start().await.expect("Failed to start gateway");
    let mut config = ClientConfig::new("test-token");
    config.gateway.hello_timeout_secs = 1;
    let fleet = start_fleet(config, &gateway.url, 1, EventDispatcher::new(4));
    let session = Arc::clone(&fleet.sessions()[0]);

    // Say nothing; the client gives up on this connection.
    let mut conn = gateway.next_connection().await.unwrap();
    let code = conn.expect_close().await.unwrap();
    assert_eq!(code, Some(4000));

    // The retry gets a proper greeting and completes.
    let mut retry = gateway.next_connection().await.unwrap();
    retry.send(hello(30_000)).await.unwrap();
    retry.recv_op(2).await.unwrap();
    retry.send(ready(&unique_session_id(), 1)).await.unwrap();
    wait_for_state(&session, SessionState::Connected, Duration::from_secs(2))
        .await
        .unwrap();

    fleet.shutdown().await;
}

// ============================================================================
// Heartbeat Tests
// ============================================================================

#[tokio::test]
async fn test_missed_heartbeat_ack_triggers_resume() {
    let mut gateway = FakeGateway::start().await.expect("Failed to start gateway");
    let fleet = start_fleet(
        ClientConfig::new("test-token"),
        &gateway.url,
        1,
        EventDispatcher::new(4),
    );
    let session = Arc::clone(&fleet.sessions()[0]);
    let session_id = unique_session_id();

    let mut conn = gateway.next_connection().await.unwrap();
    conn.send(hello(400)).await.unwrap();
    conn.recv_op(2).await.unwrap();
    conn.send(ready(&session_id, 5)).await.unwrap();
    wait_for_state(&session, SessionState::Connected, Duration::from_secs(2))
        .await
        .unwrap();

    // Swallow a beat without acknowledging; the next due beat makes the
    // client declare the connection dead.
    conn.expect_heartbeat().await.unwrap();
    let code = conn.expect_close().await.unwrap();
    assert_eq!(code, Some(4000));

    // The replacement connection resumes with the stored credentials.
    let mut retry = gateway.next_connection().await.unwrap();
    retry.send(hello(30_000)).await.unwrap();
    let resume = retry.recv_op(6).await.unwrap();
    assert_eq!(resume["d"]["token"], "test-token");
    assert_eq!(resume["d"]["session_id"], session_id.as_str());
    assert_eq!(resume["d"]["seq"], 5);

    retry.send(resumed(6)).await.unwrap();
    wait_for_state(&session, SessionState::Connected, Duration::from_secs(2))
        .await
        .unwrap();

    fleet.shutdown().await;
}

// ============================================================================
// Session Recovery Tests
// ============================================================================

#[tokio::test]
async fn test_reconnect_request_resumes_the_session() {
    let mut gateway = FakeGateway::start().await.expect("Failed to start gateway");
    let fleet = start_fleet(
        ClientConfig::new("test-token"),
        &gateway.url,
        1,
        EventDispatcher::new(4),
    );
    let session = Arc::clone(&fleet.sessions()[0]);
    let session_id = unique_session_id();

    let mut conn = gateway.next_connection().await.unwrap();
    conn.send(hello(30_000)).await.unwrap();
    conn.recv_op(2).await.unwrap();
    conn.send(ready(&session_id, 7)).await.unwrap();
    wait_for_state(&session, SessionState::Connected, Duration::from_secs(2))
        .await
        .unwrap();

    conn.send(reconnect()).await.unwrap();
    let code = conn.expect_close().await.unwrap();
    assert_eq!(code, Some(4000));

    let mut retry = gateway.next_connection().await.unwrap();
    retry.send(hello(30_000)).await.unwrap();
    let resume = retry.recv_op(6).await.unwrap();
    assert_eq!(resume["d"]["session_id"], session_id.as_str());
    assert_eq!(resume["d"]["seq"], 7);

    retry.send(resumed(8)).await.unwrap();
    wait_for_state(&session, SessionState::Connected, Duration::from_secs(2))
        .await
        .unwrap();

    fleet.shutdown().await;
}

#[tokio::test]
async fn test_dropped_connection_resumes_the_session() {
    let mut gateway = FakeGateway::start().await.expect("Failed to start gateway");
    let fleet = start_fleet(
        ClientConfig::new("test-token"),
        &gateway.url,
        1,
        EventDispatcher::new(4),
    );
    let session = Arc::clone(&fleet.sessions()[0]);
    let session_id = unique_session_id();

    let mut conn = gateway.next_connection().await.unwrap();
    conn.send(hello(30_000)).await.unwrap();
    conn.recv_op(2).await.unwrap();
    conn.send(ready(&session_id, 3)).await.unwrap();
    wait_for_state(&session, SessionState::Connected, Duration::from_secs(2))
        .await
        .unwrap();

    // Kill the socket without any goodbye.
    drop(conn);

    let mut retry = gateway.next_connection().await.unwrap();
    retry.send(hello(30_000)).await.unwrap();
    let resume = retry.recv_op(6).await.unwrap();
    assert_eq!(resume["d"]["session_id"], session_id.as_str());
    assert_eq!(resume["d"]["seq"], 3);

    retry.send(resumed(4)).await.unwrap();
    wait_for_state(&session, SessionState::Connected, Duration::from_secs(2))
        .await
        .unwrap();

    fleet.shutdown().await;
}

#[tokio::test]
async fn test_unresumable_invalid_session_identifies_fresh() {
    let mut gateway = FakeGateway::start().await.expect("Failed to start gateway");
    let fleet = start_fleet(
        ClientConfig::new("test-token"),
        &gateway.url,
        1,
        EventDispatcher::new(4),
    );
    let session = Arc::clone(&fleet.sessions()[0]);
    let old_session_id = unique_session_id();

    let mut conn = gateway.next_connection().await.unwrap();
    conn.send(hello(30_000)).await.unwrap();
    conn.recv_op(2).await.unwrap();
    conn.send(ready(&old_session_id, 1)).await.unwrap();
    wait_for_state(&session, SessionState::Connected, Duration::from_secs(2))
        .await
        .unwrap();

    conn.send(invalid_session(false)).await.unwrap();
    let code = conn.expect_close().await.unwrap();
    assert_eq!(code, Some(4000));

    // The session was scrapped, so the next connection must identify,
    // not resume.
    let mut retry = gateway.next_connection().await.unwrap();
    retry.send(hello(30_000)).await.unwrap();
    let identify = retry.recv_op(2).await.unwrap();
    assert_eq!(identify["d"]["token"], "test-token");

    let new_session_id = unique_session_id();
    retry.send(ready(&new_session_id, 1)).await.unwrap();
    wait_for_state(&session, SessionState::Connected, Duration::from_secs(2))
        .await
        .unwrap();
    assert_eq!(
        session.session_id().as_deref(),
        Some(new_session_id.as_str())
    );

    fleet.shutdown().await;
}

// ============================================================================
// Fatal Close Tests
// ============================================================================

#[tokio::test]
async fn test_authentication_close_is_fatal() {
    let mut gateway = FakeGateway::start().await.expect("Failed to start gateway");
    let fleet = start_fleet(
        ClientConfig::new("bad-token"),
        &gateway.url,
        1,
        EventDispatcher::new(4),
    );
    let session = Arc::clone(&fleet.sessions()[0]);

    let mut conn = gateway.next_connection().await.unwrap();
    conn.send(hello(30_000)).await.unwrap();
    conn.recv_op(2).await.unwrap();
    conn.close(4004).await.unwrap();

    let err = fleet.closed().await.unwrap_err();
    assert!(matches!(err, ClientError::Authentication(_)));
    assert!(err.is_fatal());
    wait_for_state(&session, SessionState::FatallyClosed, Duration::from_secs(2))
        .await
        .unwrap();

    // A fatal close means no reconnect attempts.
    gateway
        .expect_no_connection(Duration::from_millis(1500))
        .await
        .unwrap();
}

// ============================================================================
// Shutdown Tests
// ============================================================================

#[tokio::test]
async fn test_shutdown_closes_the_connection_cleanly() {
    let mut gateway = FakeGateway::start().await.expect("Failed to start gateway");
    let fleet = start_fleet(
        ClientConfig::new("test-token"),
        &gateway.url,
        1,
        EventDispatcher::new(4),
    );
    let session = Arc::clone(&fleet.sessions()[0]);

    let mut conn = gateway.next_connection().await.unwrap();
    conn.send(hello(30_000)).await.unwrap();
    conn.recv_op(2).await.unwrap();
    conn.send(ready(&unique_session_id(), 1)).await.unwrap();
    wait_for_state(&session, SessionState::Connected, Duration::from_secs(2))
        .await
        .unwrap();

    let stopping = {
        let fleet = Arc::clone(&fleet);
        tokio::spawn(async move { fleet.shutdown().await })
    };
    let code = conn.expect_close().await.unwrap();
    assert_eq!(code, Some(1000));
    stopping.await.unwrap();

    assert_eq!(session.state(), SessionState::Disconnected);
    fleet.closed().await.expect("clean shutdown is not an error");
    gateway
        .expect_no_connection(Duration::from_millis(500))
        .await
        .unwrap();
}

// ============================================================================
// Dispatch Tests
// ============================================================================

#[tokio::test]
async fn test_events_reach_listeners_in_context_order() {
    let mut gateway = FakeGateway::start().await.expect("Failed to start gateway");
    let dispatcher = EventDispatcher::new(4);
    let handler = CollectingHandler::with_delay(Duration::from_millis(15));
    dispatcher.on(EventKind::MessageCreate, handler.clone());
    dispatcher.on(EventKind::UserUpdate, handler.clone());

    let fleet = start_fleet(
        ClientConfig::new("test-token"),
        &gateway.url,
        1,
        dispatcher,
    );
    let session = Arc::clone(&fleet.sessions()[0]);

    let mut conn = gateway.next_connection().await.unwrap();
    conn.send(hello(30_000)).await.unwrap();
    conn.recv_op(2).await.unwrap();
    conn.send(ready(&unique_session_id(), 1)).await.unwrap();
    wait_for_state(&session, SessionState::Connected, Duration::from_secs(2))
        .await
        .unwrap();

    conn.send(message_create(2, "10", "first")).await.unwrap();
    conn.send(message_create(3, "10", "second")).await.unwrap();
    conn.send(user_update(4)).await.unwrap();
    conn.send(message_create(5, "20", "other server")).await.unwrap();
    conn.send(message_create(6, "10", "third")).await.unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while handler.len() < 5 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(handler.len(), 5);

    // Order holds within each context no matter how contexts interleave.
    let server_ten = DispatchContext::Server(Snowflake::new(10));
    assert_eq!(handler.sequences(server_ten), vec![2, 3, 6]);
    let server_twenty = DispatchContext::Server(Snowflake::new(20));
    assert_eq!(handler.sequences(server_twenty), vec![5]);
    assert_eq!(handler.sequences(DispatchContext::Global), vec![4]);

    fleet.shutdown().await;
}
