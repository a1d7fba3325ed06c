//! End-to-end bootstrap tests against an in-process key manager double.
//!
//! The mock key manager serves the control socket the way the real one
//! does: accept one connection, answer reset and limits requests, and stay
//! on the line until the daemon side closes it. Awaiting the mock task is
//! therefore also the assertion that teardown really closed the control
//! channel.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tempfile::TempDir;
use tkm_bridge::protocol::{
    decode_message, encode_message, ControlRequest, ControlResponse, EventHandler, EventRequest,
    EventResponse, FrameCodec,
};
use tkm_bridge::{
    bootstrap, BootstrapError, BridgeConfig, ChunkKey, ChunkRole, ContextKind, Handle, Limits,
};
use tokio::net::{UnixListener, UnixStream};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::codec::Framed;

/// Opt-in diagnostics: `RUST_LOG=debug cargo test` shows the bridge's
/// structured logs alongside failures.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Capacities used throughout: nc:2 dh:1 cc:0 ae:1 isa:1 esa:1.
fn scenario_limits() -> Limits {
    Limits {
        max_requests: 2,
        nonce: 2,
        dh: 1,
        cipher: 0,
        auth: 1,
        ike_sa: 1,
        esp_sa: 1,
    }
}

#[derive(Clone, Copy)]
enum MockBehavior {
    Healthy(Limits),
    RefuseReset,
    RefuseLimits,
}

/// Serve the control socket until the daemon side closes it.
fn spawn_mock_tkm(listener: UnixListener, behavior: MockBehavior) -> JoinHandle<()> {
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut framed = Framed::new(stream, FrameCodec::new());
        while let Some(Ok(frame)) = framed.next().await {
            let request: ControlRequest = decode_message(&frame).unwrap();
            let response = match (behavior, request) {
                (MockBehavior::RefuseReset, ControlRequest::Reset) => ControlResponse::Error {
                    reason: "reset refused".to_string(),
                },
                (_, ControlRequest::Reset) => ControlResponse::Ack,
                (MockBehavior::Healthy(limits), ControlRequest::QueryLimits) => {
                    ControlResponse::Limits(limits)
                }
                (_, ControlRequest::QueryLimits) => ControlResponse::Error {
                    reason: "limits unavailable".to_string(),
                },
            };
            framed
                .send(encode_message(&response).unwrap())
                .await
                .unwrap();
        }
    })
}

struct NullHandler;

impl EventHandler for NullHandler {
    fn esp_sa_expired(&self, _sp_id: u64, _protocol: u8, _soft: bool) -> Result<(), String> {
        Ok(())
    }
}

struct RecordingHandler {
    seen: Mutex<Vec<(u64, u8, bool)>>,
}

impl EventHandler for RecordingHandler {
    fn esp_sa_expired(&self, sp_id: u64, protocol: u8, soft: bool) -> Result<(), String> {
        self.seen.lock().unwrap().push((sp_id, protocol, soft));
        Ok(())
    }
}

struct TestEnv {
    config: BridgeConfig,
    _tmp: TempDir,
}

fn test_env() -> TestEnv {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let config = BridgeConfig::default()
        .with_control_socket(tmp.path().join("tkm.rpc.ike"))
        .with_event_socket(tmp.path().join("tkm.rpc.ees"));
    TestEnv { config, _tmp: tmp }
}

async fn await_mock(mock: JoinHandle<()>) {
    timeout(Duration::from_secs(5), mock)
        .await
        .expect("control channel was not closed")
        .expect("mock key manager panicked");
}

#[tokio::test]
async fn bootstrap_reaches_ready_with_served_limits() {
    let env = test_env();
    let listener = UnixListener::bind(&env.config.control_socket).unwrap();
    let mock = spawn_mock_tkm(listener, MockBehavior::Healthy(scenario_limits()));

    let runtime = bootstrap(&env.config, Arc::new(NullHandler)).await.unwrap();
    let context = Arc::clone(runtime.context());
    assert_eq!(*context.id_manager().limits(), scenario_limits());

    // The interface scenario, end to end through the bootstrapped context.
    let ids = context.id_manager();
    assert_eq!(ids.acquire(ContextKind::Dh).unwrap(), Handle(0));
    assert!(ids.acquire(ContextKind::Dh).unwrap_err().is_recoverable());
    ids.release(ContextKind::Dh, Handle(0)).unwrap();
    assert_eq!(ids.acquire(ContextKind::Dh).unwrap(), Handle(0));
    assert!(ids.acquire(ContextKind::Cipher).is_err());

    // Stash and consume a buffer the way a negotiation step would.
    let key = ChunkKey::context(ContextKind::Dh, Handle(0), ChunkRole::PublicValue);
    context
        .chunk_map()
        .put(key.clone(), Bytes::from_static(b"ke"), false)
        .unwrap();
    assert_eq!(
        context.chunk_map().take(&key).unwrap(),
        Bytes::from_static(b"ke")
    );
    ids.release(ContextKind::Dh, Handle(0)).unwrap();

    // The gated control client stays usable after bootstrap.
    let response = runtime
        .control()
        .request(&ControlRequest::QueryLimits)
        .await
        .unwrap();
    assert_eq!(response, ControlResponse::Limits(scenario_limits()));

    let event_socket = env.config.event_socket.clone();
    assert!(event_socket.exists());
    drop(context);
    runtime.shutdown().await;

    // Shutdown removed the event socket and closed the control channel.
    assert!(!event_socket.exists());
    await_mock(mock).await;
}

#[tokio::test]
async fn limits_query_failure_unwinds_everything() {
    let env = test_env();
    let listener = UnixListener::bind(&env.config.control_socket).unwrap();
    let mock = spawn_mock_tkm(listener, MockBehavior::RefuseLimits);

    let err = bootstrap(&env.config, Arc::new(NullHandler))
        .await
        .unwrap_err();
    assert!(matches!(err, BootstrapError::LimitsQueryFailed(_)));

    // No dangling listener, no open control channel.
    assert!(!env.config.event_socket.exists());
    await_mock(mock).await;
}

#[tokio::test]
async fn reset_failure_unwinds_everything() {
    let env = test_env();
    let listener = UnixListener::bind(&env.config.control_socket).unwrap();
    let mock = spawn_mock_tkm(listener, MockBehavior::RefuseReset);

    let err = bootstrap(&env.config, Arc::new(NullHandler))
        .await
        .unwrap_err();
    assert!(matches!(err, BootstrapError::ResetFailed(_)));

    assert!(!env.config.event_socket.exists());
    await_mock(mock).await;
}

#[tokio::test]
async fn missing_control_socket_fails_fast() {
    let env = test_env();

    let err = bootstrap(&env.config, Arc::new(NullHandler))
        .await
        .unwrap_err();
    assert!(matches!(err, BootstrapError::ConnectionFailed { .. }));

    // The event listener was never opened.
    assert!(!env.config.event_socket.exists());
}

#[tokio::test]
async fn event_listener_refusal_unwinds_control_channel() {
    let env = test_env();
    let listener = UnixListener::bind(&env.config.control_socket).unwrap();
    let mock = spawn_mock_tkm(listener, MockBehavior::Healthy(scenario_limits()));

    // Occupy the event socket path with a regular file.
    std::fs::write(&env.config.event_socket, b"imposter").unwrap();

    let err = bootstrap(&env.config, Arc::new(NullHandler))
        .await
        .unwrap_err();
    assert!(matches!(err, BootstrapError::ListenerFailed { .. }));

    // The imposter is untouched and the control channel is closed.
    assert!(env.config.event_socket.exists());
    await_mock(mock).await;
}

#[tokio::test]
async fn event_pushes_reach_the_handler() {
    let env = test_env();
    let listener = UnixListener::bind(&env.config.control_socket).unwrap();
    let mock = spawn_mock_tkm(listener, MockBehavior::Healthy(scenario_limits()));

    let handler = Arc::new(RecordingHandler {
        seen: Mutex::new(Vec::new()),
    });
    let runtime = bootstrap(&env.config, Arc::clone(&handler) as Arc<dyn EventHandler>)
        .await
        .unwrap();

    // Push an expiry the way the key manager would.
    let stream = UnixStream::connect(&env.config.event_socket).await.unwrap();
    let mut framed = Framed::new(stream, FrameCodec::new());
    framed
        .send(
            encode_message(&EventRequest::EspSaExpired {
                sp_id: 42,
                protocol: 50,
                soft: false,
            })
            .unwrap(),
        )
        .await
        .unwrap();
    let frame = framed.next().await.unwrap().unwrap();
    let response: EventResponse = decode_message(&frame).unwrap();
    assert_eq!(response, EventResponse::Ack);
    assert_eq!(*handler.seen.lock().unwrap(), vec![(42, 50, false)]);

    drop(framed);
    runtime.shutdown().await;
    await_mock(mock).await;
}
