//! Connection Driver Integration Tests
//!
//! Runs the tokio driver against in-memory transport and auth ports with
//! short real timeouts.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;

use feed_sync::application::ports::{
    AuthFailure, AuthPort, FeedTransport, FrameHandler, NoopDiagnostics, SocketEvent,
    TransportError,
};
use feed_sync::infrastructure::backoff::BackoffConfig;
use feed_sync::{
    AccessToken, ConnectionDriver, DriverError, DriverEvent, DriverPorts, EngineOutput,
    FeedConfig, ReconnectReason,
};

// =============================================================================
// Fakes
// =============================================================================

#[derive(Default)]
struct FakeTransport {
    hang_open: AtomicBool,
    opened: Mutex<Vec<String>>,
    socket: Mutex<Option<mpsc::UnboundedSender<SocketEvent>>>,
    sent: Mutex<Vec<String>>,
}

impl FakeTransport {
    fn push(&self, event: SocketEvent) {
        let socket = self.socket.lock().clone();
        socket.unwrap().send(event).unwrap();
    }
}

#[async_trait]
impl FeedTransport for FakeTransport {
    async fn open(
        &self,
        endpoint: &str,
        events: mpsc::UnboundedSender<SocketEvent>,
    ) -> Result<(), TransportError> {
        if self.hang_open.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.opened.lock().push(endpoint.to_string());
        *self.socket.lock() = Some(events);
        Ok(())
    }

    async fn send(&self, frame: String) -> Result<(), TransportError> {
        if self.socket.lock().is_none() {
            return Err(TransportError::NotConnected);
        }
        self.sent.lock().push(frame);
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        let socket = self.socket.lock().take();
        let socket = socket.ok_or(TransportError::NotConnected)?;
        let _ = socket.send(SocketEvent::Closed {
            code: 1000,
            reason: "bye".to_string(),
            clean: true,
        });
        Ok(())
    }
}

#[derive(Default)]
struct FakeAuth {
    reject_next: AtomicU32,
    presented: Mutex<Vec<String>>,
}

impl FakeAuth {
    fn authorise(&self, token: &AccessToken) -> Result<DateTime<Utc>, AuthFailure> {
        self.presented.lock().push(token.expose().to_string());
        let rejections = self.reject_next.load(Ordering::SeqCst);
        if rejections > 0 {
            self.reject_next.store(rejections - 1, Ordering::SeqCst);
            return Err(AuthFailure::Rejected {
                message: "expired".to_string(),
            });
        }
        Ok(Utc::now() + chrono::Duration::hours(1))
    }
}

#[async_trait]
impl AuthPort for FakeAuth {
    async fn fetch_auth(&self, token: &AccessToken) -> Result<DateTime<Utc>, AuthFailure> {
        self.authorise(token)
    }

    async fn update_auth(&self, token: &AccessToken) -> Result<DateTime<Utc>, AuthFailure> {
        self.authorise(token)
    }
}

#[derive(Default)]
struct FrameLog(Mutex<Vec<String>>);

impl FrameHandler for FrameLog {
    fn handle_frame(&self, frame: &str) {
        self.0.lock().push(frame.to_string());
    }
}

// =============================================================================
// Helpers
// =============================================================================

struct Harness {
    driver: ConnectionDriver,
    events: broadcast::Receiver<DriverEvent>,
    transport: Arc<FakeTransport>,
    auth: Arc<FakeAuth>,
    frames: Arc<FrameLog>,
}

fn config(token: Option<&str>) -> FeedConfig {
    let mut config = FeedConfig::new(vec!["wss://feed.test/stream".to_string()]);
    config.access_token = token.map(AccessToken::new);
    config.timeouts.open_socket = Duration::from_millis(100);
    config.timeouts.fetch_auth = Duration::from_millis(100);
    config.timeouts.close_socket = Duration::from_millis(100);
    config.reconnect = BackoffConfig {
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
        multiplier: 2.0,
        jitter_factor: 0.0,
    };
    config
}

fn start(config: &FeedConfig, transport: FakeTransport, auth: FakeAuth) -> Harness {
    let transport = Arc::new(transport);
    let auth = Arc::new(auth);
    let frames = Arc::new(FrameLog::default());
    let ports = DriverPorts::new(
        transport.clone(),
        auth.clone(),
        frames.clone(),
        Arc::new(NoopDiagnostics),
    );
    let mut driver = ConnectionDriver::spawn(config, ports);
    let events = driver.events();
    Harness {
        driver,
        events,
        transport,
        auth,
        frames,
    }
}

async fn wait_for(events: &mut broadcast::Receiver<DriverEvent>, wanted: &DriverEvent) {
    timeout(Duration::from_secs(5), async {
        loop {
            let event = events.recv().await.unwrap();
            if event == *wanted {
                return;
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {wanted:?}"));
}

async fn stop(harness: Harness) -> feed_sync::ConnectionDiagnostics {
    let Harness {
        driver, mut events, ..
    } = harness;
    driver.handle().finalise().await.unwrap();
    wait_for(&mut events, &DriverEvent::Stopped).await;
    driver.join().await.unwrap()
}

const ONLINE: DriverEvent = DriverEvent::Engine(EngineOutput::CameOnline);

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn connects_and_comes_online() {
    let mut harness = start(
        &config(Some("token-1")),
        FakeTransport::default(),
        FakeAuth::default(),
    );

    wait_for(&mut harness.events, &ONLINE).await;

    assert_eq!(*harness.transport.opened.lock(), vec!["wss://feed.test/stream"]);
    assert_eq!(*harness.auth.presented.lock(), vec!["token-1"]);
    let diagnostics = stop(harness).await;
    assert_eq!(diagnostics.reconnect_count, 0);
}

#[tokio::test]
async fn forwards_frames_and_sends() {
    let mut harness = start(
        &config(Some("token-1")),
        FakeTransport::default(),
        FakeAuth::default(),
    );
    wait_for(&mut harness.events, &ONLINE).await;

    harness
        .transport
        .push(SocketEvent::Frame(r#"{"type":"orders"}"#.to_string()));
    harness
        .driver
        .handle()
        .send(r#"{"subscribe":"orders"}"#.to_string())
        .await
        .unwrap();

    timeout(Duration::from_secs(5), async {
        while harness.frames.0.lock().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(*harness.frames.0.lock(), vec![r#"{"type":"orders"}"#]);
    assert_eq!(*harness.transport.sent.lock(), vec![r#"{"subscribe":"orders"}"#]);
    stop(harness).await;
}

#[tokio::test]
async fn unexpected_close_reconnects_with_backoff() {
    let mut harness = start(
        &config(Some("token-1")),
        FakeTransport::default(),
        FakeAuth::default(),
    );
    wait_for(&mut harness.events, &ONLINE).await;

    harness.transport.push(SocketEvent::Closed {
        code: 1006,
        reason: String::new(),
        clean: false,
    });

    wait_for(
        &mut harness.events,
        &DriverEvent::Engine(EngineOutput::WentOffline),
    )
    .await;
    wait_for(&mut harness.events, &ONLINE).await;

    assert_eq!(harness.transport.opened.lock().len(), 2);
    let diagnostics = stop(harness).await;
    assert_eq!(diagnostics.reconnect_count, 1);
    assert_eq!(diagnostics.unexpected_socket_close_count, 1);
    assert_eq!(
        diagnostics.last_reconnect_reason,
        Some(ReconnectReason::UnexpectedSocketClose)
    );
}

#[tokio::test]
async fn hung_open_times_out_and_reconnects() {
    let transport = FakeTransport::default();
    transport.hang_open.store(true, Ordering::SeqCst);
    let mut harness = start(&config(Some("token-1")), transport, FakeAuth::default());

    wait_for(
        &mut harness.events,
        &DriverEvent::Engine(EngineOutput::Reconnecting(ReconnectReason::Timeout)),
    )
    .await;

    let diagnostics = harness.driver.handle().diagnostics().await.unwrap();
    assert!(diagnostics.timeout_count >= 1);
    stop(harness).await;
}

#[tokio::test]
async fn rejected_token_requests_a_new_one() {
    let auth = FakeAuth::default();
    auth.reject_next.store(1, Ordering::SeqCst);
    let mut harness = start(&config(Some("stale")), FakeTransport::default(), auth);

    wait_for(
        &mut harness.events,
        &DriverEvent::Engine(EngineOutput::AccessTokenRequested),
    )
    .await;
    wait_for(
        &mut harness.events,
        &DriverEvent::Engine(EngineOutput::Reconnecting(ReconnectReason::AuthRejected)),
    )
    .await;

    harness
        .driver
        .handle()
        .update_access_token(AccessToken::new("fresh"))
        .await
        .unwrap();
    wait_for(&mut harness.events, &ONLINE).await;

    assert_eq!(*harness.auth.presented.lock(), vec!["stale", "fresh"]);
    stop(harness).await;
}

#[tokio::test]
async fn send_while_offline_is_not_connected() {
    let harness = start(&config(None), FakeTransport::default(), FakeAuth::default());

    let result = harness.driver.handle().send("{}".to_string()).await;

    assert!(matches!(
        result,
        Err(DriverError::Transport(TransportError::NotConnected))
    ));
    stop(harness).await;
}

#[tokio::test]
async fn shutdown_finalises_and_stops() {
    let mut harness = start(
        &config(Some("token-1")),
        FakeTransport::default(),
        FakeAuth::default(),
    );
    wait_for(&mut harness.events, &ONLINE).await;

    harness.driver.shutdown();
    wait_for(
        &mut harness.events,
        &DriverEvent::Engine(EngineOutput::Finalised),
    )
    .await;
    wait_for(&mut harness.events, &DriverEvent::Stopped).await;

    let handle = harness.driver.handle();
    harness.driver.join().await.unwrap();
    assert!(matches!(
        handle.update_endpoints(Vec::new()).await,
        Err(DriverError::Stopped)
    ));
}
