//! Shared test helpers: a scripted connector and polling utilities.
//!
//! Tests CAN use `.unwrap()` and `.expect()` - this is allowed. We test
//! the panic-free behavior of production code through assertions.

// Not every test binary uses every helper.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use tape_core::{ChannelId, ChannelState};
use tape_feed::{Connector, FeedHandle, FrameSource, TransportError};
use tape_protocol::ChannelMessage;

// ============================================================================
// Scripted Connector
// ============================================================================

/// What a scripted connection should yield next.
pub enum MockFrame {
    Payload(Vec<u8>),
    Close,
    Fail(String),
}

/// One connection handed out by the mock connector.
pub struct MockConnection {
    pub url: String,
    frame_tx: mpsc::UnboundedSender<MockFrame>,
}

impl MockConnection {
    /// Pushes a payload frame into the connection.
    ///
    /// Ignores send failures: the manager may have torn the connection
    /// down already, which is exactly what some tests assert.
    pub fn send_payload(&self, payload: &[u8]) {
        let _ = self.frame_tx.send(MockFrame::Payload(payload.to_vec()));
    }

    /// Closes the connection from the "server" side.
    pub fn send_close(&self) {
        let _ = self.frame_tx.send(MockFrame::Close);
    }

    /// Fails the connection from the "server" side.
    pub fn send_fail(&self, message: &str) {
        let _ = self.frame_tx.send(MockFrame::Fail(message.to_string()));
    }
}

#[derive(Default)]
struct MockState {
    connections: Vec<Arc<MockConnection>>,
    refuse: bool,
}

/// Connector whose connections are driven by the test.
///
/// Each `connect` call registers a [`MockConnection`] the test can feed
/// frames through; while `refuse` is set, connection attempts fail.
#[derive(Clone, Default)]
pub struct MockConnector {
    state: Arc<Mutex<MockState>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent connection attempts fail (or succeed again).
    pub fn set_refuse(&self, refuse: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.refuse = refuse;
        }
    }

    /// Number of successful connects so far.
    pub fn connection_count(&self) -> usize {
        self.state.lock().map(|s| s.connections.len()).unwrap_or(0)
    }

    /// The `index`-th connection handed out (0-based).
    pub fn connection(&self, index: usize) -> Arc<MockConnection> {
        self.state
            .lock()
            .ok()
            .and_then(|s| s.connections.get(index).cloned())
            .expect("requested connection does not exist")
    }

    /// URLs of every connect call, in order.
    pub fn connected_urls(&self) -> Vec<String> {
        self.state
            .lock()
            .map(|s| s.connections.iter().map(|c| c.url.clone()).collect())
            .unwrap_or_default()
    }
}

struct MockSource {
    rx: mpsc::UnboundedReceiver<MockFrame>,
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn FrameSource>, TransportError> {
        let (frame_tx, rx) = mpsc::unbounded_channel();
        {
            let mut state = match self.state.lock() {
                Ok(state) => state,
                Err(poisoned) => poisoned.into_inner(),
            };
            if state.refuse {
                return Err(TransportError::Connect("connection refused".to_string()));
            }
            state.connections.push(Arc::new(MockConnection {
                url: url.to_string(),
                frame_tx,
            }));
        }
        Ok(Box::new(MockSource { rx }))
    }
}

#[async_trait]
impl FrameSource for MockSource {
    async fn next_frame(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        match self.rx.recv().await {
            Some(MockFrame::Payload(payload)) => Ok(Some(payload)),
            Some(MockFrame::Close) => Ok(None),
            Some(MockFrame::Fail(message)) => Err(TransportError::Stream(message)),
            // Test dropped the connection handle: treat as clean close
            None => Ok(None),
        }
    }

    async fn close(&mut self) {
        self.rx.close();
    }
}

// ============================================================================
// Frames
// ============================================================================

/// A well-formed quote frame for the given symbol.
pub fn quote_frame(symbol: &str) -> Vec<u8> {
    format!(
        r#"{{
            "ts": "2025-11-14T15:32:08Z",
            "symbol": "{symbol}",
            "bid": 600.00,
            "ask": 600.02,
            "last": 600.01,
            "volume": 1000
        }}"#
    )
    .into_bytes()
}

/// A well-formed options-flow frame for the given symbol.
pub fn flow_frame(symbol: &str) -> Vec<u8> {
    format!(
        r#"{{
            "ts": "2025-11-14T15:32:07Z",
            "symbol": "{symbol}",
            "option_type": "call",
            "side": "buy",
            "strike": 600.0,
            "expiry": "2025-12-19",
            "size": 100,
            "premium": 25000.0
        }}"#
    )
    .into_bytes()
}

// ============================================================================
// Counters and Polling
// ============================================================================

/// Callback that counts invocations and records symbols in order.
pub struct RecordingSubscriber {
    pub count: Arc<AtomicUsize>,
    pub symbols: Arc<Mutex<Vec<String>>>,
}

impl RecordingSubscriber {
    pub fn new() -> Self {
        Self {
            count: Arc::new(AtomicUsize::new(0)),
            symbols: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Builds the callback closure to hand to `subscribe`.
    pub fn callback(&self) -> impl Fn(&ChannelMessage) + Send + Sync + 'static {
        let count = Arc::clone(&self.count);
        let symbols = Arc::clone(&self.symbols);
        move |msg| {
            let symbol = match msg {
                ChannelMessage::Flow(f) => f.symbol.clone(),
                ChannelMessage::Gamma(g) => g.symbol.clone(),
                ChannelMessage::Quote(q) => q.symbol.clone(),
                ChannelMessage::Portfolio(p) => p.account.clone(),
            };
            if let Ok(mut seen) = symbols.lock() {
                seen.push(symbol);
            }
            count.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    pub fn symbols(&self) -> Vec<String> {
        self.symbols.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl Default for RecordingSubscriber {
    fn default() -> Self {
        Self::new()
    }
}

const POLL_INTERVAL: Duration = Duration::from_millis(5);
const POLL_TIMEOUT: Duration = Duration::from_secs(2);

/// Polls until `predicate` holds, panicking after the timeout.
pub async fn wait_until<F>(what: &str, mut predicate: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + POLL_TIMEOUT;
    loop {
        if predicate() {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Polls `stats` until the channel reaches `state`.
pub async fn wait_for_state(handle: &FeedHandle, channel: ChannelId, state: ChannelState) {
    let deadline = tokio::time::Instant::now() + POLL_TIMEOUT;
    loop {
        let current = handle
            .stats()
            .await
            .ok()
            .and_then(|stats| stats.get(&channel).map(|s| s.state));
        if current == Some(state) {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {channel} to reach {state}, currently {current:?}"
        );
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Polls `stats` until the channel reports `expected` subscribers.
pub async fn wait_for_subscriber_count(handle: &FeedHandle, channel: ChannelId, expected: usize) {
    let deadline = tokio::time::Instant::now() + POLL_TIMEOUT;
    loop {
        let current = handle
            .stats()
            .await
            .ok()
            .and_then(|stats| stats.get(&channel).map(|s| s.subscriber_count));
        if current == Some(expected) {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {channel} to reach {expected} subscribers, currently {current:?}"
        );
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Polls until the subscriber has seen `expected` messages.
pub async fn wait_for_count(subscriber: &RecordingSubscriber, expected: usize) {
    let count = Arc::clone(&subscriber.count);
    wait_until(&format!("subscriber to reach {expected} messages"), move || {
        count.load(Ordering::SeqCst) >= expected
    })
    .await;
}
