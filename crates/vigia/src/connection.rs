//! Socket connection lifecycle.
//!
//! Owns the transport, the persisted window identity, and the reconnect
//! loop. Reconnection is a flat fixed delay, not exponential backoff, and
//! stops once the connection is deliberately torn down. Outbound sends
//! are fire-and-forget: when the socket is not open the frame is dropped,
//! never queued.

use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::ClockHandle;
use crate::page::PageHandle;
use crate::protocol::{Channel, Message, Response};
use crate::result::{VigiaError, VigiaResult};

/// Flat delay between reconnect attempts.
pub const RECONNECT_DELAY_MS: u64 = 3_000;
/// Interval of the URL/title change poller.
pub const POLL_INTERVAL_MS: u64 = 1_000;
/// Persisted-storage key for the stable window identity.
pub const WINDOW_ID_KEY: &str = "vigia.windowId";

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No socket open; a retry may be pending
    Disconnected,
    /// Socket opening
    Connecting,
    /// Socket open, messages flowing
    Connected,
    /// Socket open but inbound dispatch suspended
    Paused,
}

/// Minimal socket surface the connection drives.
///
/// The host owns the real socket and calls back into
/// [`Connection::handle_open`] / [`Connection::handle_close`] /
/// the router on inbound frames.
pub trait SocketTransport {
    /// Begin opening a socket to the endpoint.
    fn open(&self, url: &str) -> VigiaResult<()>;

    /// Send a frame; returns `false` when the socket is not open.
    fn send(&self, frame: &str) -> bool;

    /// Close the socket.
    fn close(&self);

    /// Whether the socket is currently open.
    fn is_open(&self) -> bool;
}

/// Shared handle to a transport.
pub type TransportHandle = Arc<dyn SocketTransport>;

/// Connection state machine plus page-info poller.
pub struct Connection {
    page: PageHandle,
    clock: ClockHandle,
    transport: TransportHandle,
    endpoint: String,
    state: ConnectionState,
    window_id: String,
    session_id: Uuid,
    torn_down: bool,
    reconnect_at: Option<u64>,
    poll_at: u64,
    last_url: String,
    last_title: String,
    push_seq: u64,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state)
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Create a disconnected connection bound to an endpoint.
    ///
    /// The window identity persists across page loads; the session
    /// identity is fresh per construction.
    #[must_use]
    pub fn new(
        page: PageHandle,
        clock: ClockHandle,
        transport: TransportHandle,
        endpoint: impl Into<String>,
    ) -> Self {
        let window_id = page.persisted_get(WINDOW_ID_KEY).unwrap_or_else(|| {
            let id = Uuid::new_v4().to_string();
            page.persisted_set(WINDOW_ID_KEY, &id);
            id
        });
        let poll_at = clock.now_ms() + POLL_INTERVAL_MS;
        let last_url = page.page_url();
        let last_title = page.page_title();
        Self {
            page,
            clock,
            transport,
            endpoint: endpoint.into(),
            state: ConnectionState::Disconnected,
            window_id,
            session_id: Uuid::new_v4(),
            torn_down: false,
            reconnect_at: None,
            poll_at,
            last_url,
            last_title,
            push_seq: 0,
        }
    }

    /// Stable per-browsing-context identity.
    #[must_use]
    pub fn window_id(&self) -> &str {
        &self.window_id
    }

    /// Transient per-load identity.
    #[must_use]
    pub const fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether inbound dispatch is suspended.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.state == ConnectionState::Paused
    }

    /// Begin connecting; re-arms the retry timer on immediate failure.
    pub fn connect(&mut self) {
        self.torn_down = false;
        self.state = ConnectionState::Connecting;
        self.reconnect_at = None;
        if let Err(err) = self.transport.open(&self.endpoint) {
            warn!(%err, endpoint = %self.endpoint, "socket open failed");
            self.state = ConnectionState::Disconnected;
            self.schedule_reconnect();
        }
    }

    /// Host callback: the socket opened.
    ///
    /// Announces the window and session identity on the `system` channel.
    pub fn handle_open(&mut self) {
        self.state = ConnectionState::Connected;
        self.reconnect_at = None;
        info!(window = %self.window_id, session = %self.session_id, "connected");
        let payload = json!({
            "windowId": self.window_id,
            "sessionId": self.session_id,
            "url": self.page.page_url(),
            "title": self.page.page_title(),
        });
        let message = self.make_push(Channel::System, "connected", payload);
        self.send_message(&message);
    }

    /// Host callback: the socket closed.
    ///
    /// Drops back to `disconnected` and schedules a flat-delay retry
    /// unless deliberately torn down. The state becomes `connecting`
    /// again only when the retry actually fires.
    pub fn handle_close(&mut self) {
        self.state = ConnectionState::Disconnected;
        if self.torn_down {
            return;
        }
        debug!("socket closed, scheduling reconnect");
        self.schedule_reconnect();
    }

    /// Suspend inbound dispatch.
    pub fn pause(&mut self) -> VigiaResult<()> {
        if self.state != ConnectionState::Connected {
            return Err(VigiaError::invalid_state("cannot pause while not connected"));
        }
        self.state = ConnectionState::Paused;
        Ok(())
    }

    /// Resume inbound dispatch.
    pub fn resume(&mut self) -> VigiaResult<()> {
        if self.state != ConnectionState::Paused {
            return Err(VigiaError::invalid_state("not paused"));
        }
        self.state = ConnectionState::Connected;
        Ok(())
    }

    /// Close for good; suppresses reconnection.
    pub fn teardown(&mut self) {
        self.torn_down = true;
        self.reconnect_at = None;
        self.transport.close();
        self.state = ConnectionState::Disconnected;
    }

    /// Fire-and-forget send; drops the frame in any state but connected,
    /// paused included.
    pub fn send_message(&self, message: &Message) -> bool {
        if self.state != ConnectionState::Connected {
            return false;
        }
        match serde_json::to_string(message) {
            Ok(frame) => self.transport.send(&frame),
            Err(err) => {
                warn!(%err, "unserializable outbound message dropped");
                false
            }
        }
    }

    /// Fire-and-forget response send.
    pub fn send_response(&self, response: &Response) -> bool {
        if self.state != ConnectionState::Connected {
            return false;
        }
        match serde_json::to_string(response) {
            Ok(frame) => self.transport.send(&frame),
            Err(err) => {
                warn!(%err, "unserializable response dropped");
                false
            }
        }
    }

    /// Push an engine-originated event.
    pub fn push(&mut self, channel: Channel, action: &str, payload: Value) -> bool {
        let message = self.make_push(channel, action, payload);
        self.send_message(&message)
    }

    /// Drive the retry timer and the URL/title poller.
    pub fn tick(&mut self) {
        let now = self.clock.now_ms();
        if let Some(at) = self.reconnect_at {
            if now >= at && !self.torn_down {
                debug!("reconnect attempt");
                self.connect();
            }
        }
        if now >= self.poll_at {
            self.poll_at = now + POLL_INTERVAL_MS;
            self.poll_page_info();
        }
    }

    fn poll_page_info(&mut self) {
        let url = self.page.page_url();
        let title = self.page.page_title();
        if url == self.last_url && title == self.last_title {
            return;
        }
        self.last_url.clone_from(&url);
        self.last_title.clone_from(&title);
        self.push(
            Channel::Navigation,
            "changed",
            json!({ "url": url, "title": title }),
        );
    }

    fn schedule_reconnect(&mut self) {
        self.reconnect_at = Some(self.clock.now_ms() + RECONNECT_DELAY_MS);
    }

    fn make_push(&mut self, channel: Channel, action: &str, payload: Value) -> Message {
        self.push_seq += 1;
        Message::push(
            format!("push-{}-{}", self.session_id.simple(), self.push_seq),
            channel,
            action,
            payload,
            self.clock.now_ms(),
        )
    }
}

/// Recording in-memory transport for tests.
pub mod fake_transport {
    use super::{SocketTransport, VigiaError, VigiaResult};
    use std::sync::Mutex;

    /// Records sent frames and lets tests toggle socket state.
    #[derive(Debug, Default)]
    pub struct FakeSocket {
        inner: Mutex<Inner>,
    }

    #[derive(Debug, Default)]
    struct Inner {
        open: bool,
        fail_open: bool,
        opened: u32,
        sent: Vec<String>,
    }

    impl FakeSocket {
        /// New closed socket.
        #[must_use]
        pub fn shared() -> std::sync::Arc<Self> {
            std::sync::Arc::new(Self::default())
        }

        /// Make subsequent `open` calls fail.
        pub fn fail_open(&self, fail: bool) {
            self.inner.lock().unwrap().fail_open = fail;
        }

        /// Number of open attempts.
        pub fn opened(&self) -> u32 {
            self.inner.lock().unwrap().opened
        }

        /// Frames sent so far.
        pub fn sent(&self) -> Vec<String> {
            self.inner.lock().unwrap().sent.clone()
        }

        /// Simulate the peer dropping the socket.
        pub fn drop_socket(&self) {
            self.inner.lock().unwrap().open = false;
        }
    }

    impl SocketTransport for FakeSocket {
        fn open(&self, _url: &str) -> VigiaResult<()> {
            let mut inner = self.inner.lock().unwrap();
            inner.opened += 1;
            if inner.fail_open {
                return Err(VigiaError::Protocol {
                    message: "connection refused".to_string(),
                });
            }
            inner.open = true;
            Ok(())
        }

        fn send(&self, frame: &str) -> bool {
            let mut inner = self.inner.lock().unwrap();
            if !inner.open {
                return false;
            }
            inner.sent.push(frame.to_string());
            true
        }

        fn close(&self) {
            self.inner.lock().unwrap().open = false;
        }

        fn is_open(&self) -> bool {
            self.inner.lock().unwrap().open
        }
    }
}
