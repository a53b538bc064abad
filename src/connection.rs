//! Connection Manager Module
//!
//! Owns the TCP stream and the authoritative [`ConnectionState`]. Performs the
//! timeout-bounded connect with socket tuning, tears the stream down, and runs the
//! reconnect loop when the send or receive task reports a dead peer.
//!
//! State machine:
//!
//! ```text
//! Disconnected --connect()--> Connecting --ok--> Connected
//! Connecting --failed--> Errored
//! Connected --peer closed, auto-reconnect on--> Reconnecting --ok--> Connected
//! Reconnecting --failed, auto-reconnect turned off--> Errored
//! Connected --peer closed, auto-reconnect off--> Disconnected
//! any --disconnect()--> Disconnected
//! ```

use crate::shutdown::ShutdownSignal;
use crate::tracker::StatsTracker;

use std::fmt;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpSocket, TcpStream};

/// Send and receive buffer size applied to every socket
pub const SOCKET_BUFFER_SIZE: u32 = 1024 * 1024;

/// Connection error types
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("Failed to create socket: {0}")]
    SocketCreation(#[source] io::Error),

    #[error("Invalid server IP address: {0}")]
    InvalidAddress(String),

    #[error("Failed to connect: {0}")]
    Connect(#[source] io::Error),

    #[error("Connection timeout after {0:?}")]
    Timeout(Duration),

    #[error("Connection failed: {0}")]
    SocketError(#[source] io::Error),

    #[error("Connect attempt superseded by disconnect")]
    Aborted,
}

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    Reconnecting = 3,
    Errored = 4,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Connected,
            3 => Self::Reconnecting,
            4 => Self::Errored,
            _ => Self::Disconnected,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Connection manager shared by the client handle and its tasks
#[derive(Debug)]
pub struct Connection {
    host: String,
    port: u16,
    state: AtomicU8,
    /// `Some` only while Connected
    stream: Mutex<Option<Arc<TcpStream>>>,
    /// Serializes connect attempts from the caller and the reconnect loop
    connect_lock: tokio::sync::Mutex<()>,
    auto_reconnect: AtomicBool,
    reconnect_interval_ms: AtomicU64,
    reconnect_timeout: Duration,
    stats: Arc<StatsTracker>,
}

impl Connection {
    pub fn new(host: impl Into<String>, port: u16, stats: Arc<StatsTracker>) -> Self {
        Self {
            host: host.into(),
            port,
            state: AtomicU8::new(ConnectionState::Disconnected as u8),
            stream: Mutex::new(None),
            connect_lock: tokio::sync::Mutex::new(()),
            auto_reconnect: AtomicBool::new(true),
            reconnect_interval_ms: AtomicU64::new(1000),
            reconnect_timeout: Duration::from_millis(5000),
            stats,
        }
    }

    /// Timeout used by each reconnect attempt
    pub fn with_reconnect_timeout(mut self, timeout: Duration) -> Self {
        self.reconnect_timeout = timeout;
        self
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn set_auto_reconnect(&self, enable: bool, interval: Duration) {
        self.auto_reconnect.store(enable, Ordering::Release);
        self.reconnect_interval_ms
            .store(interval.as_millis() as u64, Ordering::Release);
    }

    pub fn auto_reconnect(&self) -> bool {
        self.auto_reconnect.load(Ordering::Acquire)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms.load(Ordering::Acquire))
    }

    fn slot(&self) -> MutexGuard<'_, Option<Arc<TcpStream>>> {
        self.stream.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Shared handle to the live stream, `None` unless Connected
    pub fn stream(&self) -> Option<Arc<TcpStream>> {
        if !self.is_connected() {
            return None;
        }
        self.slot().clone()
    }

    /// Connect, reporting the outcome as a boolean plus the observable state
    pub async fn connect(&self, timeout: Duration) -> bool {
        match self.try_connect(timeout).await {
            Ok(()) => true,
            Err(e) => {
                log::error!("{}", e);
                false
            }
        }
    }

    /// Timeout-bounded connect. A no-op when already Connected.
    ///
    /// Success moves the state to Connected and counts one connection attempt;
    /// any failure closes the partial socket, counts an error and leaves Errored.
    /// An explicit [`disconnect`](Self::disconnect) during the attempt wins: the
    /// new stream is dropped and [`ConnectError::Aborted`] is returned.
    pub async fn try_connect(&self, timeout: Duration) -> Result<(), ConnectError> {
        let _guard = self.connect_lock.lock().await;
        if self.is_connected() {
            return Ok(());
        }

        self.set_state(ConnectionState::Connecting);
        let result = self.attempt(timeout, ConnectionState::Connecting).await;
        if let Err(e) = &result {
            if !matches!(e, ConnectError::Aborted) {
                self.transition(ConnectionState::Connecting, ConnectionState::Errored);
            }
        }
        result
    }

    /// One connect attempt made while the state is `during`. The state is only
    /// advanced to Connected if it still reads `during` once the socket is up.
    async fn attempt(&self, timeout: Duration, during: ConnectionState) -> Result<(), ConnectError> {
        let stream = match self.open(timeout).await {
            Ok(stream) => stream,
            Err(e) => {
                self.stats.record_error();
                return Err(e);
            }
        };

        // Held across the transition so a concurrent disconnect either sees the
        // new stream or prevents it from being installed.
        let mut slot = self.slot();
        if !self.transition(during, ConnectionState::Connected) {
            drop(slot);
            log::info!("Connect to {} superseded, dropping new stream", self.server_addr());
            return Err(ConnectError::Aborted);
        }
        *slot = Some(Arc::new(stream));
        drop(slot);

        self.stats.record_connection();
        log::info!("Connected to HFT server at {}", self.server_addr());
        Ok(())
    }

    async fn open(&self, timeout: Duration) -> Result<TcpStream, ConnectError> {
        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|_| ConnectError::InvalidAddress(self.host.clone()))?;
        let addr = SocketAddr::new(ip, self.port);

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(ConnectError::SocketCreation)?;
        apply_socket_options(&socket);

        // Dropping the pending connect on timeout closes the socket.
        let stream = match tokio::time::timeout(timeout, socket.connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(ConnectError::Connect(e)),
            Err(_) => return Err(ConnectError::Timeout(timeout)),
        };

        if let Some(e) = stream.take_error().map_err(ConnectError::SocketError)? {
            return Err(ConnectError::SocketError(e));
        }
        if let Err(e) = stream.set_nodelay(true) {
            log::warn!("Failed to set TCP_NODELAY: {}", e);
        }
        Ok(stream)
    }

    fn close_stream(&self) {
        // Tasks holding a clone release it on their next iteration.
        self.slot().take();
    }

    /// Close the stream and settle in Disconnected. Idempotent.
    pub fn disconnect(&self) {
        if self.state() == ConnectionState::Disconnected {
            return;
        }
        self.set_state(ConnectionState::Disconnected);
        self.close_stream();
        log::info!("Disconnected from HFT server");
    }

    /// React to a closed peer or a fatal I/O error on the live stream.
    ///
    /// Only the first caller for a given connection does anything. With
    /// auto-reconnect on, the calling task runs the reconnect loop to completion.
    pub async fn handle_disconnection(&self, shutdown: &mut ShutdownSignal) {
        let next = if self.auto_reconnect() && !shutdown.is_triggered() {
            ConnectionState::Reconnecting
        } else {
            ConnectionState::Disconnected
        };
        if !self.transition(ConnectionState::Connected, next) {
            return;
        }
        self.close_stream();

        if next == ConnectionState::Reconnecting {
            self.reconnect(shutdown).await;
        } else {
            log::info!("Connection to {} lost, not reconnecting", self.server_addr());
        }
    }

    /// Fixed-interval retry loop. The state stays Reconnecting across attempts.
    /// Ends when connected, on explicit disconnect or another connect taking over,
    /// when auto-reconnect is turned off, or on shutdown.
    async fn reconnect(&self, shutdown: &mut ShutdownSignal) {
        loop {
            if self.state() != ConnectionState::Reconnecting {
                return;
            }
            if shutdown.is_triggered() || !self.auto_reconnect() {
                self.transition(ConnectionState::Reconnecting, ConnectionState::Disconnected);
                return;
            }

            let result = {
                let _guard = self.connect_lock.lock().await;
                if self.state() != ConnectionState::Reconnecting {
                    return;
                }
                self.stats.record_reconnection_attempt();
                log::info!("Attempting reconnection to {}...", self.server_addr());
                self.attempt(self.reconnect_timeout, ConnectionState::Reconnecting).await
            };

            match result {
                Ok(()) => {
                    log::info!("Reconnection successful");
                    return;
                }
                Err(ConnectError::Aborted) => return,
                Err(e) => {
                    if !self.auto_reconnect() {
                        log::warn!("Reconnection failed ({}), auto-reconnect disabled", e);
                        self.transition(ConnectionState::Reconnecting, ConnectionState::Errored);
                        return;
                    }
                    let interval = self.reconnect_interval();
                    log::warn!("Reconnection failed ({}), will retry in {:?}", e, interval);
                    shutdown.sleep(interval).await;
                }
            }
        }
    }
}

fn apply_socket_options(socket: &TcpSocket) {
    if let Err(e) = socket.set_reuseaddr(true) {
        log::warn!("Failed to set SO_REUSEADDR: {}", e);
    }
    if let Err(e) = socket.set_keepalive(true) {
        log::warn!("Failed to set SO_KEEPALIVE: {}", e);
    }
    if let Err(e) = socket.set_send_buffer_size(SOCKET_BUFFER_SIZE) {
        log::warn!("Failed to set SO_SNDBUF: {}", e);
    }
    if let Err(e) = socket.set_recv_buffer_size(SOCKET_BUFFER_SIZE) {
        log::warn!("Failed to set SO_RCVBUF: {}", e);
    }
}
