//! TCP Client Module
//!
//! [`HftClient`] ties the pieces together: one connection manager, the outbound
//! queue with its sender task, the receive task, the heartbeat task, the handler
//! registry and the shared stats. All background work runs on tokio tasks spawned
//! by [`HftClient::start`] and joined by [`HftClient::stop`].

use crate::config::Config;
use crate::connection::{ConnectError, Connection, ConnectionState};
use crate::handlers::{Handler, HandlerRegistry};
use crate::heartbeat::{run_heartbeat, HeartbeatInterval};
use crate::protocol::{Frame, MarketDataMessage, OrderMessage, FRAME_SIZE};
use crate::receiver::{run_receiver, ReceiveStrategy};
use crate::sender::{run_sender, OutboundQueue, SendError};
use crate::shutdown::ShutdownTrigger;
use crate::tracker::{ClientStats, LatencyDistribution, StatsReport, StatsTracker};

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;

/// State shared between the client handle and its tasks
struct Shared {
    config: Config,
    connection: Connection,
    queue: OutboundQueue,
    stats: Arc<StatsTracker>,
    handlers: HandlerRegistry,
    heartbeat_interval: HeartbeatInterval,
}

impl Shared {
    fn try_send(&self, frame: Frame) -> Result<(), SendError> {
        if !self.connection.is_connected() {
            return Err(SendError::NotConnected);
        }
        self.queue.push(frame)?;
        // Counted at enqueue time, not on transmission
        self.stats.record_sent(FRAME_SIZE);
        Ok(())
    }
}

/// Binary TCP client with background send, receive and heartbeat tasks
pub struct HftClient {
    shared: Arc<Shared>,
    shutdown: ShutdownTrigger,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl HftClient {
    /// Create a new client with the given configuration. Nothing connects yet.
    pub fn new(config: Config) -> Self {
        let stats = Arc::new(StatsTracker::new());
        let connection = Connection::new(config.host.clone(), config.port, stats.clone())
            .with_reconnect_timeout(config.reconnect_timeout());
        connection.set_auto_reconnect(
            config.auto_reconnect,
            Duration::from_millis(config.reconnect_interval_ms),
        );

        let shared = Shared {
            queue: OutboundQueue::new(config.queue_limit()),
            heartbeat_interval: HeartbeatInterval::new(Duration::from_millis(config.heartbeat_interval_ms)),
            handlers: HandlerRegistry::new(),
            connection,
            stats,
            config,
        };

        Self {
            shared: Arc::new(shared),
            shutdown: ShutdownTrigger::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    // ------------------------------------------------------------------
    // Connection
    // ------------------------------------------------------------------

    /// Connect within `timeout`. Returns false on failure, leaving the state Errored.
    pub async fn connect(&self, timeout: Duration) -> bool {
        self.shared.connection.connect(timeout).await
    }

    pub async fn try_connect(&self, timeout: Duration) -> Result<(), ConnectError> {
        self.shared.connection.try_connect(timeout).await
    }

    pub fn disconnect(&self) {
        self.shared.connection.disconnect();
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connection.is_connected()
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.connection.state()
    }

    /// Enable or disable automatic reconnection and set the retry interval
    pub fn set_auto_reconnect(&self, enable: bool, reconnect_interval_ms: u64) {
        self.shared
            .connection
            .set_auto_reconnect(enable, Duration::from_millis(reconnect_interval_ms));
    }

    pub fn set_heartbeat_interval(&self, interval_ms: u64) {
        self.shared
            .heartbeat_interval
            .set(Duration::from_millis(interval_ms));
    }

    // ------------------------------------------------------------------
    // Sending
    // ------------------------------------------------------------------

    /// Queue a frame for the sender task. Returns false unless Connected.
    pub fn send(&self, frame: Frame) -> bool {
        match self.try_send(frame) {
            Ok(()) => true,
            Err(e) => {
                log::debug!("Frame {} not queued: {}", frame.id, e);
                false
            }
        }
    }

    pub fn try_send(&self, frame: Frame) -> Result<(), SendError> {
        self.shared.try_send(frame)
    }

    pub fn send_order(&self, order: &OrderMessage) -> bool {
        self.send(Frame::order(order, self.shared.config.client_id))
    }

    pub fn send_market_data(&self, market_data: &MarketDataMessage) -> bool {
        self.send(Frame::market_data(market_data, self.shared.config.client_id))
    }

    pub fn send_heartbeat(&self) -> bool {
        self.send(Frame::heartbeat(self.shared.config.client_id))
    }

    /// Frames waiting for the sender task
    pub fn queue_len(&self) -> usize {
        self.shared.queue.len()
    }

    // ------------------------------------------------------------------
    // Handlers
    // ------------------------------------------------------------------

    /// Install a callback for its category. Register before [`start`](Self::start).
    pub fn register_handler(&self, handler: Handler) {
        self.shared.handlers.register(handler);
    }

    /// Remove every registered callback
    pub fn clear_handlers(&self) {
        self.shared.handlers.clear();
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    fn tasks(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_running(&self) -> bool {
        !self.tasks().is_empty()
    }

    /// Spawn the receive, send and heartbeat tasks. No-op if already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        let mut tasks = self.tasks();
        if !tasks.is_empty() {
            return;
        }
        self.shutdown.reset();

        let config = &self.shared.config;
        let strategy = ReceiveStrategy::from_config(config);
        let buffer_size = config.recv_buffer_size;
        let carry_over = config.reassemble_frames;

        let shared = self.shared.clone();
        let signal = self.shutdown.subscribe();
        tasks.push(tokio::spawn(async move {
            run_receiver(
                strategy,
                buffer_size,
                carry_over,
                &shared.connection,
                &shared.stats,
                &shared.handlers,
                signal,
            )
            .await
        }));

        let shared = self.shared.clone();
        let signal = self.shutdown.subscribe();
        tasks.push(tokio::spawn(async move {
            run_sender(&shared.queue, &shared.connection, &shared.stats, signal).await
        }));

        let shared = self.shared.clone();
        let signal = self.shutdown.subscribe();
        tasks.push(tokio::spawn(async move {
            let client_id = shared.config.client_id;
            run_heartbeat(
                &shared.heartbeat_interval,
                || shared.connection.is_connected(),
                || shared.try_send(Frame::heartbeat(client_id)).is_ok(),
                signal,
            )
            .await
        }));

        log::info!("HFT TCP Client started with background tasks");
    }

    /// Signal shutdown, wake the sender and wait for every task to finish, then
    /// close the socket and drop frames still waiting in the outbound queue.
    pub async fn stop(&self) {
        let handles = std::mem::take(&mut *self.tasks());
        if !handles.is_empty() {
            self.shutdown.trigger();
            self.shared.queue.wake();

            for handle in handles {
                if let Err(e) = handle.await {
                    log::error!("Client task failed: {}", e);
                }
            }
        }

        self.shared.connection.disconnect();
        let dropped = self.shared.queue.clear();
        if dropped > 0 {
            log::warn!("Dropped {} unsent frames on stop", dropped);
        }

        log::info!("HFT TCP Client stopped");
    }

    // ------------------------------------------------------------------
    // Statistics
    // ------------------------------------------------------------------

    pub fn get_stats(&self) -> ClientStats {
        self.shared.stats.snapshot()
    }

    /// Zero every counter and clear the latency window. Connection state is untouched.
    pub fn reset_stats(&self) {
        self.shared.stats.reset();
    }

    /// Percentiles over the most recent latency samples
    pub fn latency_distribution(&self) -> Option<LatencyDistribution> {
        self.shared
            .stats
            .distribution(self.shared.config.histogram_significant_figures)
    }

    /// Windowed latency samples in nanoseconds, oldest first
    pub fn latency_samples(&self) -> Vec<u64> {
        self.shared.stats.latency_samples()
    }

    pub fn stats_report(&self) -> StatsReport {
        StatsReport::new(
            &self.get_stats(),
            self.state().to_string(),
            self.latency_distribution(),
        )
    }

    /// Print the stats report as JSON and log a summary
    pub fn print_stats(&self) {
        let report = self.stats_report();
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{}", json),
            Err(e) => log::error!("Failed to serialize stats: {}", e),
        }
        report.log_summary();
    }
}

impl Drop for HftClient {
    fn drop(&mut self) {
        // Tasks still running observe the flag and exit on their own.
        self.shutdown.trigger();
        self.shared.queue.wake();
        self.shared.connection.disconnect();
    }
}
