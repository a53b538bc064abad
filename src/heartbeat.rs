//! Heartbeat Scheduler
//!
//! Periodically enqueues a zero-payload keep-alive frame through the send
//! pipeline while connected. It never writes the socket itself.

use crate::shutdown::ShutdownSignal;

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Heartbeat period, adjustable while the task runs
#[derive(Debug)]
pub struct HeartbeatInterval(AtomicU64);

impl HeartbeatInterval {
    pub fn new(interval: Duration) -> Self {
        Self(AtomicU64::new(interval.as_millis() as u64))
    }

    pub fn get(&self) -> Duration {
        Duration::from_millis(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, interval: Duration) {
        self.0.store(interval.as_millis() as u64, Ordering::Release);
    }
}

/// Run until shutdown: if `is_connected`, call `send_heartbeat`; then sleep one interval.
pub(crate) async fn run_heartbeat<C, S>(
    interval: &HeartbeatInterval,
    is_connected: C,
    send_heartbeat: S,
    mut shutdown: ShutdownSignal,
) where
    C: Fn() -> bool,
    S: Fn() -> bool,
{
    log::info!("Heartbeat task started");

    while !shutdown.is_triggered() {
        if is_connected() && !send_heartbeat() {
            log::debug!("Heartbeat not queued");
        }

        // A zero interval still yields to the scheduler between heartbeats
        let period = interval.get().max(Duration::from_millis(1));
        if shutdown.sleep(period).await {
            break;
        }
    }

    log::info!("Heartbeat task stopped");
}
