//! Send Pipeline
//!
//! Outbound frame queue plus the single sender task that drains it onto the
//! socket. Only the sender task ever writes the stream, so frames from the caller
//! and from the heartbeat task never interleave on the wire.

use crate::connection::Connection;
use crate::protocol::Frame;
use crate::shutdown::ShutdownSignal;
use crate::tracker::StatsTracker;

use std::collections::VecDeque;
use std::io;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::Notify;

/// How long the sender waits before rechecking a down connection
const RECONNECT_WAIT: Duration = Duration::from_millis(10);

/// Enqueue rejection reasons
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    #[error("Not connected")]
    NotConnected,

    #[error("Outbound queue full ({0} frames)")]
    QueueFull(usize),
}

/// FIFO of frames waiting for the sender task.
///
/// Unbounded unless a limit is configured.
#[derive(Debug)]
pub struct OutboundQueue {
    frames: Mutex<VecDeque<Frame>>,
    notify: Notify,
    limit: Option<usize>,
}

impl OutboundQueue {
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            frames: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            limit,
        }
    }

    fn frames(&self) -> MutexGuard<'_, VecDeque<Frame>> {
        self.frames.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append a frame and wake the sender
    pub fn push(&self, frame: Frame) -> Result<(), SendError> {
        {
            let mut frames = self.frames();
            if let Some(limit) = self.limit {
                if frames.len() >= limit {
                    return Err(SendError::QueueFull(limit));
                }
            }
            frames.push_back(frame);
        }
        self.notify.notify_one();
        Ok(())
    }

    pub fn pop(&self) -> Option<Frame> {
        self.frames().pop_front()
    }

    pub fn len(&self) -> usize {
        self.frames().len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames().is_empty()
    }

    /// Drop every queued frame, returning how many were dropped
    pub fn clear(&self) -> usize {
        let mut frames = self.frames();
        let dropped = frames.len();
        frames.clear();
        dropped
    }

    /// Wake the sender without adding a frame
    pub fn wake(&self) {
        self.notify.notify_one();
    }

    /// Wait for a push or a wake. A notification sent while nobody waited is kept.
    pub async fn notified(&self) {
        self.notify.notified().await;
    }
}

/// Write one encoded frame in a single transmission. A short write is an error.
pub(crate) async fn write_frame(stream: &TcpStream, bytes: &[u8]) -> io::Result<()> {
    loop {
        stream.writable().await?;
        match stream.try_write(bytes) {
            Ok(n) if n == bytes.len() => return Ok(()),
            Ok(n) => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    format!("short write: {} of {} bytes", n, bytes.len()),
                ))
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
            Err(e) => return Err(e),
        }
    }
}

/// Drain the queue in order while Connected until shutdown.
pub(crate) async fn run_sender(
    queue: &OutboundQueue,
    connection: &Connection,
    stats: &StatsTracker,
    mut shutdown: ShutdownSignal,
) {
    log::info!("Send task started");

    while !shutdown.is_triggered() {
        // Frames stay queued while the connection is down.
        let Some(stream) = connection.stream() else {
            shutdown.sleep(RECONNECT_WAIT).await;
            continue;
        };

        let Some(frame) = queue.pop() else {
            drop(stream);
            tokio::select! {
                _ = queue.notified() => {}
                _ = shutdown.triggered() => {}
            }
            continue;
        };

        let bytes = frame.encode();
        match write_frame(&stream, &bytes).await {
            Ok(()) => {
                log::trace!("Sent frame id={} type={:?}", frame.id, frame.msg_type);
            }
            Err(e) => {
                log::error!("Send error: {}", e);
                stats.record_error();
                drop(stream);
                connection.handle_disconnection(&mut shutdown).await;
            }
        }
    }

    log::info!("Send task stopped");
}
