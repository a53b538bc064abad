//! Receive Pipeline
//!
//! One receive task reads the socket through a selectable [`ReceiveStrategy`],
//! splits each read into whole frames with a [`FrameAssembler`], records latency
//! and hands every frame to the handler registry.

use crate::config::{Config, ReceiveMode};
use crate::connection::Connection;
use crate::handlers::HandlerRegistry;
use crate::protocol::{now_nanos, Frame, FRAME_SIZE};
use crate::shutdown::ShutdownSignal;
use crate::tracker::StatsTracker;

use std::io;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::net::TcpStream;

/// Idle wait while the connection is down
const DISCONNECTED_WAIT: Duration = Duration::from_millis(10);

/// How the receive task waits for inbound bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveStrategy {
    /// Non-blocking read, then sleep `interval` before the next one
    Poll { interval: Duration },
    /// Wait up to `wait` for read-readiness from the reactor, then read
    Event { wait: Duration },
}

impl ReceiveStrategy {
    pub fn from_config(config: &Config) -> Self {
        match config.receive_mode {
            ReceiveMode::Poll => ReceiveStrategy::Poll {
                interval: Duration::from_micros(config.poll_interval_us),
            },
            ReceiveMode::Event => ReceiveStrategy::Event {
                wait: Duration::from_millis(config.event_wait_ms),
            },
        }
    }

    /// One read attempt. `Ok(None)` means nothing was available this round.
    async fn read(&self, stream: &TcpStream, buf: &mut [u8]) -> io::Result<Option<usize>> {
        if let ReceiveStrategy::Event { wait } = *self {
            match tokio::time::timeout(wait, stream.readable()).await {
                Ok(ready) => ready?,
                Err(_) => return Ok(None),
            }
        }

        match stream.try_read(buf) {
            Ok(n) => Ok(Some(n)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Pause applied after every read attempt
    fn pause(&self) -> Option<Duration> {
        match *self {
            ReceiveStrategy::Poll { interval } => Some(interval),
            ReceiveStrategy::Event { .. } => None,
        }
    }
}

/// Splits raw reads into frame-sized chunks.
///
/// By default a trailing partial frame is dropped and reported. With
/// carry-over enabled the partial bytes are prefixed to the next read instead.
#[derive(Debug)]
pub struct FrameAssembler {
    carry_over: bool,
    pending: Vec<u8>,
}

impl FrameAssembler {
    pub fn new(carry_over: bool) -> Self {
        Self {
            carry_over,
            pending: Vec::with_capacity(FRAME_SIZE),
        }
    }

    /// Bytes held back for the next read
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Forget any held-back bytes, returning how many were dropped.
    /// Called whenever the stream is replaced.
    pub fn reset(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }

    /// Feed one read. Calls `on_frame` for each complete frame and returns the
    /// number of trailing bytes discarded.
    pub fn push<F>(&mut self, mut data: &[u8], mut on_frame: F) -> usize
    where
        F: FnMut(Frame),
    {
        if !self.pending.is_empty() {
            let need = FRAME_SIZE - self.pending.len();
            let take = need.min(data.len());
            self.pending.extend_from_slice(&data[..take]);
            data = &data[take..];
            if self.pending.len() < FRAME_SIZE {
                return 0;
            }
            if let Ok(frame) = Frame::decode(&self.pending) {
                on_frame(frame);
            }
            self.pending.clear();
        }

        let mut chunks = data.chunks_exact(FRAME_SIZE);
        for chunk in &mut chunks {
            if let Ok(frame) = Frame::decode(chunk) {
                on_frame(frame);
            }
        }

        let rest = chunks.remainder();
        if rest.is_empty() {
            0
        } else if self.carry_over {
            self.pending.extend_from_slice(rest);
            0
        } else {
            rest.len()
        }
    }
}

/// Latency of a frame stamped by this side and echoed back, if it is stamped
fn frame_latency(frame: &Frame, now_ns: u64) -> Option<u64> {
    (frame.timestamp != 0).then(|| now_ns.saturating_sub(frame.timestamp))
}

/// Process one successful read of `data`
pub(crate) fn process_received_data(
    data: &[u8],
    assembler: &mut FrameAssembler,
    stats: &StatsTracker,
    handlers: &HandlerRegistry,
) {
    stats.record_bytes_received(data.len());

    let discarded = assembler.push(data, |frame| {
        stats.record_frame(frame_latency(&frame, now_nanos()));
        log::trace!("Received frame id={} type={:?}", frame.id, frame.msg_type);
        handlers.dispatch(&frame);
    });

    if discarded > 0 {
        log::warn!("Discarded {} trailing bytes of a partial frame", discarded);
        stats.record_discarded(discarded);
    }
}

/// Drop a partial frame left over from a stream that is gone
fn discard_pending(assembler: &mut FrameAssembler, stats: &StatsTracker) {
    let dropped = assembler.reset();
    if dropped > 0 {
        log::warn!("Discarded {} bytes of a partial frame from a closed stream", dropped);
        stats.record_discarded(dropped);
    }
}

/// Receive loop: read, split, dispatch; hand peer-closed and fatal errors to the
/// connection manager.
pub(crate) async fn run_receiver(
    strategy: ReceiveStrategy,
    buffer_size: usize,
    carry_over: bool,
    connection: &Connection,
    stats: &StatsTracker,
    handlers: &HandlerRegistry,
    mut shutdown: ShutdownSignal,
) {
    log::info!("Receive task started ({:?})", strategy);

    let mut buf = vec![0u8; buffer_size.max(FRAME_SIZE)];
    let mut assembler = FrameAssembler::new(carry_over);
    // Identity of the stream the assembler's pending bytes came from
    let mut current: Weak<TcpStream> = Weak::new();

    while !shutdown.is_triggered() {
        let Some(stream) = connection.stream() else {
            discard_pending(&mut assembler, stats);
            shutdown.sleep(DISCONNECTED_WAIT).await;
            continue;
        };
        if !Weak::ptr_eq(&current, &Arc::downgrade(&stream)) {
            discard_pending(&mut assembler, stats);
            current = Arc::downgrade(&stream);
        }

        let result = tokio::select! {
            r = strategy.read(&stream, &mut buf) => r,
            _ = shutdown.triggered() => break,
        };

        match result {
            Ok(Some(0)) => {
                log::info!("Server disconnected");
                drop(stream);
                discard_pending(&mut assembler, stats);
                connection.handle_disconnection(&mut shutdown).await;
                continue;
            }
            Ok(Some(n)) => process_received_data(&buf[..n], &mut assembler, stats, handlers),
            Ok(None) => {}
            Err(e) => {
                log::error!("Receive error: {}", e);
                stats.record_error();
                drop(stream);
                discard_pending(&mut assembler, stats);
                connection.handle_disconnection(&mut shutdown).await;
                continue;
            }
        }

        if let Some(pause) = strategy.pause() {
            shutdown.sleep(pause).await;
        }
    }

    log::info!("Receive task stopped");
}
