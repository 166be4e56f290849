//! Dedicated writer task for outbound packets.
//!
//! The session never writes to the transport directly. It encodes packets and
//! hands them to a writer task over an mpsc channel; the task batches every
//! packet already queued into a single vectored write.
//!
//! # Architecture
//!
//! ```text
//! Session ─► WriterHandle::try_send ─► mpsc ─► Writer Task ─► Transport
//! ```
//!
//! Dropping every [`WriterHandle`] closes the channel; the task drains what is
//! queued, flushes, shuts the write half down and exits.

use std::io::IoSlice;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{Result, RoutewireError};
use crate::protocol::{Packet, HEADER_SIZE};

/// Default maximum queued packets before sends are refused.
pub const DEFAULT_MAX_PENDING_PACKETS: usize = 1024;

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Maximum packets to batch in a single write operation.
const MAX_BATCH_SIZE: usize = 64;

/// A packet ready to be written.
#[derive(Debug)]
pub struct OutboundPacket {
    /// Pre-encoded header (4 bytes).
    pub header: [u8; HEADER_SIZE],
    /// Body bytes (empty for heartbeats and handshake acks).
    pub body: Bytes,
}

impl OutboundPacket {
    /// Encode the header of `packet`.
    ///
    /// # Errors
    ///
    /// `Protocol` if the body is larger than the header can describe.
    #[inline]
    pub fn new(packet: Packet) -> Result<Self> {
        Ok(Self {
            header: packet.header()?,
            body: packet.body,
        })
    }

    /// Total size of this packet (header + body).
    #[inline]
    pub fn size(&self) -> usize {
        HEADER_SIZE + self.body.len()
    }
}

/// Configuration for the writer task.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Maximum queued packets before `try_send` refuses.
    pub max_pending_packets: usize,
    /// Channel capacity for the packet queue.
    pub channel_capacity: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_pending_packets: DEFAULT_MAX_PENDING_PACKETS,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Handle for queueing packets on the writer task.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<OutboundPacket>,
    pending: Arc<AtomicUsize>,
    max_pending: usize,
}

impl WriterHandle {
    fn new(tx: mpsc::Sender<OutboundPacket>, pending: Arc<AtomicUsize>, max_pending: usize) -> Self {
        Self {
            tx,
            pending,
            max_pending,
        }
    }

    /// Current number of queued packets.
    #[inline]
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Queue a packet without waiting.
    ///
    /// Returns `Err(Backpressure)` immediately if the queue is full and
    /// `Err(ConnectionClosed)` if the writer task has exited.
    pub fn try_send(&self, packet: OutboundPacket) -> Result<()> {
        let current = self.pending.load(Ordering::Acquire);
        if current >= self.max_pending {
            return Err(RoutewireError::Backpressure);
        }

        self.pending.fetch_add(1, Ordering::AcqRel);

        self.tx.try_send(packet).map_err(|e| {
            self.pending.fetch_sub(1, Ordering::Release);
            match e {
                mpsc::error::TrySendError::Full(_) => RoutewireError::Backpressure,
                mpsc::error::TrySendError::Closed(_) => RoutewireError::ConnectionClosed,
            }
        })
    }
}

/// Spawn the writer task and return a handle for queueing packets.
///
/// The `JoinHandle` resolves once the channel is closed and drained, or on
/// the first write error.
pub fn spawn_writer_task<W>(writer: W, config: WriterConfig) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(config.channel_capacity);
    let pending = Arc::new(AtomicUsize::new(0));

    let handle = WriterHandle::new(tx, pending.clone(), config.max_pending_packets);
    let task = tokio::spawn(writer_loop(rx, writer, pending));

    (handle, task)
}

async fn writer_loop<W>(
    mut rx: mpsc::Receiver<OutboundPacket>,
    mut writer: W,
    pending: Arc<AtomicUsize>,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(first) = rx.recv().await {
        let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
        batch.push(first);

        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(packet) => batch.push(packet),
                Err(_) => break,
            }
        }

        let batch_size = batch.len();
        write_batch(&mut writer, &batch).await?;
        pending.fetch_sub(batch_size, Ordering::Release);
    }

    // Channel closed: every handle is gone
    writer.shutdown().await?;
    Ok(())
}

/// Write a batch of packets with `write_vectored`, continuing after partial
/// writes.
async fn write_batch<W>(writer: &mut W, batch: &[OutboundPacket]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if batch.is_empty() {
        return Ok(());
    }

    let total_size: usize = batch.iter().map(OutboundPacket::size).sum();
    let mut total_written = 0;

    while total_written < total_size {
        let slices = build_remaining_slices(batch, total_written);
        if slices.is_empty() {
            break;
        }

        let written = writer.write_vectored(&slices).await?;
        if written == 0 {
            return Err(RoutewireError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            )));
        }
        total_written += written;
    }

    writer.flush().await?;
    Ok(())
}

/// IoSlices for the part of `batch` after the first `skip_bytes` bytes.
fn build_remaining_slices(batch: &[OutboundPacket], skip_bytes: usize) -> Vec<IoSlice<'_>> {
    let mut slices = Vec::with_capacity(batch.len() * 2);
    let mut skipped = 0;

    for packet in batch {
        let header_end = skipped + HEADER_SIZE;
        if skip_bytes < header_end {
            let start = skip_bytes.saturating_sub(skipped);
            slices.push(IoSlice::new(&packet.header[start..]));
        }
        skipped = header_end;

        if !packet.body.is_empty() {
            let body_end = skipped + packet.body.len();
            if skip_bytes < body_end {
                let start = skip_bytes.saturating_sub(skipped);
                slices.push(IoSlice::new(&packet.body[start..]));
            }
            skipped = body_end;
        }
    }

    slices
}
