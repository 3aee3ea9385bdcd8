//! Dedicated writer task for strictly-ordered outbound bytes.
//!
//! Every outbound write - raw keystrokes, framed keystrokes, control
//! frames, page requests - funnels through one mpsc channel into a single
//! writer task. Reordering here would desynchronize the remote parser (the
//! frame that reacts to the handshake must precede the first framed
//! keystroke), so there is never a second path to the transport.
//!
//! # Architecture
//!
//! ```text
//! Session   ─┐
//! Handle 1  ─┼─► mpsc::Sender<OutboundChunk> ─► Writer Task ─► Transport
//! Handle N  ─┘
//! ```
//!
//! Multiple ready chunks are coalesced into a single vectored write. A
//! pending-count cap provides backpressure so a stalled transport cannot
//! buffer unbounded output.

use std::io::IoSlice;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{MuxError, Result};
use crate::protocol::{FrameType, Header, HEADER_SIZE};

/// Default maximum pending chunks before backpressure kicks in.
pub const DEFAULT_MAX_PENDING_CHUNKS: usize = 1024;

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Default backpressure timeout.
pub const DEFAULT_BACKPRESSURE_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum chunks to batch in a single write operation.
const MAX_BATCH_SIZE: usize = 64;

/// One logical outbound write: a framed header+payload pair, or a raw
/// byte run for passthrough mode.
#[derive(Debug)]
pub struct OutboundChunk {
    /// Pre-encoded frame header; `None` for raw-mode writes.
    header: Option<[u8; HEADER_SIZE]>,
    /// Payload bytes (may be empty for zero-length control frames).
    payload: Bytes,
}

impl OutboundChunk {
    /// A framed write: header and payload go out as one unit.
    pub fn framed(frame_type: FrameType, payload: Bytes) -> Self {
        let header = Header::for_frame(frame_type, payload.len() as u32);
        Self {
            header: Some(header.encode()),
            payload,
        }
    }

    /// A zero-length control frame.
    pub fn control(frame_type: FrameType) -> Self {
        Self::framed(frame_type, Bytes::new())
    }

    /// A raw passthrough write, no framing.
    pub fn raw(payload: Bytes) -> Self {
        Self {
            header: None,
            payload,
        }
    }

    /// Total size of this chunk on the wire.
    #[inline]
    pub fn size(&self) -> usize {
        self.header.map_or(0, |h| h.len()) + self.payload.len()
    }
}

/// Configuration for the writer task.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Maximum pending chunks before backpressure kicks in.
    pub max_pending: usize,
    /// Channel capacity for the outbound queue.
    pub channel_capacity: usize,
    /// Timeout when waiting for backpressure to clear.
    pub backpressure_timeout: Duration,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_pending: DEFAULT_MAX_PENDING_CHUNKS,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            backpressure_timeout: DEFAULT_BACKPRESSURE_TIMEOUT,
        }
    }
}

/// Handle for sending chunks to the writer task.
///
/// Cheaply cloneable; every clone feeds the same serialized queue, so
/// program order is preserved regardless of calling task.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<OutboundChunk>,
    pending: Arc<AtomicUsize>,
    max_pending: usize,
    timeout: Duration,
}

impl WriterHandle {
    fn new(
        tx: mpsc::Sender<OutboundChunk>,
        pending: Arc<AtomicUsize>,
        max_pending: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            tx,
            pending,
            max_pending,
            timeout,
        }
    }

    /// Queue a chunk for writing.
    ///
    /// Waits if backpressure is active, timing out after the configured
    /// duration.
    pub async fn send(&self, chunk: OutboundChunk) -> Result<()> {
        let current = self.pending.load(Ordering::Acquire);
        if current >= self.max_pending {
            self.wait_for_backpressure().await?;
        }

        self.pending.fetch_add(1, Ordering::AcqRel);

        self.tx.send(chunk).await.map_err(|_| {
            self.pending.fetch_sub(1, Ordering::Release);
            MuxError::ConnectionClosed
        })
    }

    /// Queue a chunk without waiting; fails immediately at capacity.
    pub fn try_send(&self, chunk: OutboundChunk) -> Result<()> {
        let current = self.pending.load(Ordering::Acquire);
        if current >= self.max_pending {
            return Err(MuxError::BackpressureTimeout);
        }

        self.pending.fetch_add(1, Ordering::AcqRel);

        self.tx.try_send(chunk).map_err(|e| {
            self.pending.fetch_sub(1, Ordering::Release);
            match e {
                mpsc::error::TrySendError::Full(_) => MuxError::BackpressureTimeout,
                mpsc::error::TrySendError::Closed(_) => MuxError::ConnectionClosed,
            }
        })
    }

    async fn wait_for_backpressure(&self) -> Result<()> {
        let start = Instant::now();
        let check_interval = Duration::from_micros(100);

        loop {
            if self.pending.load(Ordering::Acquire) < self.max_pending {
                return Ok(());
            }
            if start.elapsed() > self.timeout {
                return Err(MuxError::BackpressureTimeout);
            }
            tokio::time::sleep(check_interval).await;
        }
    }

    /// Check if backpressure is currently active.
    #[inline]
    pub fn is_backpressure_active(&self) -> bool {
        self.pending.load(Ordering::Acquire) >= self.max_pending
    }

    /// Get current pending chunk count.
    #[inline]
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }
}

/// Spawn the writer task and return a handle for sending chunks.
pub fn spawn_writer_task<W>(
    writer: W,
    config: WriterConfig,
) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(config.channel_capacity);
    let pending = Arc::new(AtomicUsize::new(0));

    let handle = WriterHandle::new(
        tx,
        pending.clone(),
        config.max_pending,
        config.backpressure_timeout,
    );

    let task = tokio::spawn(writer_loop(rx, writer, pending));

    (handle, task)
}

/// Spawn the writer task with default configuration.
pub fn spawn_writer_task_default<W>(writer: W) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    spawn_writer_task(writer, WriterConfig::default())
}

/// Main writer loop - receives chunks and writes them in arrival order.
async fn writer_loop<W>(
    mut rx: mpsc::Receiver<OutboundChunk>,
    mut writer: W,
    pending: Arc<AtomicUsize>,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        let first = match rx.recv().await {
            Some(c) => c,
            None => {
                // Channel closed, clean shutdown.
                return Ok(());
            }
        };

        let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
        batch.push(first);

        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(chunk) => batch.push(chunk),
                Err(_) => break,
            }
        }

        let batch_size = batch.len();
        write_batch(&mut writer, &batch).await?;

        pending.fetch_sub(batch_size, Ordering::Release);
    }
}

/// Write a batch of chunks using scatter/gather I/O.
async fn write_batch<W>(writer: &mut W, batch: &[OutboundChunk]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if batch.is_empty() {
        return Ok(());
    }

    let mut slices: Vec<IoSlice<'_>> = Vec::with_capacity(batch.len() * 2);
    for chunk in batch {
        if let Some(header) = &chunk.header {
            slices.push(IoSlice::new(header));
        }
        if !chunk.payload.is_empty() {
            slices.push(IoSlice::new(&chunk.payload));
        }
    }
    if slices.is_empty() {
        return Ok(());
    }

    let total_size: usize = batch.iter().map(|c| c.size()).sum();

    let written = writer.write_vectored(&slices).await?;
    if written == total_size {
        writer.flush().await?;
        return Ok(());
    }
    if written == 0 {
        return Err(MuxError::Io(std::io::Error::new(
            std::io::ErrorKind::WriteZero,
            "write_vectored returned 0",
        )));
    }

    // Partial write: continue with the remaining tail.
    let mut total_written = written;
    while total_written < total_size {
        let remaining = build_remaining_slices(batch, total_written);
        if remaining.is_empty() {
            break;
        }

        let written = writer.write_vectored(&remaining).await?;
        if written == 0 {
            return Err(MuxError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            )));
        }
        total_written += written;
    }

    writer.flush().await?;
    Ok(())
}

/// Build the IoSlice array for what remains after a partial write.
fn build_remaining_slices(batch: &[OutboundChunk], skip_bytes: usize) -> Vec<IoSlice<'_>> {
    let mut slices = Vec::with_capacity(batch.len() * 2);
    let mut skipped = 0;

    for chunk in batch {
        if let Some(header) = &chunk.header {
            let header_start = skipped;
            let header_end = skipped + header.len();
            if skip_bytes < header_end {
                let start = skip_bytes.saturating_sub(header_start);
                slices.push(IoSlice::new(&header[start..]));
            }
            skipped = header_end;
        }

        if !chunk.payload.is_empty() {
            let payload_start = skipped;
            let payload_end = skipped + chunk.payload.len();
            if skip_bytes < payload_end {
                let start = skip_bytes.saturating_sub(payload_start);
                slices.push(IoSlice::new(&chunk.payload[start..]));
            }
            skipped = payload_end;
        }
    }

    slices
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tokio::io::{duplex, AsyncReadExt};

    #[test]
    fn chunk_sizes() {
        let framed = OutboundChunk::framed(FrameType::Input, Bytes::from_static(b"hello"));
        assert_eq!(framed.size(), HEADER_SIZE + 5);

        let control = OutboundChunk::control(FrameType::Pause);
        assert_eq!(control.size(), HEADER_SIZE);

        let raw = OutboundChunk::raw(Bytes::from_static(b"ls\r"));
        assert_eq!(raw.size(), 3);
    }

    #[test]
    fn writer_config_default() {
        let config = WriterConfig::default();
        assert_eq!(config.max_pending, DEFAULT_MAX_PENDING_CHUNKS);
        assert_eq!(config.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
        assert_eq!(config.backpressure_timeout, DEFAULT_BACKPRESSURE_TIMEOUT);
    }

    #[tokio::test]
    async fn framed_chunk_reaches_transport() {
        let (client, mut server) = duplex(4096);
        let (handle, _task) = spawn_writer_task_default(client);

        let chunk = OutboundChunk::framed(FrameType::Input, Bytes::from_static(b"hello"));
        handle.send(chunk).await.unwrap();

        let mut buf = vec![0u8; 64];
        let n = server.read(&mut buf).await.unwrap();
        assert_eq!(n, HEADER_SIZE + 5);
        assert_eq!(buf[0], FrameType::Input.tag());
        assert_eq!(&buf[1..5], &5u32.to_le_bytes());
        assert_eq!(&buf[5..10], b"hello");
    }

    #[tokio::test]
    async fn raw_chunk_has_no_header() {
        let (client, mut server) = duplex(4096);
        let (handle, _task) = spawn_writer_task_default(client);

        handle
            .send(OutboundChunk::raw(Bytes::from_static(b"ls\r")))
            .await
            .unwrap();

        let mut buf = vec![0u8; 16];
        let n = server.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"ls\r");
    }

    #[tokio::test]
    async fn chunks_preserve_issuance_order() {
        let (client, mut server) = duplex(4096);
        let (handle, _task) = spawn_writer_task_default(client);

        // Handshake-reaction control frame, then the first framed keystroke.
        handle.send(OutboundChunk::control(FrameType::Resume)).await.unwrap();
        handle
            .send(OutboundChunk::framed(FrameType::Input, Bytes::from_static(b"x")))
            .await
            .unwrap();

        let expected = 2 * HEADER_SIZE + 1;
        let mut buf = vec![0u8; expected];
        server.read_exact(&mut buf).await.unwrap();

        assert_eq!(buf[0], FrameType::Resume.tag());
        assert_eq!(buf[HEADER_SIZE], FrameType::Input.tag());
        assert_eq!(buf[expected - 1], b'x');
    }

    #[tokio::test]
    async fn try_send_at_capacity() {
        let (tx, _rx) = mpsc::channel::<OutboundChunk>(10);
        let pending = Arc::new(AtomicUsize::new(100)); // at capacity

        let handle = WriterHandle::new(tx, pending, 100, Duration::from_secs(1));

        let result = handle.try_send(OutboundChunk::control(FrameType::Pause));
        assert!(matches!(result, Err(MuxError::BackpressureTimeout)));
    }

    #[tokio::test]
    async fn write_batch_mixed_chunks() {
        let mut buf = Cursor::new(Vec::new());

        let batch = vec![
            OutboundChunk::raw(Bytes::from_static(b"raw")),
            OutboundChunk::control(FrameType::ClaimActive),
            OutboundChunk::framed(FrameType::Input, Bytes::from_static(b"abc")),
        ];

        write_batch(&mut buf, &batch).await.unwrap();

        let written = buf.into_inner();
        assert_eq!(written.len(), 3 + HEADER_SIZE + HEADER_SIZE + 3);
        assert_eq!(&written[..3], b"raw");
        assert_eq!(written[3], FrameType::ClaimActive.tag());
    }

    #[test]
    fn remaining_slices_after_partial_header() {
        let batch = vec![OutboundChunk::framed(
            FrameType::Input,
            Bytes::from_static(b"hello"),
        )];

        let slices = build_remaining_slices(&batch, 2);
        assert_eq!(slices.len(), 2);
        assert_eq!(slices[0].len(), HEADER_SIZE - 2);
        assert_eq!(slices[1].len(), 5);
    }

    #[test]
    fn remaining_slices_skip_whole_header() {
        let batch = vec![OutboundChunk::framed(
            FrameType::Input,
            Bytes::from_static(b"hello"),
        )];

        let slices = build_remaining_slices(&batch, HEADER_SIZE);
        assert_eq!(slices.len(), 1);
        assert_eq!(slices[0].len(), 5);
    }

    #[test]
    fn remaining_slices_raw_chunk() {
        let batch = vec![OutboundChunk::raw(Bytes::from_static(b"keystrokes"))];

        let slices = build_remaining_slices(&batch, 4);
        assert_eq!(slices.len(), 1);
        assert_eq!(slices[0].len(), 6);
    }

    #[tokio::test]
    async fn writer_shutdown_on_channel_close() {
        let (client, _server) = duplex(4096);
        let (handle, task) = spawn_writer_task_default(client);

        drop(handle);

        let result = task.await.unwrap();
        assert!(result.is_ok());
    }
}
