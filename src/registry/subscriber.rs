//! Per-client sender
//!
//! A subscriber owns one client connection and streams in one of two modes:
//!
//! - **Live**: the producer pushes every encoded chunk with [`Subscriber::deliver`].
//! - **Catch-up**: the subscriber pulls fixed-size chunks from the audio cache
//!   at its own pace with [`Subscriber::run_catch_up`], starting from a
//!   historical absolute offset.
//!
//! Either mode ends in `Terminated` when a write fails or [`Subscriber::cancel`]
//! is called. Termination drops (closes) the connection and wakes anyone in
//! [`Subscriber::wait_for_termination`].

use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{watch, Mutex};

use crate::error::{Error, Result};

/// Client connection owned by a subscriber
pub type BoxedConnection = Box<dyn AsyncWrite + Send + Unpin>;

/// Stable identifier of a registered subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Wrap a raw id
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Raw id value
    pub fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Sender state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderState {
    /// Receiving pushed data in real time
    Live,
    /// Pulling from the audio cache
    CatchUp,
    /// Connection closed, terminal
    Terminated,
}

/// How a new client wants to receive audio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeMode {
    /// Real-time push from the live edge
    Live,
    /// Replay starting `rewind_bytes` before the live edge
    CatchUp {
        /// Distance from the live edge, in encoded bytes
        rewind_bytes: usize,
    },
}

/// Read access to cached audio for catch-up subscribers
pub trait ChunkSource: Send + Sync {
    /// Read exactly `size` bytes at absolute `offset`, or `None` if the range
    /// is not fully resident
    fn read_chunk(&self, offset: u64, size: usize) -> impl Future<Output = Option<Bytes>> + Send;

    /// One-time stream header, if the codec has one and it was produced yet
    fn stream_header(&self) -> impl Future<Output = Option<Bytes>> + Send;
}

struct ConnectionSlot {
    /// `None` once closed
    stream: Option<BoxedConnection>,
    header_sent: bool,
}

/// A connected client
pub struct Subscriber {
    id: SubscriberId,
    live: bool,
    connection: Mutex<ConnectionSlot>,
    state: watch::Sender<SenderState>,
    /// Next absolute cache offset to read (catch-up only)
    catch_up_offset: AtomicU64,
    bytes_sent: AtomicU64,
    connected_at: Instant,
}

impl Subscriber {
    /// Create a live subscriber
    pub fn live(id: SubscriberId, connection: BoxedConnection) -> Self {
        Self::with_state(id, connection, SenderState::Live, 0)
    }

    /// Create a catch-up subscriber starting at absolute `start_offset`
    pub fn catch_up(id: SubscriberId, connection: BoxedConnection, start_offset: u64) -> Self {
        Self::with_state(id, connection, SenderState::CatchUp, start_offset)
    }

    fn with_state(
        id: SubscriberId,
        connection: BoxedConnection,
        state: SenderState,
        start_offset: u64,
    ) -> Self {
        let live = matches!(state, SenderState::Live);
        let (state, _) = watch::channel(state);
        Self {
            id,
            live,
            connection: Mutex::new(ConnectionSlot {
                stream: Some(connection),
                header_sent: false,
            }),
            state,
            catch_up_offset: AtomicU64::new(start_offset),
            bytes_sent: AtomicU64::new(0),
            connected_at: Instant::now(),
        }
    }

    /// Subscriber id
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Whether this subscriber receives pushed data
    pub fn is_live(&self) -> bool {
        self.live
    }

    /// Current state
    pub fn state(&self) -> SenderState {
        *self.state.borrow()
    }

    /// Check if the subscriber has terminated
    pub fn is_terminated(&self) -> bool {
        self.state() == SenderState::Terminated
    }

    /// Next absolute offset a catch-up subscriber will read
    pub fn catch_up_offset(&self) -> u64 {
        self.catch_up_offset.load(Ordering::Acquire)
    }

    /// Total bytes written to the connection
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    /// Time since the subscriber was created
    pub fn connected_for(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Push one encoded chunk to a live subscriber
    ///
    /// The stream header is written at most once, before the first payload
    /// that comes with one. Any failure terminates the subscriber.
    pub async fn deliver(&self, header: Option<&Bytes>, payload: &Bytes) -> Result<()> {
        self.send(header, payload).await
    }

    /// Advance the catch-up offset past bytes the cache evicted
    ///
    /// `head` is the cache's new oldest resident offset. Offsets behind it are
    /// clamped to it; offsets already ahead are left alone. Returns the number
    /// of bytes skipped.
    pub fn rebase(&self, head: u64) -> u64 {
        let previous = self.catch_up_offset.fetch_max(head, Ordering::AcqRel);
        let skipped = head.saturating_sub(previous);
        if skipped > 0 {
            tracing::debug!(
                subscriber = %self.id,
                skipped_bytes = skipped,
                new_offset = head,
                "Catch-up subscriber fell behind the cache"
            );
        }
        skipped
    }

    /// Pull loop for catch-up subscribers
    ///
    /// Repeatedly reads `chunk_size` bytes at the current offset and writes them
    /// out. When the next chunk is not resident yet, waits `poll_interval` and
    /// retries. Returns once the subscriber is terminated.
    pub async fn run_catch_up<S: ChunkSource>(
        &self,
        source: &S,
        chunk_size: usize,
        poll_interval: Duration,
    ) {
        if self.live {
            tracing::warn!(subscriber = %self.id, "Catch-up loop started on a live subscriber");
            return;
        }

        let chunk_size = chunk_size.max(1);
        // The header is set before any audio is cached, so one fetch suffices
        let mut header: Option<Bytes> = None;
        let mut header_fetched = false;

        tracing::debug!(
            subscriber = %self.id,
            offset = self.catch_up_offset(),
            chunk_size = chunk_size,
            "Catch-up started"
        );

        while !self.is_terminated() {
            let offset = self.catch_up_offset.load(Ordering::Acquire);

            let Some(chunk) = source.read_chunk(offset, chunk_size).await else {
                tokio::select! {
                    _ = tokio::time::sleep(poll_interval) => {}
                    _ = self.cancelled() => break,
                }
                continue;
            };

            // A rebase moved the offset while we were reading; start over from it
            let next = offset + chunk.len() as u64;
            if self
                .catch_up_offset
                .compare_exchange(offset, next, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                continue;
            }

            if !header_fetched {
                header = source.stream_header().await;
                header_fetched = true;
            }

            if let Err(e) = self.send(header.as_ref(), &chunk).await {
                tracing::debug!(subscriber = %self.id, error = %e, "Catch-up send failed");
                break;
            }

            tracing::trace!(subscriber = %self.id, offset = offset, "Catch-up chunk sent");
        }

        tracing::debug!(
            subscriber = %self.id,
            bytes_sent = self.bytes_sent(),
            "Catch-up finished"
        );
    }

    /// Terminate from another task
    ///
    /// Safe to call concurrently with sends: an in-flight write is aborted and
    /// the connection closed by the writer; an idle connection is closed here.
    pub fn cancel(&self) {
        let previous = self.state.send_replace(SenderState::Terminated);

        if let Ok(mut slot) = self.connection.try_lock() {
            slot.stream = None;
        }

        if previous != SenderState::Terminated {
            tracing::debug!(subscriber = %self.id, "Subscriber cancelled");
        }
    }

    /// Wait until the subscriber is terminated
    ///
    /// Re-checks the state at least every `poll_interval`. Returns immediately
    /// if termination already happened.
    pub async fn wait_for_termination(&self, poll_interval: Duration) {
        let mut rx = self.state.subscribe();
        loop {
            if *rx.borrow_and_update() == SenderState::Terminated {
                return;
            }
            let _ = tokio::time::timeout(poll_interval, rx.changed()).await;
        }
    }

    /// Resolves once the state becomes `Terminated`
    async fn cancelled(&self) {
        let mut rx = self.state.subscribe();
        loop {
            if *rx.borrow_and_update() == SenderState::Terminated {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    async fn send(&self, header: Option<&Bytes>, payload: &[u8]) -> Result<()> {
        if self.is_terminated() {
            return Err(Error::SubscriberTerminated(self.id));
        }

        let mut slot = self.connection.lock().await;
        let result = self.write_slot(&mut slot, header, payload).await;

        if result.is_err() || self.is_terminated() {
            self.terminate(&mut slot);
        }

        match result {
            Ok(()) if self.is_terminated() => Err(Error::SubscriberTerminated(self.id)),
            other => other,
        }
    }

    async fn write_slot(
        &self,
        slot: &mut ConnectionSlot,
        header: Option<&Bytes>,
        payload: &[u8],
    ) -> Result<()> {
        let ConnectionSlot {
            stream,
            header_sent,
        } = slot;
        let stream = stream
            .as_mut()
            .ok_or(Error::SubscriberTerminated(self.id))?;

        let io = async {
            if !*header_sent {
                if let Some(header) = header {
                    stream.write_all(header).await?;
                    *header_sent = true;
                    self.bytes_sent
                        .fetch_add(header.len() as u64, Ordering::Relaxed);
                }
            }
            stream.write_all(payload).await?;
            stream.flush().await?;
            self.bytes_sent
                .fetch_add(payload.len() as u64, Ordering::Relaxed);
            Ok::<(), io::Error>(())
        };

        tokio::select! {
            biased;
            _ = self.cancelled() => Err(Error::SubscriberTerminated(self.id)),
            result = io => result.map_err(Error::from),
        }
    }

    fn terminate(&self, slot: &mut ConnectionSlot) {
        slot.stream = None;
        let previous = self.state.send_replace(SenderState::Terminated);
        if previous != SenderState::Terminated {
            tracing::debug!(
                subscriber = %self.id,
                bytes_sent = self.bytes_sent(),
                "Subscriber terminated"
            );
        }
    }
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("catch_up_offset", &self.catch_up_offset())
            .field("bytes_sent", &self.bytes_sent())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    use tokio::io::AsyncReadExt;
    use tokio::sync::RwLock;

    use super::*;
    use crate::buffer::AudioCache;

    struct CacheSource {
        cache: RwLock<AudioCache>,
        header_reads: AtomicUsize,
    }

    impl CacheSource {
        fn new(max_len: usize) -> Self {
            Self {
                cache: RwLock::new(AudioCache::new(max_len)),
                header_reads: AtomicUsize::new(0),
            }
        }
    }

    impl ChunkSource for CacheSource {
        async fn read_chunk(&self, offset: u64, size: usize) -> Option<Bytes> {
            self.cache.read().await.read_chunk(offset, size)
        }

        async fn stream_header(&self) -> Option<Bytes> {
            self.header_reads.fetch_add(1, Ordering::Relaxed);
            self.cache.read().await.stream_header().cloned()
        }
    }

    fn broken_pipe() -> BoxedConnection {
        let mock = tokio_test::io::Builder::new()
            .write_error(io::Error::new(io::ErrorKind::BrokenPipe, "peer gone"))
            .build();
        Box::new(mock)
    }

    #[tokio::test]
    async fn test_live_header_written_once() {
        let (client, mut server) = tokio::io::duplex(4096);
        let sub = Subscriber::live(SubscriberId::new(1), Box::new(client));
        assert_eq!(sub.state(), SenderState::Live);

        let header = Bytes::from_static(b"HDR");
        sub.deliver(Some(&header), &Bytes::from_static(b"one"))
            .await
            .unwrap();
        sub.deliver(Some(&header), &Bytes::from_static(b"two"))
            .await
            .unwrap();
        sub.deliver(None, &Bytes::from_static(b"three"))
            .await
            .unwrap();
        assert_eq!(sub.bytes_sent(), 14);

        sub.cancel();

        let mut received = Vec::new();
        server.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"HDRonetwothree");
    }

    #[tokio::test]
    async fn test_write_failure_terminates() {
        let sub = Subscriber::live(SubscriberId::new(2), broken_pipe());

        let result = sub.deliver(None, &Bytes::from_static(b"data")).await;
        assert!(matches!(result, Err(Error::Io(_))));
        assert!(sub.is_terminated());

        let result = sub.deliver(None, &Bytes::from_static(b"more")).await;
        assert!(matches!(result, Err(Error::SubscriberTerminated(_))));
    }

    #[tokio::test]
    async fn test_wait_after_termination_returns() {
        let sub = Subscriber::live(SubscriberId::new(3), broken_pipe());
        let _ = sub.deliver(None, &Bytes::from_static(b"x")).await;

        tokio::time::timeout(
            Duration::from_millis(100),
            sub.wait_for_termination(Duration::from_secs(2)),
        )
        .await
        .expect("already terminated subscriber must not block");
    }

    #[tokio::test]
    async fn test_cancel_unblocks_pending_write() {
        // Tiny pipe nobody reads from: the write below blocks
        let (client, _server) = tokio::io::duplex(8);
        let sub = Arc::new(Subscriber::live(SubscriberId::new(4), Box::new(client)));

        let writer = {
            let sub = Arc::clone(&sub);
            tokio::spawn(async move { sub.deliver(None, &Bytes::from(vec![0u8; 1024])).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(sub.state(), SenderState::Live);

        let waiter = {
            let sub = Arc::clone(&sub);
            tokio::spawn(async move { sub.wait_for_termination(Duration::from_millis(50)).await })
        };

        sub.cancel();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter released")
            .unwrap();
        let result = writer.await.unwrap();
        assert!(matches!(result, Err(Error::SubscriberTerminated(_))));
        assert!(sub.is_terminated());
    }

    #[tokio::test]
    async fn test_cancel_closes_idle_connection() {
        let (client, mut server) = tokio::io::duplex(64);
        let sub = Subscriber::live(SubscriberId::new(5), Box::new(client));

        sub.cancel();
        sub.cancel();

        let mut buf = Vec::new();
        // EOF once the subscriber dropped its end
        assert_eq!(server.read_to_end(&mut buf).await.unwrap(), 0);
    }

    #[test]
    fn test_rebase_clamps_to_head() {
        let (client, _server) = tokio::io::duplex(8);
        let behind = Subscriber::catch_up(SubscriberId::new(6), Box::new(client), 0);
        assert_eq!(behind.rebase(20), 20);
        assert_eq!(behind.catch_up_offset(), 20);

        let (client, _server) = tokio::io::duplex(8);
        let ahead = Subscriber::catch_up(SubscriberId::new(7), Box::new(client), 50);
        assert_eq!(ahead.rebase(20), 0);
        assert_eq!(ahead.catch_up_offset(), 50);
    }

    #[tokio::test]
    async fn test_catch_up_streams_in_order() {
        let source = Arc::new(CacheSource::new(10_000));
        let payload: Vec<u8> = (0..=255u8).cycle().take(300).collect();
        source.cache.write().await.append(&payload[..100]);

        let (client, mut server) = tokio::io::duplex(4096);
        let sub = Arc::new(Subscriber::catch_up(SubscriberId::new(8), Box::new(client), 0));

        let task = {
            let sub = Arc::clone(&sub);
            let source = Arc::clone(&source);
            tokio::spawn(async move {
                sub.run_catch_up(&*source, 25, Duration::from_millis(5)).await;
            })
        };

        let mut received = vec![0u8; 100];
        server.read_exact(&mut received).await.unwrap();
        assert_eq!(received, &payload[..100]);

        // Partial chunk is held back until a full one is resident
        source.cache.write().await.append(&payload[100..110]);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(sub.catch_up_offset(), 100);

        source.cache.write().await.append(&payload[110..300]);
        let mut received = vec![0u8; 200];
        server.read_exact(&mut received).await.unwrap();
        assert_eq!(received, &payload[100..300]);
        assert_eq!(sub.catch_up_offset(), 300);

        sub.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("catch-up loop exits on cancel")
            .unwrap();
    }

    #[tokio::test]
    async fn test_catch_up_sends_stream_header_first() {
        let source = CacheSource::new(1000);
        {
            let mut cache = source.cache.write().await;
            cache.set_stream_header(Bytes::from_static(b"RIFF"));
            cache.append(b"abcdefgh");
        }

        let (client, mut server) = tokio::io::duplex(4096);
        let sub = Subscriber::catch_up(SubscriberId::new(9), Box::new(client), 0);

        let reader = async {
            let mut received = vec![0u8; 12];
            server.read_exact(&mut received).await.unwrap();
            sub.cancel();
            received
        };
        let (received, _) = tokio::join!(
            reader,
            sub.run_catch_up(&source, 4, Duration::from_millis(5))
        );

        assert_eq!(received, b"RIFFabcdefgh");
    }

    #[tokio::test]
    async fn test_catch_up_failure_terminates() {
        let source = CacheSource::new(100);
        source.cache.write().await.append(&[1u8; 50]);

        let sub = Subscriber::catch_up(SubscriberId::new(10), broken_pipe(), 0);
        tokio::time::timeout(
            Duration::from_secs(1),
            sub.run_catch_up(&source, 10, Duration::from_millis(5)),
        )
        .await
        .expect("loop ends on write failure");

        assert!(sub.is_terminated());
    }

    #[tokio::test]
    async fn test_catch_up_on_live_subscriber_returns() {
        let source = CacheSource::new(100);
        let (client, _server) = tokio::io::duplex(8);
        let sub = Subscriber::live(SubscriberId::new(11), Box::new(client));

        sub.run_catch_up(&source, 10, Duration::from_millis(5)).await;
        assert!(!sub.is_terminated());
    }

    #[test]
    fn test_constructors_set_mode() {
        let (client, _server) = tokio::io::duplex(8);
        let live = Subscriber::live(SubscriberId::new(12), Box::new(client));
        assert!(live.is_live());
        assert_eq!(live.state(), SenderState::Live);
        assert_eq!(live.catch_up_offset(), 0);

        let (client, _server) = tokio::io::duplex(8);
        let catch_up = Subscriber::catch_up(SubscriberId::new(13), Box::new(client), 640);
        assert!(!catch_up.is_live());
        assert_eq!(catch_up.state(), SenderState::CatchUp);
        assert_eq!(catch_up.catch_up_offset(), 640);
        assert_eq!(catch_up.bytes_sent(), 0);
    }

    #[tokio::test]
    async fn test_catch_up_without_header_reads_it_once() {
        let source = CacheSource::new(1000);
        source.cache.write().await.append(&[7u8; 40]);

        let (client, mut server) = tokio::io::duplex(4096);
        let sub = Subscriber::catch_up(SubscriberId::new(14), Box::new(client), 0);

        let reader = async {
            let mut received = vec![0u8; 40];
            server.read_exact(&mut received).await.unwrap();
            sub.cancel();
            received
        };
        let (received, _) = tokio::join!(
            reader,
            sub.run_catch_up(&source, 5, Duration::from_millis(5))
        );

        assert_eq!(received, vec![7u8; 40]);
        assert_eq!(source.header_reads.load(Ordering::Relaxed), 1);
    }
}
