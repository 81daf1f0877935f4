//! Per-service broadcast handler
//!
//! Receives decoder callbacks for one service, encodes the audio and fans each
//! encoded chunk out to live subscribers and the catch-up cache. Also keeps the
//! service's metadata (labels, slideshow images, error counters, levels).
//!
//! Locks, each guarding one region:
//!
//! - `producer`: encoder state; held for the whole encode + fan-out of a batch
//! - `subscribers`: registry; never held across client writes
//! - `cache`: audio cache; never held across I/O
//! - `labels`, `images`, `signal`: metadata, independent of the audio path
//!
//! The only nesting is registry -> cache.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use bytes::Bytes;
use tokio::sync::{Mutex, RwLock};

use super::callbacks::{MotFile, ProgrammeHandler};
use super::config::HandlerConfig;
use super::metadata::{
    AudioFormat, AudioLevels, DynamicLabel, ErrorCounters, MotImage, SignalStats, SlideshowImage,
    XpadError,
};
use crate::buffer::{AudioCache, TimeWindowedBuffer, TimedRecord};
use crate::error::{Error, Result};
use crate::media::{peak_levels, EncodedChunk, EncoderBackend, EncoderOptions, MotType, OutputCodec};
use crate::registry::{
    BoxedConnection, ChunkSource, SubscribeMode, Subscriber, SubscriberId, SubscriberRegistry,
};
use crate::stats::HandlerStats;

/// Encoder side of the handler
#[derive(Debug, Default)]
struct ProducerState {
    /// Built on the first non-empty batch
    encoder: Option<EncoderBackend>,
    build_error_logged: bool,
    rate_mismatch_logged: bool,
}

impl ProducerState {
    /// Encode one batch, building the encoder first if needed
    ///
    /// Returns `None` if the batch has to be dropped.
    fn encode(
        &mut self,
        service_id: u32,
        codec: OutputCodec,
        sample_rate: u32,
        options: &EncoderOptions,
        samples: &[i16],
    ) -> Option<Vec<EncodedChunk>> {
        if self.encoder.is_none() {
            match EncoderBackend::new(codec, sample_rate, options) {
                Ok(encoder) => {
                    tracing::info!(
                        service_id = service_id,
                        codec = %codec,
                        sample_rate = sample_rate,
                        "Encoder started"
                    );
                    self.encoder = Some(encoder);
                    self.build_error_logged = false;
                }
                Err(e) if self.build_error_logged => {
                    tracing::trace!(service_id = service_id, error = %e, "Encoder still unavailable");
                    return None;
                }
                Err(e) => {
                    self.build_error_logged = true;
                    tracing::error!(
                        service_id = service_id,
                        codec = %codec,
                        sample_rate = sample_rate,
                        error = %e,
                        "Failed to start encoder, dropping audio until it can be built"
                    );
                    return None;
                }
            }
        }
        let encoder = self.encoder.as_mut()?;

        if encoder.sample_rate() != sample_rate && !self.rate_mismatch_logged {
            self.rate_mismatch_logged = true;
            tracing::warn!(
                service_id = service_id,
                encoder_rate = encoder.sample_rate(),
                batch_rate = sample_rate,
                "Sample rate changed after encoder start, keeping original rate"
            );
        }

        match encoder.encode(samples) {
            Ok(chunks) => Some(chunks),
            Err(e) => {
                tracing::error!(service_id = service_id, error = %e, "Encoding failed, dropping batch");
                None
            }
        }
    }
}

/// Broadcast handler for one service
pub struct BroadcastHandler {
    service_id: u32,
    codec: OutputCodec,
    config: HandlerConfig,
    producer: Mutex<ProducerState>,
    subscribers: RwLock<SubscriberRegistry>,
    cache: RwLock<AudioCache>,
    labels: RwLock<TimeWindowedBuffer<String>>,
    images: RwLock<TimeWindowedBuffer<MotImage>>,
    signal: RwLock<SignalStats>,
    bytes_encoded: AtomicU64,
    chunks_encoded: AtomicU64,
    dump_fired: AtomicBool,
    started_at: Instant,
}

impl BroadcastHandler {
    /// Create a handler for `service_id` encoding to `codec`
    ///
    /// Fails if the configuration is invalid or the codec was not compiled in.
    pub fn new(service_id: u32, codec: OutputCodec, config: HandlerConfig) -> Result<Self> {
        config.validate()?;
        if !codec.is_available() {
            return Err(Error::UnsupportedCodec(codec));
        }

        tracing::info!(
            service_id = service_id,
            codec = %codec,
            cache_max_bytes = config.cache_max_bytes,
            retention_secs = config.metadata_retention.as_secs(),
            "Broadcast handler created"
        );

        Ok(Self {
            service_id,
            codec,
            producer: Mutex::new(ProducerState::default()),
            subscribers: RwLock::new(SubscriberRegistry::new()),
            cache: RwLock::new(AudioCache::new(config.cache_max_bytes)),
            labels: RwLock::new(TimeWindowedBuffer::new(config.metadata_retention)),
            images: RwLock::new(TimeWindowedBuffer::new(config.metadata_retention)),
            signal: RwLock::new(SignalStats::default()),
            bytes_encoded: AtomicU64::new(0),
            chunks_encoded: AtomicU64::new(0),
            dump_fired: AtomicBool::new(false),
            started_at: Instant::now(),
            config,
        })
    }

    /// Service id
    pub fn service_id(&self) -> u32 {
        self.service_id
    }

    /// Output codec
    pub fn codec(&self) -> OutputCodec {
        self.codec
    }

    /// Handler configuration
    pub fn config(&self) -> &HandlerConfig {
        &self.config
    }

    /// Deliver one encoded chunk to every live subscriber, then cache it
    ///
    /// Live delivery happens in registration order. A failing subscriber is
    /// terminated and skipped; the rest still receive the chunk. After the
    /// append, catch-up subscribers behind the new cache head are clamped to it.
    ///
    /// The registry lock is not held while writing, so a stalled client never
    /// blocks registration or [`BroadcastHandler::cancel_all`]. Calls must be
    /// serialised by the caller; `on_new_audio` does so under the producer lock.
    pub async fn fan_out(&self, chunk: EncodedChunk) {
        let live: Vec<Arc<Subscriber>> = self.subscribers.read().await.live().cloned().collect();

        let header = {
            let mut cache = self.cache.write().await;
            if let Some(header) = chunk.header {
                cache.set_stream_header(header);
            }
            cache.stream_header().cloned()
        };

        for subscriber in &live {
            if let Err(e) = subscriber.deliver(header.as_ref(), &chunk.payload).await {
                tracing::warn!(
                    service_id = self.service_id,
                    subscriber = %subscriber.id(),
                    error = %e,
                    "Live delivery failed"
                );
            }
        }

        let registry = self.subscribers.read().await;
        let (evicted, head) = {
            let mut cache = self.cache.write().await;
            let evicted = cache.append(&chunk.payload);
            self.maybe_dump(&cache);
            (evicted, cache.head())
        };

        if evicted > 0 {
            for subscriber in registry.catching_up() {
                subscriber.rebase(head);
            }
        }
        drop(registry);

        self.bytes_encoded
            .fetch_add(chunk.payload.len() as u64, Ordering::Relaxed);
        self.chunks_encoded.fetch_add(1, Ordering::Relaxed);

        tracing::trace!(
            service_id = self.service_id,
            bytes = chunk.payload.len(),
            evicted = evicted,
            "Chunk fanned out"
        );
    }

    /// Write the cache to the configured dump path, once
    fn maybe_dump(&self, cache: &AudioCache) {
        let Some(path) = &self.config.dump_path else {
            return;
        };
        if cache.len() <= self.config.dump_threshold {
            return;
        }
        if self.dump_fired.swap(true, Ordering::AcqRel) {
            return;
        }

        let mut data = Vec::with_capacity(cache.len() + 64);
        if let Some(header) = cache.stream_header() {
            data.extend_from_slice(header);
        }
        data.extend_from_slice(&cache.to_vec());

        let path = path.clone();
        let service_id = self.service_id;
        tokio::spawn(async move {
            match tokio::fs::write(&path, &data).await {
                Ok(()) => tracing::info!(
                    service_id = service_id,
                    path = %path.display(),
                    bytes = data.len(),
                    "Audio cache dumped"
                ),
                Err(e) => tracing::warn!(
                    service_id = service_id,
                    path = %path.display(),
                    error = %e,
                    "Failed to dump audio cache"
                ),
            }
        });
    }

    /// Register a new client
    ///
    /// A catch-up subscriber starts `rewind_bytes` before the current live
    /// edge, or at the oldest cached byte if the cache holds less than that.
    /// Catch-up subscribers only stream once their pull loop runs, see
    /// [`BroadcastHandler::serve`].
    pub async fn register_subscriber(
        &self,
        connection: BoxedConnection,
        mode: SubscribeMode,
    ) -> Arc<Subscriber> {
        let mut registry = self.subscribers.write().await;
        let id = registry.allocate_id();

        let subscriber = match mode {
            SubscribeMode::Live => Subscriber::live(id, connection),
            SubscribeMode::CatchUp { rewind_bytes } => {
                let start = self.cache.read().await.start_offset(rewind_bytes);
                Subscriber::catch_up(id, connection, start)
            }
        };
        let subscriber = Arc::new(subscriber);
        registry.insert(Arc::clone(&subscriber));

        tracing::info!(
            service_id = self.service_id,
            subscriber = %id,
            mode = ?mode,
            offset = subscriber.catch_up_offset(),
            total = registry.len(),
            "Subscriber registered"
        );

        subscriber
    }

    /// Remove a subscriber
    ///
    /// Returns true if it was registered.
    pub async fn remove_subscriber(&self, id: SubscriberId) -> bool {
        let mut registry = self.subscribers.write().await;
        let removed = registry.remove(id);

        if let Some(subscriber) = &removed {
            tracing::info!(
                service_id = self.service_id,
                subscriber = %id,
                bytes_sent = subscriber.bytes_sent(),
                connected_secs = subscriber.connected_for().as_secs(),
                remaining = registry.len(),
                "Subscriber removed"
            );
        }

        removed.is_some()
    }

    /// Drop every subscriber that already terminated
    ///
    /// Returns the number removed.
    pub async fn remove_terminated(&self) -> usize {
        let removed = self.subscribers.write().await.remove_terminated();
        if !removed.is_empty() {
            tracing::debug!(
                service_id = self.service_id,
                count = removed.len(),
                "Removed terminated subscribers"
            );
        }
        removed.len()
    }

    /// Whether anybody is still registered
    ///
    /// The decoder may stop pulling audio for a service without subscribers.
    pub async fn has_subscribers(&self) -> bool {
        !self.subscribers.read().await.is_empty()
    }

    /// Number of registered subscribers
    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    /// Cancel every subscriber (service shutdown)
    ///
    /// Returns the number of subscribers cancelled.
    pub async fn cancel_all(&self) -> usize {
        let count = self.subscribers.read().await.cancel_all();
        tracing::info!(service_id = self.service_id, count = count, "Cancelled all subscribers");
        count
    }

    /// Stream to `connection` until it terminates
    ///
    /// Registers the subscriber, waits (live) or runs the pull loop (catch-up),
    /// then removes it. Returns the id the subscriber had.
    pub async fn serve(&self, connection: BoxedConnection, mode: SubscribeMode) -> SubscriberId {
        let subscriber = self.register_subscriber(connection, mode).await;

        if subscriber.is_live() {
            subscriber
                .wait_for_termination(self.config.termination_poll_interval)
                .await;
        } else {
            subscriber
                .run_catch_up(
                    self,
                    self.config.chunk_size,
                    self.config.catch_up_poll_interval,
                )
                .await;
        }

        let id = subscriber.id();
        self.remove_subscriber(id).await;
        id
    }

    /// Label that was current at `time`
    ///
    /// Falls back to the oldest retained label if `time` precedes all of them.
    pub async fn find_label_at_or_before(&self, time: SystemTime) -> Option<String> {
        self.labels
            .read()
            .await
            .find_at_or_before(time)
            .map(|record| record.value.clone())
    }

    /// Slideshow image that was current at `time`
    pub async fn find_image_at_or_before(&self, time: SystemTime) -> Option<MotImage> {
        self.images
            .read()
            .await
            .find_at_or_before(time)
            .map(|record| record.value.clone())
    }

    /// Current dynamic label
    pub async fn dynamic_label(&self) -> Option<DynamicLabel> {
        self.labels.read().await.latest().map(DynamicLabel::from)
    }

    /// Current slideshow image
    pub async fn image(&self) -> Option<SlideshowImage> {
        self.images.read().await.latest().map(SlideshowImage::from)
    }

    /// Retained label changes, oldest first
    pub async fn label_history(&self) -> Vec<TimedRecord<String>> {
        self.labels.read().await.records().cloned().collect()
    }

    /// Retained image changes, oldest first
    pub async fn image_history(&self) -> Vec<TimedRecord<MotImage>> {
        self.images.read().await.records().cloned().collect()
    }

    pub async fn error_counters(&self) -> ErrorCounters {
        self.signal.read().await.errors
    }

    pub async fn audio_levels(&self) -> AudioLevels {
        self.signal.read().await.levels
    }

    pub async fn xpad_errors(&self) -> XpadError {
        self.signal.read().await.xpad
    }

    pub async fn audio_format(&self) -> AudioFormat {
        self.signal.read().await.format.clone()
    }

    /// Snapshot of handler statistics
    pub async fn stats(&self) -> HandlerStats {
        let mut stats = HandlerStats::new(self.service_id, self.codec);
        stats.started_at = self.started_at;

        {
            let registry = self.subscribers.read().await;
            stats.live_subscribers = registry.live().count();
            stats.catch_up_subscribers = registry.catching_up().count();
        }
        {
            let cache = self.cache.read().await;
            stats.cache_head = cache.head();
            stats.cache_tail = cache.tail();
            stats.cache_len = cache.len();
            stats.cache_utilization = cache.utilization();
        }

        stats.bytes_encoded = self.bytes_encoded.load(Ordering::Relaxed);
        stats.chunks_encoded = self.chunks_encoded.load(Ordering::Relaxed);
        stats.sample_rate = self
            .producer
            .lock()
            .await
            .encoder
            .as_ref()
            .map(EncoderBackend::sample_rate);
        stats
    }
}

impl ProgrammeHandler for BroadcastHandler {
    async fn on_frame_errors(&self, count: u32) {
        self.signal
            .write()
            .await
            .errors
            .add_frame_errors(count, SystemTime::now());
    }

    async fn on_new_audio(&self, samples: Vec<i16>, sample_rate: u32, mode: &str) {
        let now = SystemTime::now();

        {
            let mut signal = self.signal.write().await;
            if signal.format.sample_rate != sample_rate || signal.format.mode != mode {
                signal.format = AudioFormat {
                    sample_rate,
                    mode: mode.to_string(),
                };
            }
            if samples.is_empty() {
                return;
            }
            let (left, right) = peak_levels(&samples);
            signal.levels = AudioLevels {
                time: Some(now),
                left: left.into(),
                right: right.into(),
            };
        }

        let mut producer = self.producer.lock().await;
        let Some(chunks) = producer.encode(
            self.service_id,
            self.codec,
            sample_rate,
            &self.config.encoder,
            &samples,
        ) else {
            return;
        };

        for chunk in chunks {
            self.fan_out(chunk).await;
        }
    }

    async fn on_rs_errors(&self, uncorrected: bool, _corrected: u32) {
        self.signal
            .write()
            .await
            .errors
            .add_rs_error(uncorrected, SystemTime::now());
    }

    async fn on_aac_errors(&self, count: u32) {
        self.signal
            .write()
            .await
            .errors
            .add_aac_errors(count, SystemTime::now());
    }

    async fn on_new_dynamic_label(&self, label: &str) {
        let changed = self
            .labels
            .write()
            .await
            .update(label.to_string(), SystemTime::now());

        if changed {
            tracing::debug!(service_id = self.service_id, label = label, "Dynamic label changed");
        }
    }

    async fn on_mot(&self, file: &MotFile) {
        if file.data.is_empty() {
            return;
        }

        let image = MotImage {
            data: file.data.clone(),
            subtype: MotType::from_content_sub_type(file.content_sub_type),
        };
        let subtype = image.subtype;
        let changed = self.images.write().await.update(image, SystemTime::now());

        if changed {
            tracing::debug!(
                service_id = self.service_id,
                subtype = ?subtype,
                bytes = file.data.len(),
                "Slideshow image changed"
            );
        }
    }

    async fn on_pad_length_error(&self, announced: usize, actual: usize) {
        self.signal.write().await.xpad = XpadError {
            has_error: true,
            announced_len: announced,
            len: actual,
            time: Some(SystemTime::now()),
        };
    }
}

impl ChunkSource for BroadcastHandler {
    async fn read_chunk(&self, offset: u64, size: usize) -> Option<Bytes> {
        self.cache.read().await.read_chunk(offset, size)
    }

    async fn stream_header(&self) -> Option<Bytes> {
        self.cache.read().await.stream_header().cloned()
    }
}

impl std::fmt::Debug for BroadcastHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastHandler")
            .field("service_id", &self.service_id)
            .field("codec", &self.codec)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
