//! Ordered, gapless playback of streamed audio segments.
//!
//! Segments arrive in network order but finish decoding out of order:
//! decode runs as an independent blocking task per segment, and decode
//! latency varies with segment size. The queue therefore schedules playback
//! by the sequence number assigned at arrival, not by decode completion.
//! A segment that decodes early is held until every predecessor has played;
//! a segment whose decode fails is skipped so one bad clip cannot freeze
//! audio for the rest of the answer.
//!
//! At most one segment plays at a time. [`AudioPlaybackQueue::stop`] halts
//! any in-progress playback immediately, discards everything pending or
//! still decoding, and resets the cursor. An epoch counter guards against
//! stragglers: decode results from before a `stop` are dropped even when
//! their blocking task completes afterwards.

use crate::audio::decode::{DecodedSegment, decode_segment};
use crate::config::AudioConfig;
use crate::error::{AssistError, Result};
use async_trait::async_trait;
use cpal::StreamConfig;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Plays one decoded segment at a time on some output.
///
/// The production implementation is [`CpalSink`]; tests substitute mocks.
#[async_trait]
pub trait PlaybackSink: Send + Sync {
    /// Play a segment to completion. Returns early when halted.
    async fn play(&self, segment: &DecodedSegment) -> Result<()>;

    /// Stop any in-progress play immediately.
    fn halt(&self);
}

/// Decode hook, swappable in tests for deterministic decode latencies.
pub type SegmentDecoder = Arc<dyn Fn(&[u8]) -> Result<DecodedSegment> + Send + Sync>;

enum QueueMsg {
    /// A segment was enqueued; fixes its position in playback order.
    Announce { epoch: u64, seq: u64 },
    /// A segment's decode finished (`None` = decode failed, skip it).
    Decoded {
        epoch: u64,
        seq: u64,
        segment: Option<DecodedSegment>,
    },
    /// Discard all state and move to a new epoch.
    Flush { epoch: u64 },
}

/// Sequence-ordered playback queue.
pub struct AudioPlaybackQueue {
    tx: mpsc::UnboundedSender<QueueMsg>,
    epoch: Arc<AtomicU64>,
    sink: Arc<dyn PlaybackSink>,
    decoder: SegmentDecoder,
}

impl AudioPlaybackQueue {
    /// Create a queue playing through the given sink, decoding via symphonia.
    pub fn new(sink: Arc<dyn PlaybackSink>) -> Self {
        Self::with_decoder(sink, Arc::new(|bytes: &[u8]| decode_segment(bytes)))
    }

    /// Create a queue with a custom segment decoder.
    pub fn with_decoder(sink: Arc<dyn PlaybackSink>, decoder: SegmentDecoder) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let epoch = Arc::new(AtomicU64::new(0));
        tokio::spawn(run_scheduler(rx, Arc::clone(&sink), Arc::clone(&epoch)));
        Self {
            tx,
            epoch,
            sink,
            decoder,
        }
    }

    /// Enqueue one raw segment under its arrival-order sequence number.
    ///
    /// The announcement fixes the segment's position in playback order
    /// before decode starts; decode itself runs as an independent blocking
    /// task, so completions may arrive in any order.
    pub fn enqueue(&self, seq: u64, payload: Vec<u8>) {
        let epoch = self.epoch.load(Ordering::SeqCst);
        if self.tx.send(QueueMsg::Announce { epoch, seq }).is_err() {
            return;
        }

        let tx = self.tx.clone();
        let decoder = Arc::clone(&self.decoder);
        tokio::task::spawn_blocking(move || {
            let segment = match decoder(&payload) {
                Ok(segment) => {
                    debug!(seq, secs = f64::from(segment.duration_secs()), "segment decoded");
                    Some(segment)
                }
                Err(e) => {
                    warn!(seq, %e, "segment decode failed; skipping");
                    None
                }
            };
            let _ = tx.send(QueueMsg::Decoded {
                epoch,
                seq,
                segment,
            });
        });
    }

    /// Halt playback, discard all pending and in-flight segments, and reset
    /// the cursor.
    ///
    /// Used for explicit cancellation and when a new question supersedes a
    /// still-playing answer.
    pub fn stop(&self) {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        self.sink.halt();
        let _ = self.tx.send(QueueMsg::Flush { epoch });
        debug!(epoch, "playback queue flushed");
    }
}

/// Scheduler loop: owns arrival order and decoded-but-unplayed segments,
/// playing strictly in announced order with at most one play in flight.
async fn run_scheduler(
    mut rx: mpsc::UnboundedReceiver<QueueMsg>,
    sink: Arc<dyn PlaybackSink>,
    shared_epoch: Arc<AtomicU64>,
) {
    let mut epoch: u64 = 0;
    // Sequence numbers in arrival order; the front is the playback cursor.
    let mut pending: VecDeque<u64> = VecDeque::new();
    // Decode results that arrived before their turn.
    let mut decoded: HashMap<u64, Option<DecodedSegment>> = HashMap::new();

    while let Some(msg) = rx.recv().await {
        match msg {
            QueueMsg::Announce { epoch: e, seq } if e == epoch => pending.push_back(seq),
            QueueMsg::Decoded {
                epoch: e,
                seq,
                segment,
            } if e == epoch => {
                decoded.insert(seq, segment);
            }
            QueueMsg::Flush { epoch: e } => {
                epoch = e;
                pending.clear();
                decoded.clear();
                continue;
            }
            // Stale message from a superseded exchange.
            _ => {}
        }

        // Play every segment that is next in line and already decoded.
        // A later segment whose decode finished first stays held here.
        while let Some(&next) = pending.front() {
            if shared_epoch.load(Ordering::SeqCst) != epoch {
                // A stop arrived while playing; the Flush is in the channel.
                break;
            }
            match decoded.remove(&next) {
                Some(Some(segment)) => {
                    pending.pop_front();
                    debug!(seq = next, "playing segment");
                    if let Err(e) = sink.play(&segment).await {
                        warn!(seq = next, %e, "segment playback failed");
                    }
                }
                Some(None) => {
                    // Decode failed; cursor advances past it.
                    pending.pop_front();
                }
                None => break, // next-in-line still decoding
            }
        }
    }
}

// ── cpal output sink ───────────────────────────────────────────

/// Audio playback to system speakers via cpal.
pub struct CpalSink {
    device: cpal::Device,
    halted: Arc<AtomicBool>,
}

impl CpalSink {
    /// Create a sink on the configured (or default) output device.
    ///
    /// # Errors
    ///
    /// Returns an error if no output device is available.
    pub fn new(config: &AudioConfig) -> Result<Self> {
        let host = cpal::default_host();

        let device = if let Some(ref name) = config.output_device {
            host.output_devices()
                .map_err(|e| AssistError::Audio(format!("cannot enumerate devices: {e}")))?
                .find(|d| {
                    d.description()
                        .ok()
                        .map(|desc| desc.name() == name)
                        .unwrap_or(false)
                })
                .ok_or_else(|| AssistError::Audio(format!("output device '{name}' not found")))?
        } else {
            host.default_output_device()
                .ok_or_else(|| AssistError::Audio("no default output device".into()))?
        };

        let device_name = device
            .description()
            .map(|d| d.name().to_owned())
            .unwrap_or_else(|_| "<unknown>".into());
        info!("using output device: {device_name}");

        Ok(Self {
            device,
            halted: Arc::new(AtomicBool::new(false)),
        })
    }

    /// List available output devices.
    ///
    /// # Errors
    ///
    /// Returns an error if devices cannot be enumerated.
    pub fn list_output_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host
            .output_devices()
            .map_err(|e| AssistError::Audio(format!("cannot enumerate devices: {e}")))?;

        let mut names = Vec::new();
        for device in devices {
            if let Ok(desc) = device.description() {
                names.push(desc.name().to_owned());
            }
        }
        Ok(names)
    }
}

/// Internal buffer for tracking playback progress.
struct PlaybackBuffer {
    samples: Vec<f32>,
    position: usize,
    finished: bool,
}

#[async_trait]
impl PlaybackSink for CpalSink {
    async fn play(&self, segment: &DecodedSegment) -> Result<()> {
        self.halted.store(false, Ordering::SeqCst);

        let device = self.device.clone();
        let halted = Arc::clone(&self.halted);
        let samples = segment.samples.clone();
        let sample_rate = segment.sample_rate;

        tokio::task::spawn_blocking(move || -> Result<()> {
            let stream_config = StreamConfig {
                channels: 1,
                sample_rate,
                buffer_size: cpal::BufferSize::Default,
            };

            let buffer = Arc::new(Mutex::new(PlaybackBuffer {
                samples,
                position: 0,
                finished: false,
            }));
            let buffer_clone = Arc::clone(&buffer);

            let stream = device
                .build_output_stream(
                    &stream_config,
                    move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                        let mut buf = match buffer_clone.lock() {
                            Ok(b) => b,
                            Err(_) => return,
                        };

                        for sample in data.iter_mut() {
                            if buf.position < buf.samples.len() {
                                *sample = buf.samples[buf.position];
                                buf.position += 1;
                            } else {
                                *sample = 0.0;
                                buf.finished = true;
                            }
                        }
                    },
                    move |err| {
                        error!("audio output stream error: {err}");
                    },
                    None,
                )
                .map_err(|e| AssistError::Audio(format!("failed to build output stream: {e}")))?;

            stream
                .play()
                .map_err(|e| AssistError::Audio(format!("failed to start output stream: {e}")))?;

            // Wait for playback to finish or a halt.
            loop {
                std::thread::sleep(std::time::Duration::from_millis(10));
                if halted.load(Ordering::SeqCst) {
                    break;
                }
                let buf = buffer
                    .lock()
                    .map_err(|e| AssistError::Audio(format!("playback buffer lock poisoned: {e}")))?;
                if buf.finished {
                    break;
                }
            }

            drop(stream);
            Ok(())
        })
        .await
        .map_err(|e| AssistError::Audio(format!("playback task failed: {e}")))?
    }

    fn halt(&self) {
        self.halted.store(true, Ordering::SeqCst);
    }
}
