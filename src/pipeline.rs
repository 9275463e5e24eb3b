//! Perception cycle: frame -> tensor -> probability -> window -> link.
//!
//! Runs on a single thread. Everything below the link is recoverable: a frame
//! that fails to decode or classify is logged, counted and skipped without
//! touching the smoother. A failed send ends the run.

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::detect::ObstacleClassifier;
use crate::error::TransportError;
use crate::frame::{FrameDecoder, ImageFrame};
use crate::smoother::RollingSmoother;
use crate::transport::SignalSink;

const STATUS_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PipelineStats {
    pub frames: u64,
    pub decode_failures: u64,
    pub inference_failures: u64,
    pub samples: u64,
    pub signals_sent: u64,
    pub last_signal: Option<f64>,
}

pub struct PerceptionPipeline<C: ObstacleClassifier, T: SignalSink> {
    decoder: FrameDecoder,
    classifier: C,
    smoother: RollingSmoother,
    link: T,
    stats: PipelineStats,
    last_frame_at: Option<Instant>,
    last_status_at: Instant,
    fps: f64,
}

impl<C: ObstacleClassifier, T: SignalSink> PerceptionPipeline<C, T> {
    /// The decoder enforces the classifier's input size when it declares one.
    pub fn new(classifier: C, smoother: RollingSmoother, link: T) -> Self {
        let decoder = match classifier.input_size() {
            Some((width, height)) => FrameDecoder::with_input_size(width, height),
            None => FrameDecoder::new(),
        };
        Self {
            decoder,
            classifier,
            smoother,
            link,
            stats: PipelineStats::default(),
            last_frame_at: None,
            last_status_at: Instant::now(),
            fps: 0.0,
        }
    }

    /// Push one frame through. Returns the signal sent, if any.
    pub fn process_frame(&mut self, frame: &ImageFrame) -> Result<Option<f64>, TransportError> {
        self.stats.frames += 1;
        let now = Instant::now();
        if let Some(last) = self.last_frame_at {
            let elapsed = now.duration_since(last).as_secs_f64();
            if elapsed > 0.0 {
                self.fps = 1.0 / elapsed;
            }
        }
        self.last_frame_at = Some(now);

        let input = match self.decoder.decode(frame) {
            Ok(input) => input,
            Err(err) => {
                self.stats.decode_failures += 1;
                log::warn!("skipping frame ({} bytes): {}", frame.len(), err);
                return Ok(None);
            }
        };

        let probability = match self.classifier.predict(&input) {
            Ok(p) if p.is_finite() => f64::from(p).clamp(0.0, 1.0),
            Ok(p) => {
                self.stats.inference_failures += 1;
                log::warn!("classifier {} returned {}; frame skipped", self.classifier.name(), p);
                return Ok(None);
            }
            Err(err) => {
                self.stats.inference_failures += 1;
                log::warn!("classifier {} failed: {:#}", self.classifier.name(), err);
                return Ok(None);
            }
        };
        self.stats.samples += 1;

        let Some(signal) = self.smoother.enqueue(probability) else {
            log::debug!(
                "warming up: {}/{} samples",
                self.smoother.len(),
                self.smoother.capacity()
            );
            return Ok(None);
        };

        self.link.send(signal)?;
        self.stats.signals_sent += 1;
        self.stats.last_signal = Some(signal);
        log::debug!(
            "{:.1} fps / {:.1} kb / {:.2} prediction",
            self.fps,
            frame.len() as f64 / 1000.0,
            signal / self.smoother.capacity() as f64
        );
        Ok(Some(signal))
    }

    /// Consume frames until the source ends, `stop` is raised or the control
    /// side closes the link.
    ///
    /// `stop` is checked between frames; a blocked read is not interrupted.
    /// A peer hang-up ends the run normally since the pilot closes the link
    /// once it has landed. Any other send failure is an error.
    pub fn run<I>(&mut self, frames: I, stop: &AtomicBool) -> Result<PipelineStats>
    where
        I: IntoIterator<Item = Result<ImageFrame>>,
    {
        self.classifier
            .warm_up()
            .with_context(|| format!("warm up classifier {}", self.classifier.name()))?;
        log::info!(
            "perception running: classifier={} window={}",
            self.classifier.name(),
            self.smoother.capacity()
        );

        for frame in frames {
            if stop.load(Ordering::SeqCst) {
                log::info!("stop requested");
                break;
            }
            let frame = frame?;
            match self.process_frame(&frame) {
                Ok(_) => {}
                Err(err) if err.is_disconnect() => {
                    log::info!("signal link closed by pilot: {}", err);
                    break;
                }
                Err(err) => return Err(err).context("send smoothed signal"),
            }

            if self.last_status_at.elapsed() >= STATUS_INTERVAL {
                log::info!(
                    "{:.1} fps, frames={} sent={} skipped={} prediction={:.2}",
                    self.fps,
                    self.stats.frames,
                    self.stats.signals_sent,
                    self.stats.decode_failures + self.stats.inference_failures,
                    self.smoother.average()
                );
                self.last_status_at = Instant::now();
            }
        }
        Ok(self.stats.clone())
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    pub fn smoother(&self) -> &RollingSmoother {
        &self.smoother
    }

    pub fn into_link(self) -> T {
        self.link
    }
}
