//! Obstacle-aware forward flight.
//!
//! This crate turns a camera's unframed JPEG byte stream into hover setpoints
//! that slow or stop a small quadcopter ahead of an obstacle.
//!
//! # Architecture
//!
//! Two processes, one link between them:
//!
//! 1. **Perception** (`perception` binary): deck bytes -> `FrameExtractor` ->
//!    `FrameDecoder` -> `ObstacleClassifier` -> `RollingSmoother` -> link.
//! 2. **Control** (`pilot` binary): link -> `ControlLoop` -> `SetpointSink`.
//!
//! The control side has no clock of its own while cruising; each step waits
//! for the next smoothed signal.
//!
//! # Module Structure
//!
//! - `ingest`: frame extraction from the deck stream
//! - `frame`: frame and tensor types, JPEG decoding
//! - `detect`: classifier backends
//! - `smoother`: rolling window over classifier outputs
//! - `transport`: authenticated perception -> control link
//! - `pipeline`: the perception cycle
//! - `control`: state machine, velocity laws, setpoint sinks
//! - `config`: file + environment configuration

pub mod config;
pub mod control;
pub mod detect;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod pipeline;
pub mod smoother;
pub mod transport;

pub use control::{
    ControlLoop, ControlState, FlightPlan, FlightReport, Pacer, Setpoint, SetpointSink,
    ThreadPacer, VelocityPolicy,
};
pub use detect::{ObstacleClassifier, StubClassifier};
#[cfg(feature = "backend-tract")]
pub use detect::TractClassifier;
pub use error::{ControlError, DecodeError, SinkError, TransportError};
pub use frame::{FrameDecoder, ImageFrame, InputTensor};
pub use ingest::{DeckConfig, DeckSource, FrameExtractor};
pub use pipeline::{PerceptionPipeline, PipelineStats};
pub use smoother::RollingSmoother;
pub use transport::{AuthKey, SignalListener, SignalReceiver, SignalSender, SignalSink, SignalSource};
