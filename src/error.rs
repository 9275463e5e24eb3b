//! Error taxonomy shared by the perception and control sides.
//!
//! Decode errors are absorbed at the frame boundary. Transport and sink
//! errors are fatal and propagate out of `ControlLoop::run`.

use thiserror::Error;

/// A frame could not be turned into a classifier input.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("jpeg decode failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("frame size {width}x{height} does not match classifier input {expected_width}x{expected_height}")]
    Dimensions {
        width: u32,
        height: u32,
        expected_width: u32,
        expected_height: u32,
    },

    #[error("frame buffer overflow: {0} bytes without a complete frame")]
    Overflow(usize),
}

/// Failure on the perception -> control link.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("link i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("link closed by peer")]
    Closed,

    #[error("link authentication failed: {0}")]
    AuthenticationFailed(&'static str),

    #[error("link protocol violation: {0}")]
    Protocol(String),

    #[error("refusing to send non-finite signal {0}")]
    NonFinite(f64),
}

impl TransportError {
    /// The peer went away: clean close, reset or broken pipe.
    pub fn is_disconnect(&self) -> bool {
        match self {
            Self::Closed => true,
            Self::Io(err) => matches!(
                err.kind(),
                std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}

/// The flight controller refused a command.
#[derive(Debug, Error)]
#[error("setpoint sink rejected command: {reason}")]
pub struct SinkError {
    pub reason: String,
}

impl SinkError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl From<std::io::Error> for SinkError {
    fn from(err: std::io::Error) -> Self {
        Self::new(err.to_string())
    }
}

/// Fatal outcome of a control run.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("signal link failed during cruise: {0}")]
    Transport(#[from] TransportError),

    #[error("setpoint rejected: {0}")]
    SetpointRejected(#[from] SinkError),
}
