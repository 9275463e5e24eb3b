//! Perception -> control signal link.
//!
//! A reliable, ordered, single-producer single-consumer channel carrying one
//! smoothed signal per message. The blocking receive on the control side is
//! what paces the cruise phase; there is no separate clock.
//!
//! - `link`: authenticated TCP link used between the two processes
//! - `channel`: in-process equivalent over `std::sync::mpsc`

pub mod channel;
mod handshake;
pub mod link;

pub use channel::{channel, ChannelReceiver, ChannelSender};
pub use handshake::{answer_challenge, deliver_challenge, AuthKey};
pub use link::{is_loopback_addr, SignalListener, SignalReceiver, SignalSender};

use crate::error::TransportError;

/// Perception side of the link.
pub trait SignalSink {
    fn send(&mut self, signal: f64) -> Result<(), TransportError>;
}

/// Control side of the link. `recv` blocks until the next signal arrives.
pub trait SignalSource {
    fn recv(&mut self) -> Result<f64, TransportError>;
}
