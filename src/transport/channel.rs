//! In-process signal link over `std::sync::mpsc`.
//!
//! Same ordering and closure semantics as the TCP link, without the socket.
//! Used to run both halves in one process (simulation, tests).

use std::sync::mpsc::{self, Receiver, Sender};

use super::{SignalSink, SignalSource};
use crate::error::TransportError;

pub struct ChannelSender {
    tx: Sender<f64>,
}

pub struct ChannelReceiver {
    rx: Receiver<f64>,
}

/// Create a connected sender/receiver pair.
pub fn channel() -> (ChannelSender, ChannelReceiver) {
    let (tx, rx) = mpsc::channel();
    (ChannelSender { tx }, ChannelReceiver { rx })
}

impl SignalSink for ChannelSender {
    fn send(&mut self, signal: f64) -> Result<(), TransportError> {
        if !signal.is_finite() {
            return Err(TransportError::NonFinite(signal));
        }
        self.tx.send(signal).map_err(|_| TransportError::Closed)
    }
}

impl SignalSource for ChannelReceiver {
    fn recv(&mut self) -> Result<f64, TransportError> {
        self.rx.recv().map_err(|_| TransportError::Closed)
    }
}
