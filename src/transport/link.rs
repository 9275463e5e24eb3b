//! TCP signal link between the perception and control processes.
//!
//! One producer, one consumer. After the handshake every message is a single
//! little-endian `f64`: the windowed sum exactly as the smoother emitted it.
//! TCP gives ordering and delivery; the link adds nothing on top beyond
//! refusing values the control law could not use.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};

use super::handshake::{authenticate_connector, authenticate_listener, read_exact, AuthKey};
use super::{SignalSink, SignalSource};
use crate::error::TransportError;

const MESSAGE_LEN: usize = 8;

/// Control-side listener. Accepts exactly one producer.
pub struct SignalListener {
    listener: TcpListener,
    key: AuthKey,
}

impl SignalListener {
    pub fn bind(addr: impl ToSocketAddrs, key: AuthKey) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)?;
        Ok(Self { listener, key })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.listener.local_addr()?)
    }

    /// Wait for the perception process and authenticate it.
    ///
    /// Consumes the listener, so no second producer can attach.
    pub fn accept(self) -> Result<SignalReceiver, TransportError> {
        let (mut stream, peer) = self.listener.accept()?;
        stream.set_nodelay(true)?;
        authenticate_listener(&mut stream, &self.key)?;
        log::info!("signal link accepted from {}", peer);
        Ok(SignalReceiver {
            stream,
            peer,
            received: 0,
        })
    }
}

/// Control-side end of the link.
pub struct SignalReceiver {
    stream: TcpStream,
    peer: SocketAddr,
    received: u64,
}

impl SignalReceiver {
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn received(&self) -> u64 {
        self.received
    }
}

impl SignalSource for SignalReceiver {
    fn recv(&mut self) -> Result<f64, TransportError> {
        let value = read_signal(&mut self.stream)?;
        self.received += 1;
        Ok(value)
    }
}

/// Perception-side end of the link.
pub struct SignalSender {
    stream: TcpStream,
    sent: u64,
}

impl SignalSender {
    pub fn connect(addr: impl ToSocketAddrs, key: &AuthKey) -> Result<Self, TransportError> {
        let mut stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        authenticate_connector(&mut stream, key)?;
        log::info!("signal link connected to {}", stream.peer_addr()?);
        Ok(Self { stream, sent: 0 })
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }
}

impl SignalSink for SignalSender {
    fn send(&mut self, signal: f64) -> Result<(), TransportError> {
        write_signal(&mut self.stream, signal)?;
        self.sent += 1;
        Ok(())
    }
}

fn write_signal<W: Write>(out: &mut W, signal: f64) -> Result<(), TransportError> {
    if !signal.is_finite() {
        return Err(TransportError::NonFinite(signal));
    }
    out.write_all(&signal.to_le_bytes())?;
    out.flush()?;
    Ok(())
}

fn read_signal<R: Read>(input: &mut R) -> Result<f64, TransportError> {
    let mut bytes = [0u8; MESSAGE_LEN];
    read_exact(input, &mut bytes)?;
    let value = f64::from_le_bytes(bytes);
    if !value.is_finite() {
        return Err(TransportError::Protocol(format!(
            "received non-finite signal {}",
            value
        )));
    }
    Ok(value)
}

/// True for `localhost` and loopback IP literals, with or without a port.
pub fn is_loopback_addr(addr: &str) -> bool {
    let host = match addr.parse::<SocketAddr>() {
        Ok(sock) => return sock.ip().is_loopback(),
        Err(_) => addr.rsplit_once(':').map(|(host, _)| host).unwrap_or(addr),
    };
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.eq_ignore_ascii_case("localhost") {
        return true;
    }
    host.parse::<std::net::IpAddr>()
        .map(|ip| ip.is_loopback())
        .unwrap_or(false)
}
