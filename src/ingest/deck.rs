//! Camera deck frame source.
//!
//! The deck streams JPEG frames over a plain TCP socket. This source:
//! - Connects to the deck streamer
//! - Reads fixed-size chunks and feeds them to a `FrameExtractor`
//! - Yields complete `ImageFrame`s in stream order
//!
//! A new `DeckSource` starts with an empty extractor, so reconnecting never
//! mixes bytes from two connections.

use anyhow::{Context, Result};
use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use super::jpeg::{ExtractorStats, FrameExtractor, DEFAULT_MAX_BUFFER_BYTES};
use crate::frame::ImageFrame;

/// Configuration for a deck source.
#[derive(Clone, Debug)]
pub struct DeckConfig {
    /// Deck streamer address, `host:port`.
    pub addr: String,
    /// Bytes requested per socket read.
    pub chunk_size: usize,
    /// Extractor cap on unconsumed bytes. `0` disables it.
    pub max_buffer_bytes: usize,
    /// Connect timeout. `None` blocks until the OS gives up.
    pub connect_timeout: Option<Duration>,
}

impl Default for DeckConfig {
    fn default() -> Self {
        Self {
            addr: "192.168.4.1:5000".to_string(),
            chunk_size: 512,
            max_buffer_bytes: DEFAULT_MAX_BUFFER_BYTES,
            connect_timeout: Some(Duration::from_secs(10)),
        }
    }
}

/// Statistics for a deck source.
#[derive(Clone, Debug)]
pub struct DeckStats {
    pub frames_captured: u64,
    pub bytes_read: u64,
    pub extractor: ExtractorStats,
    pub source: String,
}

/// Frame source over any byte reader, normally the deck's TCP stream.
pub struct DeckSource<R: Read = TcpStream> {
    reader: R,
    extractor: FrameExtractor,
    chunk: Vec<u8>,
    source: String,
    connected_at: Instant,
    last_frame_at: Option<Instant>,
    bytes_read: u64,
    ended: bool,
}

impl DeckSource<TcpStream> {
    /// Connect to the deck streamer.
    pub fn connect(config: &DeckConfig) -> Result<Self> {
        log::info!("connecting to deck on {}...", config.addr);
        let stream = match config.connect_timeout {
            Some(timeout) => {
                let addr = config
                    .addr
                    .to_socket_addrs()
                    .with_context(|| format!("resolve deck address {}", config.addr))?
                    .next()
                    .with_context(|| format!("deck address {} resolved to nothing", config.addr))?;
                TcpStream::connect_timeout(&addr, timeout)
            }
            None => TcpStream::connect(&config.addr),
        }
        .with_context(|| format!("connect to deck at {}", config.addr))?;
        stream.set_nodelay(true).context("set deck socket nodelay")?;
        log::info!("deck socket connected");
        Ok(Self::from_reader(stream, config.addr.clone(), config))
    }
}

impl<R: Read> DeckSource<R> {
    pub fn from_reader(reader: R, source: impl Into<String>, config: &DeckConfig) -> Self {
        Self {
            reader,
            extractor: FrameExtractor::with_max_buffer(config.max_buffer_bytes),
            chunk: vec![0u8; config.chunk_size.max(1)],
            source: source.into(),
            connected_at: Instant::now(),
            last_frame_at: None,
            bytes_read: 0,
            ended: false,
        }
    }

    /// Read until the next complete frame.
    ///
    /// Returns `Ok(None)` once the stream has ended. Bytes of an incomplete
    /// final frame are dropped with the connection.
    pub fn next_frame(&mut self) -> Result<Option<ImageFrame>> {
        loop {
            if let Some(frame) = self.extractor.next_frame() {
                self.last_frame_at = Some(Instant::now());
                return Ok(Some(frame));
            }
            if self.ended {
                return Ok(None);
            }

            let read = self
                .reader
                .read(&mut self.chunk)
                .with_context(|| format!("read from deck {}", self.source))?;
            if read == 0 {
                log::info!(
                    "deck stream {} ended ({} bytes left unframed)",
                    self.source,
                    self.extractor.buffered_len()
                );
                self.ended = true;
                return Ok(None);
            }
            self.bytes_read += read as u64;
            if let Err(err) = self.extractor.push(&self.chunk[..read]) {
                log::warn!("deck {}: {}", self.source, err);
            }
        }
    }

    /// Check if the source is healthy.
    pub fn is_healthy(&self) -> bool {
        if self.ended {
            return false;
        }
        match self.last_frame_at {
            Some(last) => last.elapsed() <= Duration::from_secs(2),
            None => self.connected_at.elapsed() <= Duration::from_secs(5),
        }
    }

    /// Get frame statistics.
    pub fn stats(&self) -> DeckStats {
        let extractor = self.extractor.stats();
        DeckStats {
            frames_captured: extractor.frames,
            bytes_read: self.bytes_read,
            extractor,
            source: self.source.clone(),
        }
    }
}

impl<R: Read> Iterator for DeckSource<R> {
    type Item = Result<ImageFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_frame().transpose()
    }
}
