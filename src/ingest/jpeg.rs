//! Marker-based JPEG extraction from an unframed byte stream.
//!
//! The deck sends JPEGs back to back over TCP with no length prefix. Frames
//! are found by scanning for the start-of-image (0xFFD8) and end-of-image
//! (0xFFD9) markers. Chunk boundaries carry no meaning: a frame may span any
//! number of reads and a read may hold several frames.

use crate::error::DecodeError;
use crate::frame::ImageFrame;

pub const START_MARKER: [u8; 2] = [0xFF, 0xD8];
pub const END_MARKER: [u8; 2] = [0xFF, 0xD9];

/// Room for two 5 MiB frames.
pub const DEFAULT_MAX_BUFFER_BYTES: usize = 5 * 1024 * 1024 * 2;

/// Counters for one connection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExtractorStats {
    pub frames: u64,
    pub stale_bytes: u64,
    pub overflows: u64,
}

/// Accumulates stream bytes and yields complete frames in order.
///
/// Bytes before `cursor` have been consumed and are never looked at again.
/// They are compacted away lazily on the next `push`.
pub struct FrameExtractor {
    buffer: Vec<u8>,
    cursor: usize,
    max_buffer_bytes: usize,
    stats: ExtractorStats,
}

impl FrameExtractor {
    pub fn new() -> Self {
        Self::with_max_buffer(DEFAULT_MAX_BUFFER_BYTES)
    }

    /// `0` disables the cap.
    pub fn with_max_buffer(max_buffer_bytes: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(64 * 1024),
            cursor: 0,
            max_buffer_bytes,
            stats: ExtractorStats::default(),
        }
    }

    /// Append a chunk read from the stream.
    ///
    /// If the pending (unconsumed) bytes plus the chunk exceed the cap, the
    /// pending bytes are dropped first and the overflow is reported. The chunk
    /// itself is always kept so a frame starting in it is not lost.
    ///
    /// Pending bytes that already hold a complete frame are never dropped;
    /// the cap only bounds data that `next_frame` cannot make progress on.
    pub fn push(&mut self, chunk: &[u8]) -> Result<(), DecodeError> {
        let pending = self.buffered_len();
        let overflow = self.max_buffer_bytes > 0
            && pending + chunk.len() > self.max_buffer_bytes
            && !self.holds_complete_frame();
        if overflow {
            // Keep a trailing 0xFF: it may be the first half of a marker.
            let keep_from = match self.buffer.last() {
                Some(0xFF) => self.buffer.len() - 1,
                _ => self.buffer.len(),
            };
            self.cursor = keep_from.max(self.cursor);
            self.stats.overflows += 1;
        }

        self.compact();
        self.buffer.extend_from_slice(chunk);

        if overflow {
            Err(DecodeError::Overflow(pending))
        } else {
            Ok(())
        }
    }

    /// Pull the next complete frame, if the buffer holds one.
    pub fn next_frame(&mut self) -> Option<ImageFrame> {
        loop {
            let pending = &self.buffer[self.cursor..];
            let start = find_marker(pending, &START_MARKER);
            let end = find_marker(pending, &END_MARKER);

            match (start, end) {
                (Some(start), Some(end)) if end > start => {
                    let frame = pending[start..end + 2].to_vec();
                    self.cursor += end + 2;
                    self.stats.frames += 1;
                    return Some(ImageFrame::from_extracted(frame));
                }
                (Some(start), Some(_)) => {
                    // End of a frame whose start we never saw.
                    self.discard(start);
                }
                (None, Some(_)) => {
                    let keep_from = match pending.last() {
                        Some(0xFF) => pending.len() - 1,
                        _ => pending.len(),
                    };
                    self.discard(keep_from);
                    return None;
                }
                (_, None) => return None,
            }
        }
    }

    /// Push a chunk and drain every frame it completes.
    ///
    /// An overflow is logged and counted; frames completed by the chunk are
    /// still returned.
    pub fn extend(&mut self, chunk: &[u8]) -> Vec<ImageFrame> {
        if let Err(err) = self.push(chunk) {
            log::warn!("frame extractor: {}", err);
        }
        std::iter::from_fn(|| self.next_frame()).collect()
    }

    /// Bytes received but not yet consumed.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len() - self.cursor
    }

    pub fn stats(&self) -> ExtractorStats {
        self.stats
    }

    /// Forget everything. Used when a new connection begins.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.cursor = 0;
        self.stats = ExtractorStats::default();
    }

    fn holds_complete_frame(&self) -> bool {
        let pending = &self.buffer[self.cursor..];
        match find_marker(pending, &START_MARKER) {
            Some(start) => find_marker(&pending[start + 2..], &END_MARKER).is_some(),
            None => false,
        }
    }

    fn discard(&mut self, len: usize) {
        self.cursor += len;
        self.stats.stale_bytes += len as u64;
    }

    fn compact(&mut self) {
        if self.cursor == 0 {
            return;
        }
        if self.cursor == self.buffer.len() {
            self.buffer.clear();
            self.cursor = 0;
        } else if self.cursor >= self.buffer.len() / 2 {
            self.buffer.drain(..self.cursor);
            self.cursor = 0;
        }
    }
}

impl Default for FrameExtractor {
    fn default() -> Self {
        Self::new()
    }
}

fn find_marker(buffer: &[u8], marker: &[u8; 2]) -> Option<usize> {
    buffer.windows(2).position(|pair| pair == marker)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(body: &[u8]) -> Vec<u8> {
        let mut out = START_MARKER.to_vec();
        out.extend_from_slice(body);
        out.extend_from_slice(&END_MARKER);
        out
    }

    fn stream_of(frames: &[Vec<u8>], gap: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        for f in frames {
            out.extend_from_slice(f);
            out.extend_from_slice(gap);
        }
        out
    }

    #[test]
    fn yields_same_frames_for_every_chunk_size() {
        let frames = vec![
            frame(b"first"),
            frame(&[0x01, 0xFF, 0x00, 0x02]),
            frame(b""),
            frame(&[0xFF; 7]),
        ];
        let stream = stream_of(&frames, b"\x00\x11");

        for chunk_size in 1..=stream.len() {
            let mut extractor = FrameExtractor::new();
            let mut got = Vec::new();
            for chunk in stream.chunks(chunk_size) {
                got.extend(extractor.extend(chunk).into_iter().map(ImageFrame::into_bytes));
            }
            assert_eq!(got, frames, "chunk size {}", chunk_size);
        }
    }

    #[test]
    fn yields_same_frames_for_mixed_chunk_lengths() {
        let frames = vec![
            frame(b"alpha"),
            frame(&[0xFF, 0xFF, 0x00]),
            frame(&[0x42; 40]),
            frame(b""),
            frame(b"omega"),
        ];
        let stream = stream_of(&frames, &[0x00, 0xFF, 0x11]);

        let patterns: [&[usize]; 4] = [&[1, 7, 2, 300], &[3, 1, 1, 5, 2], &[300, 1], &[2, 9, 4]];
        for pattern in patterns {
            for offset in 0..pattern.len() {
                let mut extractor = FrameExtractor::new();
                let mut got = Vec::new();
                let mut lengths = pattern.iter().cycle().skip(offset);
                let mut rest = stream.as_slice();
                while !rest.is_empty() {
                    let len = lengths.next().copied().unwrap_or(1).min(rest.len());
                    let (chunk, tail) = rest.split_at(len);
                    got.extend(extractor.extend(chunk).into_iter().map(ImageFrame::into_bytes));
                    rest = tail;
                }
                assert_eq!(got, frames, "pattern {:?} offset {}", pattern, offset);
            }
        }
    }

    #[test]
    fn frame_split_across_reads_is_held_until_complete() {
        let mut extractor = FrameExtractor::new();
        assert!(extractor.extend(&[0xFF, 0xD8, 0x01]).is_empty());
        assert!(extractor.extend(&[0x02, 0xFF]).is_empty());
        let out = extractor.extend(&[0xD9, 0xFF, 0xD8, 0x03]);

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].as_bytes(), &[0xFF, 0xD8, 0x01, 0x02, 0xFF, 0xD9]);
        // Start of the next frame stays buffered.
        assert_eq!(extractor.buffered_len(), 3);
    }

    #[test]
    fn stale_end_before_start_is_discarded() {
        let mut extractor = FrameExtractor::new();
        let mut stream = vec![0xAA, 0xBB, 0xFF, 0xD9, 0xCC];
        stream.extend_from_slice(&frame(b"ok"));

        let out = extractor.extend(&stream);

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].as_bytes(), frame(b"ok").as_slice());
        assert_eq!(extractor.stats().stale_bytes, 5);
        assert_eq!(extractor.buffered_len(), 0);
    }

    #[test]
    fn stale_end_without_any_start_yields_nothing() {
        let mut extractor = FrameExtractor::new();
        let out = extractor.extend(&[0x10, 0xFF, 0xD9, 0x20, 0xFF]);

        assert!(out.is_empty());
        // Trailing 0xFF might begin the next start marker.
        assert_eq!(extractor.buffered_len(), 1);

        let out = extractor.extend(&[0xD8, 0x42, 0xFF, 0xD9]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].as_bytes(), &[0xFF, 0xD8, 0x42, 0xFF, 0xD9]);
    }

    #[test]
    fn unterminated_data_is_retained() {
        let mut extractor = FrameExtractor::new();
        assert!(extractor.extend(&[0x00, 0x01, 0x02]).is_empty());
        assert!(extractor.extend(&[0xFF, 0xD8, 0x03]).is_empty());
        assert_eq!(extractor.buffered_len(), 6);
        assert_eq!(extractor.stats().stale_bytes, 0);
    }

    #[test]
    fn overflow_drops_pending_bytes_and_recovers() {
        let mut extractor = FrameExtractor::with_max_buffer(16);
        extractor.push(&[0xFF, 0xD8, 0, 0, 0, 0, 0, 0, 0, 0]).unwrap();
        let err = extractor.push(&[0; 10]).unwrap_err();
        assert!(matches!(err, DecodeError::Overflow(10)));
        assert_eq!(extractor.stats().overflows, 1);
        assert!(extractor.next_frame().is_none());

        let out = extractor.extend(&frame(b"next"));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].as_bytes(), frame(b"next").as_slice());
    }

    #[test]
    fn undrained_complete_frames_survive_the_cap() {
        let mut extractor = FrameExtractor::with_max_buffer(16);
        let first = frame(b"abcdef");
        let second = frame(b"ghijkl");

        extractor.push(&first).unwrap();
        extractor.push(&second).unwrap();
        assert_eq!(extractor.stats().overflows, 0);

        assert_eq!(extractor.next_frame().map(ImageFrame::into_bytes), Some(first));
        assert_eq!(extractor.next_frame().map(ImageFrame::into_bytes), Some(second));
        assert!(extractor.next_frame().is_none());
    }

    #[test]
    fn reset_clears_state_for_new_connection() {
        let mut extractor = FrameExtractor::new();
        extractor.extend(&[0xFF, 0xD8, 0x01]);
        extractor.reset();
        assert_eq!(extractor.buffered_len(), 0);

        let out = extractor.extend(&[0x02, 0xFF, 0xD9]);
        assert!(out.is_empty());
    }
}
