//! Frame ingestion from the camera deck.
//!
//! - `jpeg`: marker scanning over an unframed byte stream
//! - `deck`: the TCP source that feeds it
//!
//! Ingestion only cuts frames out of the stream. Decoding and inference
//! happen downstream and cannot corrupt extractor state.

pub mod deck;
pub mod jpeg;

pub use deck::{DeckConfig, DeckSource, DeckStats};
pub use jpeg::{ExtractorStats, FrameExtractor};
