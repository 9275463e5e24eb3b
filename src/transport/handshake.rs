//! Mutual challenge/response authentication for the signal link.
//!
//! Both endpoints hold the same shared key. The side delivering a challenge
//! sends a random nonce; the other side proves knowledge of the key by
//! returning a keyed SHA-256 digest of it. Each connection runs the exchange
//! once in each direction before any signal flows:
//!
//! ```text
//! listener                          connector
//!   CHALLENGE || nonce_a   ------>
//!                          <------  digest(key, nonce_a)
//!   WELCOME | FAILURE      ------>
//!                          <------  CHALLENGE || nonce_b
//!   digest(key, nonce_b)   ------>
//!                          <------  WELCOME | FAILURE
//! ```
//!
//! The link itself is not encrypted; the handshake only keeps stray clients
//! from steering the vehicle.

use rand::RngCore;
use sha2::{Digest, Sha256};
use std::io::{Read, Write};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::TransportError;

const CHALLENGE_MAGIC: &[u8; 11] = b"#CHALLENGE#";
const WELCOME: &[u8; 9] = b"#WELCOME#";
const FAILURE: &[u8; 9] = b"#FAILURE#";
const NONCE_LEN: usize = 32;
const DIGEST_DOMAIN: &str = "obstacle-pilot:link-auth:v1";

/// Shared credential for the signal link. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AuthKey(Vec<u8>);

impl AuthKey {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<&str> for AuthKey {
    fn from(value: &str) -> Self {
        Self::new(value.as_bytes())
    }
}

impl std::fmt::Debug for AuthKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AuthKey(<redacted>)")
    }
}

/// Challenge the peer and verify its answer.
pub fn deliver_challenge<S: Read + Write>(
    stream: &mut S,
    key: &AuthKey,
) -> Result<(), TransportError> {
    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);

    let mut message = Vec::with_capacity(CHALLENGE_MAGIC.len() + NONCE_LEN);
    message.extend_from_slice(CHALLENGE_MAGIC);
    message.extend_from_slice(&nonce);
    stream.write_all(&message)?;
    stream.flush()?;

    let mut answer = [0u8; 32];
    read_exact(stream, &mut answer)?;
    let expected = keyed_digest(key, &nonce);

    if digests_match(&answer, &expected) {
        stream.write_all(WELCOME)?;
        stream.flush()?;
        Ok(())
    } else {
        // Best effort: the peer may already be gone.
        let _ = stream.write_all(FAILURE);
        let _ = stream.flush();
        Err(TransportError::AuthenticationFailed(
            "peer answered challenge with wrong digest",
        ))
    }
}

/// Answer a challenge from the peer and read its verdict.
pub fn answer_challenge<S: Read + Write>(
    stream: &mut S,
    key: &AuthKey,
) -> Result<(), TransportError> {
    let mut message = [0u8; CHALLENGE_MAGIC.len() + NONCE_LEN];
    read_exact(stream, &mut message)?;
    let (magic, nonce) = message.split_at(CHALLENGE_MAGIC.len());
    if magic != CHALLENGE_MAGIC {
        return Err(TransportError::Protocol(
            "expected challenge message".to_string(),
        ));
    }

    stream.write_all(&keyed_digest(key, nonce))?;
    stream.flush()?;

    let mut verdict = [0u8; 9];
    read_exact(stream, &mut verdict)?;
    if &verdict == WELCOME {
        Ok(())
    } else if &verdict == FAILURE {
        Err(TransportError::AuthenticationFailed("peer rejected our key"))
    } else {
        Err(TransportError::Protocol(
            "unexpected handshake verdict".to_string(),
        ))
    }
}

/// Accepting side: verify the peer first, then prove ourselves.
pub fn authenticate_listener<S: Read + Write>(
    stream: &mut S,
    key: &AuthKey,
) -> Result<(), TransportError> {
    deliver_challenge(stream, key)?;
    answer_challenge(stream, key)
}

/// Connecting side: mirror image of `authenticate_listener`.
pub fn authenticate_connector<S: Read + Write>(
    stream: &mut S,
    key: &AuthKey,
) -> Result<(), TransportError> {
    answer_challenge(stream, key)?;
    deliver_challenge(stream, key)
}

fn keyed_digest(key: &AuthKey, nonce: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    let domain = DIGEST_DOMAIN.as_bytes();
    hasher.update((domain.len() as u32).to_le_bytes());
    hasher.update(domain);
    hasher.update((key.as_bytes().len() as u32).to_le_bytes());
    hasher.update(key.as_bytes());
    hasher.update(nonce);
    hasher.finalize().into()
}

fn digests_match(a: &[u8; 32], b: &[u8; 32]) -> bool {
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

pub(crate) fn read_exact<S: Read>(stream: &mut S, buf: &mut [u8]) -> Result<(), TransportError> {
    stream.read_exact(buf).map_err(|err| match err.kind() {
        std::io::ErrorKind::UnexpectedEof => TransportError::Closed,
        _ => TransportError::Io(err),
    })
}
