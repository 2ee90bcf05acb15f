//! Continuation identifier generation

use crate::types::ContinuationId;
use rand::RngCore;
use tracing::trace;

/// Mints hex identifiers from cryptographically strong random bytes
#[derive(Debug, Clone, Copy)]
pub struct IdGenerator {
    bytes: usize,
}

impl IdGenerator {
    pub fn new(bytes: usize) -> Self {
        Self {
            bytes: bytes.max(1),
        }
    }

    pub fn generate(&self) -> ContinuationId {
        let mut buf = vec![0u8; self.bytes];
        rand::thread_rng().fill_bytes(&mut buf);
        ContinuationId::from_bytes(&buf)
    }

    /// Generate until `taken` reports the candidate as free.
    ///
    /// Must be called with the target holder locked so the check and the
    /// following insert are atomic.
    pub fn generate_unique(&self, taken: impl Fn(&str) -> bool) -> ContinuationId {
        loop {
            let candidate = self.generate();
            if !taken(candidate.as_str()) {
                return candidate;
            }
            trace!(continuation_id = %candidate, "Identifier collision, regenerating");
        }
    }
}
