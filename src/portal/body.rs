//! Chunked HTTP request body reassembly.
//!
//! The network stack delivers request bodies in chunks bound to an
//! `(index, length, total)` triple. The assembler owns one growable
//! buffer per request: allocated when the first chunk arrives, filled at
//! each chunk's offset, and handed to the route handler once
//! `index + length == total`.
//!
//! Bodies larger than [`BODY_MAX_BYTES`] are rejected outright — logged
//! and never buffered. A hard cap, not a soft failure path.

use core::fmt;
use log::warn;

/// Hard cap on a single request body.
pub const BODY_MAX_BYTES: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyError {
    /// Declared total exceeds the hard cap.
    Oversized { total: usize },
    /// Chunk offset/length fall outside the declared total, or a chunk
    /// arrived before the first one allocated the buffer.
    BadChunk,
}

impl fmt::Display for BodyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Oversized { total } => {
                write!(f, "request body too large ({total} > {BODY_MAX_BYTES} bytes)")
            }
            Self::BadChunk => write!(f, "chunk outside declared body bounds"),
        }
    }
}

/// Per-request reassembly buffer.
///
/// Owned exclusively by one request's lifetime; [`BodyAssembler::feed`]
/// returns the completed body exactly once.
pub struct BodyAssembler {
    buf: Vec<u8>,
    total: usize,
    started: bool,
}

impl BodyAssembler {
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            total: 0,
            started: false,
        }
    }

    /// Feed one chunk. Returns `Ok(Some(body))` when the final chunk
    /// lands, `Ok(None)` while more chunks are expected.
    pub fn feed(
        &mut self,
        index: usize,
        data: &[u8],
        total: usize,
    ) -> Result<Option<Vec<u8>>, BodyError> {
        if total > BODY_MAX_BYTES {
            warn!("request body too large to be processed ({total} bytes)");
            return Err(BodyError::Oversized { total });
        }

        if index == 0 {
            self.buf = vec![0u8; total];
            self.total = total;
            self.started = true;
        } else if !self.started || total != self.total {
            return Err(BodyError::BadChunk);
        }

        let end = index.checked_add(data.len()).ok_or(BodyError::BadChunk)?;
        if end > self.total {
            return Err(BodyError::BadChunk);
        }
        self.buf[index..end].copy_from_slice(data);

        if end == self.total {
            self.started = false;
            Ok(Some(core::mem::take(&mut self.buf)))
        } else {
            Ok(None)
        }
    }

    /// Whether reassembly is in progress.
    pub fn is_active(&self) -> bool {
        self.started
    }
}

impl Default for BodyAssembler {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_chunk_body() {
        let mut asm = BodyAssembler::new();
        let body = asm.feed(0, b"hello", 5).unwrap();
        assert_eq!(body.unwrap(), b"hello");
        assert!(!asm.is_active());
    }

    #[test]
    fn multi_chunk_body_in_order() {
        let mut asm = BodyAssembler::new();
        assert!(asm.feed(0, b"hel", 8).unwrap().is_none());
        assert!(asm.is_active());
        assert!(asm.feed(3, b"lo ", 8).unwrap().is_none());
        let body = asm.feed(6, b"yo", 8).unwrap();
        assert_eq!(body.unwrap(), b"hello yo");
    }

    #[test]
    fn empty_body_completes_immediately() {
        let mut asm = BodyAssembler::new();
        let body = asm.feed(0, b"", 0).unwrap();
        assert_eq!(body.unwrap(), b"");
    }

    #[test]
    fn oversized_body_never_buffered() {
        let mut asm = BodyAssembler::new();
        let err = asm.feed(0, b"x", BODY_MAX_BYTES + 1).unwrap_err();
        assert_eq!(
            err,
            BodyError::Oversized {
                total: BODY_MAX_BYTES + 1
            }
        );
        assert!(!asm.is_active());
    }

    #[test]
    fn max_sized_body_accepted() {
        let mut asm = BodyAssembler::new();
        let data = vec![0xAB; BODY_MAX_BYTES];
        let body = asm.feed(0, &data, BODY_MAX_BYTES).unwrap();
        assert_eq!(body.unwrap().len(), BODY_MAX_BYTES);
    }

    #[test]
    fn chunk_past_total_rejected() {
        let mut asm = BodyAssembler::new();
        assert!(asm.feed(0, b"abcd", 4).is_ok());
        let mut asm = BodyAssembler::new();
        assert!(asm.feed(0, b"ab", 4).unwrap().is_none());
        assert_eq!(asm.feed(3, b"cd", 4), Err(BodyError::BadChunk));
    }

    #[test]
    fn late_chunk_without_start_rejected() {
        let mut asm = BodyAssembler::new();
        assert_eq!(asm.feed(2, b"cd", 4), Err(BodyError::BadChunk));
    }

    #[test]
    fn mismatched_total_rejected() {
        let mut asm = BodyAssembler::new();
        assert!(asm.feed(0, b"ab", 6).unwrap().is_none());
        assert_eq!(asm.feed(2, b"cd", 8), Err(BodyError::BadChunk));
    }
}
