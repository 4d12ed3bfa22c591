//! Per-message buffer for the header currently under evaluation.

use std::fmt;

/// Memory for buffering or reassembly could not be obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationFailed;

impl fmt::Display for AllocationFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("memory allocation failed")
    }
}

impl std::error::Error for AllocationFailed {}

impl From<std::collections::TryReserveError> for AllocationFailed {
    fn from(_: std::collections::TryReserveError) -> Self {
        AllocationFailed
    }
}

/// Remove the transport's dot-stuffing escape, if any.
pub fn unescape(raw: &[u8]) -> &[u8] {
    raw.strip_prefix(b".").unwrap_or(raw)
}

/// Raw lines of one candidate header, in folding order. Lines are kept as
/// bytes; 8-bit content must go back out exactly as it came in.
#[derive(Debug, Default)]
pub struct HeaderCache {
    lines: Vec<Vec<u8>>,
    cached_len: usize,
}

impl HeaderCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, raw: &[u8]) -> Result<(), AllocationFailed> {
        self.lines.try_reserve(1)?;
        let mut line = Vec::new();
        line.try_reserve_exact(raw.len())?;
        line.extend_from_slice(raw);
        self.cached_len += unescape(raw).len();
        self.lines.push(line);
        Ok(())
    }

    /// Hand every buffered line, unchanged and in order, to `emit`.
    pub fn flush<F: FnMut(&[u8])>(&self, mut emit: F) {
        for line in &self.lines {
            emit(line.as_slice());
        }
    }

    pub fn clear(&mut self) {
        self.lines = Vec::new();
        self.cached_len = 0;
    }

    /// Sum of de-escaped line lengths.
    pub fn cached_len(&self) -> usize {
        self.cached_len
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn lines(&self) -> impl Iterator<Item = &[u8]> {
        self.lines.iter().map(Vec::as_slice)
    }
}
