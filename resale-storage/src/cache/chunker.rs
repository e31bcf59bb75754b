//! Splitting oversized values into parts and back.
//!
//! A chunked entry is a manifest `"##CHUNKS##|<n>"` at the logical key plus
//! `n` parts at `<key>__part0 .. <key>__part<n-1>`.

use resale_core::{ResaleResult, ValidationError};

/// Prefix marking a manifest value.
pub const CHUNK_MARKER: &str = "##CHUNKS##|";

/// Smallest host entry that holds a manifest for any part count.
pub const MIN_HOST_ENTRY_BYTES: usize = CHUNK_MARKER.len() + 20;

/// Infix between a logical key and a part index.
pub const PART_SUFFIX: &str = "__part";

/// Key of part `index` of `key`.
pub fn part_key(key: &str, index: usize) -> String {
    format!("{}{}{}", key, PART_SUFFIX, index)
}

/// Manifest value for `part_count` parts.
pub fn manifest(part_count: usize) -> String {
    format!("{}{}", CHUNK_MARKER, part_count)
}

/// What a raw value at a logical key turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Manifest {
    /// Not a manifest; the raw value is the payload.
    Simple,
    /// A manifest naming this many parts.
    Chunked(usize),
    /// Starts with the marker but the count does not parse.
    Malformed,
}

/// Classify a raw cached value.
pub fn parse_manifest(raw: &str) -> Manifest {
    match raw.strip_prefix(CHUNK_MARKER) {
        None => Manifest::Simple,
        Some(count) => match count.trim().parse::<usize>() {
            Ok(n) if n > 0 => Manifest::Chunked(n),
            _ => Manifest::Malformed,
        },
    }
}

/// Splits values into parts of at most `max_part_bytes` UTF-8 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    max_part_bytes: usize,
}

impl Chunker {
    /// Create a chunker. `max_part_bytes` must be positive.
    pub fn new(max_part_bytes: usize) -> ResaleResult<Self> {
        if max_part_bytes == 0 {
            return Err(ValidationError::InvalidValue {
                field: "max_part_bytes".to_string(),
                reason: "part size must be positive".to_string(),
            }
            .into());
        }
        Ok(Self { max_part_bytes })
    }

    pub fn max_part_bytes(&self) -> usize {
        self.max_part_bytes
    }

    /// Split into contiguous, order-preserving parts.
    ///
    /// Cuts fall on char boundaries, so a part may come in under the limit.
    /// A single char wider than the limit gets a part of its own. Empty input
    /// yields exactly one empty part.
    pub fn split(&self, value: &str) -> Vec<String> {
        if value.is_empty() {
            return vec![String::new()];
        }

        let mut parts = Vec::with_capacity(value.len().div_ceil(self.max_part_bytes));
        let mut rest = value;
        while !rest.is_empty() {
            let mut cut = self.max_part_bytes.min(rest.len());
            while !rest.is_char_boundary(cut) {
                cut -= 1;
            }
            if cut == 0 {
                // First char alone is wider than the limit.
                cut = rest.chars().next().map(char::len_utf8).unwrap_or(rest.len());
            }
            let (head, tail) = rest.split_at(cut);
            parts.push(head.to_string());
            rest = tail;
        }
        parts
    }

    /// Exact inverse of [`Chunker::split`]: concatenation in order.
    pub fn join<S: AsRef<str>>(parts: &[S]) -> String {
        let total = parts.iter().map(|p| p.as_ref().len()).sum();
        let mut value = String::with_capacity(total);
        for part in parts {
            value.push_str(part.as_ref());
        }
        value
    }
}
