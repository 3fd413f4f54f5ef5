//! `Content-Range` request headers and `Range` response headers.
//!
//! # Wire format
//!
//! ```text
//! known-length chunk:   bytes {start}-{end}/{total}
//! streaming chunk:      bytes {start}-{end}/*
//! offset probe:         bytes */{total}   |   bytes */*
//! acknowledged range:   bytes=0-{last}    (response `Range` header)
//! ```
//!
//! `end` and `last` are inclusive byte offsets.

use std::fmt;

/// Error returned when a `Range` response header cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed range header: {header:?}")]
pub struct RangeError {
    pub header: String,
}

/// Value of a `Content-Range` request header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentRange {
    /// A byte window `start..=end`; `total` is `None` while the full size is
    /// still unknown (streaming uploads).
    Bytes {
        start: u64,
        end: u64,
        total: Option<u64>,
    },
    /// A zero-length status probe.
    Probe { total: Option<u64> },
}

impl ContentRange {
    /// Window of a chunk of `len` bytes starting at `start` (`len > 0`).
    pub fn chunk(start: u64, len: u64, total: Option<u64>) -> Self {
        Self::Bytes {
            start,
            end: start + len.saturating_sub(1),
            total,
        }
    }
}

impl fmt::Display for ContentRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes {
                start,
                end,
                total: Some(total),
            } => write!(f, "bytes {start}-{end}/{total}"),
            Self::Bytes {
                start,
                end,
                total: None,
            } => write!(f, "bytes {start}-{end}/*"),
            Self::Probe { total: Some(total) } => write!(f, "bytes */{total}"),
            Self::Probe { total: None } => write!(f, "bytes */*"),
        }
    }
}

/// Parses the inclusive upper bound of an acknowledged-range header.
///
/// The header must end in `{digits}-{digits}`; the trailing group is the
/// highest acknowledged byte offset. Anything before that suffix (`bytes=`,
/// whitespace) is ignored.
pub fn parse_upper_bound(header: &str) -> Result<u64, RangeError> {
    let malformed = || RangeError {
        header: header.to_string(),
    };

    let trimmed = header.trim_end();
    let (head, upper) = trimmed.rsplit_once('-').ok_or_else(malformed)?;

    let lower_digits = head
        .chars()
        .rev()
        .take_while(char::is_ascii_digit)
        .count();
    if lower_digits == 0 || upper.is_empty() || !upper.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed());
    }

    upper.parse().map_err(|_| malformed())
}

/// Number of bytes the endpoint reports holding.
///
/// An absent header means nothing has been acknowledged yet.
pub fn acknowledged_bytes(header: Option<&str>) -> Result<u64, RangeError> {
    match header {
        None => Ok(0),
        Some(h) => parse_upper_bound(h)?
            .checked_add(1)
            .ok_or_else(|| RangeError {
                header: h.to_string(),
            }),
    }
}
