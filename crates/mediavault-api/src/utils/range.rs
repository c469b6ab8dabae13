//! HTTP `Range` header handling.
//!
//! Only single byte ranges are supported: `bytes=N-M`, `bytes=N-` and `bytes=-N`.
//! Anything else is reported as `RangeNotSatisfiable`, which maps to 400 rather than
//! 416 for compatibility with existing clients.

use mediavault_core::AppError;

/// A syntactically valid range, before it is applied to an object size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeSpec {
    /// `bytes=N-M`
    Explicit { start: u64, end: u64 },
    /// `bytes=N-`
    OpenEnded { start: u64 },
    /// `bytes=-N`
    Suffix { length: u64 },
}

/// Inclusive byte range resolved against an object size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn length(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn content_range(&self, total: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, total)
    }
}

fn unsatisfiable(header: &str) -> AppError {
    AppError::RangeNotSatisfiable(format!("Unsupported or invalid Range header: {}", header))
}

fn parse_number(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

pub fn parse_range_header(header: &str) -> Result<RangeSpec, AppError> {
    let spec = header
        .trim()
        .strip_prefix("bytes=")
        .ok_or_else(|| unsatisfiable(header))?
        .trim();

    // Multiple ranges would need a multipart/byteranges body.
    if spec.contains(',') {
        return Err(unsatisfiable(header));
    }

    let (start, end) = spec.split_once('-').ok_or_else(|| unsatisfiable(header))?;

    match (start.trim(), end.trim()) {
        ("", "") => Err(unsatisfiable(header)),
        ("", length) => match parse_number(length) {
            Some(length) if length > 0 => Ok(RangeSpec::Suffix { length }),
            _ => Err(unsatisfiable(header)),
        },
        (start, "") => parse_number(start)
            .map(|start| RangeSpec::OpenEnded { start })
            .ok_or_else(|| unsatisfiable(header)),
        (start, end) => match (parse_number(start), parse_number(end)) {
            (Some(start), Some(end)) if start <= end => Ok(RangeSpec::Explicit { start, end }),
            _ => Err(unsatisfiable(header)),
        },
    }
}

impl RangeSpec {
    /// Apply to an object of `size` bytes. Open-ended ranges are capped at `chunk_size`
    /// bytes so a single request never streams the rest of a huge file.
    pub fn resolve(self, size: u64, chunk_size: u64) -> Result<ByteRange, AppError> {
        if size == 0 {
            return Err(AppError::RangeNotSatisfiable(
                "Range requested on an empty object".to_string(),
            ));
        }
        let last = size - 1;

        let range = match self {
            RangeSpec::Explicit { start, end } => {
                if start > last {
                    return Err(beyond_end(start, size));
                }
                ByteRange {
                    start,
                    end: end.min(last),
                }
            }
            RangeSpec::OpenEnded { start } => {
                if start > last {
                    return Err(beyond_end(start, size));
                }
                let span = chunk_size.max(1);
                ByteRange {
                    start,
                    end: start.saturating_add(span - 1).min(last),
                }
            }
            RangeSpec::Suffix { length } => ByteRange {
                start: size.saturating_sub(length),
                end: last,
            },
        };
        Ok(range)
    }
}

fn beyond_end(start: u64, size: u64) -> AppError {
    AppError::RangeNotSatisfiable(format!(
        "Range start {} is beyond the end of a {} byte object",
        start, size
    ))
}

/// Parse and resolve in one step.
pub fn resolve_range(header: &str, size: u64, chunk_size: u64) -> Result<ByteRange, AppError> {
    parse_range_header(header)?.resolve(size, chunk_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIZE: u64 = 10_000_000;
    const CHUNK: u64 = 2 * 1024 * 1024;

    fn range(start: u64, end: u64) -> ByteRange {
        ByteRange { start, end }
    }

    #[test]
    fn test_open_ended_is_bounded_to_chunk() {
        assert_eq!(resolve_range("bytes=0-", SIZE, CHUNK).unwrap(), range(0, 2_097_151));
        assert_eq!(
            resolve_range("bytes=9000000-", SIZE, CHUNK).unwrap(),
            range(9_000_000, 9_999_999)
        );
    }

    #[test]
    fn test_suffix_range() {
        assert_eq!(
            resolve_range("bytes=-500", SIZE, CHUNK).unwrap(),
            range(9_999_500, 9_999_999)
        );
        assert_eq!(resolve_range("bytes=-50", 20, CHUNK).unwrap(), range(0, 19));
    }

    #[test]
    fn test_explicit_range() {
        let r = resolve_range("bytes=100-199", SIZE, CHUNK).unwrap();
        assert_eq!(r, range(100, 199));
        assert_eq!(r.length(), 100);
        assert_eq!(r.content_range(SIZE), "bytes 100-199/10000000");
    }

    #[test]
    fn test_explicit_end_is_clamped() {
        assert_eq!(resolve_range("bytes=5-1000", 10, CHUNK).unwrap(), range(5, 9));
    }

    #[test]
    fn test_unsatisfiable_ranges() {
        assert!(resolve_range("bytes=10-20", 10, CHUNK).is_err());
        assert!(resolve_range("bytes=10-", 10, CHUNK).is_err());
        assert!(resolve_range("bytes=0-0", 0, CHUNK).is_err());
        assert!(resolve_range("bytes=-5", 0, CHUNK).is_err());
    }

    #[test]
    fn test_malformed_headers() {
        for header in [
            "bytes=abc",
            "bytes=5-1",
            "bytes=-",
            "bytes=-0",
            "bytes=1-2,4-5",
            "items=0-10",
            "bytes=+1-2",
            "bytes 0-10",
            "",
        ] {
            let err = parse_range_header(header).unwrap_err();
            assert!(
                matches!(err, AppError::RangeNotSatisfiable(_)),
                "expected range error for {:?}",
                header
            );
        }
    }
}
