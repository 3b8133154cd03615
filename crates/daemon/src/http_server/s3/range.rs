use std::ops::Range;

use super::error::S3Error;

/// Resolve a `Range` header against an object of `size` bytes.
///
/// Only a single `bytes=` range is honoured. Headers that do not parse, or
/// ask for several ranges, are ignored and the whole object is served, as
/// S3 does. A well-formed range that starts past the end is an error.
pub fn resolve(header: &str, size: u64) -> Result<Option<Range<u64>>, S3Error> {
    let Some(spec) = header.trim().strip_prefix("bytes=") else {
        return Ok(None);
    };
    if spec.contains(',') {
        return Ok(None);
    }
    let Some((start, end)) = spec.split_once('-') else {
        return Ok(None);
    };
    let (start, end) = (start.trim(), end.trim());

    let range = match (start.is_empty(), end.is_empty()) {
        // bytes=-N: the last N bytes
        (true, false) => {
            let Ok(suffix) = end.parse::<u64>() else {
                return Ok(None);
            };
            if suffix == 0 {
                return Err(S3Error::InvalidRange { size });
            }
            size.saturating_sub(suffix)..size
        }
        (false, _) => {
            let Ok(first) = start.parse::<u64>() else {
                return Ok(None);
            };
            let last = if end.is_empty() {
                size.saturating_sub(1)
            } else {
                match end.parse::<u64>() {
                    Ok(last) if last >= first => last.min(size.saturating_sub(1)),
                    _ => return Ok(None),
                }
            };
            if first >= size {
                return Err(S3Error::InvalidRange { size });
            }
            first..last + 1
        }
        (true, true) => return Ok(None),
    };

    if range.is_empty() {
        return Err(S3Error::InvalidRange { size });
    }
    Ok(Some(range))
}

/// `Content-Range` value for a served range.
pub fn content_range(range: &Range<u64>, size: u64) -> String {
    format!("bytes {}-{}/{}", range.start, range.end - 1, size)
}
