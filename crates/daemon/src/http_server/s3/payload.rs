use axum::body::Body;
use base64::Engine;
use bytes::Bytes;
use http::header::CONTENT_LENGTH;
use http::HeaderMap;

use super::auth::{
    sha256_hex, ChunkSigner, CONTENT_SHA256_HEADER, STREAMING_PAYLOAD_PREFIX, UNSIGNED_PAYLOAD,
};
use super::chunked;
use super::error::S3Error;

const DECODED_LENGTH_HEADER: &str = "x-amz-decoded-content-length";
const CONTENT_MD5_HEADER: &str = "content-md5";

/// Read a request body of at most `max_size` payload bytes, removing
/// aws-chunked framing and checking the declared SHA-256 and MD5 digests.
///
/// `signer` is present when the request was authenticated with a streaming
/// signature; chunk signatures are then verified too.
pub async fn read(
    body: Body,
    headers: &HeaderMap,
    mut signer: Option<ChunkSigner>,
    max_size: usize,
) -> Result<Bytes, S3Error> {
    let mode = header_str(headers, CONTENT_SHA256_HEADER);
    let streaming = mode.is_some_and(|mode| mode.starts_with(STREAMING_PAYLOAD_PREFIX));

    let declared = if streaming {
        header_u64(headers, DECODED_LENGTH_HEADER)?
    } else {
        header_u64(headers, CONTENT_LENGTH.as_str())?
    };
    if declared.is_some_and(|declared| declared > max_size as u64) {
        return Err(S3Error::EntityTooLarge { max: max_size });
    }

    // chunk framing adds roughly 90 bytes per chunk
    let raw_limit = if streaming {
        max_size.saturating_add(max_size / 16).saturating_add(64 * 1024)
    } else {
        max_size
    };
    let raw = axum::body::to_bytes(body, raw_limit)
        .await
        .map_err(|e| match declared {
            None => S3Error::EntityTooLarge { max: max_size },
            Some(_) => S3Error::IncompleteBody(format!("failed to read request body: {e}")),
        })?;

    let data = if streaming {
        let decoded = chunked::decode(&raw, signer.as_mut(), max_size)?;
        if let Some(expected) = declared {
            if decoded.len() as u64 != expected {
                return Err(S3Error::IncompleteBody(format!(
                    "decoded {} bytes, {DECODED_LENGTH_HEADER} says {expected}",
                    decoded.len()
                )));
            }
        }
        decoded
    } else {
        match mode {
            None | Some(UNSIGNED_PAYLOAD) => {}
            Some(expected) => {
                if !expected.eq_ignore_ascii_case(&sha256_hex(&raw)) {
                    return Err(S3Error::ContentSha256Mismatch);
                }
            }
        }
        raw
    };

    verify_content_md5(headers, &data)?;
    Ok(data)
}

fn verify_content_md5(headers: &HeaderMap, data: &[u8]) -> Result<(), S3Error> {
    let Some(value) = header_str(headers, CONTENT_MD5_HEADER) else {
        return Ok(());
    };
    let expected = base64::engine::general_purpose::STANDARD
        .decode(value.trim())
        .map_err(|_| S3Error::InvalidDigest)?;
    if expected.len() != 16 {
        return Err(S3Error::InvalidDigest);
    }
    if md5::compute(data).0[..] != expected[..] {
        return Err(S3Error::BadDigest);
    }
    Ok(())
}

fn header_str<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn header_u64(headers: &HeaderMap, name: &str) -> Result<Option<u64>, S3Error> {
    header_str(headers, name)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| S3Error::InvalidArgument(format!("invalid {name} header")))
        })
        .transpose()
}
