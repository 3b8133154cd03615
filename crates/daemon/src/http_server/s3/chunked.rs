//! Decoding of `aws-chunked` request bodies.
//!
//! ```text
//! <hex-size>[;chunk-signature=<sig>]\r\n<data>\r\n
//! ...
//! 0[;chunk-signature=<sig>]\r\n
//! [<trailer-name>:<value>\r\n ...]
//! \r\n
//! ```

use bytes::{Bytes, BytesMut};

use super::auth::ChunkSigner;
use super::error::S3Error;

const CRLF: &[u8] = b"\r\n";
const SIGNATURE_PARAM: &str = "chunk-signature=";

/// Strip the chunk framing from `body`. When `signer` is given every chunk
/// must carry a valid signature.
pub fn decode(
    body: &[u8],
    mut signer: Option<&mut ChunkSigner>,
    max_size: usize,
) -> Result<Bytes, S3Error> {
    let mut decoded = BytesMut::with_capacity(body.len().min(max_size));
    let mut rest = body;

    loop {
        let (header, after_header) = split_line(rest)?;
        let (size, signature) = parse_chunk_header(header)?;

        if after_header.len() < size {
            return Err(incomplete("chunk shorter than its declared size"));
        }
        let (data, after_data) = after_header.split_at(size);

        if let Some(signer) = signer.as_deref_mut() {
            let signature =
                signature.ok_or_else(|| incomplete("chunk is missing its signature"))?;
            signer.verify_next(signature, data)?;
        }

        if size == 0 {
            // trailers (if any) end with an empty line; nothing after it matters
            return Ok(decoded.freeze());
        }

        if decoded.len() + size > max_size {
            return Err(S3Error::EntityTooLarge { max: max_size });
        }
        decoded.extend_from_slice(data);

        rest = after_data
            .strip_prefix(CRLF)
            .ok_or_else(|| incomplete("chunk data not followed by CRLF"))?;
    }
}

fn split_line(input: &[u8]) -> Result<(&str, &[u8]), S3Error> {
    let end = input
        .windows(CRLF.len())
        .position(|window| window == CRLF)
        .ok_or_else(|| incomplete("unterminated chunk header"))?;
    let line = std::str::from_utf8(&input[..end]).map_err(|_| incomplete("chunk header is not utf-8"))?;
    Ok((line, &input[end + CRLF.len()..]))
}

fn parse_chunk_header(line: &str) -> Result<(usize, Option<&str>), S3Error> {
    let mut parts = line.split(';');
    let size = parts.next().unwrap_or_default().trim();
    let size = usize::from_str_radix(size, 16).map_err(|_| incomplete("invalid chunk size"))?;
    let signature = parts.find_map(|param| param.trim().strip_prefix(SIGNATURE_PARAM));
    Ok((size, signature))
}

fn incomplete(reason: &str) -> S3Error {
    S3Error::IncompleteBody(format!("malformed aws-chunked body: {reason}"))
}
