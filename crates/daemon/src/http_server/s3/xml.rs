//! S3 XML documents: askama templates for responses, plus the one request
//! document the API accepts (`DeleteObjects`).

use askama::Template;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, SecondsFormat, Utc};
use http::header::CONTENT_TYPE;
use http::StatusCode;

use object_store::ObjectMeta;

use super::error::S3Error;

/// Keys per `DeleteObjects` request, as on S3.
pub const MAX_DELETE_KEYS: usize = 1000;

#[derive(Template)]
#[template(path = "s3/error.xml")]
pub struct ErrorDocument<'a> {
    pub code: &'a str,
    pub message: &'a str,
    pub request_id: &'a str,
}

#[derive(Template)]
#[template(path = "s3/list_buckets.xml")]
pub struct ListBucketsDocument<'a> {
    pub owner: &'a str,
    pub bucket: &'a str,
    pub created: String,
}

#[derive(Template)]
#[template(path = "s3/location.xml")]
pub struct LocationDocument<'a> {
    pub location: &'a str,
}

/// One `<Contents>` entry of a listing.
pub struct ObjectEntry {
    pub key: String,
    pub last_modified: String,
    pub etag: String,
    pub size: u64,
}

impl ObjectEntry {
    pub fn new(meta: &ObjectMeta, url_encoded: bool) -> Self {
        Self {
            key: encode_if(meta.key.as_str(), url_encoded),
            last_modified: iso8601(&meta.last_modified),
            etag: meta.etag(),
            size: meta.size,
        }
    }
}

#[derive(Template)]
#[template(path = "s3/list_objects.xml")]
pub struct ListObjectsDocument<'a> {
    pub bucket: &'a str,
    pub prefix: String,
    pub marker: String,
    pub next_marker: Option<String>,
    pub max_keys: usize,
    pub delimiter: Option<String>,
    pub url_encoded: bool,
    pub is_truncated: bool,
    pub contents: Vec<ObjectEntry>,
    pub common_prefixes: Vec<String>,
}

#[derive(Template)]
#[template(path = "s3/list_objects_v2.xml")]
pub struct ListObjectsV2Document<'a> {
    pub bucket: &'a str,
    pub prefix: String,
    pub key_count: usize,
    pub max_keys: usize,
    pub delimiter: Option<String>,
    pub url_encoded: bool,
    pub is_truncated: bool,
    pub continuation_token: Option<String>,
    pub next_continuation_token: Option<String>,
    pub start_after: Option<String>,
    pub contents: Vec<ObjectEntry>,
    pub common_prefixes: Vec<String>,
}

pub struct DeleteError {
    pub key: String,
    pub code: &'static str,
    pub message: String,
}

#[derive(Template)]
#[template(path = "s3/delete_result.xml")]
pub struct DeleteResultDocument {
    pub deleted: Vec<String>,
    pub errors: Vec<DeleteError>,
}

/// Render `template` as an `application/xml` response.
pub fn render<T: Template>(status: StatusCode, template: &T) -> Result<Response, S3Error> {
    let body = template
        .render()
        .map_err(|e| S3Error::Internal(format!("failed to render response: {e}")))?;
    Ok((status, [(CONTENT_TYPE, "application/xml")], body).into_response())
}

/// Timestamp format used inside listings.
pub fn iso8601(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Listing values are URL-encoded when the client asks for
/// `encoding-type=url`.
pub fn encode_if(value: &str, url_encoded: bool) -> String {
    if url_encoded {
        super::auth::uri_encode(value, false)
    } else {
        value.to_string()
    }
}

/// A parsed `<Delete>` request body.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct DeleteRequest {
    pub quiet: bool,
    pub keys: Vec<String>,
}

impl DeleteRequest {
    pub fn parse(body: &str) -> Result<Self, S3Error> {
        if element_values(body, "Delete").is_empty() {
            return Err(S3Error::MalformedXml);
        }
        let quiet = element_values(body, "Quiet")
            .first()
            .is_some_and(|value| value.trim().eq_ignore_ascii_case("true"));

        let mut keys = Vec::new();
        for object in element_values(body, "Object") {
            let key = element_values(object, "Key")
                .into_iter()
                .next()
                .ok_or(S3Error::MalformedXml)?;
            keys.push(unescape(key)?);
        }
        if keys.is_empty() || keys.len() > MAX_DELETE_KEYS {
            return Err(S3Error::MalformedXml);
        }
        Ok(Self { quiet, keys })
    }
}

/// Inner text of every `<tag>...</tag>` (attributes allowed on the opening
/// tag) at any depth, in document order. Elements of the same name are not
/// expected to nest.
fn element_values<'a>(body: &'a str, tag: &str) -> Vec<&'a str> {
    let open = format!("<{tag}");
    let close = format!("</{tag}>");
    let mut values = Vec::new();
    let mut rest = body;

    while let Some(start) = rest.find(&open) {
        let after_name = &rest[start + open.len()..];
        // `<Key` must not match `<KeyMarker>`
        let Some(end_of_tag) = after_name.find('>') else {
            break;
        };
        let attributes = &after_name[..end_of_tag];
        if !(attributes.is_empty() || attributes.starts_with(char::is_whitespace)) {
            rest = after_name;
            continue;
        }
        if attributes.ends_with('/') {
            values.push("");
            rest = &after_name[end_of_tag + 1..];
            continue;
        }
        let content = &after_name[end_of_tag + 1..];
        let Some(end) = content.find(&close) else {
            break;
        };
        values.push(&content[..end]);
        rest = &content[end + close.len()..];
    }
    values
}

/// Resolve the predefined XML entities and character references.
fn unescape(text: &str) -> Result<String, S3Error> {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let entity_end = rest[amp..].find(';').ok_or(S3Error::MalformedXml)?;
        let entity = &rest[amp + 1..amp + entity_end];
        let resolved = match entity {
            "amp" => '&',
            "lt" => '<',
            "gt" => '>',
            "quot" => '"',
            "apos" => '\'',
            _ => {
                let code = if let Some(hex) = entity.strip_prefix("#x") {
                    u32::from_str_radix(hex, 16).ok()
                } else if let Some(dec) = entity.strip_prefix('#') {
                    dec.parse().ok()
                } else {
                    None
                };
                code.and_then(char::from_u32).ok_or(S3Error::MalformedXml)?
            }
        };
        out.push(resolved);
        rest = &rest[amp + entity_end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}
