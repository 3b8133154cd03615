use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::Extension;
use http::header::{
    ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, ETAG, IF_MATCH, IF_NONE_MATCH,
    LAST_MODIFIED, RANGE,
};
use http::{HeaderMap, HeaderValue, StatusCode};
use serde::Deserialize;

use object_store::{ObjectKey, ObjectMeta};

use super::auth::ChunkSigner;
use super::error::S3Error;
use super::{check_bucket, payload, range};
use crate::ServiceState;

const COPY_SOURCE_HEADER: &str = "x-amz-copy-source";

/// Sub-resources that would turn a plain object request into a multipart
/// upload operation.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectQuery {
    upload_id: Option<String>,
    part_number: Option<String>,
}

impl ObjectQuery {
    fn reject_multipart(&self) -> Result<(), S3Error> {
        if self.upload_id.is_some() || self.part_number.is_some() {
            return Err(S3Error::NotImplemented("Multipart upload"));
        }
        Ok(())
    }
}

#[tracing::instrument(skip_all, fields(bucket = %bucket, key = %key))]
pub async fn put_object(
    State(state): State<ServiceState>,
    Path((bucket, key)): Path<(String, String)>,
    Query(query): Query<ObjectQuery>,
    headers: HeaderMap,
    signer: Option<Extension<ChunkSigner>>,
    body: Body,
) -> Result<Response, S3Error> {
    check_bucket(&state, &bucket)?;
    query.reject_multipart()?;
    if headers.contains_key(COPY_SOURCE_HEADER) {
        return Err(S3Error::NotImplemented("CopyObject"));
    }
    let key = ObjectKey::parse(&key)?;

    let signer = signer.map(|Extension(signer)| signer);
    let data = payload::read(body, &headers, signer, state.config().max_object_size).await?;
    let meta = state.vault().put(&key, data).await?;

    let generation = state.tracker().mark_dirty();
    tracing::debug!(size = meta.size, generation, "object stored");

    let mut response = StatusCode::OK.into_response();
    response.headers_mut().insert(ETAG, header_value(&meta.etag())?);
    Ok(response)
}

#[tracing::instrument(skip_all, fields(bucket = %bucket, key = %key))]
pub async fn get_object(
    State(state): State<ServiceState>,
    Path((bucket, key)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response, S3Error> {
    check_bucket(&state, &bucket)?;
    let key = ObjectKey::parse(&key)?;

    let (meta, data) = state.vault().get(&key).await?;
    check_preconditions(&headers, &meta)?;

    let size = data.len() as u64;
    let requested = match headers.get(RANGE).and_then(|value| value.to_str().ok()) {
        Some(value) => range::resolve(value, size)?,
        None => None,
    };

    let mut response_headers = object_headers(&meta)?;
    let (status, body) = match requested {
        Some(range) => {
            response_headers.insert(
                CONTENT_RANGE,
                header_value(&range::content_range(&range, size))?,
            );
            let slice = data.slice(range.start as usize..range.end as usize);
            (StatusCode::PARTIAL_CONTENT, slice)
        }
        None => (StatusCode::OK, data),
    };
    Ok((status, response_headers, body).into_response())
}

#[tracing::instrument(skip_all, fields(bucket = %bucket, key = %key))]
pub async fn head_object(
    State(state): State<ServiceState>,
    Path((bucket, key)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response, S3Error> {
    check_bucket(&state, &bucket)?;
    let key = ObjectKey::parse(&key)?;

    let meta = state.vault().head(&key).await?;
    check_preconditions(&headers, &meta)?;

    let mut response_headers = object_headers(&meta)?;
    response_headers.insert(CONTENT_LENGTH, HeaderValue::from(meta.size));
    Ok((StatusCode::OK, response_headers).into_response())
}

/// Idempotent: deleting a missing key succeeds.
#[tracing::instrument(skip_all, fields(bucket = %bucket, key = %key))]
pub async fn delete_object(
    State(state): State<ServiceState>,
    Path((bucket, key)): Path<(String, String)>,
    Query(query): Query<ObjectQuery>,
) -> Result<Response, S3Error> {
    check_bucket(&state, &bucket)?;
    query.reject_multipart()?;
    let key = ObjectKey::parse(&key)?;

    if state.vault().delete(&key).await? {
        let generation = state.tracker().mark_dirty();
        tracing::debug!(generation, "object deleted");
    }
    Ok(StatusCode::NO_CONTENT.into_response())
}

fn object_headers(meta: &ObjectMeta) -> Result<HeaderMap, S3Error> {
    let content_type = mime_guess::from_path(meta.key.as_str()).first_or_octet_stream();

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, header_value(content_type.as_ref())?);
    headers.insert(ETAG, header_value(&meta.etag())?);
    headers.insert(LAST_MODIFIED, header_value(&http_date(meta))?);
    headers.insert(ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    Ok(headers)
}

/// `If-Match` and `If-None-Match` against the current entity tag.
fn check_preconditions(headers: &HeaderMap, meta: &ObjectMeta) -> Result<(), S3Error> {
    let etag = meta.etag();
    let matches = |value: &HeaderValue| {
        value.to_str().is_ok_and(|value| {
            value.split(',').map(str::trim).any(|candidate| {
                candidate == "*" || candidate.trim_start_matches("W/") == etag
            })
        })
    };

    if let Some(value) = headers.get(IF_MATCH) {
        if !matches(value) {
            return Err(S3Error::PreconditionFailed);
        }
    }
    if let Some(value) = headers.get(IF_NONE_MATCH) {
        if matches(value) {
            return Err(S3Error::NotModified);
        }
    }
    Ok(())
}

fn http_date(meta: &ObjectMeta) -> String {
    meta.last_modified
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

fn header_value(value: &str) -> Result<HeaderValue, S3Error> {
    HeaderValue::from_str(value)
        .map_err(|_| S3Error::Internal(format!("invalid header value {value:?}")))
}
