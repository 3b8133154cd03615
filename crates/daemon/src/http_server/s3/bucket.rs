use std::collections::HashMap;

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::Extension;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use http::header::LOCATION;
use http::{HeaderMap, HeaderValue, StatusCode};

use object_store::{ListPage, ListQuery, ObjectKey, DEFAULT_MAX_KEYS};

use super::auth::ChunkSigner;
use super::error::S3Error;
use super::xml::{
    self, encode_if, DeleteError, DeleteRequest, DeleteResultDocument, ListBucketsDocument,
    ListObjectsDocument, ListObjectsV2Document, LocationDocument, ObjectEntry,
};
use super::{check_bucket, payload, BUCKET_REGION_HEADER};
use crate::ServiceState;

const OWNER: &str = "gits3";
/// Region S3 reports as an empty location constraint.
const DEFAULT_REGION: &str = "us-east-1";
/// `DeleteObjects` bodies: 1000 keys of up to 1024 bytes plus markup.
const MAX_DELETE_BODY: usize = 2 * 1024 * 1024;

type Params = HashMap<String, String>;

#[tracing::instrument(skip_all)]
pub async fn list_buckets(State(state): State<ServiceState>) -> Result<Response, S3Error> {
    let metadata = tokio::fs::metadata(state.vault().root())
        .await
        .map_err(|e| S3Error::Internal(format!("vault root: {e}")))?;
    let created = metadata.created().or_else(|_| metadata.modified());
    let created = created
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now());

    xml::render(
        StatusCode::OK,
        &ListBucketsDocument {
            owner: OWNER,
            bucket: &state.config().bucket,
            created: xml::iso8601(&created),
        },
    )
}

#[tracing::instrument(skip_all, fields(bucket = %bucket))]
pub async fn head_bucket(
    State(state): State<ServiceState>,
    Path(bucket): Path<String>,
) -> Result<Response, S3Error> {
    check_bucket(&state, &bucket)?;
    let mut response = StatusCode::OK.into_response();
    if let Ok(region) = HeaderValue::from_str(&state.config().region) {
        response.headers_mut().insert(BUCKET_REGION_HEADER, region);
    }
    Ok(response)
}

/// Creating the served bucket succeeds (it always exists); no other bucket
/// can be created.
#[tracing::instrument(skip_all, fields(bucket = %bucket))]
pub async fn create_bucket(
    State(state): State<ServiceState>,
    Path(bucket): Path<String>,
) -> Result<Response, S3Error> {
    if bucket != state.config().bucket {
        return Err(S3Error::AccessDenied(format!(
            "this gateway only serves bucket '{}'",
            state.config().bucket
        )));
    }
    let location = HeaderValue::from_str(&format!("/{bucket}"))
        .map_err(|_| S3Error::InvalidArgument("invalid bucket name".to_string()))?;
    Ok((StatusCode::OK, [(LOCATION, location)]).into_response())
}

#[tracing::instrument(skip_all, fields(bucket = %bucket))]
pub async fn get_bucket(
    State(state): State<ServiceState>,
    Path(bucket): Path<String>,
    Query(params): Query<Params>,
) -> Result<Response, S3Error> {
    check_bucket(&state, &bucket)?;

    if params.contains_key("location") {
        let location = match state.config().region.as_str() {
            DEFAULT_REGION => "",
            region => region,
        };
        return xml::render(StatusCode::OK, &LocationDocument { location });
    }
    for unsupported in ["uploads", "versions", "versioning", "policy", "acl", "lifecycle"] {
        if params.contains_key(unsupported) {
            return Err(S3Error::NotImplemented("Bucket sub-resource"));
        }
    }

    match params.get("list-type").map(String::as_str) {
        Some("2") => list_objects_v2(&state, &params).await,
        None => list_objects_v1(&state, &params).await,
        Some(other) => Err(S3Error::InvalidArgument(format!("unknown list-type {other}"))),
    }
}

#[tracing::instrument(skip_all, fields(bucket = %bucket))]
pub async fn post_bucket(
    State(state): State<ServiceState>,
    Path(bucket): Path<String>,
    Query(params): Query<Params>,
    headers: HeaderMap,
    signer: Option<Extension<ChunkSigner>>,
    body: Body,
) -> Result<Response, S3Error> {
    check_bucket(&state, &bucket)?;
    if !params.contains_key("delete") {
        return Err(S3Error::NotImplemented("POST on a bucket"));
    }

    let signer = signer.map(|Extension(signer)| signer);
    let body = payload::read(body, &headers, signer, MAX_DELETE_BODY).await?;
    let body = std::str::from_utf8(&body).map_err(|_| S3Error::MalformedXml)?;
    let request = DeleteRequest::parse(body)?;

    let mut deleted = Vec::new();
    let mut errors = Vec::new();
    for raw_key in request.keys {
        let result = match ObjectKey::parse(&raw_key) {
            Ok(key) => state.vault().delete(&key).await.map_err(S3Error::from),
            Err(e) => Err(S3Error::from(e)),
        };
        match result {
            Ok(removed) => {
                if removed {
                    state.tracker().mark_dirty();
                }
                deleted.push(raw_key);
            }
            Err(e) => errors.push(DeleteError {
                code: e.code(),
                message: e.to_string(),
                key: raw_key,
            }),
        }
    }
    tracing::debug!(deleted = deleted.len(), failed = errors.len(), "batch delete");

    if request.quiet {
        deleted.clear();
    }
    xml::render(StatusCode::OK, &DeleteResultDocument { deleted, errors })
}

struct ListParams {
    prefix: String,
    delimiter: Option<String>,
    max_keys: usize,
    url_encoded: bool,
}

impl ListParams {
    fn from_params(params: &Params) -> Result<Self, S3Error> {
        let max_keys = match params.get("max-keys") {
            Some(value) => value
                .parse::<usize>()
                .map_err(|_| S3Error::InvalidArgument(format!("invalid max-keys {value:?}")))?
                .min(DEFAULT_MAX_KEYS),
            None => DEFAULT_MAX_KEYS,
        };
        let url_encoded = match params.get("encoding-type").map(String::as_str) {
            None => false,
            Some("url") => true,
            Some(other) => {
                return Err(S3Error::InvalidArgument(format!(
                    "invalid encoding-type {other:?}"
                )))
            }
        };
        Ok(Self {
            prefix: params.get("prefix").cloned().unwrap_or_default(),
            delimiter: params.get("delimiter").filter(|d| !d.is_empty()).cloned(),
            max_keys,
            url_encoded,
        })
    }

    fn query(&self, start_after: Option<String>) -> ListQuery {
        ListQuery {
            prefix: self.prefix.clone(),
            delimiter: self.delimiter.clone(),
            start_after,
            max_keys: self.max_keys,
        }
    }

    fn encode(&self, value: &str) -> String {
        encode_if(value, self.url_encoded)
    }

    fn entries(&self, page: &ListPage) -> (Vec<ObjectEntry>, Vec<String>) {
        let contents = page
            .objects
            .iter()
            .map(|meta| ObjectEntry::new(meta, self.url_encoded))
            .collect();
        let prefixes = page
            .common_prefixes
            .iter()
            .map(|prefix| self.encode(prefix))
            .collect();
        (contents, prefixes)
    }
}

async fn list_objects_v1(state: &ServiceState, params: &Params) -> Result<Response, S3Error> {
    let list = ListParams::from_params(params)?;
    let marker = params.get("marker").cloned().filter(|m| !m.is_empty());
    let page = state.vault().list(list.query(marker.clone())).await?;
    let (contents, common_prefixes) = list.entries(&page);

    xml::render(
        StatusCode::OK,
        &ListObjectsDocument {
            bucket: &state.config().bucket,
            prefix: list.encode(&list.prefix),
            marker: list.encode(marker.as_deref().unwrap_or_default()),
            next_marker: page.next_marker.as_deref().map(|m| list.encode(m)),
            max_keys: list.max_keys,
            delimiter: list.delimiter.as_deref().map(|d| list.encode(d)),
            url_encoded: list.url_encoded,
            is_truncated: page.is_truncated,
            contents,
            common_prefixes,
        },
    )
}

async fn list_objects_v2(state: &ServiceState, params: &Params) -> Result<Response, S3Error> {
    let list = ListParams::from_params(params)?;
    let continuation_token = params.get("continuation-token").cloned();
    let start_after = params.get("start-after").cloned().filter(|s| !s.is_empty());

    let resume_from = match &continuation_token {
        Some(token) => Some(decode_token(token)?),
        None => start_after.clone(),
    };
    let page = state.vault().list(list.query(resume_from)).await?;
    let (contents, common_prefixes) = list.entries(&page);

    xml::render(
        StatusCode::OK,
        &ListObjectsV2Document {
            bucket: &state.config().bucket,
            prefix: list.encode(&list.prefix),
            key_count: contents.len() + common_prefixes.len(),
            max_keys: list.max_keys,
            delimiter: list.delimiter.as_deref().map(|d| list.encode(d)),
            url_encoded: list.url_encoded,
            is_truncated: page.is_truncated,
            continuation_token,
            next_continuation_token: page.next_marker.as_deref().map(encode_token),
            start_after: start_after.as_deref().map(|s| list.encode(s)),
            contents,
            common_prefixes,
        },
    )
}

/// Continuation tokens are the last returned key, opaque to clients.
fn encode_token(marker: &str) -> String {
    URL_SAFE_NO_PAD.encode(marker)
}

fn decode_token(token: &str) -> Result<String, S3Error> {
    let invalid = || S3Error::InvalidArgument("The continuation token provided is incorrect".to_string());
    let bytes = URL_SAFE_NO_PAD.decode(token).map_err(|_| invalid())?;
    String::from_utf8(bytes).map_err(|_| invalid())
}
