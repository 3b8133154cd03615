use axum::response::{IntoResponse, Response};
use http::header::CONTENT_TYPE;
use http::{HeaderValue, StatusCode};

use object_store::StoreError;

use super::xml::ErrorDocument;
use super::REQUEST_ID_HEADER;

/// Errors surfaced to S3 clients as XML error documents.
#[derive(Debug, thiserror::Error)]
pub enum S3Error {
    #[error("The specified bucket does not exist: {0}")]
    NoSuchBucket(String),
    #[error("The specified key does not exist: {0}")]
    NoSuchKey(String),
    #[error("{0}")]
    InvalidKey(String),
    #[error("{0}")]
    InvalidArgument(String),
    #[error("{0}")]
    AccessDenied(String),
    #[error("The AWS access key id you provided does not exist in our records")]
    InvalidAccessKeyId,
    #[error("{0}")]
    AuthorizationHeaderMalformed(String),
    #[error("The request signature we calculated does not match the signature you provided")]
    SignatureDoesNotMatch,
    #[error("The difference between the request time and the server's time is too large")]
    RequestTimeTooSkewed,
    #[error("The requested range is not satisfiable for an object of {size} bytes")]
    InvalidRange { size: u64 },
    #[error("Your proposed upload exceeds the maximum allowed object size of {max} bytes")]
    EntityTooLarge { max: usize },
    #[error("The provided 'x-amz-content-sha256' header does not match what was computed")]
    ContentSha256Mismatch,
    #[error("The Content-MD5 you specified did not match what we received")]
    BadDigest,
    #[error("The Content-MD5 you specified is not valid")]
    InvalidDigest,
    #[error("{0}")]
    IncompleteBody(String),
    #[error("The XML you provided was not well-formed or did not validate against our published schema")]
    MalformedXml,
    #[error("At least one of the preconditions you specified did not hold")]
    PreconditionFailed,
    #[error("Not modified")]
    NotModified,
    #[error("{0} is not supported by this gateway")]
    NotImplemented(&'static str),
    #[error("We encountered an internal error, please try again: {0}")]
    Internal(String),
}

impl S3Error {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoSuchBucket(_) => "NoSuchBucket",
            Self::NoSuchKey(_) => "NoSuchKey",
            Self::InvalidKey(_) => "InvalidKey",
            Self::InvalidArgument(_) => "InvalidArgument",
            Self::AccessDenied(_) => "AccessDenied",
            Self::InvalidAccessKeyId => "InvalidAccessKeyId",
            Self::AuthorizationHeaderMalformed(_) => "AuthorizationHeaderMalformed",
            Self::SignatureDoesNotMatch => "SignatureDoesNotMatch",
            Self::RequestTimeTooSkewed => "RequestTimeTooSkewed",
            Self::InvalidRange { .. } => "InvalidRange",
            Self::EntityTooLarge { .. } => "EntityTooLarge",
            Self::ContentSha256Mismatch => "XAmzContentSHA256Mismatch",
            Self::BadDigest => "BadDigest",
            Self::InvalidDigest => "InvalidDigest",
            Self::IncompleteBody(_) => "IncompleteBody",
            Self::MalformedXml => "MalformedXML",
            Self::PreconditionFailed => "PreconditionFailed",
            Self::NotModified => "NotModified",
            Self::NotImplemented(_) => "NotImplemented",
            Self::Internal(_) => "InternalError",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::NoSuchBucket(_) | Self::NoSuchKey(_) => StatusCode::NOT_FOUND,
            Self::AccessDenied(_)
            | Self::InvalidAccessKeyId
            | Self::SignatureDoesNotMatch
            | Self::RequestTimeTooSkewed => StatusCode::FORBIDDEN,
            Self::InvalidRange { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            Self::PreconditionFailed => StatusCode::PRECONDITION_FAILED,
            Self::NotModified => StatusCode::NOT_MODIFIED,
            Self::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl From<StoreError> for S3Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(key) => Self::NoSuchKey(key),
            StoreError::InvalidKey { .. } => Self::InvalidKey(err.to_string()),
            StoreError::KeyConflict(_) => Self::InvalidArgument(err.to_string()),
            StoreError::Io(_) | StoreError::Join(_) => Self::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for S3Error {
    fn into_response(self) -> Response {
        let request_id = uuid::Uuid::new_v4().simple().to_string();
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, %request_id, "s3 request failed");
        } else {
            tracing::debug!(code = self.code(), error = %self, %request_id, "s3 request rejected");
        }

        let mut response = if status == StatusCode::NOT_MODIFIED {
            status.into_response()
        } else {
            let message = self.to_string();
            let document = ErrorDocument {
                code: self.code(),
                message: &message,
                request_id: &request_id,
            };
            match askama::Template::render(&document) {
                Ok(body) => (status, [(CONTENT_TYPE, "application/xml")], body).into_response(),
                Err(_) => status.into_response(),
            }
        };
        if let Ok(value) = HeaderValue::from_str(&request_id) {
            response.headers_mut().insert(REQUEST_ID_HEADER, value);
        }
        response
    }
}
