//! Path-style S3 API over the vault.
//!
//! A single bucket (the configured one) maps onto the vault root; object keys
//! map onto relative paths below it. Every successful write or delete marks
//! the sync tracker dirty after the vault reports the change durable.

use axum::middleware;
use axum::routing::get;
use axum::Router;

use crate::ServiceState;

pub mod auth;
mod bucket;
pub mod chunked;
pub mod error;
mod object;
mod payload;
pub mod range;
pub mod xml;

pub use error::S3Error;

pub const REQUEST_ID_HEADER: &str = "x-amz-request-id";
pub const BUCKET_REGION_HEADER: &str = "x-amz-bucket-region";

pub fn router(state: ServiceState) -> Router {
    Router::new()
        .route("/", get(bucket::list_buckets))
        .route(
            "/:bucket",
            get(bucket::get_bucket)
                .head(bucket::head_bucket)
                .put(bucket::create_bucket)
                .post(bucket::post_bucket),
        )
        .route(
            "/:bucket/",
            get(bucket::get_bucket)
                .head(bucket::head_bucket)
                .put(bucket::create_bucket)
                .post(bucket::post_bucket),
        )
        .route(
            "/:bucket/*key",
            get(object::get_object)
                .head(object::head_object)
                .put(object::put_object)
                .delete(object::delete_object),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::authenticate,
        ))
        .with_state(state)
}

/// Only the configured bucket exists.
fn check_bucket(state: &ServiceState, bucket: &str) -> Result<(), S3Error> {
    if bucket == state.config().bucket {
        Ok(())
    } else {
        Err(S3Error::NoSuchBucket(bucket.to_string()))
    }
}
