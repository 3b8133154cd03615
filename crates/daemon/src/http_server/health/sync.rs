use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use common::sync::SyncStatus;

use crate::http_server::client::ApiRequest;
use crate::ServiceState;

/// Request type for the sync status endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncStatusRequest {}

impl ApiRequest for SyncStatusRequest {
    type Response = SyncStatus;
    const PATH: &'static str = "/_status/sync";
}

#[tracing::instrument(skip(state))]
pub async fn handler(State(state): State<ServiceState>) -> Response {
    (StatusCode::OK, Json(state.coordinator().status())).into_response()
}
