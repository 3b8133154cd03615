use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::http_server::client::ApiRequest;
use crate::ServiceState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadyzRequest {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadyzResponse {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ApiRequest for ReadyzRequest {
    type Response = ReadyzResponse;
    const PATH: &'static str = "/_status/readyz";
}

/// Ready while the vault directory is present. Sync failures do not make the
/// gateway unready: objects stay readable and writable locally.
#[tracing::instrument(skip(state))]
pub async fn handler(State(state): State<ServiceState>) -> Response {
    let root = state.vault().root().to_path_buf();
    match tokio::fs::metadata(&root).await {
        Ok(metadata) if metadata.is_dir() => (
            StatusCode::OK,
            Json(ReadyzResponse {
                status: "ok".to_string(),
                reason: None,
            }),
        )
            .into_response(),
        _ => {
            tracing::warn!(root = %root.display(), "vault directory missing");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ReadyzResponse {
                    status: "unavailable".to_string(),
                    reason: Some("vault directory missing".to_string()),
                }),
            )
                .into_response()
        }
    }
}
