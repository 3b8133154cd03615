use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::http_server::client::ApiRequest;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivezRequest {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LivezResponse {
    pub status: String,
}

impl ApiRequest for LivezRequest {
    type Response = LivezResponse;
    const PATH: &'static str = "/_status/livez";
}

/// Answers as long as the process serves HTTP, independent of the vault and
/// the remote. Restart decisions belong here; degraded service is reported
/// by [`super::readiness::handler`] and `/_status/sync`.
pub async fn handler() -> (StatusCode, Json<LivezResponse>) {
    (
        StatusCode::OK,
        Json(LivezResponse {
            status: "ok".to_string(),
        }),
    )
}
