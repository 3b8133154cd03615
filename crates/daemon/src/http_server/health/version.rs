use axum::Json;
use serde::{Deserialize, Serialize};

use common::version::BuildInfo;

use crate::build_info;
use crate::http_server::client::ApiRequest;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionRequest {}

impl ApiRequest for VersionRequest {
    type Response = BuildInfo;
    const PATH: &'static str = "/_status/version";
}

pub async fn handler() -> Json<BuildInfo> {
    Json(build_info())
}
