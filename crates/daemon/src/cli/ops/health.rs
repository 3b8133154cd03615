use std::fmt;

use clap::Args;
use owo_colors::OwoColorize;

use gits3_daemon::http_server::client::{ApiClient, ApiError, ApiRequest};
use gits3_daemon::http_server::health::liveness::LivezRequest;
use gits3_daemon::http_server::health::readiness::ReadyzRequest;

/// Probe a running gateway's liveness and readiness endpoints.
#[derive(Args, Debug, Clone)]
pub struct Health;

#[derive(Debug)]
pub enum EndpointStatus {
    Ok,
    Unhealthy(String),
    NotReachable,
}

impl EndpointStatus {
    fn from_result<T>(result: Result<T, ApiError>) -> Self {
        match result {
            Ok(_) => Self::Ok,
            Err(ApiError::HttpStatus(status, body)) => {
                Self::Unhealthy(format!("{status} {}", body.trim()))
            }
            Err(_) => Self::NotReachable,
        }
    }

    fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl fmt::Display for EndpointStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "{}", "OK".green()),
            Self::Unhealthy(reason) => write!(f, "{} ({})", "UNHEALTHY".red(), reason),
            Self::NotReachable => write!(f, "{}", "NOT REACHABLE".red()),
        }
    }
}

#[derive(Debug)]
pub struct HealthOutput {
    pub url: String,
    pub livez: EndpointStatus,
    pub readyz: EndpointStatus,
}

impl fmt::Display for HealthOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({}):", "Gateway".bold(), self.url)?;
        writeln!(f, "  {} {}", "livez:".dimmed(), self.livez)?;
        write!(f, "  {} {}", "readyz:".dimmed(), self.readyz)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HealthError {
    #[error("gateway at {url} is not live: {status}")]
    NotLive { url: String, status: String },
}

async fn probe<T: ApiRequest>(client: &ApiClient, request: T) -> EndpointStatus {
    EndpointStatus::from_result(client.call(request).await)
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Health {
    type Error = HealthError;
    type Output = HealthOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let livez = probe(&ctx.client, LivezRequest {}).await;
        let readyz = probe(&ctx.client, ReadyzRequest {}).await;

        let url = ctx.client.base_url().to_string();
        if !livez.is_ok() {
            return Err(HealthError::NotLive {
                url,
                status: livez.to_string(),
            });
        }
        Ok(HealthOutput { url, livez, readyz })
    }
}
