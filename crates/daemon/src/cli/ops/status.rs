use std::fmt;

use chrono::{DateTime, Utc};
use clap::Args;
use owo_colors::OwoColorize;

use common::sync::{SyncState, SyncStatus};
use gits3_daemon::http_server::client::ApiError;
use gits3_daemon::http_server::health::sync::SyncStatusRequest;

/// Show the sync engine state of a running gateway.
#[derive(Args, Debug, Clone)]
pub struct Status {
    /// Print the raw JSON document
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug)]
pub struct StatusOutput {
    pub status: SyncStatus,
    pub json: bool,
}

fn when(at: Option<DateTime<Utc>>) -> String {
    at.map(|at| at.to_rfc3339())
        .unwrap_or_else(|| "never".to_string())
}

fn short(oid: &Option<String>) -> String {
    oid.as_deref()
        .map(|oid| oid.chars().take(10).collect())
        .unwrap_or_else(|| "-".to_string())
}

impl fmt::Display for StatusOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = &self.status;
        if self.json {
            let json = serde_json::to_string_pretty(s).map_err(|_| fmt::Error)?;
            return write!(f, "{json}");
        }

        let state = match s.state {
            SyncState::Clean => "clean".green().to_string(),
            SyncState::Dirty => "dirty".yellow().to_string(),
            SyncState::Syncing => "syncing".cyan().to_string(),
            SyncState::Pulling => "pulling".cyan().to_string(),
        };
        writeln!(f, "{} {}", "Sync:".bold(), state)?;
        writeln!(f, "  {} {}", "policy:".dimmed(), s.policy)?;
        writeln!(
            f,
            "  {} {}",
            "remote:".dimmed(),
            if s.remote_configured { "configured" } else { "none" }
        )?;
        writeln!(
            f,
            "  {} {} / {} / {}",
            "generation (seen/committed/synced):".dimmed(),
            s.generation,
            s.committed_generation,
            s.synced_generation
        )?;
        writeln!(
            f,
            "  {} {} {} {}",
            "head:".dimmed(),
            short(&s.local_head),
            "remote:".dimmed(),
            short(&s.remote_ref)
        )?;
        writeln!(
            f,
            "  {} commits={} pushes={} pulls={} conflicts={} failures={}",
            "counters:".dimmed(),
            s.commits,
            s.pushes,
            s.pulls,
            s.conflicts,
            s.failures
        )?;
        writeln!(f, "  {} {}", "last sync:".dimmed(), when(s.last_sync_at))?;
        write!(f, "  {} {}", "last pull:".dimmed(), when(s.last_pull_at))?;
        if let Some(error) = &s.last_error {
            write!(
                f,
                "\n  {} {} ({})",
                "last error:".red(),
                error,
                when(s.last_error_at)
            )?;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Status {
    type Error = ApiError;
    type Output = StatusOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let status = ctx.client.call(SyncStatusRequest {}).await?;
        Ok(StatusOutput {
            status,
            json: self.json,
        })
    }
}
