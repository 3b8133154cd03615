use std::fmt;

use clap::Args;

use common::version::BuildInfo;
use gits3_daemon::build_info;
use gits3_daemon::http_server::client::ApiError;
use gits3_daemon::http_server::health::version::VersionRequest;

/// Print build information, and the gateway's with `--remote-check`.
#[derive(Args, Debug, Clone)]
pub struct Version {
    /// Also ask the gateway at --remote for its version
    #[arg(long)]
    pub remote_check: bool,
}

#[derive(Debug)]
pub struct VersionOutput {
    pub local: BuildInfo,
    pub remote: Option<BuildInfo>,
}

fn write_info(f: &mut fmt::Formatter<'_>, label: &str, info: &BuildInfo) -> fmt::Result {
    write!(
        f,
        "{label} {} (built {}, features: {})",
        info.version, info.build_timestamp, info.build_features
    )
}

impl fmt::Display for VersionOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_info(f, "gits3", &self.local)?;
        if let Some(remote) = &self.remote {
            writeln!(f)?;
            write_info(f, "gateway", remote)?;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Version {
    type Error = ApiError;
    type Output = VersionOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let remote = if self.remote_check {
            Some(ctx.client.call(VersionRequest {}).await?)
        } else {
            None
        };
        Ok(VersionOutput {
            local: build_info(),
            remote,
        })
    }
}
