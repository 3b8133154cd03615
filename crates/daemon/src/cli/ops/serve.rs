use std::fmt;

use clap::Args;
use owo_colors::OwoColorize;
use tracing_subscriber::EnvFilter;

use gits3_daemon::service_config::{ConfigError, ServeArgs};
use gits3_daemon::{spawn_service, ServiceConfig, ServiceError};

/// Run the gateway in the foreground until ctrl-c or SIGTERM.
#[derive(Args, Debug, Clone)]
pub struct Serve {
    #[command(flatten)]
    pub args: ServeArgs,
}

#[derive(Debug)]
pub struct ServeOutput {
    pub bucket: String,
}

impl fmt::Display for ServeOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} bucket {}", "Stopped".bold(), self.bucket)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Service(#[from] ServiceError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Serve {
    type Error = ServeError;
    type Output = ServeOutput;

    async fn execute(&self, _ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let config = ServiceConfig::try_from(self.args.clone())?;
        init_tracing(config.log_level);

        tracing::info!(
            vault = %config.vault_dir.display(),
            bucket = %config.bucket,
            remote = config.git.remote_url.as_deref().unwrap_or("none"),
            auth = config.credentials.is_some(),
            "starting gateway"
        );
        spawn_service(&config).await?;

        Ok(ServeOutput {
            bucket: config.bucket,
        })
    }
}

/// `RUST_LOG` wins over `--log-level` when set.
fn init_tracing(level: tracing::Level) {
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
