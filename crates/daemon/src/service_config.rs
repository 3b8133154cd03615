use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, ValueEnum};

use common::repo::GitConfig;
use common::sync::{ConflictPolicy, LocalFirst, RemoteWins};

pub const DEFAULT_MAX_OBJECT_SIZE: usize = 256 * 1024 * 1024;

/// Flags for `gits3 serve`. Every flag falls back to an environment variable
/// so the gateway can be configured entirely from a container spec.
#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Vault directory (the git working copy served as the bucket)
    #[arg(long = "dir", env = "VAULT_DIR", default_value = "/vault")]
    pub dir: PathBuf,

    /// Name of the single bucket exposed over S3
    #[arg(long, env = "BUCKET", default_value = "vault")]
    pub bucket: String,

    /// Listen address
    #[arg(long, env = "ADDR", default_value = "0.0.0.0:80")]
    pub addr: SocketAddr,

    /// Access key clients sign with. Empty disables authentication
    #[arg(long, env = "ACCESS_KEY", default_value = "")]
    pub access_key: String,

    #[arg(long, env = "SECRET_KEY", default_value = "", hide_env_values = true)]
    pub secret_key: String,

    /// Region clients sign for
    #[arg(long, env = "REGION", default_value = "us-east-1")]
    pub region: String,

    /// Remote repository to replicate to. Without one, commits stay local
    #[arg(long, env = "GIT_REPO")]
    pub git_repo: Option<String>,

    #[arg(long, env = "GIT_BRANCH", default_value = "main")]
    pub git_branch: String,

    /// Commit author name
    #[arg(long, env = "GIT_USER", default_value = "git3")]
    pub git_user: String,

    /// Commit author email
    #[arg(long, env = "GIT_EMAIL", default_value = "git3@sync")]
    pub git_email: String,

    /// Token for authenticated https remotes
    #[arg(long, env = "GIT_TOKEN", hide_env_values = true)]
    pub git_token: Option<String>,

    /// Seconds without writes before changes are committed and pushed
    #[arg(long, env = "DEBOUNCE", default_value_t = 10)]
    pub debounce: u64,

    /// Seconds between pulls from the remote, 0 disables pulling
    #[arg(long, env = "PULL_INTERVAL", default_value_t = 60)]
    pub pull_interval: u64,

    /// Seconds a single push or fetch may take
    #[arg(long, env = "GIT_TIMEOUT", default_value_t = 60)]
    pub git_timeout: u64,

    /// Seconds allowed for the final commit and push on shutdown
    #[arg(long, env = "SHUTDOWN_GRACE", default_value_t = 30)]
    pub shutdown_grace: u64,

    /// What to do when local and remote history diverge
    #[arg(long, env = "CONFLICT_POLICY", value_enum, default_value_t = ConflictPolicyKind::LocalFirst)]
    pub conflict_policy: ConflictPolicyKind,

    /// Largest accepted object body, in bytes
    #[arg(long, env = "MAX_OBJECT_SIZE", default_value_t = DEFAULT_MAX_OBJECT_SIZE)]
    pub max_object_size: usize,

    /// Log level used when RUST_LOG is not set
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: tracing::Level,
}

#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConflictPolicyKind {
    /// Publish local work first, skip the pull if that is impossible
    #[default]
    LocalFirst,
    /// Replace unpublished local work with the remote head
    RemoteWins,
}

impl ConflictPolicyKind {
    pub fn policy(self) -> Arc<dyn ConflictPolicy> {
        match self {
            Self::LocalFirst => Arc::new(LocalFirst),
            Self::RemoteWins => Arc::new(RemoteWins),
        }
    }
}

#[derive(Clone)]
pub struct Credentials {
    pub access_key: String,
    pub secret_key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// Validated service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub vault_dir: PathBuf,
    pub bucket: String,
    pub listen_addr: SocketAddr,
    /// `None` when authentication is disabled.
    pub credentials: Option<Credentials>,
    pub region: String,
    pub git: GitConfig,
    pub debounce: Duration,
    /// Zero disables the puller.
    pub pull_interval: Duration,
    pub git_timeout: Duration,
    pub shutdown_grace: Duration,
    pub conflict_policy: ConflictPolicyKind,
    pub max_object_size: usize,
    pub log_level: tracing::Level,
}

impl Config {
    /// Defaults for a vault at `vault_dir` with no remote, no
    /// authentication and an ephemeral local port.
    pub fn new(vault_dir: impl Into<PathBuf>) -> Self {
        Self {
            vault_dir: vault_dir.into(),
            bucket: "vault".to_string(),
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            credentials: None,
            region: "us-east-1".to_string(),
            git: GitConfig::default(),
            debounce: Duration::from_secs(10),
            pull_interval: Duration::from_secs(60),
            git_timeout: common::sync::DEFAULT_GIT_TIMEOUT,
            shutdown_grace: Duration::from_secs(30),
            conflict_policy: ConflictPolicyKind::default(),
            max_object_size: DEFAULT_MAX_OBJECT_SIZE,
            log_level: tracing::Level::INFO,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_bucket_name(&self.bucket)?;
        if self.region.is_empty() {
            return Err(ConfigError::EmptyRegion);
        }
        if self.git.branch.is_empty() {
            return Err(ConfigError::EmptyBranch);
        }
        if self.max_object_size == 0 {
            return Err(ConfigError::ZeroObjectSize);
        }
        Ok(())
    }
}

impl TryFrom<ServeArgs> for Config {
    type Error = ConfigError;

    fn try_from(args: ServeArgs) -> Result<Self, Self::Error> {
        let credentials = match (args.access_key.is_empty(), args.secret_key.is_empty()) {
            (true, _) => None,
            (false, true) => return Err(ConfigError::MissingSecretKey),
            (false, false) => Some(Credentials {
                access_key: args.access_key,
                secret_key: args.secret_key,
            }),
        };

        let config = Self {
            vault_dir: args.dir,
            bucket: args.bucket,
            listen_addr: args.addr,
            credentials,
            region: args.region,
            git: GitConfig {
                remote_url: args.git_repo.filter(|url| !url.is_empty()),
                branch: args.git_branch,
                author_name: args.git_user,
                author_email: args.git_email,
                token: args.git_token.filter(|token| !token.is_empty()),
            },
            debounce: Duration::from_secs(args.debounce),
            pull_interval: Duration::from_secs(args.pull_interval),
            git_timeout: Duration::from_secs(args.git_timeout),
            shutdown_grace: Duration::from_secs(args.shutdown_grace),
            conflict_policy: args.conflict_policy,
            max_object_size: args.max_object_size,
            log_level: args.log_level,
        };
        config.validate()?;
        Ok(config)
    }
}

fn validate_bucket_name(name: &str) -> Result<(), ConfigError> {
    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.');
    if !(3..=63).contains(&name.len()) || !valid_chars {
        return Err(ConfigError::InvalidBucket(name.to_string()));
    }
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("a secret key is required when an access key is set")]
    MissingSecretKey,
    #[error("invalid bucket name {0:?}: use 3-63 lowercase letters, digits, '-' or '.'")]
    InvalidBucket(String),
    #[error("region must not be empty")]
    EmptyRegion,
    #[error("git branch must not be empty")]
    EmptyBranch,
    #[error("max object size must be positive")]
    ZeroObjectSize,
}
