use clap::Parser;
use url::Url;

#[macro_use]
pub mod op;
pub mod ops;

pub use op::OpContext;
pub use ops::{Command, OpError, OpOutput};

#[derive(Parser, Debug)]
#[command(name = "gits3", version, about = "S3-compatible gateway over a git-versioned vault")]
pub struct Cli {
    /// Base URL of a running gateway, for the inspection commands
    #[arg(long, global = true, env = "GITS3_URL", default_value = "http://localhost:80")]
    pub remote: Url,

    #[command(subcommand)]
    pub command: Command,
}
