use url::Url;

use gits3_daemon::http_server::client::{ApiClient, ApiError};

/// Shared inputs for every command.
#[derive(Debug, Clone)]
pub struct OpContext {
    pub client: ApiClient,
}

impl OpContext {
    pub fn new(remote: &Url) -> Result<Self, ApiError> {
        Ok(Self {
            client: ApiClient::new(remote)?,
        })
    }
}

/// One CLI command.
#[async_trait::async_trait]
pub trait Op: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;
    type Output: std::fmt::Display + std::fmt::Debug;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error>;
}

/// Build a clap `Command` enum from `(Variant, Type)` pairs, plus matching
/// `OpOutput`/`OpError` enums and a dispatching `execute`.
#[macro_export]
macro_rules! command_enum {
    ($(($variant:ident, $ty:ty)),* $(,)?) => {
        #[derive(clap::Subcommand, Debug, Clone)]
        pub enum Command {
            $($variant($ty),)*
        }

        #[derive(Debug)]
        pub enum OpOutput {
            $($variant(<$ty as $crate::cli::op::Op>::Output),)*
        }

        impl std::fmt::Display for OpOutput {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(OpOutput::$variant(output) => write!(f, "{output}"),)*
                }
            }
        }

        #[derive(Debug, thiserror::Error)]
        pub enum OpError {
            $(
                #[error(transparent)]
                $variant(<$ty as $crate::cli::op::Op>::Error),
            )*
        }

        impl Command {
            pub async fn execute(
                &self,
                ctx: &$crate::cli::op::OpContext,
            ) -> Result<OpOutput, OpError> {
                match self {
                    $(
                        Command::$variant(op) => $crate::cli::op::Op::execute(op, ctx)
                            .await
                            .map(OpOutput::$variant)
                            .map_err(OpError::$variant),
                    )*
                }
            }
        }
    };
}
