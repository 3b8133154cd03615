mod cli;

use clap::Parser;

use cli::{Cli, OpContext};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let ctx = OpContext::new(&cli.remote)?;

    let output = cli.command.execute(&ctx).await?;
    println!("{output}");
    Ok(())
}
