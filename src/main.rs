use anyhow::{Context, Result};
use clap::Parser;
use tracing::Instrument;

use medtwin::{
    cli::{self, Cli, CommandOutput},
    config::Config,
    logging::{InvocationScope, init_tracing},
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config =
        Config::load_or_default(cli.config.as_deref()).with_context(|| match &cli.config {
            Some(path) => format!("failed to load config from {}", path.display()),
            None => "failed to load config".to_string(),
        })?;
    config.apply_env_overrides();

    let scope = InvocationScope::new(cli.command.name(), &config);
    let logging = init_tracing(&config.logging, scope)?;

    let output = cli::execute(cli, &config)
        .instrument(logging.command_span())
        .await?;
    match output {
        CommandOutput::Json(body) => println!(
            "{}",
            serde_json::to_string_pretty(&body).context("failed to render output")?
        ),
        CommandOutput::Text(text) => println!("{text}"),
    }
    Ok(())
}
