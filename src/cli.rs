//! Command-line driver.
//!
//! `preprocess`, `synthesis` and `pipeline` call the stages, in-process against the
//! configured store or over HTTP when an API base is set. `chat` and `agent` forward free
//! text to the external model and agent services.

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Result, anyhow};
use clap::{Args, Parser, Subcommand};
use serde_json::{Map, Value, json};

use crate::{
    config::Config,
    driver::{
        AGENT_OUTPUT_FILE, CHAT_OUTPUT_FILE, ChatClient, DriverError, HttpAgentClient,
        HttpStageClient, InProcessStageClient, OpenAiCompatibleChatClient, PipelineRequest,
        StageClient, ask_agent, run_pipeline, save_text_output,
    },
    run::{generate_run_id, validate_run_id},
    stages::{PreprocessRequest, SynthesisRequest},
    storage::{BlobStore, open_blob_store},
};

const DEFAULT_CHAT_MESSAGE: &str = "Give a short introduction to synthetic medical imaging data.";

#[derive(Debug, Parser)]
#[command(name = "medtwin")]
#[command(version, about = "Medical image preprocessing and digital twin pipeline", long_about = None)]
pub struct Cli {
    /// Config file (JSONC). Defaults to ./medtwin.jsonc when present.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Base URL of deployed stages; stage calls run in-process when unset.
    #[arg(long, env = "API_BASE", global = true)]
    pub api_base: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Send a message to the chat model.
    Chat(ChatArgs),
    /// Generate a digital twin from a key or a prior run.
    Synthesis(SynthesisArgs),
    /// Denoise, normalize and/or resample an input array.
    Preprocess(PreprocessArgs),
    /// Run preprocess, then synthesis on its output.
    Pipeline(PipelineArgs),
    /// Send a message to the agent service.
    Agent(AgentArgs),
}

impl Commands {
    pub fn name(&self) -> &'static str {
        match self {
            Commands::Chat(_) => "chat",
            Commands::Synthesis(_) => "synthesis",
            Commands::Preprocess(_) => "preprocess",
            Commands::Pipeline(_) => "pipeline",
            Commands::Agent(_) => "agent",
        }
    }
}

#[derive(Debug, Args)]
pub struct ChatArgs {
    #[arg(long, default_value = DEFAULT_CHAT_MESSAGE)]
    pub message: String,
    /// Store the reply under output/<run_id>/.
    #[arg(long)]
    pub save: bool,
    #[arg(long, env = "RUN_ID")]
    pub run_id: Option<String>,
}

#[derive(Debug, Args)]
pub struct SynthesisArgs {
    /// Inherit work/<run_id>/processed.npy and write under the same run.
    #[arg(long)]
    pub run_id: Option<String>,
    #[arg(long)]
    pub source_key: Option<String>,
    #[arg(long)]
    pub input_key: Option<String>,
    /// Free-form JSON metadata; non-JSON text is kept as {"raw": <text>}.
    #[arg(long)]
    pub recipe: Option<String>,
    #[arg(long)]
    pub export_png: bool,
}

#[derive(Debug, Args)]
pub struct PreprocessArgs {
    /// Inherit work/<run_id>/digital_twin.npy and write under the same run.
    #[arg(long)]
    pub run_id: Option<String>,
    #[arg(long)]
    pub source_key: Option<String>,
    #[arg(long)]
    pub denoise: bool,
    #[arg(long)]
    pub normalize: bool,
    #[arg(long)]
    pub resample: bool,
    #[arg(long)]
    pub export_png: bool,
    #[arg(long)]
    pub export_zip: bool,
    #[arg(long)]
    pub recipe: Option<String>,
}

#[derive(Debug, Args)]
pub struct PipelineArgs {
    /// Raw .npy/.npz input of the preprocess step.
    #[arg(long)]
    pub input_key: String,
    #[arg(long)]
    pub denoise: bool,
    #[arg(long)]
    pub normalize: bool,
    #[arg(long)]
    pub resample: bool,
    #[arg(long)]
    pub export_png: bool,
    #[arg(long)]
    pub export_zip: bool,
}

#[derive(Debug, Args)]
pub struct AgentArgs {
    #[arg(long)]
    pub message: String,
    #[arg(long, env = "AGENT_ID")]
    pub agent_id: Option<String>,
    #[arg(long, env = "AGENT_ALIAS_ID")]
    pub agent_alias_id: Option<String>,
    #[arg(long)]
    pub save: bool,
    #[arg(long, env = "RUN_ID")]
    pub run_id: Option<String>,
}

/// What a command prints on success.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutput {
    Json(Value),
    Text(String),
}

pub async fn execute(cli: Cli, config: &Config) -> Result<CommandOutput> {
    let timeout = Duration::from_millis(config.driver.request_timeout_ms);
    let api_base = cli
        .api_base
        .clone()
        .or_else(|| config.driver.api_base.clone())
        .filter(|api_base| !api_base.trim().is_empty());

    match cli.command {
        Commands::Chat(args) => {
            let client = OpenAiCompatibleChatClient::from_config(&config.driver.chat, timeout)
                .map_err(into_anyhow)?;
            let reply = client.complete(&args.message).await.map_err(into_anyhow)?;
            let store = open_blob_store(&config.storage);
            finish_text(reply, args.save, args.run_id, CHAT_OUTPUT_FILE, store).await
        }
        Commands::Agent(args) => {
            let agent_id = args
                .agent_id
                .or_else(|| config.driver.agent.agent_id.clone())
                .unwrap_or_default();
            let agent_alias_id = args
                .agent_alias_id
                .or_else(|| config.driver.agent.agent_alias_id.clone())
                .unwrap_or_default();
            let client =
                HttpAgentClient::from_config(&config.driver.agent, timeout).map_err(into_anyhow)?;
            let reply = ask_agent(&client, &agent_id, &agent_alias_id, &args.message)
                .await
                .map_err(into_anyhow)?;
            let store = open_blob_store(&config.storage);
            finish_text(reply, args.save, args.run_id, AGENT_OUTPUT_FILE, store).await
        }
        Commands::Preprocess(args) => {
            let request = PreprocessRequest {
                run_id: args.run_id,
                source_key: args.source_key,
                denoise: args.denoise,
                normalize: args.normalize,
                resample: args.resample,
                export_png: args.export_png,
                export_zip: args.export_zip,
                recipe: parse_recipe(args.recipe.as_deref()),
            };
            let client = stage_client(config, api_base.as_deref(), timeout);
            let body = client.preprocess(&request).await.map_err(into_anyhow)?;
            Ok(CommandOutput::Json(body))
        }
        Commands::Synthesis(args) => {
            let request = SynthesisRequest {
                run_id: args.run_id,
                source_key: args.source_key,
                input_key: args.input_key,
                export_png: args.export_png,
                recipe: parse_recipe(args.recipe.as_deref()),
            };
            let client = stage_client(config, api_base.as_deref(), timeout);
            let body = client.synthesis(&request).await.map_err(into_anyhow)?;
            Ok(CommandOutput::Json(body))
        }
        Commands::Pipeline(args) => {
            let request = PipelineRequest {
                input_key: args.input_key,
                denoise: args.denoise,
                normalize: args.normalize,
                resample: args.resample,
                export_png: args.export_png,
                export_zip: args.export_zip,
            };
            let client = stage_client(config, api_base.as_deref(), timeout);
            let report = run_pipeline(client.as_ref(), &request)
                .await
                .map_err(into_anyhow)?;
            Ok(CommandOutput::Json(serde_json::to_value(report)?))
        }
    }
}

fn stage_client(config: &Config, api_base: Option<&str>, timeout: Duration) -> Box<dyn StageClient> {
    match api_base {
        Some(api_base) => {
            tracing::info!(target: "cli", api_base = %api_base, "stage_client_http");
            Box::new(HttpStageClient::new(api_base, timeout))
        }
        None => {
            tracing::info!(target: "cli", "stage_client_in_process");
            Box::new(InProcessStageClient::new(
                open_blob_store(&config.storage),
                config.pipeline.clone(),
            ))
        }
    }
}

async fn finish_text(
    reply: String,
    save: bool,
    run_id: Option<String>,
    file_name: &str,
    store: Arc<dyn BlobStore>,
) -> Result<CommandOutput> {
    if !save {
        return Ok(CommandOutput::Text(reply));
    }

    let run_id = run_id
        .filter(|run_id| !run_id.trim().is_empty())
        .unwrap_or_else(generate_run_id);
    validate_run_id(&run_id)?;
    let uri = save_text_output(store.as_ref(), &run_id, file_name, &reply)
        .await
        .map_err(into_anyhow)?;
    Ok(CommandOutput::Text(format!("{reply}\nOutput saved to {uri}")))
}

/// Recipe flag text as JSON. Missing means `{}`; text that is not JSON is wrapped as
/// `{"raw": <text>}`.
pub fn parse_recipe(text: Option<&str>) -> Value {
    match text {
        None => Value::Object(Map::new()),
        Some(text) => serde_json::from_str(text).unwrap_or_else(|_| json!({ "raw": text })),
    }
}

fn into_anyhow(err: DriverError) -> anyhow::Error {
    match &err.body {
        Some(body) => anyhow!("{err}: {body}"),
        None => anyhow!(err),
    }
}
