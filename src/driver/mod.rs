//! Client-side orchestration: stage calls, the preprocess-then-synthesis saga, and the
//! external chat model and agent services.

pub mod agent;
pub mod chat;
pub mod client;
pub mod credentials;
pub mod error;
pub mod output;
pub mod pipeline;

pub use agent::{
    AgentClient, AgentEvent, AgentEventStream, AgentSession, HttpAgentClient,
    aggregate_agent_text, ask_agent,
};
pub use chat::{ChatClient, OpenAiCompatibleChatClient};
pub use client::{HttpStageClient, InProcessStageClient, StageClient};
pub use error::{DriverError, DriverErrorKind};
pub use output::{AGENT_OUTPUT_FILE, CHAT_OUTPUT_FILE, save_text_output};
pub use pipeline::{PipelineReport, PipelineRequest, PipelineStatus, run_pipeline};
