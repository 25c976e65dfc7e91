use std::{
    pin::Pin,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use futures_core::Stream;
use futures_util::StreamExt;
use reqwest::{Client, header};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::Instrument;
use uuid::Uuid;

use crate::{
    config::AgentConfig,
    driver::{
        credentials::{CredentialRef, resolve_auth_header},
        error::{
            DriverError, configuration_error, invalid_request, map_http_error,
            protocol_violation, upstream_failure,
        },
    },
};

/// One event of an agent response stream.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// Part of the reply text.
    Chunk { bytes: Vec<u8> },
    /// Reasoning or orchestration trace emitted by the agent service.
    Trace(Value),
    Other(Value),
}

pub type AgentEventStream =
    Pin<Box<dyn Stream<Item = Result<AgentEvent, DriverError>> + Send + 'static>>;

/// Addresses one conversation with one deployed agent alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentSession {
    pub agent_id: String,
    pub agent_alias_id: String,
    pub session_id: String,
}

impl AgentSession {
    /// New session with a fresh random id, so no state carries over between calls.
    pub fn fresh(agent_id: impl Into<String>, agent_alias_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            agent_alias_id: agent_alias_id.into(),
            session_id: Uuid::new_v4().to_string(),
        }
    }
}

#[async_trait]
pub trait AgentClient: Send + Sync {
    async fn invoke(
        &self,
        session: &AgentSession,
        message: &str,
    ) -> Result<AgentEventStream, DriverError>;
}

/// Concatenates chunk text in arrival order, dropping bytes that are not valid UTF-8.
/// Trace and unknown events are skipped; the first stream error aborts aggregation.
pub async fn aggregate_agent_text(mut stream: AgentEventStream) -> Result<String, DriverError> {
    let mut text = String::new();
    let mut skipped = 0_usize;
    while let Some(event) = stream.next().await {
        match event? {
            AgentEvent::Chunk { bytes } => text.push_str(&decode_dropping_invalid(&bytes)),
            AgentEvent::Trace(_) | AgentEvent::Other(_) => skipped += 1,
        }
    }

    tracing::debug!(
        target: "driver.agent",
        text_bytes = text.len(),
        skipped_events = skipped,
        "agent_stream_aggregated"
    );
    Ok(text)
}

/// Opens a fresh session, sends `message`, and returns the aggregated reply.
pub async fn ask_agent(
    client: &dyn AgentClient,
    agent_id: &str,
    agent_alias_id: &str,
    message: &str,
) -> Result<String, DriverError> {
    if agent_id.trim().is_empty() || agent_alias_id.trim().is_empty() {
        return Err(invalid_request(
            "missing agent identifiers; provide --agent-id and --agent-alias-id or set AGENT_ID / AGENT_ALIAS_ID",
        ));
    }

    let session = AgentSession::fresh(agent_id, agent_alias_id);
    tracing::info!(
        target: "driver.agent",
        agent_id = %session.agent_id,
        agent_alias_id = %session.agent_alias_id,
        session_id = %session.session_id,
        "agent_session_opened"
    );
    let stream = client.invoke(&session, message).await?;
    aggregate_agent_text(stream).await
}

/// UTF-8 decode where invalid sequences are dropped rather than replaced.
fn decode_dropping_invalid(bytes: &[u8]) -> String {
    bytes.utf8_chunks().map(|chunk| chunk.valid()).collect()
}

/// Decodes one NDJSON line. Blank lines yield `None`.
pub fn parse_agent_line(line: &str) -> Result<Option<AgentEvent>, DriverError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let payload = serde_json::from_str::<Value>(line)
        .map_err(|err| protocol_violation(format!("invalid agent ndjson payload: {err}")))?;

    if let Some(chunk) = payload.get("chunk") {
        let bytes = chunk
            .get("bytes")
            .and_then(Value::as_str)
            .ok_or_else(|| protocol_violation("agent chunk event has no text bytes"))?;
        return Ok(Some(AgentEvent::Chunk {
            bytes: bytes.as_bytes().to_vec(),
        }));
    }
    if let Some(trace) = payload.get("trace") {
        return Ok(Some(AgentEvent::Trace(trace.clone())));
    }
    Ok(Some(AgentEvent::Other(payload)))
}

/// Invokes an agent over HTTP and decodes its newline-delimited JSON event stream.
#[derive(Clone)]
pub struct HttpAgentClient {
    client: Client,
    endpoint: String,
    credential: CredentialRef,
    timeout: Duration,
}

impl HttpAgentClient {
    pub fn from_config(config: &AgentConfig, timeout: Duration) -> Result<Self, DriverError> {
        let endpoint = config
            .endpoint
            .clone()
            .filter(|endpoint| !endpoint.trim().is_empty())
            .ok_or_else(|| configuration_error("driver.agent.endpoint is not configured"))?;

        Ok(Self {
            client: Client::builder()
                .pool_idle_timeout(Duration::from_secs(30))
                .build()
                .expect("reqwest client must build"),
            endpoint,
            credential: config.credential.clone(),
            timeout,
        })
    }

    pub fn session_url(&self, session: &AgentSession) -> String {
        format!(
            "{}/agents/{}/aliases/{}/sessions/{}/text",
            self.endpoint.trim_end_matches('/'),
            session.agent_id,
            session.agent_alias_id,
            session.session_id
        )
    }
}

#[async_trait]
impl AgentClient for HttpAgentClient {
    async fn invoke(
        &self,
        session: &AgentSession,
        message: &str,
    ) -> Result<AgentEventStream, DriverError> {
        let url = self.session_url(session);
        let mut request = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ACCEPT, "application/x-ndjson")
            .json(&json!({ "inputText": message }));
        if let Some(auth_header) = resolve_auth_header(&self.credential, "agent")? {
            request = request.header(header::AUTHORIZATION, auth_header);
        }

        let started_at = Instant::now();
        let response = request
            .send()
            .await
            .map_err(|err| upstream_failure(format!("agent request failed: {err}")))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(map_http_error("agent", status, &body));
        }

        let (tx, rx) = mpsc::channel::<Result<AgentEvent, DriverError>>(64);
        let stream_span = tracing::debug_span!(
            target: "driver.agent",
            "agent_stream",
            session_id = %session.session_id
        );
        tokio::spawn(
            async move {
                let mut body = response.bytes_stream();
                let mut buffer: Vec<u8> = Vec::new();
                let mut events = 0_usize;

                while let Some(item) = body.next().await {
                    let chunk = match item {
                        Ok(chunk) => chunk,
                        Err(err) => {
                            let _ = tx
                                .send(Err(upstream_failure(format!(
                                    "agent stream chunk error: {err}"
                                ))))
                                .await;
                            return;
                        }
                    };

                    buffer.extend_from_slice(&chunk);
                    while let Some(idx) = buffer.iter().position(|byte| *byte == b'\n') {
                        let line: Vec<u8> = buffer.drain(..=idx).collect();
                        match parse_agent_line(&decode_dropping_invalid(&line)) {
                            Ok(Some(event)) => {
                                events += 1;
                                if tx.send(Ok(event)).await.is_err() {
                                    return;
                                }
                            }
                            Ok(None) => {}
                            Err(err) => {
                                let _ = tx.send(Err(err)).await;
                                return;
                            }
                        }
                    }
                }

                match parse_agent_line(&decode_dropping_invalid(&buffer)) {
                    Ok(Some(event)) => {
                        events += 1;
                        let _ = tx.send(Ok(event)).await;
                    }
                    Ok(None) => {}
                    Err(err) => {
                        let _ = tx.send(Err(err)).await;
                    }
                }
                tracing::debug!(
                    target: "driver.agent",
                    events,
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    "agent_stream_end"
                );
            }
            .instrument(stream_span),
        );

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}
