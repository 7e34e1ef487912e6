//! OpenAI chat-completions model backend.
//!
//! Makes direct HTTP calls to an OpenAI-compatible chat endpoint. Prompt
//! content stays deliberately thin: the orchestrator cares about the reply
//! protocol (handoff and termination markers), not the prompt engineering.

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::models::{AgentProfile, Message, ModelConfig, UsageDelta};
use crate::domain::ports::{AgentReply, BackendError, ModelBackend};
use crate::services::cost_tracker::price;

/// Trailing marker an agent uses to request an explicit handoff.
const HANDOFF_MARKER: &str = "HANDOFF:";

/// Configuration for the OpenAI API backend.
#[derive(Debug, Clone)]
pub struct OpenAiApiConfig {
    /// API key (read from OPENAI_API_KEY env if not set)
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl From<&ModelConfig> for OpenAiApiConfig {
    fn from(config: &ModelConfig) -> Self {
        Self {
            api_key: None,
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout_secs: config.timeout_secs,
        }
    }
}

impl OpenAiApiConfig {
    pub fn get_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
    }

    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize, Default)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

pub struct OpenAiBackend {
    client: Client,
    config: OpenAiApiConfig,
}

impl OpenAiBackend {
    pub fn new(config: OpenAiApiConfig) -> Result<Self, BackendError> {
        let api_key = config
            .get_api_key()
            .ok_or_else(|| BackendError::Fatal("OPENAI_API_KEY is not set".to_string()))?;

        let mut headers = header::HeaderMap::new();
        let mut auth = header::HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|e| BackendError::Fatal(format!("invalid API key: {e}")))?;
        auth.set_sensitive(true);
        headers.insert(header::AUTHORIZATION, auth);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| BackendError::Fatal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    async fn chat(&self, messages: Vec<ChatMessage>) -> Result<ChatResponse, BackendError> {
        let request = ChatRequest {
            model: self.config.model.clone(),
            messages,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let url = format!("{}/chat/completions", self.config.base_url);
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                // Connection and timeout failures are worth retrying.
                BackendError::Transient(format!("request to {url} failed: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        response
            .json::<ChatResponse>()
            .await
            .map_err(|e| BackendError::Fatal(format!("malformed chat response: {e}")))
    }

    fn history_as_messages(
        &self,
        agent: &AgentProfile,
        query: &str,
        history: &[Message],
    ) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage {
            role: "system".to_string(),
            content: format!(
                "You are {}, the {} specialist in a data-analysis team. \
                 End your reply with TERMINATE when the user's question is fully answered. \
                 To pass control to a teammate, end with a line 'HANDOFF: <agent name>'. \
                 Allowed handoff targets: {}.",
                agent.name,
                agent.capability,
                agent.handoff_targets.join(", "),
            ),
        }];

        messages.push(ChatMessage {
            role: "user".to_string(),
            content: query.to_string(),
        });

        for msg in history {
            let role = if msg.agent == agent.name {
                "assistant"
            } else {
                "user"
            };
            messages.push(ChatMessage {
                role: role.to_string(),
                content: format!("[{}] {}", msg.agent, msg.content),
            });
        }

        messages
    }
}

/// Map an HTTP status to the retryability taxonomy: rate limits and server
/// errors are transient, client errors are fatal.
fn classify_status(status: StatusCode, body: &str) -> BackendError {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        BackendError::Transient(format!("backend returned {status}: {body}"))
    } else {
        BackendError::Fatal(format!("backend returned {status}: {body}"))
    }
}

/// Parse the reply protocol out of raw model text: a trailing
/// `HANDOFF: <name>` line and the termination markers.
fn parse_reply(content: String, usage: UsageDelta) -> AgentReply {
    let mut handoff_to = None;
    let mut kept_lines: Vec<&str> = Vec::new();

    for line in content.lines() {
        if let Some(target) = line.trim().strip_prefix(HANDOFF_MARKER) {
            handoff_to = Some(target.trim().to_string());
        } else {
            kept_lines.push(line);
        }
    }

    let text = kept_lines.join("\n");
    let is_final = text.contains("TERMINATE") || text.contains("STOP");

    AgentReply {
        content: text,
        artifacts: Vec::new(),
        handoff_to,
        is_final,
        is_error: false,
        usage,
    }
}

#[async_trait]
impl ModelBackend for OpenAiBackend {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn generate(
        &self,
        agent: &AgentProfile,
        query: &str,
        history: &[Message],
    ) -> Result<AgentReply, BackendError> {
        let messages = self.history_as_messages(agent, query, history);
        let response = self.chat(messages).await?;

        let content = response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| BackendError::Fatal("chat response had no choices".to_string()))?;

        let usage = response.usage.unwrap_or_default();
        let delta = UsageDelta::new(
            usage.prompt_tokens,
            usage.completion_tokens,
            price(
                &self.config.model,
                usage.prompt_tokens,
                usage.completion_tokens,
            ),
        );

        Ok(parse_reply(content, delta))
    }

    async fn select_next(
        &self,
        history: &[Message],
        candidates: &[String],
    ) -> Result<String, BackendError> {
        let transcript = history
            .iter()
            .rev()
            .take(5)
            .map(|m| format!("[{}] {}", m.agent, m.content))
            .collect::<Vec<_>>()
            .join("\n");

        let messages = vec![
            ChatMessage {
                role: "system".to_string(),
                content: format!(
                    "Pick which team member should speak next. \
                     Answer with exactly one name from: {}.",
                    candidates.join(", ")
                ),
            },
            ChatMessage {
                role: "user".to_string(),
                content: transcript,
            },
        ];

        let response = self.chat(messages).await?;
        response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().to_string())
            .ok_or_else(|| BackendError::Fatal("selection response had no choices".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Capability;

    fn test_backend(base_url: &str) -> OpenAiBackend {
        let config = OpenAiApiConfig::from(&ModelConfig::default())
            .with_api_key("sk-test")
            .with_base_url(base_url.to_string());
        OpenAiBackend::new(config).unwrap()
    }

    #[test]
    fn test_parse_reply_extracts_handoff() {
        let reply = parse_reply(
            "Here is the plan.\nHANDOFF: Code_Executor".to_string(),
            UsageDelta::default(),
        );
        assert_eq!(reply.handoff_to.as_deref(), Some("Code_Executor"));
        assert_eq!(reply.content, "Here is the plan.");
        assert!(!reply.is_final);
    }

    #[test]
    fn test_parse_reply_detects_termination() {
        let reply = parse_reply("All done. TERMINATE".to_string(), UsageDelta::default());
        assert!(reply.is_final);
        assert!(reply.handoff_to.is_none());
    }

    #[test]
    fn test_status_classification() {
        assert!(classify_status(StatusCode::TOO_MANY_REQUESTS, "").is_transient());
        assert!(classify_status(StatusCode::BAD_GATEWAY, "").is_transient());
        assert!(!classify_status(StatusCode::UNAUTHORIZED, "").is_transient());
        assert!(!classify_status(StatusCode::BAD_REQUEST, "").is_transient());
    }

    #[tokio::test]
    async fn test_generate_parses_chat_response() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "choices": [{"message": {"role": "assistant", "content": "42 rows. TERMINATE"}}],
                    "usage": {"prompt_tokens": 1000, "completion_tokens": 500}
                }"#,
            )
            .create_async()
            .await;

        let backend = test_backend(&server.url());
        let agent = AgentProfile::new("Data_Analyzer", Capability::Planning);

        let reply = backend.generate(&agent, "how many rows?", &[]).await.unwrap();
        assert!(reply.is_final);
        assert_eq!(reply.usage.input_tokens, 1000);
        assert!((reply.usage.cost_usd - 0.0075).abs() < 1e-9);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(503)
            .with_body("overloaded")
            .create_async()
            .await;

        let backend = test_backend(&server.url());
        let agent = AgentProfile::new("Data_Analyzer", Capability::Planning);

        let err = backend.generate(&agent, "q", &[]).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_client_error_is_fatal() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(401)
            .with_body("bad key")
            .create_async()
            .await;

        let backend = test_backend(&server.url());
        let agent = AgentProfile::new("Data_Analyzer", Capability::Planning);

        let err = backend.generate(&agent, "q", &[]).await.unwrap_err();
        assert!(!err.is_transient());
    }
}
