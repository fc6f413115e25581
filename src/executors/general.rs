//! General conversation executor backed by an Ollama server
//!
//! Sends the recent messages of the current session plus the new question
//! to `/api/chat` and returns the model's reply.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{ExecutorError, Payload, SessionContext, StrategyExecutor};
use crate::config::OllamaConfig;
use crate::error::{Result, RouterError};
use crate::session::Role;

const SYSTEM_PROMPT: &str = "Você é um assistente de IA especializado em análise de dados \
empresariais de uma consultoria. Responda de forma útil e profissional, em português. \
Se a pergunta for sobre dados específicos, sugira que o usuário diga quais dados deseja consultar.";

/// Request structure for Ollama API
#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
}

/// Message structure for Ollama API
#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    #[serde(default)]
    content: String,
}

/// Response from Ollama's /api/chat endpoint
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    message: OllamaMessage,
    #[serde(default)]
    done: bool,
}

/// Conversational replies from a local or remote Ollama model
///
/// # Examples
///
/// ```
/// use warehouse_router::config::OllamaConfig;
/// use warehouse_router::executors::OllamaExecutor;
///
/// let config = OllamaConfig {
///     host: "http://localhost:11434".to_string(),
///     model: "llama3.2:latest".to_string(),
/// };
/// let executor = OllamaExecutor::new(config, std::time::Duration::from_secs(30));
/// assert!(executor.is_ok());
/// ```
pub struct OllamaExecutor {
    client: Client,
    config: OllamaConfig,
}

impl OllamaExecutor {
    /// Creates an executor for the configured host and model
    ///
    /// # Errors
    ///
    /// Returns `RouterError::Http` if the HTTP client cannot be built
    pub fn new(config: OllamaConfig, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("warehouse-router/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(RouterError::from)?;

        tracing::info!(
            "Initialized Ollama executor: host={}, model={}",
            config.host,
            config.model
        );

        Ok(Self { client, config })
    }

    fn build_messages(&self, content: &str, context: &SessionContext) -> Vec<OllamaMessage> {
        let mut messages = Vec::with_capacity(context.history.len() + 2);
        messages.push(OllamaMessage {
            role: "system".to_string(),
            content: SYSTEM_PROMPT.to_string(),
        });
        for message in &context.history {
            let role = match message.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            messages.push(OllamaMessage {
                role: role.to_string(),
                content: message.content.clone(),
            });
        }
        messages.push(OllamaMessage {
            role: "user".to_string(),
            content: content.to_string(),
        });
        messages
    }
}

fn classify_request_error(error: reqwest::Error) -> ExecutorError {
    if error.is_timeout() || error.is_connect() || error.is_request() {
        ExecutorError::Transient(format!("Ollama unavailable: {}", error))
    } else {
        ExecutorError::Permanent(format!("Ollama request failed: {}", error))
    }
}

#[async_trait]
impl StrategyExecutor for OllamaExecutor {
    async fn execute(
        &self,
        content: &str,
        context: &SessionContext,
    ) -> std::result::Result<Payload, ExecutorError> {
        let request = OllamaRequest {
            model: self.config.model.clone(),
            messages: self.build_messages(content, context),
            stream: false,
        };
        let url = format!("{}/api/chat", self.config.host.trim_end_matches('/'));

        tracing::debug!(
            "Sending Ollama request: {} messages",
            request.messages.len()
        );

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!("Ollama request failed: {}", e);
                classify_request_error(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!("Ollama returned error {}: {}", status, error_text);
            let message = format!("Ollama returned error {}: {}", status, error_text);
            return Err(if status.is_server_error() {
                ExecutorError::Transient(message)
            } else {
                ExecutorError::Permanent(message)
            });
        }

        let reply: OllamaResponse = response.json().await.map_err(|e| {
            tracing::error!("Failed to parse Ollama response: {}", e);
            ExecutorError::Permanent(format!("Failed to parse Ollama response: {}", e))
        })?;
        tracing::debug!("Ollama response: done={}", reply.done);

        Ok(Payload::text(reply.message.content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::Strategy;
    use crate::session::Message;

    fn executor(host: &str) -> OllamaExecutor {
        OllamaExecutor::new(
            OllamaConfig {
                host: host.to_string(),
                model: "llama3.2:latest".to_string(),
            },
            Duration::from_millis(500),
        )
        .unwrap()
    }

    #[test]
    fn test_build_messages_includes_session_history_only() {
        let session_id = uuid::Uuid::new_v4();
        let context = SessionContext {
            session_id,
            history: vec![
                Message::user(session_id, "oi"),
                Message::assistant(session_id, "olá", Strategy::General, Duration::from_millis(3)),
            ],
        };

        let messages = executor("http://localhost:11434").build_messages("tudo bem?", &context);
        let roles: Vec<_> = messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
        assert_eq!(messages[3].content, "tudo bem?");
    }

    #[test]
    fn test_response_parsing() {
        let json = r#"{"model":"llama3.2","message":{"role":"assistant","content":"Olá!"},"done":true}"#;
        let parsed: OllamaResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.message.content, "Olá!");
        assert!(parsed.done);
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transient() {
        // Port 9 (discard) is almost never listening
        let executor = executor("http://127.0.0.1:9");
        let context = SessionContext {
            session_id: uuid::Uuid::new_v4(),
            history: Vec::new(),
        };
        let err = executor.execute("olá", &context).await.unwrap_err();
        assert!(err.is_transient(), "got {:?}", err);
    }
}
