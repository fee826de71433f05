use std::time::Duration;

use async_trait::async_trait;
use revio_core::{LlmConfig, RevioError};
use serde::{Deserialize, Serialize};

/// A message in a chat conversation with the LLM.
///
/// # Examples
///
/// ```
/// use revio_review::llm::{ChatMessage, Role};
///
/// let msg = ChatMessage::user("Suggest improvements");
/// assert!(matches!(msg.role, Role::User));
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    /// Role of the message sender.
    pub role: Role,
    /// Text content of the message.
    pub content: String,
}

impl ChatMessage {
    /// A system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// A user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Role in the chat conversation.
///
/// # Examples
///
/// ```
/// use revio_review::llm::Role;
///
/// let role = Role::System;
/// assert_eq!(serde_json::to_string(&role).unwrap(), "\"system\"");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System-level instructions.
    System,
    /// User input.
    User,
    /// Assistant response.
    Assistant,
}

/// Raw model output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// Text of the first choice.
    pub text: String,
    /// Why generation stopped (`"stop"`, `"length"`, ...), when reported.
    pub finish_reason: Option<String>,
}

/// Anything that can answer a chat request for a named model.
///
/// [`LlmClient`] is the HTTP implementation; tests substitute canned models.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Send `messages` to `model` and return its completion.
    async fn chat(&self, model: &str, messages: &[ChatMessage]) -> Result<Completion, RevioError>;
}

/// OpenAI-compatible chat completions client.
///
/// Works with any provider that exposes the `/v1/chat/completions` endpoint:
/// OpenAI, Ollama, vLLM, LiteLLM, etc.
///
/// # Examples
///
/// ```
/// use revio_core::LlmConfig;
/// use revio_review::llm::LlmClient;
///
/// let config = LlmConfig {
///     api_key: Some("test-key".into()),
///     ..LlmConfig::default()
/// };
/// let client = LlmClient::new(&config).unwrap();
/// assert_eq!(client.model(), "gpt-4o");
/// ```
pub struct LlmClient {
    client: reqwest::Client,
    config: LlmConfig,
    api_key: Option<String>,
}

impl LlmClient {
    /// Create a new LLM client from configuration.
    ///
    /// The API key comes from the config or the provider's environment variable.
    ///
    /// # Errors
    ///
    /// Returns [`RevioError::Llm`] if the HTTP client cannot be built.
    pub fn new(config: &LlmConfig) -> Result<Self, RevioError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RevioError::Llm(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key: config.resolve_api_key(),
            config: config.clone(),
        })
    }

    /// Return the primary model name from the configuration.
    pub fn model(&self) -> &str {
        &self.config.model
    }
}

#[async_trait]
impl ChatModel for LlmClient {
    /// Builds a request to `{base_url}/v1/chat/completions` with the given
    /// messages and the configured temperature.
    async fn chat(&self, model: &str, messages: &[ChatMessage]) -> Result<Completion, RevioError> {
        let base_url = self
            .config
            .base_url
            .as_deref()
            .unwrap_or("https://api.openai.com")
            .trim_end_matches('/');
        let url = format!("{base_url}/v1/chat/completions");

        let body = serde_json::json!({
            "model": model,
            "messages": messages,
            "temperature": self.config.temperature,
        });

        let mut request = self.client.post(&url);
        if let Some(api_key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {api_key}"));
        }
        request = request.header("Content-Type", "application/json");

        let response = request
            .json(&body)
            .send()
            .await
            .map_err(|e| RevioError::Llm(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(RevioError::Llm(format!(
                "LLM API error {status}: {body_text}"
            )));
        }

        let response_body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| RevioError::Llm(format!("failed to parse response: {e}")))?;

        let choice = response_body
            .get("choices")
            .and_then(|c| c.get(0))
            .ok_or_else(|| {
                RevioError::Llm(format!("unexpected response structure: {response_body}"))
            })?;
        let text = choice
            .get("message")
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .ok_or_else(|| {
                RevioError::Llm(format!("unexpected response structure: {response_body}"))
            })?;

        Ok(Completion {
            text: text.to_string(),
            finish_reason: choice
                .get("finish_reason")
                .and_then(|f| f.as_str())
                .map(String::from),
        })
    }
}

/// Ask each model in `models` in turn until one answers.
///
/// Every failure is logged at warn level; the last error is returned when
/// all models fail.
///
/// # Errors
///
/// Returns the last model's error, or [`RevioError::Config`] if `models` is empty.
pub async fn chat_with_fallback(
    llm: &dyn ChatModel,
    models: &[&str],
    system: &str,
    user: &str,
) -> Result<Completion, RevioError> {
    let messages = [ChatMessage::system(system), ChatMessage::user(user)];
    let mut last_err = RevioError::Config("no models configured".into());

    for model in models {
        tracing::debug!(model, "calling model");
        match llm.chat(model, &messages).await {
            Ok(completion) => {
                if completion.finish_reason.as_deref() == Some("length") {
                    tracing::warn!(model, "model output was truncated");
                }
                return Ok(completion);
            }
            Err(e) => {
                tracing::warn!(model, error = %e, "model call failed");
                last_err = e;
            }
        }
    }

    Err(last_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Flaky {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ChatModel for Flaky {
        async fn chat(&self, model: &str, _: &[ChatMessage]) -> Result<Completion, RevioError> {
            self.calls.lock().unwrap().push(model.to_string());
            if model == "primary" {
                return Err(RevioError::Llm("rate limited".into()));
            }
            Ok(Completion {
                text: format!("from {model}"),
                finish_reason: Some("stop".into()),
            })
        }
    }

    fn config_for(url: &str) -> LlmConfig {
        LlmConfig {
            api_key: Some("sk-test".into()),
            base_url: Some(url.to_string()),
            ..LlmConfig::default()
        }
    }

    #[test]
    fn model_returns_config_model() {
        let config = LlmConfig {
            model: "gpt-4o-mini".into(),
            ..LlmConfig::default()
        };
        let client = LlmClient::new(&config).unwrap();
        assert_eq!(client.model(), "gpt-4o-mini");
    }

    #[test]
    fn chat_message_serializes() {
        let msg = ChatMessage::system("hello");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "system");
        assert_eq!(json["content"], "hello");
    }

    #[tokio::test]
    async fn chat_parses_completion() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .match_body(mockito::Matcher::PartialJson(
                serde_json::json!({"model": "gpt-4o"}),
            ))
            .with_status(200)
            .with_body(
                r#"{"choices":[{"message":{"role":"assistant","content":"ok"},"finish_reason":"stop"}]}"#,
            )
            .create_async()
            .await;

        let client = LlmClient::new(&config_for(&server.url())).unwrap();
        let completion = client
            .chat("gpt-4o", &[ChatMessage::user("hi")])
            .await
            .unwrap();

        assert_eq!(completion.text, "ok");
        assert_eq!(completion.finish_reason.as_deref(), Some("stop"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn non_success_status_is_llm_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/chat/completions")
            .with_status(429)
            .with_body("slow down")
            .create_async()
            .await;

        let client = LlmClient::new(&config_for(&server.url())).unwrap();
        let err = client
            .chat("gpt-4o", &[ChatMessage::user("hi")])
            .await
            .unwrap_err();
        assert!(matches!(err, RevioError::Llm(ref m) if m.contains("429")));
    }

    #[tokio::test]
    async fn malformed_body_is_llm_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices":[]}"#)
            .create_async()
            .await;

        let client = LlmClient::new(&config_for(&server.url())).unwrap();
        let result = client.chat("gpt-4o", &[ChatMessage::user("hi")]).await;
        assert!(matches!(result, Err(RevioError::Llm(_))));
    }

    #[tokio::test]
    async fn fallback_uses_next_model() {
        let llm = Flaky {
            calls: Mutex::new(Vec::new()),
        };
        let completion = chat_with_fallback(&llm, &["primary", "backup"], "sys", "user")
            .await
            .unwrap();
        assert_eq!(completion.text, "from backup");
        assert_eq!(*llm.calls.lock().unwrap(), ["primary", "backup"]);
    }

    #[tokio::test]
    async fn fallback_returns_last_error() {
        let llm = Flaky {
            calls: Mutex::new(Vec::new()),
        };
        let err = chat_with_fallback(&llm, &["primary"], "sys", "user")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("rate limited"));
    }
}
