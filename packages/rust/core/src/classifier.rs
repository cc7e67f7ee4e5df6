//! External classifier boundary.
//!
//! A [`Classifier`] takes an instruction and bounded content and returns the
//! raw model text. Callers own parsing and fallback; any transport or shape
//! problem surfaces as [`AiDigestError::Classifier`].

use std::time::Duration;

use aidigest_shared::{AiDigestError, ClassifierConfig, Result, classifier_api_key};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// User-Agent string for classifier requests.
const USER_AGENT: &str = concat!("aidigest/", env!("CARGO_PKG_VERSION"));

#[async_trait]
pub trait Classifier: Send + Sync {
    /// Human-readable name for tracing.
    fn name(&self) -> &str;

    /// Send one instruction plus content and return the model's reply text.
    async fn complete(&self, instruction: &str, content: &str) -> Result<String>;
}

// ---------------------------------------------------------------------------
// OpenAI-compatible chat completions
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// Client for any `/chat/completions` endpoint (DeepSeek by default).
pub struct OpenAiCompatibleClassifier {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl OpenAiCompatibleClassifier {
    pub fn new(config: &ClassifierConfig, api_key: String) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AiDigestError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    /// Build from config, reading the key from the configured env var.
    pub fn from_config(config: &ClassifierConfig) -> Result<Self> {
        Self::new(config, classifier_api_key(config)?)
    }
}

#[async_trait]
impl Classifier for OpenAiCompatibleClassifier {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, instruction: &str, content: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: instruction,
                },
                ChatMessage {
                    role: "user",
                    content,
                },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        debug!(model = %self.model, content_len = content.len(), "calling classifier");
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AiDigestError::Classifier(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AiDigestError::Classifier(format!(
                "HTTP {status}: {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| AiDigestError::Classifier(format!("invalid response body: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| AiDigestError::Classifier("response has no message content".into()))
    }
}

// ---------------------------------------------------------------------------
// Disabled classifier
// ---------------------------------------------------------------------------

/// Stand-in used when no classifier is configured; every call fails, so
/// callers take their deterministic paths.
pub struct DisabledClassifier {
    reason: String,
}

impl DisabledClassifier {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Classifier for DisabledClassifier {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn complete(&self, _instruction: &str, _content: &str) -> Result<String> {
        Err(AiDigestError::Classifier(format!(
            "classifier disabled: {}",
            self.reason
        )))
    }
}

/// Remove a surrounding Markdown code fence (```json ... ```), if any.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. `json`) on the opening line.
    let rest = rest.split_once('\n').map_or("", |(_, body)| body);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base: &str) -> ClassifierConfig {
        ClassifierConfig {
            base_url: format!("{base}/v1"),
            timeout_secs: 5,
            ..Default::default()
        }
    }

    #[test]
    fn strips_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fences("```\n[1]\n```  "), "[1]");
        assert_eq!(strip_code_fences("  {\"a\": 1} "), "{\"a\": 1}");
    }

    #[tokio::test]
    async fn returns_message_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({"model": "deepseek-chat"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "{\"selected_indices\": [0]}"}}]
            })))
            .mount(&server)
            .await;

        let classifier =
            OpenAiCompatibleClassifier::new(&config(&server.uri()), "sk-test".into()).unwrap();
        let reply = classifier.complete("pick", "[0] item").await.expect("reply");
        assert_eq!(reply, "{\"selected_indices\": [0]}");
    }

    #[tokio::test]
    async fn http_error_is_classifier_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let classifier =
            OpenAiCompatibleClassifier::new(&config(&server.uri()), "sk-test".into()).unwrap();
        let err = classifier.complete("pick", "x").await.unwrap_err();
        assert!(matches!(err, AiDigestError::Classifier(ref m) if m.contains("429")));
    }

    #[tokio::test]
    async fn empty_choices_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})))
            .mount(&server)
            .await;

        let classifier =
            OpenAiCompatibleClassifier::new(&config(&server.uri()), "sk-test".into()).unwrap();
        assert!(classifier.complete("pick", "x").await.is_err());
    }

    #[tokio::test]
    async fn disabled_always_fails() {
        let classifier = DisabledClassifier::new("no API key");
        let err = classifier.complete("a", "b").await.unwrap_err();
        assert!(err.to_string().contains("no API key"));
    }
}
