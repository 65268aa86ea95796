//! Chat-completion client for OpenAI-compatible APIs (Groq by default).
//!
//! The [`ChatModel`] trait is the seam the answer engine talks to; the
//! production implementation is [`ChatClient`]. A request is a system prompt
//! plus a user turn. With an image, the user turn is a content array whose
//! first part is the inline JPEG and second part is the question text.
//!
//! Retries: HTTP 429, 5xx and transport errors are retried up to
//! `chat.max_retries` times with exponential backoff (1s, 2s, 4s, ...).
//! Other statuses fail immediately.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

use crate::config::ChatConfig;
use crate::router::Engine;

/// One chat turn to send to the model.
#[derive(Debug, Clone, Default)]
pub struct ChatPrompt {
    pub system: String,
    pub user: String,
    /// Base64 JPEG, sent as a `data:image/jpeg;base64,` URL.
    pub image: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("chat API error (HTTP {status}): {message}")]
    Status { status: u16, message: String },
    #[error("chat transport error: {0}")]
    Transport(String),
    #[error("invalid chat response: {0}")]
    InvalidResponse(String),
}

impl ChatError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ChatError::Status { status, .. } => *status == 429 || *status >= 500,
            ChatError::Transport(_) => true,
            ChatError::InvalidResponse(_) => false,
        }
    }
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Model identifier used for `engine`.
    fn model_for(&self, engine: Engine) -> &str;

    /// Return the assistant's reply text.
    async fn complete(&self, engine: Engine, prompt: &ChatPrompt) -> Result<String, ChatError>;
}

// ============ Wire types ============

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: MessageContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

fn build_request<'a>(model: &'a str, temperature: f32, prompt: &ChatPrompt) -> CompletionRequest<'a> {
    let user = match &prompt.image {
        Some(b64) => MessageContent::Parts(vec![
            ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: format!("data:image/jpeg;base64,{}", b64),
                },
            },
            ContentPart::Text {
                text: prompt.user.clone(),
            },
        ]),
        None => MessageContent::Text(prompt.user.clone()),
    };

    CompletionRequest {
        model,
        messages: vec![
            Message {
                role: "system",
                content: MessageContent::Text(prompt.system.clone()),
            },
            Message {
                role: "user",
                content: user,
            },
        ],
        temperature,
    }
}

// ============ HTTP client ============

pub struct ChatClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    text_model: String,
    vision_model: String,
    temperature: f32,
    max_retries: u32,
}

impl ChatClient {
    /// Build a client whose API key comes from the variable named by
    /// `chat.api_key_env`.
    pub fn from_env(config: &ChatConfig) -> anyhow::Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("{} environment variable not set", config.api_key_env))?;
        Self::new(config, api_key)
    }

    pub fn new(config: &ChatConfig, api_key: String) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
            text_model: config.text_model.clone(),
            vision_model: config.vision_model.clone(),
            temperature: config.temperature,
            max_retries: config.max_retries,
        })
    }

    async fn send_once(&self, body: &CompletionRequest<'_>) -> Result<String, ChatError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(body)
            .send()
            .await
            .map_err(|e| ChatError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ChatError::Status {
                status: status.as_u16(),
                message: text.chars().take(500).collect(),
            });
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| ChatError::InvalidResponse(e.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ChatError::InvalidResponse("no choices in response".to_string()))
    }
}

#[async_trait]
impl ChatModel for ChatClient {
    fn model_for(&self, engine: Engine) -> &str {
        match engine {
            Engine::Text => &self.text_model,
            Engine::Vision => &self.vision_model,
        }
    }

    async fn complete(&self, engine: Engine, prompt: &ChatPrompt) -> Result<String, ChatError> {
        let body = build_request(self.model_for(engine), self.temperature, prompt);

        let mut attempt = 0u32;
        loop {
            match self.send_once(&body).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                    warn!("chat request failed ({}), retry {} in {:?}", e, attempt, delay);
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn prompt(image: Option<&str>) -> ChatPrompt {
        ChatPrompt {
            system: "sys".to_string(),
            user: "what is osmosis?".to_string(),
            image: image.map(str::to_string),
        }
    }

    #[test]
    fn test_text_request_shape() {
        let json = serde_json::to_value(build_request("m", 0.7, &prompt(None))).unwrap();
        assert_eq!(json["model"], "m");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][0]["content"], "sys");
        assert_eq!(json["messages"][1]["content"], "what is osmosis?");
    }

    #[test]
    fn test_image_part_precedes_text() {
        let json = serde_json::to_value(build_request("m", 0.7, &prompt(Some("QUJD")))).unwrap();
        let parts = json["messages"][1]["content"].as_array().unwrap();
        assert_eq!(parts[0]["type"], "image_url");
        assert_eq!(parts[0]["image_url"]["url"], "data:image/jpeg;base64,QUJD");
        assert_eq!(parts[1]["type"], "text");
        assert_eq!(parts[1]["text"], "what is osmosis?");
    }

    #[test]
    fn test_retryable_classification() {
        let status = |s| ChatError::Status {
            status: s,
            message: String::new(),
        };
        assert!(status(429).is_retryable());
        assert!(status(503).is_retryable());
        assert!(!status(400).is_retryable());
        assert!(ChatError::Transport("reset".into()).is_retryable());
    }

    /// Fails with 503 `failures` times, then answers.
    async fn mock_server(failures: usize) -> (String, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route(
                "/chat/completions",
                post(
                    |State((calls, failures)): State<(Arc<AtomicUsize>, usize)>,
                     Json(body): Json<serde_json::Value>| async move {
                        let n = calls.fetch_add(1, Ordering::SeqCst);
                        if n < failures {
                            return (StatusCode::SERVICE_UNAVAILABLE, Json(serde_json::json!({})));
                        }
                        let reply = format!("answer from {}", body["model"].as_str().unwrap_or(""));
                        (
                            StatusCode::OK,
                            Json(serde_json::json!({
                                "choices": [{ "message": { "role": "assistant", "content": reply } }]
                            })),
                        )
                    },
                ),
            )
            .with_state((calls.clone(), failures));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), calls)
    }

    fn config(base_url: String) -> ChatConfig {
        ChatConfig {
            base_url,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_client_retries_server_errors() {
        let (url, calls) = mock_server(1).await;
        let client = ChatClient::new(&config(url), "key".to_string()).unwrap();
        let reply = client.complete(Engine::Vision, &prompt(None)).await.unwrap();
        assert_eq!(reply, "answer from meta-llama/llama-4-scout-17b-16e-instruct");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_client_gives_up_after_max_retries() {
        let (url, calls) = mock_server(10).await;
        let mut cfg = config(url);
        cfg.max_retries = 1;
        let client = ChatClient::new(&cfg, "key".to_string()).unwrap();
        let err = client.complete(Engine::Text, &prompt(None)).await.unwrap_err();
        assert!(matches!(err, ChatError::Status { status: 503, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
