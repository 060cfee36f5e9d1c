
use serde::Serialize;
use serde_json::Value;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::config::ReasonerConfig;

const MAX_LOGGED_BODY: usize = 512;

/// Failures of a reasoning call. Each is reported as-is and never retried.
#[derive(Error, Debug)]
pub enum ReasonerError {
    #[error("{}", transport_message(*status, body))]
    Transport { status: Option<u16>, body: String },

    #[error("Invalid JSON response: {body}")]
    MalformedResponse { body: String },

    #[error("API error: {payload}")]
    RemoteApi { payload: String },

    #[error("Empty or unknown response format: {body}")]
    EmptyAnswer { body: String },

    #[error("API key not set: environment variable {0} is empty or missing")]
    MissingApiKey(String),
}

fn transport_message(status: Option<u16>, body: &str) -> String {
    match status {
        Some(status) => format!("HTTP {status}: {body}"),
        None => format!("Request failed: {body}"),
    }
}

/// Produces a free-text answer for a system message and a user prompt
pub trait Reasoner: Send + Sync {
    fn complete(&self, system: &str, prompt: &str) -> Result<String, ReasonerError>;

    fn model_name(&self) -> &str;
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint such as OpenRouter
#[derive(Debug, Clone)]
pub struct OpenRouterClient {
    url: Url,
    model: String,
    api_key: String,
    referer: String,
    title: String,
    agent: ureq::Agent,
}

impl OpenRouterClient {
    /// Build a client, reading the API key from the configured environment variable
    #[inline]
    pub fn new(config: &ReasonerConfig) -> Result<Self, ReasonerError> {
        let api_key = config
            .api_key()
            .ok_or_else(|| ReasonerError::MissingApiKey(config.api_key_env.clone()))?;
        Self::with_api_key(config, api_key)
    }

    #[inline]
    pub fn with_api_key(config: &ReasonerConfig, api_key: String) -> Result<Self, ReasonerError> {
        if api_key.trim().is_empty() {
            return Err(ReasonerError::MissingApiKey(config.api_key_env.clone()));
        }

        let base = format!("{}/", config.endpoint.trim_end_matches('/'));
        let url = Url::parse(&base)
            .and_then(|base| base.join("chat/completions"))
            .map_err(|e| ReasonerError::Transport {
                status: None,
                body: format!("invalid endpoint {}: {e}", config.endpoint),
            })?;

        // Status codes are inspected by hand so error bodies can be reported
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_secs)))
            .http_status_as_error(false)
            .build()
            .into();

        info!(
            "Reasoner client for model {} at {} (timeout {}s)",
            config.model, url, config.timeout_secs
        );

        Ok(Self {
            url,
            model: config.model.clone(),
            api_key,
            referer: config.referer.clone(),
            title: config.title.clone(),
            agent,
        })
    }

    #[inline]
    pub fn url(&self) -> &Url {
        &self.url
    }

    fn post(&self, body: &str) -> Result<(u16, String), ReasonerError> {
        let transport = |e: ureq::Error| ReasonerError::Transport {
            status: None,
            body: e.to_string(),
        };

        let mut response = self
            .agent
            .post(self.url.as_str())
            .header("Authorization", &format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .header("HTTP-Referer", &self.referer)
            .header("X-Title", &self.title)
            .send(body)
            .map_err(transport)?;

        let status = response.status().as_u16();
        let text = response.body_mut().read_to_string().map_err(transport)?;
        Ok((status, text))
    }
}

impl Reasoner for OpenRouterClient {
    #[inline]
    fn complete(&self, system: &str, prompt: &str) -> Result<String, ReasonerError> {
        let started = Instant::now();
        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
        };
        let request_json =
            serde_json::to_string(&request).map_err(|e| ReasonerError::Transport {
                status: None,
                body: format!("failed to serialize request: {e}"),
            })?;

        debug!(
            "POST {} (model {}, prompt {} bytes)",
            self.url,
            self.model,
            prompt.len()
        );

        let (status, body) = self.post(&request_json)?;
        debug!(
            "Reasoner answered HTTP {} after {} ms",
            status,
            started.elapsed().as_millis()
        );

        if status != 200 {
            error!("Reasoner returned HTTP {}: {}", status, snippet(&body));
            return Err(ReasonerError::Transport {
                status: Some(status),
                body,
            });
        }

        extract_answer(&body)
    }

    #[inline]
    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Pull `choices[0].message.content` out of a chat-completion body
#[inline]
pub fn extract_answer(body: &str) -> Result<String, ReasonerError> {
    let value: Value =
        serde_json::from_str(body).map_err(|_| ReasonerError::MalformedResponse {
            body: body.to_string(),
        })?;

    if let Some(payload) = value.get("error") {
        error!("Reasoner API error: {}", payload);
        return Err(ReasonerError::RemoteApi {
            payload: payload.to_string(),
        });
    }

    value
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .filter(|answer| !answer.trim().is_empty())
        .map(str::to_string)
        .ok_or_else(|| ReasonerError::EmptyAnswer {
            body: body.to_string(),
        })
}

fn snippet(body: &str) -> &str {
    match body.char_indices().nth(MAX_LOGGED_BODY) {
        Some((end, _)) => &body[..end],
        None => body,
    }
}
