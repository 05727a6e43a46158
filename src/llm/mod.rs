//! Language-model inference endpoint.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::InferenceConfig;
use crate::error::{Result, TriageError};

const STAGE: &str = "inference";

/// Anything that turns a prompt into raw completion text.
///
/// Callers must treat the text as untrusted: it may carry formatting around
/// the payload they asked for.
pub trait InferenceEndpoint {
    fn complete(&self, prompt: &str) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: [ChatMessage<'a>; 1],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

/// Blocking client for a messages-style completion API.
pub struct MessagesClient {
    http: reqwest::blocking::Client,
    endpoint: String,
    api_key: String,
    api_version: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl MessagesClient {
    pub fn new(cfg: &InferenceConfig, api_key: impl Into<String>) -> anyhow::Result<Self> {
        Ok(Self {
            http: build_http(cfg.timeout())?,
            endpoint: cfg.endpoint.clone(),
            api_key: api_key.into(),
            api_version: cfg.api_version.clone(),
            model: cfg.model.clone(),
            max_tokens: cfg.max_tokens,
            temperature: cfg.temperature,
        })
    }
}

fn build_http(timeout: Duration) -> anyhow::Result<reqwest::blocking::Client> {
    Ok(reqwest::blocking::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .build()?)
}

impl InferenceEndpoint for MessagesClient {
    fn complete(&self, prompt: &str) -> Result<String> {
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let resp = self
            .http
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", &self.api_version)
            .json(&body)
            .send()
            .map_err(|e| TriageError::transport(STAGE, e))?;

        let status = resp.status();
        let text = resp
            .text()
            .map_err(|e| TriageError::transport(STAGE, format!("reading response: {e}")))?;
        check_status(status, &text)?;

        let parsed: MessagesResponse = serde_json::from_str(&text)
            .map_err(|e| TriageError::transport(STAGE, format!("bad response body: {e}")))?;
        first_text(parsed)
    }
}

/// Any non-2xx answer (overload, auth, rate limit) fails the call.
fn check_status(status: reqwest::StatusCode, body: &str) -> Result<()> {
    if status.is_success() {
        return Ok(());
    }
    Err(TriageError::transport(
        STAGE,
        format!("HTTP {status}: {}", body.chars().take(300).collect::<String>()),
    ))
}

fn first_text(resp: MessagesResponse) -> Result<String> {
    resp.content
        .into_iter()
        .find(|b| b.kind == "text")
        .and_then(|b| b.text)
        .ok_or_else(|| TriageError::Validation("response carried no text block".to_string()))
}
