// src/analyze/ai_adapter.rs
//! AI adapter: completion provider abstraction + concrete providers.
//! The summarization agent only sees `DynCompletion`; tests swap in `MockCompletion`.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::config::{LlmBackend, Settings};
use crate::error::CompletionError;

// ------------------------------------------------------------
// Public surface
// ------------------------------------------------------------

pub type CompletionFuture<'a> =
    Pin<Box<dyn Future<Output = Result<String, CompletionError>> + Send + 'a>>;

/// Narrow capability: one system + user prompt in, raw model text out.
pub trait CompletionProvider: Send + Sync {
    fn complete<'a>(&'a self, system: &'a str, user: &'a str) -> CompletionFuture<'a>;
    /// Provider name for diagnostics.
    fn name(&self) -> &'static str;
}

/// Convenient alias used by callers.
pub type DynCompletion = Arc<dyn CompletionProvider>;

/// Factory: build the provider selected in settings.
pub fn build_completion_provider(settings: &Settings) -> anyhow::Result<DynCompletion> {
    match &settings.llm.backend {
        LlmBackend::Mock => Ok(Arc::new(MockCompletion::canned_poll())),
        LlmBackend::OpenAiCompat { api_key } => {
            let provider = OpenAiCompatProvider::new(
                api_key.expose(),
                &settings.llm.model,
                &settings.llm.base_url,
                settings.request_timeout,
            )?
            .with_sampling(settings.llm.temperature, settings.llm.max_tokens);
            Ok(Arc::new(provider))
        }
    }
}

// ------------------------------------------------------------
// OpenAI-compatible chat completions (OpenAI, xAI, local gateways)
// ------------------------------------------------------------

pub struct OpenAiCompatProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiCompatProvider {
    pub fn new(
        api_key: &str,
        model: &str,
        base_url: &str,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("poll-agent/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10).min(timeout))
            .timeout(timeout)
            .build()
            .context("building completion http client")?;
        Ok(Self {
            http,
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            temperature: 0.2,
            max_tokens: 1024,
        })
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}
#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}
#[derive(Serialize)]
struct Req<'a> {
    model: &'a str,
    messages: Vec<Msg<'a>>,
    temperature: f32,
    max_tokens: u32,
    response_format: ResponseFormat,
}
#[derive(Deserialize)]
struct Resp {
    choices: Vec<Choice>,
}
#[derive(Deserialize)]
struct Choice {
    message: ChoiceMsg,
}
#[derive(Deserialize)]
struct ChoiceMsg {
    #[serde(default)]
    content: Option<String>,
}

impl CompletionProvider for OpenAiCompatProvider {
    fn complete<'a>(&'a self, system: &'a str, user: &'a str) -> CompletionFuture<'a> {
        Box::pin(async move {
            let req = Req {
                model: &self.model,
                messages: vec![
                    Msg {
                        role: "system",
                        content: system,
                    },
                    Msg {
                        role: "user",
                        content: user,
                    },
                ],
                temperature: self.temperature,
                max_tokens: self.max_tokens,
                response_format: ResponseFormat {
                    kind: "json_object",
                },
            };

            let resp = self
                .http
                .post(format!("{}/chat/completions", self.base_url))
                .bearer_auth(&self.api_key)
                .json(&req)
                .send()
                .await?;

            let status = resp.status();
            if !status.is_success() {
                return Err(CompletionError::Status {
                    status: status.as_u16(),
                });
            }
            let body: Resp = resp.json().await?;
            body.choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .filter(|c| !c.trim().is_empty())
                .ok_or(CompletionError::Empty)
        })
    }

    fn name(&self) -> &'static str {
        "openai-compatible"
    }
}

// ------------------------------------------------------------
// Mock provider
// ------------------------------------------------------------

/// Deterministic provider for tests/local runs. Counts calls and keeps the last system prompt.
pub struct MockCompletion {
    reply: Result<String, String>,
    calls: AtomicUsize,
    last_system: Mutex<Option<String>>,
}

impl MockCompletion {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: Ok(reply.into()),
            calls: AtomicUsize::new(0),
            last_system: Mutex::new(None),
        }
    }

    /// Every call fails with `CompletionError::Request(msg)`.
    pub fn failing(msg: impl Into<String>) -> Self {
        Self {
            reply: Err(msg.into()),
            calls: AtomicUsize::new(0),
            last_system: Mutex::new(None),
        }
    }

    /// Generic, valid draft without sample posts; used for `LLM_PROVIDER=mock`.
    pub fn canned_poll() -> Self {
        Self::new(
            r#"{"status":"poll_topic_found","topic":"Mock topic","rationale":"Mock provider output for offline runs.","poll_question":"Is the mock provider working?","options":["Yes","No"],"sample_post_ids":[]}"#,
        )
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_system_prompt(&self) -> Option<String> {
        self.last_system.lock().ok().and_then(|g| g.clone())
    }
}

impl CompletionProvider for MockCompletion {
    fn complete<'a>(&'a self, system: &'a str, _user: &'a str) -> CompletionFuture<'a> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_system.lock() {
            *last = Some(system.to_string());
        }
        let out = self
            .reply
            .clone()
            .map_err(CompletionError::Request);
        Box::pin(async move { out })
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
