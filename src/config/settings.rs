// src/config/settings.rs
//! Process configuration, read once from the environment (plus `.env`) and validated
//! before anything else starts.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::config::handles::{load_handles_default, parse_handle_list, ENV_HANDLES_PATH};
use crate::error::ConfigError;

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 1800;
pub const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com/v1";

/// API credential. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret(len={})", self.0.len())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchBackend {
    Xai { api_key: Secret },
    Fixture { path: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmBackend {
    OpenAiCompat { api_key: Secret },
    /// Returns a canned draft; for offline runs.
    Mock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

#[derive(Debug, Clone)]
pub struct SearchSettings {
    pub backend: SearchBackend,
    pub model: String,
    pub base_url: String,
    pub max_posts: usize,
    pub window: Duration,
    pub topic_hint: Option<String>,
    pub max_retries: u8,
}

#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub backend: LlmBackend,
    pub model: String,
    pub base_url: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// House rules appended to the summarization system prompt (`RULES_PATH`).
    pub rules: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub handles: Vec<String>,
    pub poll_interval: Duration,
    pub search: SearchSettings,
    pub llm: LlmSettings,
    pub request_timeout: Duration,
    pub handle_concurrency: usize,
    pub shutdown_grace: Duration,
    pub run_once: bool,
    pub log_format: LogFormat,
    pub metrics_addr: Option<SocketAddr>,
}

impl Settings {
    /// Read from the process environment. Call `dotenvy::dotenv()` first if `.env` should apply.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Build from any key/value source; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| {
            lookup(k)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        // --- handles ---
        let mut handles = get("X_HANDLES")
            .map(|raw| parse_handle_list(&raw))
            .unwrap_or_default();
        if handles.is_empty() {
            handles = load_handles_default(get(ENV_HANDLES_PATH).as_deref())
                .map_err(ConfigError::HandleFile)?;
        }
        if handles.is_empty() {
            return Err(ConfigError::NoHandles);
        }

        // --- timing ---
        let interval_secs: u64 =
            parse_or("POLL_INTERVAL_SECONDS", get("POLL_INTERVAL_SECONDS"), DEFAULT_POLL_INTERVAL_SECS)?;
        if interval_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "POLL_INTERVAL_SECONDS",
                reason: "must be greater than zero".into(),
            });
        }
        let poll_interval = Duration::from_secs(interval_secs);
        let window_secs: u64 = parse_or("SEARCH_WINDOW_SECONDS", get("SEARCH_WINDOW_SECONDS"), interval_secs)?;
        let timeout_secs: u64 = parse_or("REQUEST_TIMEOUT_SECS", get("REQUEST_TIMEOUT_SECS"), 60)?;
        if timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "REQUEST_TIMEOUT_SECS",
                reason: "must be greater than zero".into(),
            });
        }
        let grace_secs: u64 = parse_or("SHUTDOWN_GRACE_SECS", get("SHUTDOWN_GRACE_SECS"), 10)?;

        // --- search ---
        let search_backend = match get("SEARCH_PROVIDER").as_deref().map(str::to_ascii_lowercase) {
            None => xai_backend(&get)?,
            Some(p) if p == "xai" => xai_backend(&get)?,
            Some(p) if p == "fixture" => SearchBackend::Fixture {
                path: PathBuf::from(
                    get("SEARCH_FIXTURE_PATH")
                        .unwrap_or_else(|| "config/search_fixture.json".to_string()),
                ),
            },
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "SEARCH_PROVIDER",
                    reason: format!("unsupported provider {other:?} (expected xai|fixture)"),
                })
            }
        };
        let max_posts: usize = parse_or("MAX_POSTS", get("MAX_POSTS"), 20)?;
        if max_posts == 0 {
            return Err(ConfigError::Invalid {
                key: "MAX_POSTS",
                reason: "must be greater than zero".into(),
            });
        }
        let search = SearchSettings {
            backend: search_backend,
            model: get("SEARCH_MODEL")
                .or_else(|| get("GROK_MODEL"))
                .unwrap_or_else(|| crate::ingest::providers::xai::DEFAULT_MODEL.to_string()),
            base_url: get("SEARCH_BASE_URL")
                .unwrap_or_else(|| crate::ingest::providers::xai::DEFAULT_BASE_URL.to_string()),
            max_posts,
            window: Duration::from_secs(window_secs),
            topic_hint: get("TOPIC_HINT"),
            max_retries: parse_or("SEARCH_MAX_RETRIES", get("SEARCH_MAX_RETRIES"), 2)?,
        };

        // --- language model ---
        let llm_backend = match get("LLM_PROVIDER").as_deref().map(str::to_ascii_lowercase) {
            None => llm_backend(&get)?,
            Some(p) if p == "openai" || p == "xai" => llm_backend(&get)?,
            Some(p) if p == "mock" => LlmBackend::Mock,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "LLM_PROVIDER",
                    reason: format!("unsupported provider {other:?} (expected openai|mock)"),
                })
            }
        };
        let temperature: f32 = parse_or("LLM_TEMPERATURE", get("LLM_TEMPERATURE"), 0.2)?;
        if !(0.0..=2.0).contains(&temperature) {
            return Err(ConfigError::Invalid {
                key: "LLM_TEMPERATURE",
                reason: "must be within 0.0..=2.0".into(),
            });
        }
        let llm = LlmSettings {
            backend: llm_backend,
            model: get("LLM_MODEL")
                .or_else(|| get("AGENT_MODEL"))
                .unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
            base_url: get("LLM_BASE_URL").unwrap_or_else(|| DEFAULT_LLM_BASE_URL.to_string()),
            temperature,
            max_tokens: parse_or("LLM_MAX_TOKENS", get("LLM_MAX_TOKENS"), 1024)?,
            rules: load_rules(
                get("RULES_PATH")
                    .or_else(|| get("X_POLL_RULES_PATH"))
                    .or_else(|| get("X_POLL_PROMPT_PATH")),
            )?,
        };

        // --- process ---
        let handle_concurrency: usize =
            parse_or("HANDLE_CONCURRENCY", get("HANDLE_CONCURRENCY"), 1)?;
        if !(1..=16).contains(&handle_concurrency) {
            return Err(ConfigError::Invalid {
                key: "HANDLE_CONCURRENCY",
                reason: "must be within 1..=16".into(),
            });
        }
        let log_format = match get("LOG_FORMAT").as_deref().map(str::to_ascii_lowercase) {
            None => LogFormat::Compact,
            Some(f) if f == "compact" => LogFormat::Compact,
            Some(f) if f == "json" => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "LOG_FORMAT",
                    reason: format!("unsupported format {other:?} (expected compact|json)"),
                })
            }
        };
        let metrics_addr = match get("METRICS_ADDR") {
            None => None,
            Some(a) => Some(a.parse().map_err(|e| ConfigError::Invalid {
                key: "METRICS_ADDR",
                reason: format!("{e}"),
            })?),
        };

        Ok(Self {
            handles,
            poll_interval,
            search,
            llm,
            request_timeout: Duration::from_secs(timeout_secs),
            handle_concurrency,
            shutdown_grace: Duration::from_secs(grace_secs),
            run_once: get("RUN_ONCE").as_deref().is_some_and(truthy),
            log_format,
            metrics_addr,
        })
    }
}

fn xai_backend(get: &impl Fn(&str) -> Option<String>) -> Result<SearchBackend, ConfigError> {
    let api_key = get("XAI_API_KEY").ok_or(ConfigError::Missing { key: "XAI_API_KEY" })?;
    Ok(SearchBackend::Xai {
        api_key: Secret(api_key),
    })
}

fn llm_backend(get: &impl Fn(&str) -> Option<String>) -> Result<LlmBackend, ConfigError> {
    let api_key = get("LLM_API_KEY")
        .or_else(|| get("OPENAI_API_KEY"))
        .ok_or(ConfigError::Missing { key: "LLM_API_KEY" })?;
    Ok(LlmBackend::OpenAiCompat {
        api_key: Secret(api_key),
    })
}

/// Read the optional rules file once. A set but unreadable path is a startup error;
/// a blank file counts as no rules.
fn load_rules(path: Option<String>) -> Result<Option<String>, ConfigError> {
    let Some(path) = path else {
        return Ok(None);
    };
    let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::Invalid {
        key: "RULES_PATH",
        reason: format!("{path}: {e}"),
    })?;
    let text = text.trim();
    Ok((!text.is_empty()).then(|| text.to_string()))
}

fn parse_or<T>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(v) => v.parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: format!("{v:?}: {e}"),
        }),
    }
}

fn truthy(v: &str) -> bool {
    matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
