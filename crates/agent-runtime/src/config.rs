//! Provider Configuration
//!
//! Which backend to use and how to reach it. Read once from the process
//! environment, or built directly so tests never touch the environment.

use std::str::FromStr;
use std::time::Duration;

use agent_core::error::AgentError;

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
const DEFAULT_OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
const DEFAULT_OPENROUTER_MODEL: &str = "google/gemini-2.5-flash-lite";
const DEFAULT_OLLAMA_HOST: &str = "http://localhost";
const DEFAULT_OLLAMA_PORT: u16 = 11434;
const DEFAULT_OLLAMA_MODEL: &str = "llama3.2";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

/// The selectable model backends
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAi,
    #[default]
    OpenRouter,
    Ollama,
}

impl ProviderKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::OpenRouter => "openrouter",
            Self::Ollama => "ollama",
        }
    }

    /// Lenient selection: unset or unknown values fall back to OpenRouter.
    pub fn select(raw: Option<&str>) -> Self {
        let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
            return Self::default();
        };

        raw.parse().unwrap_or_else(|_| {
            tracing::warn!(
                value = %raw,
                fallback = Self::default().as_str(),
                "unknown LLM_PROVIDER"
            );
            Self::default()
        })
    }
}

impl FromStr for ProviderKind {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "openrouter" => Ok(Self::OpenRouter),
            "ollama" => Ok(Self::Ollama),
            other => Err(AgentError::Config(format!("unknown provider: {other}"))),
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings for an OpenAI-compatible chat-completions endpoint
#[derive(Clone)]
pub struct HttpBackendConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub default_model: String,
}

impl std::fmt::Debug for HttpBackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBackendConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

/// Ollama provider configuration
#[derive(Clone, Debug)]
pub struct OllamaConfig {
    /// Ollama host URL
    pub host: String,

    /// Ollama port
    pub port: u16,

    pub default_model: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_OLLAMA_HOST.into(),
            port: DEFAULT_OLLAMA_PORT,
            default_model: DEFAULT_OLLAMA_MODEL.into(),
        }
    }
}

/// Everything needed to resolve a [`Provider`](crate::provider::Provider)
#[derive(Clone, Debug)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub openai: HttpBackendConfig,
    pub openrouter: HttpBackendConfig,
    pub ollama: OllamaConfig,

    /// Per-request timeout for HTTP backends
    pub request_timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::default(),
            openai: HttpBackendConfig {
                api_key: None,
                base_url: DEFAULT_OPENAI_BASE_URL.into(),
                default_model: DEFAULT_OPENAI_MODEL.into(),
            },
            openrouter: HttpBackendConfig {
                api_key: None,
                base_url: DEFAULT_OPENROUTER_BASE_URL.into(),
                default_model: DEFAULT_OPENROUTER_MODEL.into(),
            },
            ollama: OllamaConfig::default(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl ProviderConfig {
    /// Create from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_owned()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        Self {
            kind: ProviderKind::select(var("LLM_PROVIDER").as_deref()),
            openai: HttpBackendConfig {
                api_key: var("OPENAI_API_KEY"),
                base_url: var("OPENAI_BASE_URL").unwrap_or(defaults.openai.base_url),
                default_model: var("OPENAI_DEFAULT_MODEL").unwrap_or(defaults.openai.default_model),
            },
            openrouter: HttpBackendConfig {
                api_key: var("OPENROUTER_API_KEY"),
                base_url: var("OPENROUTER_BASE_URL").unwrap_or(defaults.openrouter.base_url),
                default_model: var("OPENROUTER_MODEL_NAME")
                    .unwrap_or(defaults.openrouter.default_model),
            },
            ollama: OllamaConfig {
                host: var("OLLAMA_HOST").unwrap_or(defaults.ollama.host),
                port: var("OLLAMA_PORT")
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(defaults.ollama.port),
                default_model: var("OLLAMA_MODEL").unwrap_or(defaults.ollama.default_model),
            },
            request_timeout: var("LLM_REQUEST_TIMEOUT_SECS")
                .and_then(|s| s.parse().ok())
                .map_or(defaults.request_timeout, Duration::from_secs),
        }
    }

    #[must_use]
    pub const fn with_kind(mut self, kind: ProviderKind) -> Self {
        self.kind = kind;
        self
    }

    #[must_use]
    pub fn with_openai_key(mut self, key: impl Into<String>) -> Self {
        self.openai.api_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn with_openrouter_key(mut self, key: impl Into<String>) -> Self {
        self.openrouter.api_key = Some(key.into());
        self
    }

    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}
