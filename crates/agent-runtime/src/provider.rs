//! Provider Selection
//!
//! The closed set of backends a deployment can run against. The choice is
//! made once from [`ProviderConfig`] and never changes for the process.

use std::sync::{Arc, OnceLock};

#[cfg(not(feature = "ollama"))]
use agent_core::error::AgentError;
use agent_core::{
    error::Result,
    provider::{Model, ModelProvider, model_hint},
};

use crate::config::{ProviderConfig, ProviderKind};
#[cfg(feature = "ollama")]
use crate::ollama::OllamaBackend;
use crate::openai::ChatCompletionsBackend;

/// A resolved model backend
#[derive(Clone, Debug)]
pub enum Provider {
    OpenAi(ChatCompletionsBackend),
    OpenRouter(ChatCompletionsBackend),
    #[cfg(feature = "ollama")]
    Ollama(OllamaBackend),
}

impl Provider {
    pub const fn kind(&self) -> ProviderKind {
        match self {
            Self::OpenAi(_) => ProviderKind::OpenAi,
            Self::OpenRouter(_) => ProviderKind::OpenRouter,
            #[cfg(feature = "ollama")]
            Self::Ollama(_) => ProviderKind::Ollama,
        }
    }

    /// The model used when an agent names none
    pub fn default_model(&self) -> &str {
        match self {
            Self::OpenAi(backend) | Self::OpenRouter(backend) => backend.default_model(),
            #[cfg(feature = "ollama")]
            Self::Ollama(backend) => backend.default_model(),
        }
    }
}

impl ModelProvider for Provider {
    fn name(&self) -> &str {
        self.kind().as_str()
    }

    fn get_model(&self, name_hint: Option<&str>) -> Result<Arc<dyn Model>> {
        let name = model_hint(name_hint).unwrap_or_else(|| self.default_model());

        Ok(match self {
            Self::OpenAi(backend) | Self::OpenRouter(backend) => Arc::new(backend.model(name)),
            #[cfg(feature = "ollama")]
            Self::Ollama(backend) => Arc::new(backend.model(name)),
        })
    }
}

/// Build the provider a configuration selects.
///
/// Missing credentials for the selected backend are a `Config` error.
pub fn resolve(config: &ProviderConfig) -> Result<Provider> {
    let provider = match config.kind {
        ProviderKind::OpenAi => Provider::OpenAi(ChatCompletionsBackend::new(
            ProviderKind::OpenAi.as_str(),
            &config.openai,
            config.request_timeout,
        )?),
        ProviderKind::OpenRouter => Provider::OpenRouter(ChatCompletionsBackend::new(
            ProviderKind::OpenRouter.as_str(),
            &config.openrouter,
            config.request_timeout,
        )?),
        #[cfg(feature = "ollama")]
        ProviderKind::Ollama => Provider::Ollama(OllamaBackend::from_config(config.ollama.clone())),
        #[cfg(not(feature = "ollama"))]
        ProviderKind::Ollama => {
            return Err(AgentError::Config(
                "ollama provider requested but the `ollama` feature is disabled".into(),
            ));
        }
    };

    tracing::info!(
        provider = %provider.kind(),
        default_model = %provider.default_model(),
        "model provider resolved"
    );
    Ok(provider)
}

static PROVIDER: OnceLock<Arc<Provider>> = OnceLock::new();

/// The process-wide provider, resolved from the environment on first use.
///
/// A failed resolution is not cached; the next call tries again.
pub fn global_provider() -> Result<Arc<Provider>> {
    if let Some(provider) = PROVIDER.get() {
        return Ok(Arc::clone(provider));
    }

    let provider = Arc::new(resolve(&ProviderConfig::from_env())?);
    Ok(Arc::clone(PROVIDER.get_or_init(|| provider)))
}
