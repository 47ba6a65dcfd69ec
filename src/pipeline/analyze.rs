//! Language-model analysis: document text in, JSON event array out.
//!
//! The analyzer sends a single prompt (see [`crate::prompts`]) and checks
//! only the *shape* of the reply: after trimming it must start with `[` and
//! end with `]`. Field-level decoding is left to the event sink, so a payload
//! that passes here can still fail there with a JSON error.
//!
//! The model sits behind the [`LanguageModel`] trait. Production code uses
//! [`ProviderModel`], a thin adapter over an edgequake-llm provider; tests
//! substitute a scripted implementation.

use crate::config::PipelineConfig;
use crate::error::{AnalysisFailure, PipelineError};
use crate::model::EventPayload;
use crate::prompts::event_extraction_prompt;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

/// Default provider when none is configured.
pub const DEFAULT_PROVIDER: &str = "gemini";

/// Default model when none is configured.
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

/// A text-in, text-out generative model.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Send `prompt` and return the raw response text.
    ///
    /// Errors are transport or provider messages (network, auth, rate limit).
    async fn complete(&self, prompt: &str) -> Result<String, String>;
}

/// [`LanguageModel`] backed by an edgequake-llm provider.
pub struct ProviderModel {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
}

impl ProviderModel {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &PipelineConfig) -> Self {
        Self {
            provider,
            options: build_options(config),
        }
    }
}

#[async_trait]
impl LanguageModel for ProviderModel {
    async fn complete(&self, prompt: &str) -> Result<String, String> {
        let messages = vec![ChatMessage::user(prompt)];
        let response = self
            .provider
            .chat(&messages, Some(&self.options))
            .await
            .map_err(|e| e.to_string())?;
        debug!(
            "Model usage: {} input tokens, {} output tokens",
            response.prompt_tokens, response.completion_tokens
        );
        Ok(response.content)
    }
}

/// Build `CompletionOptions` from the pipeline config.
fn build_options(config: &PipelineConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

/// Resolve the language model, from most-specific to least-specific.
///
/// 1. **Pre-built model** (`config.provider`): used as-is.
/// 2. **Named provider** (`config.provider_name`, default model if unset).
/// 3. **Default provider** ([`DEFAULT_PROVIDER`]) when its API key variable is
///    present, otherwise whatever `ProviderFactory::from_env` detects.
pub fn resolve_model(config: &PipelineConfig) -> Result<Arc<dyn LanguageModel>, PipelineError> {
    if let Some(ref model) = config.provider {
        return Ok(Arc::clone(model));
    }

    let model_name = config.model.as_deref().unwrap_or(DEFAULT_MODEL);

    if let Some(ref name) = config.provider_name {
        let provider = create_provider(name, model_name)?;
        return Ok(Arc::new(ProviderModel::new(provider, config)));
    }

    if std::env::var("GEMINI_API_KEY").is_ok_and(|k| !k.is_empty()) {
        let provider = create_provider(DEFAULT_PROVIDER, model_name)?;
        return Ok(Arc::new(ProviderModel::new(provider, config)));
    }

    let (provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| PipelineError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set GEMINI_API_KEY (or another provider key) or pass --provider.\n\
                Error: {e}"
            ),
        })?;
    Ok(Arc::new(ProviderModel::new(provider, config)))
}

fn create_provider(name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, PipelineError> {
    ProviderFactory::create_llm_provider(name, model).map_err(|e| {
        PipelineError::ProviderNotConfigured {
            provider: name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Turns document text into a bracket-checked [`EventPayload`].
#[derive(Clone)]
pub struct Analyzer {
    model: Arc<dyn LanguageModel>,
    timeout: Duration,
}

impl Analyzer {
    pub fn new(model: Arc<dyn LanguageModel>, config: &PipelineConfig) -> Self {
        Self {
            model,
            timeout: Duration::from_secs(config.api_timeout_secs),
        }
    }

    /// Ask the model for the events in `text`.
    ///
    /// No retries: a failed or malformed reply ends the pipeline run.
    pub async fn analyze(&self, text: &str) -> Result<EventPayload, AnalysisFailure> {
        let prompt = event_extraction_prompt(text);
        let start = Instant::now();

        let raw = match timeout(self.timeout, self.model.complete(&prompt)).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(detail)) => {
                warn!("Model invocation failed: {}", detail);
                return Err(AnalysisFailure::ModelInvocationError { detail });
            }
            Err(_) => {
                let detail = format!(
                    "model call timed out after {}s",
                    self.timeout.as_secs()
                );
                warn!("{}", detail);
                return Err(AnalysisFailure::ModelInvocationError { detail });
            }
        };

        debug!("Model replied in {:?} ({} chars)", start.elapsed(), raw.len());

        match EventPayload::from_model_output(&raw) {
            Some(payload) => {
                info!("Model returned a JSON array ({} chars)", payload.as_str().len());
                Ok(payload)
            }
            None => {
                warn!("Model reply is not a bare JSON array");
                Err(AnalysisFailure::MalformedModelOutput {
                    raw_response: raw.trim().to_string(),
                })
            }
        }
    }
}
