//! The provider boundary: ask one question about one document.
//!
//! [`Answerer`] is the only seam through which the crate talks to the
//! network during dispatch. [`LlmAnswerer`] implements it on top of an
//! `edgequake-llm` provider; tests implement it with in-process stubs.
//!
//! Provider failures are classified into [`ProviderError`] variants so the
//! retry loop can tell a 429 (retry later) from a revoked key (give up now).
//!
//! ## Retry Strategy
//!
//! Rate limits and 5xx errors are transient and frequent under concurrent
//! load. Exponential backoff (`retry_backoff_ms * 2^(attempt-1)`, capped at
//! `max_backoff_ms`) avoids a thundering herd: with 500 ms base and 3
//! retries the wait sequence is 500 ms → 1 s → 2 s. A server-supplied
//! retry-after delay wins when it is longer, up to the same `max_backoff_ms`
//! cap.

use crate::config::DatasetConfig;
use crate::error::{Pdf2QaError, ProviderError};
use crate::prompts::{build_question_prompt, DEFAULT_SYSTEM_PROMPT};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// Model used when a provider is named but no model is given.
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Answers a question about a document's text.
#[async_trait]
pub trait Answerer: Send + Sync {
    /// Provider name written to every result row.
    fn provider(&self) -> &str;

    /// Model used when the batch does not name one.
    fn default_model(&self) -> &str;

    async fn ask(
        &self,
        document_text: &str,
        question: &str,
        model: &str,
    ) -> Result<String, ProviderError>;
}

/// [`Answerer`] backed by an `edgequake-llm` provider.
pub struct LlmAnswerer {
    provider: Arc<dyn LLMProvider>,
    /// Set when the provider was created by name, so other models of the
    /// same provider can be instantiated on demand.
    provider_name: Option<String>,
    system_prompt: String,
    options: CompletionOptions,
    by_model: Mutex<HashMap<String, Arc<dyn LLMProvider>>>,
}

impl LlmAnswerer {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &DatasetConfig) -> Self {
        Self {
            provider,
            provider_name: config.provider_name.clone(),
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            options: build_options(config),
            by_model: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve the provider from `config` (see [`resolve_provider`]).
    pub fn from_config(config: &DatasetConfig) -> Result<Self, Pdf2QaError> {
        let provider = resolve_provider(config)?;
        Ok(Self::new(provider, config))
    }

    fn provider_for(&self, model: &str) -> Result<Arc<dyn LLMProvider>, ProviderError> {
        if model.is_empty() || model == self.provider.model() {
            return Ok(Arc::clone(&self.provider));
        }
        let Some(name) = self.provider_name.as_deref() else {
            debug!(
                "Model '{}' requested but provider was pre-built; using '{}'",
                model,
                self.provider.model()
            );
            return Ok(Arc::clone(&self.provider));
        };

        let mut cache = self
            .by_model
            .lock()
            .map_err(|_| ProviderError::Transient("provider cache poisoned".into()))?;
        if let Some(p) = cache.get(model) {
            return Ok(Arc::clone(p));
        }
        let created = ProviderFactory::create_llm_provider(name, model)
            .map_err(|e| ProviderError::InvalidRequest(format!("model '{}': {}", model, e)))?;
        cache.insert(model.to_string(), Arc::clone(&created));
        Ok(created)
    }
}

#[async_trait]
impl Answerer for LlmAnswerer {
    fn provider(&self) -> &str {
        self.provider.name()
    }

    fn default_model(&self) -> &str {
        self.provider.model()
    }

    async fn ask(
        &self,
        document_text: &str,
        question: &str,
        model: &str,
    ) -> Result<String, ProviderError> {
        let provider = self.provider_for(model)?;
        let messages = vec![
            ChatMessage::system(&self.system_prompt),
            ChatMessage::user(build_question_prompt(document_text, question)),
        ];

        match provider.chat(&messages, Some(&self.options)).await {
            Ok(response) => {
                debug!(
                    "{}: {} input tokens, {} output tokens",
                    provider.model(),
                    response.prompt_tokens,
                    response.completion_tokens
                );
                Ok(response.content)
            }
            Err(e) => Err(classify_error_message(provider.name(), &e.to_string())),
        }
    }
}

/// Build `CompletionOptions` from the dataset config.
fn build_options(config: &DatasetConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

// ── Error classification ─────────────────────────────────────────────────

static RE_RETRY_AFTER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)retry[- _]?after[^0-9]{0,12}(\d+)").expect("static regex")
});

static RE_STATUS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(400|401|403|404|408|429|5\d\d)\b").expect("static regex"));

/// Classify a provider error message as transient or permanent.
///
/// Providers surface HTTP failures as text, so this looks for a status code
/// first and falls back to well-known phrases. Anything unrecognised is
/// treated as transient: retrying an unknown failure is cheap, dropping a
/// recoverable one loses a row.
pub fn classify_error_message(provider: &str, message: &str) -> ProviderError {
    let lower = message.to_lowercase();
    let status = RE_STATUS
        .captures(message)
        .and_then(|c| c[1].parse::<u16>().ok());

    let rate_limited = status == Some(429)
        || lower.contains("rate limit")
        || lower.contains("rate_limit")
        || lower.contains("too many requests");
    if rate_limited {
        let retry_after_secs = RE_RETRY_AFTER
            .captures(message)
            .and_then(|c| c[1].parse().ok());
        return ProviderError::RateLimited {
            provider: provider.to_string(),
            retry_after_secs,
        };
    }

    let auth = matches!(status, Some(401) | Some(403))
        || lower.contains("unauthorized")
        || lower.contains("forbidden")
        || lower.contains("authentication")
        || lower.contains("api key")
        || lower.contains("api_key");
    if auth {
        return ProviderError::Auth {
            provider: provider.to_string(),
            detail: message.to_string(),
        };
    }

    let invalid = matches!(status, Some(400) | Some(404))
        || lower.contains("invalid request")
        || lower.contains("invalid_request")
        || lower.contains("context length")
        || lower.contains("context_length")
        || lower.contains("content filter")
        || lower.contains("content_filter")
        || lower.contains("model not found");
    if invalid {
        return ProviderError::InvalidRequest(message.to_string());
    }

    ProviderError::Transient(message.to_string())
}

// ── Retry loop ───────────────────────────────────────────────────────────

/// Ask with per-call timeout and retry on transient failures.
///
/// `on_retry(attempt, error)` is called before each backoff sleep. Returns
/// the raw answer, or the last error once retries are exhausted or a
/// permanent error occurs.
pub async fn ask_with_retry<F>(
    answerer: &dyn Answerer,
    document_text: &str,
    question: &str,
    model: &str,
    config: &DatasetConfig,
    mut on_retry: F,
) -> Result<String, ProviderError>
where
    F: FnMut(u32, &ProviderError) + Send,
{
    let call_timeout = Duration::from_secs(config.api_timeout_secs);
    let mut attempt: u32 = 0;

    loop {
        let outcome = match timeout(call_timeout, answerer.ask(document_text, question, model)).await
        {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout {
                secs: config.api_timeout_secs,
            }),
        };

        let err = match outcome {
            Ok(answer) => return Ok(answer),
            Err(e) => e,
        };

        if !err.is_transient() || attempt >= config.max_retries {
            return Err(err);
        }

        attempt += 1;
        let backoff = retry_delay_ms(config, attempt, &err);
        warn!(
            "Retry {}/{} after {}ms — {}",
            attempt, config.max_retries, backoff, err
        );
        on_retry(attempt, &err);
        sleep(Duration::from_millis(backoff)).await;
    }
}

/// Milliseconds to wait before retry `attempt` (1-based) after `err`.
fn retry_delay_ms(config: &DatasetConfig, attempt: u32, err: &ProviderError) -> u64 {
    let server_hint = err.retry_after_secs().unwrap_or(0).saturating_mul(1000);
    config
        .backoff_for_attempt(attempt)
        .max(server_hint)
        .min(config.max_backoff_ms)
}

// ── Provider resolution ──────────────────────────────────────────────────

/// Instantiate a named provider with the given model.
fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, Pdf2QaError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        Pdf2QaError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`) — used as-is. Useful in
///    tests or when the caller needs custom middleware.
/// 2. **Named provider + model** (`config.provider_name`) — created with
///    [`ProviderFactory::create_llm_provider`], which reads the matching API
///    key from the environment.
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`).
/// 4. **`OPENAI_API_KEY`** — OpenAI wins when its key is present, so users
///    with several keys get a predictable default.
/// 5. **Full auto-detection** (`ProviderFactory::from_env`).
pub fn resolve_provider(config: &DatasetConfig) -> Result<Arc<dyn LLMProvider>, Pdf2QaError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
            return create_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| Pdf2QaError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}
