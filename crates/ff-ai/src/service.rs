//! The AI service context: credentials, selection and request dispatch

use std::sync::{Mutex, PoisonError, RwLock};

use chrono::Utc;
use ff_protocol::{
    CodeType, GenerationRequest, ModelDescriptor, ProviderId, SelectionState, UsageStats,
};
use secrecy::SecretString;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::AiConfig;
use crate::credentials::{ApiKeyStore, CredentialStore, KeychainStore};
use crate::error::{AiError, Result};
use crate::output::{is_fenced, strip_code_fences};
use crate::prompts::{build_code_prompt, build_docs_prompt, CODE_SYSTEM_PROMPT, DOCS_SYSTEM_PROMPT};
use crate::providers::{backend_for, Prompt, TokenUsage};
use crate::registry::{self, find_model};
use crate::selection::{FileSelectionStore, SelectionStore};

const CODE_TEMPERATURE: f32 = 0.2;
const DOCS_TEMPERATURE: f32 = 0.3;

/// Model selection and generation dispatch
///
/// Construct one per process and hand it to whatever needs to generate; all
/// methods take `&self`, so it can be shared behind an `Arc`.
pub struct AiService<K: ApiKeyStore, S: SelectionStore> {
    config: AiConfig,
    http: reqwest::Client,
    credentials: CredentialStore<K>,
    selection_store: S,
    selection: RwLock<Option<SelectionState>>,
    usage: Mutex<UsageStats>,
}

impl<K: ApiKeyStore, S: SelectionStore> std::fmt::Debug for AiService<K, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AiService")
            .field("credentials", &self.credentials)
            .field("selection", &self.selection())
            .finish_non_exhaustive()
    }
}

impl AiService<KeychainStore, FileSelectionStore> {
    /// Service backed by the OS keychain and the settings file under `data_dir`
    pub fn from_config(config: AiConfig) -> Result<Self> {
        let keys = KeychainStore::with_service(config.keyring_service.clone());
        let credentials = CredentialStore::load(keys, config.env_fallback);
        let selection_store = FileSelectionStore::new(config.settings_path());
        Self::new(config, credentials, selection_store)
    }
}

impl<K: ApiKeyStore, S: SelectionStore> AiService<K, S> {
    /// Create a service and restore the persisted selection
    ///
    /// A persisted selection naming a model that is no longer registered is
    /// ignored (and left on disk until the next successful selection).
    pub fn new(config: AiConfig, credentials: CredentialStore<K>, selection_store: S) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build()?;

        let restored = match selection_store.load() {
            Ok(Some(state)) => match find_model(&state.model_id) {
                Some(model) if model.provider == state.provider => {
                    info!(model_id = %state.model_id, provider = %state.provider, "Restored model selection");
                    Some(state)
                }
                _ => {
                    warn!(model_id = %state.model_id, "Persisted model is not registered, starting unselected");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "Failed to read persisted selection, starting unselected");
                None
            }
        };

        Ok(Self {
            config,
            http,
            credentials,
            selection_store,
            selection: RwLock::new(restored),
            usage: Mutex::new(UsageStats::default()),
        })
    }

    /// Active configuration
    pub fn config(&self) -> &AiConfig {
        &self.config
    }

    /// Underlying credential store
    pub fn credentials(&self) -> &CredentialStore<K> {
        &self.credentials
    }

    /// Stored key for a provider
    pub fn get_api_key(&self, provider: ProviderId) -> Option<SecretString> {
        self.credentials.get_api_key(provider)
    }

    /// Store or overwrite a provider key
    pub fn set_api_key(&self, provider: ProviderId, api_key: &str) -> Result<()> {
        self.credentials.set_api_key(provider, api_key)?;
        Ok(())
    }

    /// Remove a provider key
    ///
    /// The current selection is kept; generation fails with
    /// [`AiError::ProviderNotConfigured`] until a key is set again.
    pub fn remove_api_key(&self, provider: ProviderId) -> Result<()> {
        self.credentials.remove_api_key(provider)?;
        if self.selection().is_some_and(|s| s.provider == provider) {
            warn!(%provider, "Removed the key of the selected provider");
        }
        Ok(())
    }

    /// Models whose provider has a configured key, in registry order
    pub fn list_available_models(&self) -> Vec<ModelDescriptor> {
        registry::list_available_models(&self.credentials)
    }

    /// Current selection, if any
    pub fn selection(&self) -> Option<SelectionState> {
        self.selection
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Registry entry of the current selection
    pub fn current_model(&self) -> Option<ModelDescriptor> {
        self.selection()
            .and_then(|s| find_model(&s.model_id).copied())
    }

    /// Select a model
    ///
    /// Fails without touching the selection if the model is unknown, its
    /// provider has no key, or the selection cannot be persisted.
    #[instrument(skip(self))]
    pub fn set_model(&self, model_id: &str) -> Result<ModelDescriptor> {
        let model = *find_model(model_id).ok_or_else(|| AiError::UnknownModel(model_id.to_string()))?;

        if !self.credentials.is_configured(model.provider) {
            return Err(AiError::ProviderNotConfigured {
                provider: model.provider,
            });
        }

        let state = SelectionState::for_model(&model);
        self.selection_store.save(&state)?;
        *self
            .selection
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(state);

        info!(provider = %model.provider, "Selected model");
        Ok(model)
    }

    /// Accumulated token usage
    pub fn usage_stats(&self) -> UsageStats {
        self.usage
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Generate code for a request with the selected model
    ///
    /// Returns the first completion with any enclosing code fence removed.
    #[instrument(skip(self, request), fields(request_id = %Uuid::new_v4(), code_type = %request.code_type))]
    pub async fn generate_code(&self, request: &GenerationRequest) -> Result<String> {
        request.validate().map_err(AiError::InvalidRequest)?;
        let (model, api_key) = self.resolve()?;
        if !model.supports_code {
            warn!(model = model.id, "Selected model is not tuned for code generation");
        }

        let options = request.options.clone().unwrap_or_default();
        let prompt = Prompt {
            system: CODE_SYSTEM_PROMPT.to_string(),
            user: build_code_prompt(request),
            temperature: Some(options.temperature.unwrap_or(CODE_TEMPERATURE)),
            max_tokens: options.max_tokens.unwrap_or(model.max_tokens),
        };

        let text = self.dispatch(&model, &api_key, &prompt).await?;
        Ok(strip_code_fences(&text))
    }

    /// Generate Markdown documentation for a piece of code
    #[instrument(skip(self, code), fields(request_id = %Uuid::new_v4()))]
    pub async fn generate_documentation(&self, code: &str, code_type: CodeType) -> Result<String> {
        if code.trim().is_empty() {
            return Err(AiError::InvalidRequest("code cannot be empty".to_string()));
        }
        let (model, api_key) = self.resolve()?;

        let prompt = Prompt {
            system: DOCS_SYSTEM_PROMPT.to_string(),
            user: build_docs_prompt(code, code_type),
            temperature: Some(DOCS_TEMPERATURE),
            max_tokens: model.max_tokens,
        };

        let text = self.dispatch(&model, &api_key, &prompt).await?;
        if is_fenced(&text) {
            Ok(strip_code_fences(&text))
        } else {
            Ok(text.trim().to_string())
        }
    }

    /// Selected model and its provider key
    fn resolve(&self) -> Result<(ModelDescriptor, SecretString)> {
        let selection = self.selection().ok_or(AiError::NoModelSelected)?;
        let model = find_model(&selection.model_id)
            .copied()
            .ok_or_else(|| AiError::UnknownModel(selection.model_id.clone()))?;
        let api_key = self
            .credentials
            .get_api_key(model.provider)
            .ok_or(AiError::ProviderNotConfigured {
                provider: model.provider,
            })?;
        Ok((model, api_key))
    }

    async fn dispatch(
        &self,
        model: &ModelDescriptor,
        api_key: &SecretString,
        prompt: &Prompt,
    ) -> Result<String> {
        debug!(model = model.id, provider = %model.provider, "Dispatching generation request");
        let completion = backend_for(model.provider)
            .complete(
                &self.http,
                self.config.base_url(model.provider),
                api_key,
                model.id,
                prompt,
            )
            .await?;

        self.record_usage(completion.usage);
        info!(
            model = model.id,
            tokens = completion.usage.map(|u| u.total_tokens).unwrap_or(0),
            "Generation completed"
        );
        Ok(completion.text)
    }

    fn record_usage(&self, usage: Option<TokenUsage>) {
        let mut stats = self.usage.lock().unwrap_or_else(PoisonError::into_inner);
        stats.requests = stats.requests.saturating_add(1);
        if let Some(u) = usage {
            stats.prompt_tokens = stats.prompt_tokens.saturating_add(u.prompt_tokens);
            stats.completion_tokens = stats.completion_tokens.saturating_add(u.completion_tokens);
            stats.total_tokens = stats.total_tokens.saturating_add(u.total_tokens);
        }
        stats.last_request_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::MemoryKeyStore;
    use crate::selection::MemorySelectionStore;
    use pretty_assertions::assert_eq;

    type TestService = AiService<MemoryKeyStore, MemorySelectionStore>;

    fn service_with(keys: &[(ProviderId, &str)], selection: MemorySelectionStore) -> TestService {
        let credentials = CredentialStore::load_with_env(
            MemoryKeyStore::with_keys(keys.iter().copied()),
            false,
            |_| None,
        );
        match AiService::new(AiConfig::default(), credentials, selection) {
            Ok(service) => service,
            Err(e) => panic!("service construction failed: {e}"),
        }
    }

    #[test]
    fn set_model_persists_selection() -> anyhow::Result<()> {
        let store = MemorySelectionStore::default();
        let service = service_with(&[(ProviderId::OpenAI, "test-openai-key")], store.clone());

        let model = service.set_model("gpt-4-turbo")?;

        assert_eq!(model.provider, ProviderId::OpenAI);
        let expected = SelectionState {
            model_id: "gpt-4-turbo".to_string(),
            provider: ProviderId::OpenAI,
        };
        assert_eq!(store.load()?, Some(expected.clone()));
        assert_eq!(service.selection(), Some(expected));
        Ok(())
    }

    #[test]
    fn unconfigured_provider_leaves_selection_untouched() -> anyhow::Result<()> {
        let store = MemorySelectionStore::default();
        let service = service_with(&[(ProviderId::OpenAI, "k")], store.clone());
        service.set_model("gpt-4o")?;

        let err = service.set_model("gemini-1.5-pro").err();
        assert!(matches!(
            err,
            Some(AiError::ProviderNotConfigured {
                provider: ProviderId::Google
            })
        ));
        assert_eq!(service.current_model().map(|m| m.id), Some("gpt-4o"));
        assert_eq!(store.load()?.map(|s| s.model_id), Some("gpt-4o".to_string()));
        Ok(())
    }

    #[test]
    fn unknown_model_is_rejected() {
        let service = service_with(&[(ProviderId::OpenAI, "k")], MemorySelectionStore::default());
        assert!(matches!(service.set_model("gpt-5"), Err(AiError::UnknownModel(_))));
        assert!(service.selection().is_none());
    }

    #[test]
    fn restores_registered_selection() {
        let store = MemorySelectionStore::with_state(SelectionState {
            model_id: "claude-3-5-sonnet-20241022".to_string(),
            provider: ProviderId::Anthropic,
        });
        let service = service_with(&[], store);
        assert_eq!(
            service.current_model().map(|m| m.id),
            Some("claude-3-5-sonnet-20241022")
        );
    }

    #[test]
    fn ignores_stale_selection() {
        let store = MemorySelectionStore::with_state(SelectionState {
            model_id: "gpt-4-turbo".to_string(),
            provider: ProviderId::Anthropic,
        });
        let service = service_with(&[], store);
        assert!(service.selection().is_none());
    }

    #[tokio::test]
    async fn generate_without_selection_fails() {
        let service = service_with(&[(ProviderId::OpenAI, "k")], MemorySelectionStore::default());
        let request = GenerationRequest::new(CodeType::Component, "React", "Greeting");
        let result = service.generate_code(&request).await;
        assert!(matches!(result, Err(AiError::NoModelSelected)));
        assert_eq!(service.usage_stats().requests, 0);
    }

    #[tokio::test]
    async fn invalid_request_fails_before_dispatch() -> anyhow::Result<()> {
        let service = service_with(&[(ProviderId::OpenAI, "k")], MemorySelectionStore::default());
        service.set_model("gpt-4o")?;
        let request = GenerationRequest::new(CodeType::Component, "React", "   ");
        let result = service.generate_code(&request).await;
        assert!(matches!(result, Err(AiError::InvalidRequest(_))));
        Ok(())
    }

    #[test]
    fn list_available_models_follows_credentials() -> anyhow::Result<()> {
        let service = service_with(&[], MemorySelectionStore::default());
        assert!(service.list_available_models().is_empty());

        service.set_api_key(ProviderId::Anthropic, "sk-ant")?;
        let providers: Vec<_> = service
            .list_available_models()
            .iter()
            .map(|m| m.provider)
            .collect();
        assert!(!providers.is_empty());
        assert!(providers.iter().all(|p| *p == ProviderId::Anthropic));
        Ok(())
    }

    #[test]
    fn usage_totals_saturate() {
        let service = service_with(&[], MemorySelectionStore::default());
        let huge = TokenUsage {
            prompt_tokens: u64::MAX - 1,
            completion_tokens: 1,
            total_tokens: u64::MAX,
        };
        service.record_usage(Some(huge));
        service.record_usage(Some(huge));

        let stats = service.usage_stats();
        assert_eq!(stats.requests, 2);
        assert_eq!(stats.prompt_tokens, u64::MAX);
        assert_eq!(stats.completion_tokens, 2);
        assert_eq!(stats.total_tokens, u64::MAX);
    }
}
