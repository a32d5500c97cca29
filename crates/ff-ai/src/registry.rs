//! Static model registry
//!
//! Declaration order is the order models are listed to users.

use ff_protocol::{ModelDescriptor, ProviderId};

use crate::credentials::{ApiKeyStore, CredentialStore};

/// Every selectable model
pub const MODELS: &[ModelDescriptor] = &[
    ModelDescriptor {
        id: "gpt-4-turbo",
        provider: ProviderId::OpenAI,
        display_name: "GPT-4 Turbo",
        description: "High-quality general model with a 128k context window",
        max_tokens: 4096,
        supports_code: true,
    },
    ModelDescriptor {
        id: "gpt-4o",
        provider: ProviderId::OpenAI,
        display_name: "GPT-4o",
        description: "Fast multimodal flagship model",
        max_tokens: 4096,
        supports_code: true,
    },
    ModelDescriptor {
        id: "gpt-4o-mini",
        provider: ProviderId::OpenAI,
        display_name: "GPT-4o mini",
        description: "Low-cost model for small edits",
        max_tokens: 4096,
        supports_code: true,
    },
    ModelDescriptor {
        id: "claude-3-5-sonnet-20241022",
        provider: ProviderId::Anthropic,
        display_name: "Claude 3.5 Sonnet",
        description: "Strong reasoning and code generation",
        max_tokens: 8192,
        supports_code: true,
    },
    ModelDescriptor {
        id: "claude-3-5-haiku-20241022",
        provider: ProviderId::Anthropic,
        display_name: "Claude 3.5 Haiku",
        description: "Fast, inexpensive Claude model",
        max_tokens: 8192,
        supports_code: true,
    },
    ModelDescriptor {
        id: "gemini-1.5-pro",
        provider: ProviderId::Google,
        display_name: "Gemini 1.5 Pro",
        description: "Long-context Gemini model",
        max_tokens: 8192,
        supports_code: true,
    },
    ModelDescriptor {
        id: "gemini-1.5-flash",
        provider: ProviderId::Google,
        display_name: "Gemini 1.5 Flash",
        description: "Lightweight Gemini model for quick drafts",
        max_tokens: 8192,
        supports_code: false,
    },
];

/// Look up a model by id
pub fn find_model(id: &str) -> Option<&'static ModelDescriptor> {
    MODELS.iter().find(|m| m.id == id)
}

/// Models whose provider has a configured credential
pub fn list_available_models<K: ApiKeyStore>(
    credentials: &CredentialStore<K>,
) -> Vec<ModelDescriptor> {
    let configured = credentials.configured_providers();
    MODELS
        .iter()
        .filter(|m| configured.contains(&m.provider))
        .copied()
        .collect()
}
