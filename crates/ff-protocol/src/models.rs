use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Supported LLM providers
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    /// OpenAI (api.openai.com)
    OpenAI,
    /// Anthropic (api.anthropic.com)
    Anthropic,
    /// Google Gemini, reached through its OpenAI-compatible endpoint
    Google,
}

impl ProviderId {
    /// Every provider, in the order they are listed to users
    pub const ALL: [ProviderId; 3] = [ProviderId::OpenAI, ProviderId::Anthropic, ProviderId::Google];

    /// Stable lowercase identifier, also used as the credential account suffix
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::OpenAI => "openai",
            ProviderId::Anthropic => "anthropic",
            ProviderId::Google => "google",
        }
    }

    /// Human-readable vendor name
    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderId::OpenAI => "OpenAI",
            ProviderId::Anthropic => "Anthropic",
            ProviderId::Google => "Google",
        }
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string does not name a known provider
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown provider: {0}")]
pub struct UnknownProvider(pub String);

impl FromStr for ProviderId {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(ProviderId::OpenAI),
            "anthropic" => Ok(ProviderId::Anthropic),
            "google" => Ok(ProviderId::Google),
            _ => Err(UnknownProvider(s.to_string())),
        }
    }
}

/// Static metadata for a selectable generation model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, JsonSchema)]
pub struct ModelDescriptor {
    /// Model identifier sent to the provider (e.g. "gpt-4-turbo")
    pub id: &'static str,
    /// Provider that serves the model
    pub provider: ProviderId,
    /// Human-readable name
    pub display_name: &'static str,
    /// Short description shown next to the name
    pub description: &'static str,
    /// Completion token ceiling used when a request does not set one
    pub max_tokens: u32,
    /// Whether the model is recommended for code generation
    pub supports_code: bool,
}

/// Persisted model/provider pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SelectionState {
    /// Selected model identifier
    pub model_id: String,
    /// Provider owning the selected model
    pub provider: ProviderId,
}

impl SelectionState {
    /// Build a selection from a registry entry
    pub fn for_model(model: &ModelDescriptor) -> Self {
        Self {
            model_id: model.id.to_string(),
            provider: model.provider,
        }
    }
}

/// Kind of artifact a generation request asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CodeType {
    /// Reusable UI component
    Component,
    /// Full page or screen
    Page,
    /// HTTP API endpoint
    Api,
    /// Reusable state/logic hook
    Hook,
    /// Helper or utility module
    Utility,
    /// Automated tests
    Test,
    /// Complete application scaffold
    FullApp,
}

impl CodeType {
    /// Every code type, in menu order
    pub const ALL: [CodeType; 7] = [
        CodeType::Component,
        CodeType::Page,
        CodeType::Api,
        CodeType::Hook,
        CodeType::Utility,
        CodeType::Test,
        CodeType::FullApp,
    ];

    /// Stable snake_case identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            CodeType::Component => "component",
            CodeType::Page => "page",
            CodeType::Api => "api",
            CodeType::Hook => "hook",
            CodeType::Utility => "utility",
            CodeType::Test => "test",
            CodeType::FullApp => "full_app",
        }
    }

    /// Phrase used when describing the artifact in a prompt
    pub fn describe(&self) -> &'static str {
        match self {
            CodeType::Component => "a reusable UI component",
            CodeType::Page => "a complete page",
            CodeType::Api => "an API endpoint",
            CodeType::Hook => "a custom hook",
            CodeType::Utility => "a utility module",
            CodeType::Test => "a test suite",
            CodeType::FullApp => "a full application",
        }
    }
}

impl std::fmt::Display for CodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string does not name a known code type
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown code type: {0}")]
pub struct UnknownCodeType(pub String);

impl FromStr for CodeType {
    type Err = UnknownCodeType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        CodeType::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| UnknownCodeType(s.to_string()))
    }
}

/// Sampling options for a generation request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct GenerationOptions {
    /// Sampling temperature (0.0 to 2.0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Maximum completion tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Extra instructions appended to the prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_instructions: Option<String>,
}

/// A code-generation request
///
/// Deserialization rejects unknown fields so malformed payloads fail at the
/// boundary instead of being silently ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct GenerationRequest {
    /// What to generate
    #[serde(rename = "type")]
    pub code_type: CodeType,
    /// Target framework (e.g. "React", "Next.js", "Express")
    pub framework: String,
    /// Free-text description of what the code must do
    pub requirements: String,
    /// Target language (e.g. "typescript")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Feature tags to include (e.g. "auth", "testing")
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub features: Vec<String>,
    /// Existing code or repository context to take into account
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Sampling options
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<GenerationOptions>,
}

impl GenerationRequest {
    /// Create a request with the three required fields
    pub fn new(
        code_type: CodeType,
        framework: impl Into<String>,
        requirements: impl Into<String>,
    ) -> Self {
        Self {
            code_type,
            framework: framework.into(),
            requirements: requirements.into(),
            language: None,
            features: Vec::new(),
            context: None,
            options: None,
        }
    }

    /// Set the target language
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Add a feature tag
    pub fn with_feature(mut self, feature: impl Into<String>) -> Self {
        self.features.push(feature.into());
        self
    }

    /// Attach existing code or repository context
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Set sampling options
    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// Validate the request before it is dispatched
    pub fn validate(&self) -> Result<(), String> {
        if self.framework.trim().is_empty() {
            return Err("framework cannot be empty".to_string());
        }
        if self.requirements.trim().is_empty() {
            return Err("requirements cannot be empty".to_string());
        }
        if let Some(t) = self.options.as_ref().and_then(|o| o.temperature) {
            if !(0.0..=2.0).contains(&t) {
                return Err(format!("temperature out of range: {t}"));
            }
        }
        Ok(())
    }
}

/// Token usage accumulated across requests
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct UsageStats {
    /// Successful generation requests
    pub requests: u64,
    /// Prompt tokens billed
    pub prompt_tokens: u64,
    /// Completion tokens billed
    pub completion_tokens: u64,
    /// Total tokens billed
    pub total_tokens: u64,
    /// Time of the most recent successful request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_request_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn provider_id_round_trips_through_str() {
        for p in ProviderId::ALL {
            assert_eq!(p.as_str().parse::<ProviderId>(), Ok(p));
        }
        assert_eq!("OpenAI".parse::<ProviderId>(), Ok(ProviderId::OpenAI));
        assert!("mistral".parse::<ProviderId>().is_err());
    }

    #[test]
    fn provider_id_serializes_lowercase() -> Result<(), serde_json::Error> {
        assert_eq!(serde_json::to_value(ProviderId::Anthropic)?, json!("anthropic"));
        Ok(())
    }

    #[test]
    fn code_type_accepts_dashes() {
        assert_eq!("full-app".parse::<CodeType>(), Ok(CodeType::FullApp));
        assert_eq!("Component".parse::<CodeType>(), Ok(CodeType::Component));
        assert!("widget".parse::<CodeType>().is_err());
    }

    #[test]
    fn generation_request_uses_type_tag() -> Result<(), serde_json::Error> {
        let request: GenerationRequest = serde_json::from_value(json!({
            "type": "component",
            "framework": "React",
            "requirements": "Render a friendly greeting"
        }))?;
        assert_eq!(
            request,
            GenerationRequest::new(CodeType::Component, "React", "Render a friendly greeting")
        );
        Ok(())
    }

    #[test]
    fn generation_request_rejects_unknown_fields() {
        let result = serde_json::from_value::<GenerationRequest>(json!({
            "type": "component",
            "framework": "React",
            "requirements": "x",
            "colour": "blue"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn generation_request_validation() {
        assert!(GenerationRequest::new(CodeType::Api, "Express", "CRUD").validate().is_ok());
        assert!(GenerationRequest::new(CodeType::Api, " ", "CRUD").validate().is_err());
        assert!(GenerationRequest::new(CodeType::Api, "Express", "").validate().is_err());

        let hot = GenerationRequest::new(CodeType::Api, "Express", "CRUD").with_options(
            GenerationOptions {
                temperature: Some(3.5),
                ..Default::default()
            },
        );
        assert!(hot.validate().is_err());
    }
}
