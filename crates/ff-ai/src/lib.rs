//! FlashFusion AI service layer
//!
//! Chooses an LLM from a static registry, gated by which providers have an
//! API key configured, remembers the choice across sessions, and dispatches
//! code-generation requests to the provider's chat endpoint.
//!
//! # Features
//! - OpenAI, Anthropic and Google (OpenAI-compatible endpoint) dispatch
//! - API keys in the OS keychain, with `*_API_KEY` environment fallback
//! - Model selection persisted to a JSON settings file
//! - Code-fence stripping of generated code
//!
//! # Example
//! ```no_run
//! use ff_ai::{AiConfig, AiService};
//! use ff_protocol::{CodeType, GenerationRequest, ProviderId};
//!
//! # async fn run() -> ff_ai::Result<()> {
//! let service = AiService::from_config(AiConfig::load()?)?;
//! service.set_api_key(ProviderId::OpenAI, "sk-...")?;
//! service.set_model("gpt-4-turbo")?;
//!
//! let code = service
//!     .generate_code(&GenerationRequest::new(CodeType::Component, "React", "A greeting"))
//!     .await?;
//! println!("{code}");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

pub mod config;
pub mod credentials;
pub mod error;
pub mod output;
pub mod prompts;
pub mod providers;
pub mod registry;
pub mod selection;
pub mod service;

pub use config::{is_development_mode, AiConfig};
pub use credentials::{ApiKeyStore, CredentialStore, KeySource, KeychainStore, MemoryKeyStore};
pub use error::{AiError, Result};
pub use output::strip_code_fences;
pub use registry::{find_model, list_available_models, MODELS};
pub use selection::{FileSelectionStore, MemorySelectionStore, SelectionStore};
pub use service::AiService;
