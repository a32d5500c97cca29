//! FlashFusion Protocol - shared types for the AI service layer
//!
//! This crate holds the data model that the service crate and its front ends
//! agree on: which providers exist, how a selectable model is described, what
//! a code-generation request looks like and what gets persisted as the
//! current selection.
//!
//! # Core Types
//!
//! - [`ProviderId`] - The closed set of supported LLM vendors
//! - [`ModelDescriptor`] - Static metadata for a selectable model
//! - [`GenerationRequest`] - A validated code-generation request
//! - [`SelectionState`] - The persisted model/provider pair
//!
//! # Example
//!
//! ```rust
//! use ff_protocol::{CodeType, GenerationRequest, ProviderId};
//!
//! let request = GenerationRequest::new(CodeType::Component, "React", "Render a greeting");
//! assert_eq!(request.framework, "React");
//! assert_eq!("openai".parse::<ProviderId>().ok(), Some(ProviderId::OpenAI));
//! ```

#![warn(missing_docs)]

/// Protocol models module
pub mod models;

pub use models::*;
