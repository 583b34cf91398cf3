//! Language-model provider implementations for Sidekick.
//!
//! All providers implement the `sidekick_core::Provider` trait.
//! `build_from_config` picks the endpoint and credentials.

pub mod openai_compat;
pub mod router;

pub use openai_compat::OpenAiCompatProvider;
pub use router::build_from_config;
