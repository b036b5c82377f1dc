//! LLM provider implementations for Voltwise.
//!
//! All providers implement the `voltwise_core::Provider` trait. The
//! configured provider is always wrapped in [`RetryingProvider`], which owns
//! the completion deadline and retry policy.

pub mod builder;
pub mod openai_compat;
pub mod retry;

pub use builder::{build_from_config, resolve_model, retry_policy};
pub use openai_compat::OpenAiCompatProvider;
pub use retry::{RetryPolicy, RetryingProvider};
