//! Natural language to structured intent
//!
//! text + context -> CompletionProvider -> JSON reply -> validated Intent

pub mod client;
pub mod context;
pub mod schema;

pub use client::{CompletionProvider, LlmClient, OpenAiProvider, ProviderError};
pub use schema::{Action, Intent};
