//! LLM completion collaborator: the [`LlmClient`] seam and its Langbase
//! pipes implementation.

mod client;
mod types;

#[cfg(test)]
#[path = "types_tests.rs"]
mod types_tests;

#[cfg(test)]
pub use client::MockLlmClient;
pub use client::{LangbaseClient, LlmClient};
pub use types::*;
