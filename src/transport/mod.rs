//! Concrete [`ConversationTransport`](crate::pipeline::conversation::ConversationTransport)
//! adapters.
//!
//! The orchestrator only knows the trait. Adapters own wire formats,
//! authentication and retry; nothing here leaks into the core loop.

pub mod anthropic;

pub use anthropic::{AnthropicConfig, AnthropicTransport};
