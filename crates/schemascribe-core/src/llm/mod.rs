//! LLM backends, the shared prompt framing, and the retry policy applied
//! around every call.

pub mod client;
pub mod prompt;
pub mod retry;

pub use client::{AnthropicClient, LlmClient, OllamaClient, OpenAiClient};
pub use prompt::{ColumnContext, TableContext};
pub use retry::RetryPolicy;
