//! # Error Types
//!
//! Defines `ScribeError`, the unified error enum for every failure mode in
//! the catalog pipeline. Variants map onto how the run reacts to them:
//! configuration and connection problems abort immediately, extraction
//! problems abort only when nothing could be extracted, and LLM failures are
//! downgraded per column by the catalog generator.

use thiserror::Error;

use crate::catalog::CatalogState;

/// All errors that can occur in schemascribe operations.
#[derive(Error, Debug)]
pub enum ScribeError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Connection failed: {message}\n  Target: {target}")]
    Connection {
        message: String,
        target: String,
        #[source]
        source: Option<sqlx::Error>,
    },

    #[error("Schema extraction failed: {message}")]
    Extraction { message: String },

    #[error("LLM error: {message}")]
    Llm { message: String, transient: bool },

    #[error("Render error: {message}")]
    Render { message: String },

    #[error("Output error: {message}: {source}")]
    Output {
        message: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Check failed: {message}")]
    CheckFailed { message: String },

    #[error("Invalid catalog state transition: {from} -> {to}")]
    InvalidState {
        from: CatalogState,
        to: CatalogState,
    },
}

impl ScribeError {
    pub fn config(message: impl Into<String>) -> Self {
        ScribeError::Config {
            message: message.into(),
        }
    }

    pub fn extraction(message: impl Into<String>) -> Self {
        ScribeError::Extraction {
            message: message.into(),
        }
    }

    /// An LLM failure worth retrying (timeouts, dropped connections, 429, 5xx).
    pub fn llm_transient(message: impl Into<String>) -> Self {
        ScribeError::Llm {
            message: message.into(),
            transient: true,
        }
    }

    /// An LLM failure that retrying will not fix (auth, bad request, malformed envelope).
    pub fn llm_fatal(message: impl Into<String>) -> Self {
        ScribeError::Llm {
            message: message.into(),
            transient: false,
        }
    }

    /// Whether the retry policy may attempt the call again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ScribeError::Llm {
                transient: true,
                ..
            }
        )
    }
}

pub type Result<T> = std::result::Result<T, ScribeError>;
