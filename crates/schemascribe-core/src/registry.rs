//! # Component Registry
//!
//! Maps the `type` / `provider` tag of a config profile to the constructor
//! of a connector or LLM client. Builtins are registered explicitly by
//! [`Registry::with_builtins`]; tests build their own registries and add
//! stub implementations with the same `register_*` calls.

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use tracing::debug;

use crate::config::{ConnectionProfile, LlmProfile};
use crate::error::{Result, ScribeError};
use crate::llm::{AnthropicClient, LlmClient, OllamaClient, OpenAiClient};
use crate::schema::dbt::DbtConnector;
use crate::schema::duckdb::DuckDbConnector;
use crate::schema::mysql::MySqlConnector;
use crate::schema::postgres::PostgresConnector;
use crate::schema::sqlite::SqliteConnector;
use crate::schema::Connector;

/// Builds a connector from its profile. Errors leave nothing half-built behind.
pub type ConnectorCtor = fn(&ConnectionProfile) -> Result<Box<dyn Connector>>;

/// Builds an LLM client from its profile. Clients are shared across concurrent calls.
pub type LlmClientCtor = fn(&LlmProfile) -> Result<Arc<dyn LlmClient>>;

#[derive(Default)]
pub struct Registry {
    connectors: BTreeMap<String, ConnectorCtor>,
    llm_clients: BTreeMap<String, LlmClientCtor>,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every shipped connector and LLM client.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();

        registry.register_connector("sqlite", |p| Ok(Box::new(SqliteConnector::from_profile(p)?)));
        registry.register_connector("postgres", |p| {
            Ok(Box::new(PostgresConnector::from_profile(p)?))
        });
        registry.register_connector("postgresql", |p| {
            Ok(Box::new(PostgresConnector::from_profile(p)?))
        });
        registry.register_connector("mysql", |p| Ok(Box::new(MySqlConnector::from_profile(p)?)));
        registry.register_connector("mariadb", |p| Ok(Box::new(MySqlConnector::from_profile(p)?)));
        registry.register_connector("duckdb", |p| Ok(Box::new(DuckDbConnector::from_profile(p)?)));
        registry.register_connector("dbt", |p| Ok(Box::new(DbtConnector::from_profile(p)?)));

        registry.register_llm_client("openai", |p| Ok(Arc::new(OpenAiClient::from_profile(p)?)));
        registry.register_llm_client("anthropic", |p| {
            Ok(Arc::new(AnthropicClient::from_profile(p)?))
        });
        registry.register_llm_client("ollama", |p| Ok(Arc::new(OllamaClient::from_profile(p)?)));

        registry
    }

    /// Register (or replace) the connector constructor for `tag`.
    pub fn register_connector(&mut self, tag: &str, ctor: ConnectorCtor) {
        self.connectors.insert(normalize(tag), ctor);
    }

    /// Register (or replace) the LLM client constructor for `tag`.
    pub fn register_llm_client(&mut self, tag: &str, ctor: LlmClientCtor) {
        self.llm_clients.insert(normalize(tag), ctor);
    }

    pub fn create_connector(
        &self,
        tag: &str,
        profile: &ConnectionProfile,
    ) -> Result<Box<dyn Connector>> {
        let ctor = self.connectors.get(&normalize(tag)).ok_or_else(|| {
            ScribeError::config(format!(
                "Unknown connector type '{}' in profile '{}'. Supported types: {}",
                tag,
                profile.name,
                self.connector_tags().join(", ")
            ))
        })?;
        debug!(tag, profile = %profile.name, "creating connector");
        ctor(profile)
    }

    pub fn create_llm_client(&self, tag: &str, profile: &LlmProfile) -> Result<Arc<dyn LlmClient>> {
        let ctor = self.llm_clients.get(&normalize(tag)).ok_or_else(|| {
            ScribeError::config(format!(
                "Unknown LLM provider '{}' in profile '{}'. Supported providers: {}",
                tag,
                profile.name,
                self.llm_tags().join(", ")
            ))
        })?;
        debug!(tag, profile = %profile.name, "creating LLM client");
        ctor(profile)
    }

    /// Build the connector a profile's `type` names.
    pub fn connector_for(&self, profile: &ConnectionProfile) -> Result<Box<dyn Connector>> {
        self.create_connector(&profile.kind, profile)
    }

    /// Build the LLM client a profile's `provider` names.
    pub fn llm_client_for(&self, profile: &LlmProfile) -> Result<Arc<dyn LlmClient>> {
        self.create_llm_client(&profile.provider, profile)
    }

    /// Registered connector tags, sorted.
    pub fn connector_tags(&self) -> Vec<&str> {
        self.connectors.keys().map(String::as_str).collect()
    }

    /// Registered LLM provider tags, sorted.
    pub fn llm_tags(&self) -> Vec<&str> {
        self.llm_clients.keys().map(String::as_str).collect()
    }
}

fn normalize(tag: &str) -> String {
    tag.trim().to_ascii_lowercase()
}

/// Process-wide registry of builtins, initialized on first use.
pub fn global() -> &'static Registry {
    static GLOBAL: OnceLock<Registry> = OnceLock::new();
    GLOBAL.get_or_init(Registry::with_builtins)
}
