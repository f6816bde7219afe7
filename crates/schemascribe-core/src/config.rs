//! # Configuration File Parser
//!
//! Reads `scribe.toml`, which names the database connections and LLM
//! providers a run can use. Each profile is a tagged table: the `type`
//! (connections) or `provider` (LLM) key selects the registered
//! implementation, every other key is handed to it as a string setting.
//!
//! Secrets are never written into the file. A profile carries
//! `password = "${PG_PASSWORD}"` instead of the password itself; the
//! reference is expanded from the environment when the profile is
//! resolved. Expansion happens on parsed string values only, so secret
//! text is never re-read as TOML and comments are never expanded.
//!
//! Example `scribe.toml`:
//!
//! ```toml
//! [default]
//! db = "local"
//! llm = "ollama"
//!
//! [db_connections.local]
//! type = "sqlite"
//! path = "./app.db"
//!
//! [db_connections.warehouse]
//! type = "postgres"
//! host = "db.internal"
//! port = 5432
//! user = "analyst"
//! password = "${PG_PASSWORD}"
//! dbname = "analytics"
//!
//! [llm_providers.openai]
//! provider = "openai"
//! model = "gpt-4o-mini"
//! api_key = "${OPENAI_API_KEY}"
//!
//! [llm_providers.ollama]
//! provider = "ollama"
//! model = "llama3"
//!
//! [generate]
//! concurrency = 4
//! timeout_secs = 30
//! max_retries = 2
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;

use crate::catalog::generator::GeneratorOptions;
use crate::error::{Result, ScribeError};
use crate::llm::retry::RetryPolicy;

/// Default config file name.
pub const CONFIG_FILE_NAME: &str = "scribe.toml";

/// Top-level scribe.toml structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScribeConfig {
    /// Profiles used when the CLI does not name one.
    pub default: DefaultProfiles,
    /// Database connection profiles, keyed by profile name.
    pub db_connections: BTreeMap<String, toml::Table>,
    /// LLM provider profiles, keyed by profile name.
    pub llm_providers: BTreeMap<String, toml::Table>,
    /// Description run settings.
    pub generate: GenerateConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DefaultProfiles {
    pub db: Option<String>,
    pub llm: Option<String>,
}

/// Settings for the description phase.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GenerateConfig {
    /// Maximum LLM calls in flight.
    pub concurrency: Option<usize>,
    /// Reuse one answer for columns sharing a (name, type) signature.
    pub dedupe: Option<bool>,
    /// Per-call timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Retries after the first attempt for transient failures.
    pub max_retries: Option<u32>,
    /// Backoff before the first retry, doubled on every further retry.
    pub backoff_ms: Option<u64>,
    /// Ask for one description per dbt model as well. dbt runs only; on by default.
    pub model_descriptions: Option<bool>,
}

/// String settings of one profile, minus its type tag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileSettings {
    values: BTreeMap<String, String>,
}

impl ProfileSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.values.insert(key.to_string(), value.to_string());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    /// Fetch a setting the implementation cannot work without.
    pub fn require(&self, profile: &str, key: &str) -> Result<&str> {
        self.get(key).ok_or_else(|| {
            ScribeError::config(format!("Profile '{}' is missing required key '{}'", profile, key))
        })
    }

    /// Parse a numeric setting, falling back to `default` when absent.
    pub fn parse_or<T: std::str::FromStr>(&self, profile: &str, key: &str, default: T) -> Result<T> {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => raw.parse().map_err(|_| {
                ScribeError::config(format!(
                    "Profile '{}': key '{}' has invalid value '{}'",
                    profile, key, raw
                ))
            }),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

/// A resolved database (or dbt project) profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionProfile {
    pub name: String,
    /// Registry tag, e.g. `sqlite`, `postgres`, `dbt`.
    pub kind: String,
    pub settings: ProfileSettings,
}

impl ConnectionProfile {
    pub fn new(name: &str, kind: &str, settings: ProfileSettings) -> Self {
        Self {
            name: name.to_string(),
            kind: kind.to_string(),
            settings,
        }
    }

    /// Profile used for `schemascribe dbt`, which points at a directory rather than a config entry.
    pub fn dbt_project(project_dir: &Path) -> Self {
        Self::new(
            "dbt",
            "dbt",
            ProfileSettings::new().with("project_dir", &project_dir.to_string_lossy()),
        )
    }
}

/// A resolved LLM provider profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmProfile {
    pub name: String,
    /// Registry tag, e.g. `openai`, `ollama`.
    pub provider: String,
    pub settings: ProfileSettings,
}

impl LlmProfile {
    pub fn new(name: &str, provider: &str, settings: ProfileSettings) -> Self {
        Self {
            name: name.to_string(),
            provider: provider.to_string(),
            settings,
        }
    }
}

/// Read and parse a config file.
pub fn read_config(path: &Path) -> Result<ScribeConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        ScribeError::config(format!(
            "Failed to read {}: {}\n  Create it or pass --config <path>",
            path.display(),
            e
        ))
    })?;

    ScribeConfig::parse(&content).map_err(|e| match e {
        ScribeError::Config { message } => {
            ScribeError::config(format!("{}: {}", path.display(), message))
        }
        other => other,
    })
}

impl ScribeConfig {
    /// Parse config text. `${VAR}` references stay unexpanded until a profile is resolved.
    pub fn parse(content: &str) -> Result<Self> {
        let config: ScribeConfig = toml::from_str(content)
            .map_err(|e| ScribeError::config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate semantic constraints that serde cannot enforce.
    pub fn validate(&self) -> Result<()> {
        for (name, table) in &self.db_connections {
            if !matches!(table.get("type"), Some(toml::Value::String(_))) {
                return Err(ScribeError::config(format!(
                    "db_connections.{} needs a string 'type' key",
                    name
                )));
            }
        }
        for (name, table) in &self.llm_providers {
            if !matches!(table.get("provider"), Some(toml::Value::String(_))) {
                return Err(ScribeError::config(format!(
                    "llm_providers.{} needs a string 'provider' key",
                    name
                )));
            }
        }
        if let Some(db) = &self.default.db {
            if !self.db_connections.contains_key(db) {
                return Err(ScribeError::config(format!(
                    "default.db names '{}', which is not defined under [db_connections]",
                    db
                )));
            }
        }
        if let Some(llm) = &self.default.llm {
            if !self.llm_providers.contains_key(llm) {
                return Err(ScribeError::config(format!(
                    "default.llm names '{}', which is not defined under [llm_providers]",
                    llm
                )));
            }
        }
        if self.generate.concurrency == Some(0) {
            return Err(ScribeError::config("generate.concurrency must be at least 1"));
        }
        Ok(())
    }

    /// Resolve a database profile by name, or the default when `name` is `None`.
    pub fn connection_profile(&self, name: Option<&str>) -> Result<ConnectionProfile> {
        let name = pick_profile(name, self.default.db.as_deref(), "db")?;
        let table = self.db_connections.get(name).ok_or_else(|| {
            ScribeError::config(format!(
                "Database profile '{}' not found. Known profiles: {}",
                name,
                known(self.db_connections.keys())
            ))
        })?;
        let (kind, settings) = split_profile(name, table, "type")?;
        Ok(ConnectionProfile::new(name, &kind, settings))
    }

    /// Resolve an LLM profile by name, or the default when `name` is `None`.
    pub fn llm_profile(&self, name: Option<&str>) -> Result<LlmProfile> {
        let name = pick_profile(name, self.default.llm.as_deref(), "llm")?;
        let table = self.llm_providers.get(name).ok_or_else(|| {
            ScribeError::config(format!(
                "LLM profile '{}' not found. Known profiles: {}",
                name,
                known(self.llm_providers.keys())
            ))
        })?;
        let (provider, settings) = split_profile(name, table, "provider")?;
        Ok(LlmProfile::new(name, &provider, settings))
    }

    /// Options for the catalog generator, with unset keys at their defaults.
    pub fn generator_options(&self) -> GeneratorOptions {
        let defaults = GeneratorOptions::default();
        let retry_defaults = RetryPolicy::default();
        GeneratorOptions {
            concurrency: self.generate.concurrency.unwrap_or(defaults.concurrency),
            dedupe: self.generate.dedupe.unwrap_or(defaults.dedupe),
            describe_tables: defaults.describe_tables,
            retry: RetryPolicy {
                max_retries: self.generate.max_retries.unwrap_or(retry_defaults.max_retries),
                initial_backoff: self
                    .generate
                    .backoff_ms
                    .map(Duration::from_millis)
                    .unwrap_or(retry_defaults.initial_backoff),
                call_timeout: self
                    .generate
                    .timeout_secs
                    .map(Duration::from_secs)
                    .unwrap_or(retry_defaults.call_timeout),
            },
        }
    }

    /// [`generator_options`](Self::generator_options) for a dbt project run.
    pub fn dbt_generator_options(&self) -> GeneratorOptions {
        GeneratorOptions {
            describe_tables: self.generate.model_descriptions.unwrap_or(true),
            ..self.generator_options()
        }
    }
}

fn pick_profile<'a>(explicit: Option<&'a str>, default: Option<&'a str>, flag: &str) -> Result<&'a str> {
    explicit.or(default).ok_or_else(|| {
        ScribeError::config(format!(
            "No {} profile selected. Pass --{} <name> or set [default] {} = \"...\"",
            flag, flag, flag
        ))
    })
}

fn known<'a>(names: impl Iterator<Item = &'a String>) -> String {
    let names: Vec<&str> = names.map(String::as_str).collect();
    if names.is_empty() {
        "(none)".to_string()
    } else {
        names.join(", ")
    }
}

/// Split a profile table into its tag and the remaining settings as strings.
fn split_profile(name: &str, table: &toml::Table, tag_key: &str) -> Result<(String, ProfileSettings)> {
    let mut tag = None;
    let mut settings = ProfileSettings::new();
    for (key, value) in table {
        let text = match value {
            toml::Value::String(s) => expand_refs(s).map_err(|var| {
                ScribeError::config(format!(
                    "Profile '{}', key '{}': environment variable '{}' is referenced but not set",
                    name, key, var
                ))
            })?,
            toml::Value::Integer(i) => i.to_string(),
            toml::Value::Float(f) => f.to_string(),
            toml::Value::Boolean(b) => b.to_string(),
            other => {
                return Err(ScribeError::config(format!(
                    "Profile '{}': key '{}' must be a scalar, got {}",
                    name,
                    key,
                    other.type_str()
                )))
            }
        };
        if key == tag_key {
            tag = Some(text);
        } else {
            settings.values.insert(key.clone(), text);
        }
    }
    let tag = tag.ok_or_else(|| {
        ScribeError::config(format!("Profile '{}' is missing its '{}' key", name, tag_key))
    })?;
    Ok((tag, settings))
}

fn env_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$\{([A-Za-z0-9_]+)\}").expect("valid env pattern"))
}

/// Expand `${VAR}` references in one setting value from the process environment.
///
/// An unset variable is an error rather than an empty string, so a missing
/// secret is reported before any connection attempt. The error is the
/// variable's name, never a value.
fn expand_refs(content: &str) -> std::result::Result<String, String> {
    let mut missing = None;
    let expanded = env_pattern().replace_all(content, |caps: &regex::Captures<'_>| {
        match std::env::var(&caps[1]) {
            Ok(value) => value,
            Err(_) => {
                missing.get_or_insert_with(|| caps[1].to_string());
                String::new()
            }
        }
    });
    match missing {
        Some(var) => Err(var),
        None => Ok(expanded.into_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
[default]
db = "local"
llm = "ollama"

[db_connections.local]
type = "sqlite"
path = "./app.db"

[db_connections.warehouse]
type = "postgres"
host = "db.internal"
port = 5432
dbname = "analytics"

[llm_providers.ollama]
provider = "ollama"
model = "llama3"

[llm_providers.openai]
provider = "openai"
model = "gpt-4o-mini"
temperature = 0.2

[generate]
concurrency = 8
dedupe = false
timeout_secs = 10
max_retries = 5
backoff_ms = 100
"#;

    #[test]
    fn test_parse_full_config() {
        let config = ScribeConfig::parse(FULL).unwrap();
        assert_eq!(config.default.db.as_deref(), Some("local"));
        assert_eq!(config.db_connections.len(), 2);
        assert_eq!(config.llm_providers.len(), 2);
        assert_eq!(config.generate.concurrency, Some(8));
    }

    #[test]
    fn test_connection_profile_defaults_and_scalars() {
        let config = ScribeConfig::parse(FULL).unwrap();

        let local = config.connection_profile(None).unwrap();
        assert_eq!(local.name, "local");
        assert_eq!(local.kind, "sqlite");
        assert_eq!(local.settings.get("path"), Some("./app.db"));
        assert_eq!(local.settings.get("type"), None);

        let warehouse = config.connection_profile(Some("warehouse")).unwrap();
        assert_eq!(warehouse.kind, "postgres");
        assert_eq!(warehouse.settings.get("port"), Some("5432"));
    }

    #[test]
    fn test_llm_profile_float_setting() {
        let config = ScribeConfig::parse(FULL).unwrap();
        let openai = config.llm_profile(Some("openai")).unwrap();
        assert_eq!(openai.provider, "openai");
        assert_eq!(openai.settings.get("temperature"), Some("0.2"));
    }

    #[test]
    fn test_unknown_profile_lists_known() {
        let config = ScribeConfig::parse(FULL).unwrap();
        let err = config.connection_profile(Some("nope")).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("nope"), "{}", msg);
        assert!(msg.contains("local, warehouse"), "{}", msg);
    }

    #[test]
    fn test_no_profile_selected() {
        let config = ScribeConfig::parse("").unwrap();
        let err = config.llm_profile(None).unwrap_err();
        assert!(err.to_string().contains("--llm"));
    }

    #[test]
    fn test_generator_options_from_config() {
        let config = ScribeConfig::parse(FULL).unwrap();
        let options = config.generator_options();
        assert_eq!(options.concurrency, 8);
        assert!(!options.dedupe);
        assert_eq!(options.retry.max_retries, 5);
        assert_eq!(options.retry.call_timeout, Duration::from_secs(10));
        assert_eq!(options.retry.initial_backoff, Duration::from_millis(100));
        assert!(!options.describe_tables);
    }

    #[test]
    fn test_dbt_runs_describe_models_unless_disabled() {
        let config = ScribeConfig::parse(FULL).unwrap();
        let options = config.dbt_generator_options();
        assert!(options.describe_tables);
        assert_eq!(options.concurrency, 8);

        let config = ScribeConfig::parse("[generate]\nmodel_descriptions = false\n").unwrap();
        assert!(!config.dbt_generator_options().describe_tables);
    }

    #[test]
    fn test_generator_options_defaults() {
        let options = ScribeConfig::parse("").unwrap().generator_options();
        assert_eq!(options.concurrency, GeneratorOptions::default().concurrency);
        assert_eq!(options.retry.call_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_validate_missing_type() {
        let err = ScribeConfig::parse("[db_connections.x]\npath = \"a.db\"\n").unwrap_err();
        assert!(err.to_string().contains("db_connections.x"));
    }

    #[test]
    fn test_validate_dangling_default() {
        let err = ScribeConfig::parse("[default]\nllm = \"ghost\"\n").unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_validate_zero_concurrency() {
        assert!(ScribeConfig::parse("[generate]\nconcurrency = 0\n").is_err());
    }

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("SCHEMASCRIBE_TEST_SECRET", "hunter2");
        let expanded = expand_refs("pre-${SCHEMASCRIBE_TEST_SECRET}-post").unwrap();
        assert_eq!(expanded, "pre-hunter2-post");
    }

    fn secret_profile(var: &str) -> String {
        format!(
            "[db_connections.pg]\ntype = \"postgres\"\npassword = \"${{{}}}\"\n",
            var
        )
    }

    #[test]
    fn test_secret_with_quote_is_kept_verbatim() {
        std::env::set_var("SCHEMASCRIBE_TEST_QUOTED", "pa\"ss");
        let config = ScribeConfig::parse(&secret_profile("SCHEMASCRIBE_TEST_QUOTED")).unwrap();
        let profile = config.connection_profile(Some("pg")).unwrap();
        assert_eq!(profile.settings.get("password"), Some("pa\"ss"));
    }

    #[test]
    fn test_secret_with_backslash_is_not_unescaped() {
        std::env::set_var("SCHEMASCRIBE_TEST_BACKSLASH", "ab\\tcd");
        let config = ScribeConfig::parse(&secret_profile("SCHEMASCRIBE_TEST_BACKSLASH")).unwrap();
        let profile = config.connection_profile(Some("pg")).unwrap();
        assert_eq!(profile.settings.get("password"), Some("ab\\tcd"));
    }

    #[test]
    fn test_reference_in_comment_is_ignored() {
        std::env::remove_var("SCHEMASCRIBE_TEST_COMMENTED");
        let text = "# password = \"${SCHEMASCRIBE_TEST_COMMENTED}\"\n[db_connections.local]\ntype = \"sqlite\"\npath = \"a.db\"\n";
        let config = ScribeConfig::parse(text).unwrap();
        assert!(config.connection_profile(Some("local")).is_ok());
    }

    #[test]
    fn test_missing_secret_names_profile_not_value() {
        std::env::remove_var("SCHEMASCRIBE_TEST_ABSENT");
        let config = ScribeConfig::parse(&secret_profile("SCHEMASCRIBE_TEST_ABSENT")).unwrap();
        let msg = config.connection_profile(Some("pg")).unwrap_err().to_string();
        assert!(msg.contains("'pg'"), "{}", msg);
        assert!(msg.contains("SCHEMASCRIBE_TEST_ABSENT"), "{}", msg);
    }

    #[test]
    fn test_expand_env_vars_missing() {
        std::env::remove_var("SCHEMASCRIBE_TEST_UNSET_VAR");
        let err = expand_refs("${SCHEMASCRIBE_TEST_UNSET_VAR}").unwrap_err();
        assert_eq!(err, "SCHEMASCRIBE_TEST_UNSET_VAR");
    }

    #[test]
    fn test_read_config_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, FULL).unwrap();

        let config = read_config(&path).unwrap();
        assert_eq!(config.default.llm.as_deref(), Some("ollama"));
    }

    #[test]
    fn test_read_config_missing_file() {
        let err = read_config(Path::new("/nonexistent/scribe.toml")).unwrap_err();
        assert!(matches!(err, ScribeError::Config { .. }));
    }

    #[test]
    fn test_settings_require_and_parse() {
        let settings = ProfileSettings::new().with("port", "abc");
        assert!(settings.require("p", "host").is_err());
        assert!(settings.parse_or::<u16>("p", "port", 5432).is_err());
        assert_eq!(settings.parse_or::<u16>("p", "missing", 5432).unwrap(), 5432);
    }
}
