use std::collections::BTreeSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use schemascribe_core::config::{LlmProfile, ScribeConfig};
use schemascribe_core::llm::{ColumnContext, LlmClient, TableContext};
use schemascribe_core::registry::Registry;
use schemascribe_core::schema::types::*;
use schemascribe_core::{Result, ScribeError};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

/// Registry tag of [`StubLlm`].
pub const STUB_PROVIDER: &str = "stub";

/// Reply configured for the stub profile in [`sqlite_config`].
pub const STUB_DESCRIPTION: &str = "stub description";

/// Deterministic LLM client.
///
/// Answers with a fixed reply when one is set, otherwise with
/// `"<column> (<type>) described."` or `"<table> model described."`.
/// Column or table names listed in `fail_columns` fail with a non-transient
/// error, so the retry policy gives up immediately.
///
/// Tracks how many calls were in flight at once, counting a call from
/// before its delay until it returns.
#[derive(Default)]
pub struct StubLlm {
    reply: Option<String>,
    fail_columns: BTreeSet<String>,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// Holds one slot of the in-flight count; released on drop, including on abort.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl StubLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(columns: &[&str]) -> Self {
        Self {
            fail_columns: columns.iter().map(|c| c.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            ..Self::default()
        }
    }

    pub fn with_reply(mut self, reply: &str) -> Self {
        self.reply = Some(reply.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Reads `reply` and `fail_columns` (comma separated) from the profile.
    pub fn from_profile(profile: &LlmProfile) -> Result<Self> {
        let fail: Vec<&str> = profile
            .settings
            .get("fail_columns")
            .map(|raw| raw.split(',').map(str::trim).filter(|c| !c.is_empty()).collect())
            .unwrap_or_default();
        let mut stub = Self::failing(&fail);
        if let Some(reply) = profile.settings.get("reply") {
            stub = stub.with_reply(reply);
        }
        Ok(stub)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of calls seen in flight at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn expected(column: &str, data_type: &str) -> String {
        format!("{} ({}) described.", column, data_type)
    }

    pub fn expected_table(table: &str) -> String {
        format!("{} model described.", table)
    }

    /// Count the call, wait out the delay, then answer or fail for `name`.
    async fn answer(&self, name: &str, label: &str, default_reply: String) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _slot = InFlight(&self.in_flight);
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail_columns.contains(name) {
            return Err(ScribeError::llm_fatal(format!("stub refused to describe {}", label)));
        }
        Ok(self.reply.clone().unwrap_or(default_reply))
    }
}

#[async_trait]
impl LlmClient for StubLlm {
    fn name(&self) -> &str {
        STUB_PROVIDER
    }

    async fn complete(&self, _system: &str, _prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok("stub reply".to_string())
    }

    async fn describe_column(&self, ctx: &ColumnContext) -> Result<String> {
        let label = format!("{}.{}", ctx.table, ctx.column);
        self.answer(&ctx.column, &label, Self::expected(&ctx.column, &ctx.data_type))
            .await
    }

    async fn describe_table(&self, ctx: &TableContext) -> Result<String> {
        self.answer(&ctx.table, &ctx.table, Self::expected_table(&ctx.table))
            .await
    }
}

/// Builtins plus the `stub` LLM provider.
pub fn stub_registry() -> Registry {
    let mut registry = Registry::with_builtins();
    registry.register_llm_client(STUB_PROVIDER, |p| Ok(Arc::new(StubLlm::from_profile(p)?)));
    registry
}

/// Config with one SQLite profile `local` and one stub LLM profile `stub`.
pub fn sqlite_config(db_path: &Path, fail_columns: &[&str]) -> ScribeConfig {
    let text = format!(
        r#"
[default]
db = "local"
llm = "stub"

[db_connections.local]
type = "sqlite"
path = "{}"

[llm_providers.stub]
provider = "stub"
reply = "{}"
fail_columns = "{}"

[generate]
concurrency = 2
max_retries = 0
timeout_secs = 5
"#,
        db_path.display().to_string().replace('\\', "/"),
        STUB_DESCRIPTION,
        fail_columns.join(",")
    );
    ScribeConfig::parse(&text).expect("test config parses")
}

/// Two-table snapshot with no descriptions, `id` and `created_at` repeated across tables.
pub fn shop_snapshot() -> SchemaSnapshot {
    let mut schema = SchemaSnapshot::new(SourceKind::Sqlite, "shop".to_string());

    let mut users = TableInfo::new("users".to_string());
    let mut id = ColumnInfo::new("id".to_string(), "INTEGER".to_string());
    id.nullable = false;
    users.push_column(id);
    users.push_column(ColumnInfo::new("email".to_string(), "TEXT".to_string()));
    users.push_column(ColumnInfo::new("created_at".to_string(), "TIMESTAMP".to_string()));
    schema.push_table(users);

    let mut orders = TableInfo::new("orders".to_string());
    let mut id = ColumnInfo::new("id".to_string(), "INTEGER".to_string());
    id.nullable = false;
    orders.push_column(id);
    orders.push_column(ColumnInfo::new("total".to_string(), "NUMERIC(10,2)".to_string()));
    orders.push_column(ColumnInfo::new("created_at".to_string(), "TIMESTAMP".to_string()));
    schema.push_table(orders);

    schema
}

/// Create a SQLite file at `path` and run `statements` against it.
pub async fn create_sqlite_db(path: &Path, statements: &[&str]) {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .expect("create sqlite db");
    for stmt in statements {
        sqlx::query(stmt).execute(&pool).await.expect("run fixture statement");
    }
    pool.close().await;
}

/// The `users` / `orders` shop database.
pub async fn create_shop_db(path: &Path) {
    create_sqlite_db(
        path,
        &[
            "CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT NOT NULL, name VARCHAR(80), created_at TIMESTAMP)",
            "CREATE TABLE orders (id INTEGER PRIMARY KEY, user_id INTEGER NOT NULL REFERENCES users(id), total NUMERIC(10,2), created_at TIMESTAMP)",
        ],
    )
    .await;
}

/// Property file documenting `customers` but not `orders`.
pub const DBT_SCHEMA_YML: &str = r#"version: 2
models:
  - name: customers
    description: One row per customer
    meta:
      owner: analytics
    columns:
      - name: customer_id
        tests:
          - unique
          - not_null
      - name: first_name
        description: Hand written.
"#;

/// Write a compiled dbt project with `customers` and `orders` models.
///
/// `customers` is documented in `models/schema.yml`; `orders` lives in
/// `models/marts/` and is documented nowhere.
pub fn write_dbt_project(dir: &Path) {
    let write = |rel: &str, content: &str| {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create fixture dir");
        }
        std::fs::write(path, content).expect("write fixture file");
    };

    write("dbt_project.yml", "name: jaffle_shop\nversion: '1.0'\n");
    write("models/customers.sql", "select 1 as customer_id, 'a' as first_name");
    write("models/marts/orders.sql", "select 1 as order_id, 10.0 as amount");
    write("models/schema.yml", DBT_SCHEMA_YML);

    let manifest = serde_json::json!({
        "metadata": { "project_name": "jaffle_shop" },
        "nodes": {
            "model.jaffle_shop.customers": {
                "resource_type": "model",
                "name": "customers",
                "description": "One row per customer",
                "original_file_path": "models/customers.sql",
                "columns": {
                    "customer_id": {
                        "name": "customer_id",
                        "data_type": "integer",
                        "constraints": [{ "type": "not_null" }]
                    },
                    "first_name": { "name": "first_name", "description": "Hand written." }
                }
            },
            "model.jaffle_shop.orders": {
                "resource_type": "model",
                "name": "orders",
                "description": "",
                "original_file_path": "models/marts/orders.sql",
                "columns": {
                    "order_id": { "name": "order_id", "data_type": "integer" },
                    "amount": { "name": "amount", "data_type": "numeric" }
                }
            },
            "test.jaffle_shop.unique_customers_customer_id": {
                "resource_type": "test",
                "name": "unique_customers_customer_id"
            }
        }
    });
    write(
        "target/manifest.json",
        &serde_json::to_string_pretty(&manifest).expect("serialize manifest"),
    );
}
