use std::path::PathBuf;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use crate::config::ConnectionProfile;
use crate::error::{Result, ScribeError};
use crate::schema::connector::{skip_table, Connector};
use crate::schema::types::*;

pub struct SqliteConnector {
    path: PathBuf,
    pool: Option<SqlitePool>,
}

impl SqliteConnector {
    pub fn new(path: PathBuf) -> Self {
        Self { path, pool: None }
    }

    pub fn from_profile(profile: &ConnectionProfile) -> Result<Self> {
        let path = profile.settings.require(&profile.name, "path")?;
        Ok(Self::new(PathBuf::from(path)))
    }

    fn pool(&self) -> Result<&SqlitePool> {
        self.pool
            .as_ref()
            .ok_or_else(|| ScribeError::extraction("SQLite connector used before connect()"))
    }

    async fn list_tables(pool: &SqlitePool) -> Result<Vec<String>> {
        let query = "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY rowid";
        let rows = sqlx::query(query)
            .fetch_all(pool)
            .await
            .map_err(|e| ScribeError::extraction(format!("fetch tables: {}", e)))?;

        Ok(rows.iter().map(|row| row.get::<String, _>("name")).collect())
    }

    async fn table_columns(
        pool: &SqlitePool,
        table_name: &str,
    ) -> std::result::Result<TableInfo, sqlx::Error> {
        let query = format!("PRAGMA table_info(\"{}\")", table_name.replace('"', "\"\""));
        let rows = sqlx::query(&query).fetch_all(pool).await?;

        let mut table = TableInfo::new(table_name.to_string());
        for row in rows {
            let name: String = row.try_get("name")?;
            let type_str: String = row.try_get("type")?;
            let notnull: i32 = row.try_get("notnull")?;
            let pk: i32 = row.try_get("pk")?;

            // INTEGER PRIMARY KEY aliases the rowid and can never be NULL,
            // but PRAGMA table_info still reports notnull = 0 for it.
            let is_rowid = pk > 0 && type_str.eq_ignore_ascii_case("INTEGER");

            let mut column = ColumnInfo::new(name, type_str);
            column.nullable = notnull == 0 && !is_rowid;
            table.push_column(column);
        }
        Ok(table)
    }
}

#[async_trait]
impl Connector for SqliteConnector {
    fn kind(&self) -> SourceKind {
        SourceKind::Sqlite
    }

    async fn connect(&mut self) -> Result<()> {
        let target = format!("sqlite:{}", self.path.display());
        if !self.path.is_file() {
            return Err(ScribeError::Connection {
                message: "database file does not exist".to_string(),
                target,
                source: None,
            });
        }

        let options = SqliteConnectOptions::new()
            .filename(&self.path)
            .read_only(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| ScribeError::Connection {
                message: "failed to open SQLite database".to_string(),
                target,
                source: Some(e),
            })?;

        self.pool = Some(pool);
        Ok(())
    }

    async fn extract_schema(&mut self) -> Result<SchemaSnapshot> {
        let name = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "sqlite".to_string());
        let mut schema = SchemaSnapshot::new(SourceKind::Sqlite, name);
        let pool = self.pool()?;

        for table_name in Self::list_tables(pool).await? {
            match Self::table_columns(pool, &table_name).await {
                Ok(table) => schema.push_table(table),
                Err(e) => skip_table(&table_name, &e),
            }
        }

        Ok(schema)
    }

    async fn close(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.close().await;
        }
    }
}
