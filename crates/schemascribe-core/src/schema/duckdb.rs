//! DuckDB connector.
//!
//! A path ending in `.duckdb` or `.db` is opened read-only as a database
//! file. Any other path is read through an in-memory instance: a single
//! CSV, Parquet or JSON file becomes one table, and a directory or glob
//! pattern becomes one table per matching file, named after the file.
//!
//! The `duckdb` driver is synchronous, so every call runs on the blocking pool.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use duckdb::{AccessMode, Config, Connection};
use tracing::debug;

use crate::config::ConnectionProfile;
use crate::error::{Result, ScribeError};
use crate::schema::connector::{skip_table, Connector};
use crate::schema::types::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Database,
    SingleFile,
    FileScan,
}

pub struct DuckDbConnector {
    path: String,
    conn: Option<Arc<Mutex<Connection>>>,
}

impl DuckDbConnector {
    pub fn new(path: String) -> Self {
        Self { path, conn: None }
    }

    pub fn from_profile(profile: &ConnectionProfile) -> Result<Self> {
        let path = profile.settings.require(&profile.name, "path")?;
        Ok(Self::new(path.to_string()))
    }

    fn mode(&self) -> Mode {
        let path = self.path.as_str();
        if path.ends_with(".duckdb") || path.ends_with(".db") {
            Mode::Database
        } else if path.ends_with('/') || path.contains('*') || Path::new(path).is_dir() {
            Mode::FileScan
        } else {
            Mode::SingleFile
        }
    }

    /// File stem of the path, ignoring any glob part.
    fn snapshot_name(&self) -> String {
        let base = self.path.split('*').next().unwrap_or_default();
        Path::new(base.trim_end_matches('/'))
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "duckdb".to_string())
    }

    fn target(&self) -> String {
        format!("duckdb:{}", self.path)
    }
}

fn connection_error(target: String, message: String) -> ScribeError {
    ScribeError::Connection {
        message,
        target,
        source: None,
    }
}

fn open(path: &str, mode: Mode) -> duckdb::Result<Connection> {
    match mode {
        Mode::Database => {
            let config = Config::default().access_mode(AccessMode::ReadOnly)?;
            Connection::open_with_flags(path, config)
        }
        Mode::SingleFile | Mode::FileScan => Connection::open_in_memory(),
    }
}

/// Quote `text` as a SQL string literal.
fn quote_literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// User tables as `(schema, table, comment)`, in creation order per schema.
fn list_tables(conn: &Connection) -> duckdb::Result<Vec<(String, String, Option<String>)>> {
    let mut stmt = conn.prepare(
        "SELECT schema_name, table_name, comment FROM duckdb_tables() \
         WHERE NOT internal ORDER BY schema_name, table_oid",
    )?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?;
    rows.collect()
}

fn table_columns(conn: &Connection, schema: &str, table: &str) -> duckdb::Result<Vec<ColumnInfo>> {
    let mut stmt = conn.prepare(
        "SELECT column_name, data_type, is_nullable FROM duckdb_columns() \
         WHERE schema_name = ? AND table_name = ? ORDER BY column_index",
    )?;
    let rows = stmt.query_map(duckdb::params![schema, table], |row| {
        let mut column = ColumnInfo::new(row.get(0)?, row.get(1)?);
        column.nullable = row.get(2)?;
        Ok(column)
    })?;
    rows.collect()
}

/// Columns DuckDB infers for a data file.
fn describe_file(conn: &Connection, file: &str) -> duckdb::Result<Vec<ColumnInfo>> {
    let sql = format!("DESCRIBE SELECT * FROM {}", quote_literal(file));
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], |row| {
        let null: Option<String> = row.get(2)?;
        let mut column = ColumnInfo::new(row.get(0)?, row.get(1)?);
        column.nullable = null.as_deref() != Some("NO");
        Ok(column)
    })?;
    rows.collect()
}

/// Files matched by a directory or glob path, sorted.
fn glob_files(conn: &Connection, path: &str) -> duckdb::Result<Vec<String>> {
    let pattern = if path.contains('*') {
        path.to_string()
    } else {
        format!("{}/*.*", path.trim_end_matches('/'))
    };
    let sql = format!("SELECT file FROM glob({}) ORDER BY file", quote_literal(&pattern));
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], |row| row.get(0))?;
    rows.collect()
}

fn file_table(conn: &Connection, file: &str) -> duckdb::Result<TableInfo> {
    let name = Path::new(file)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.to_string());
    let mut table = TableInfo::new(name);
    for column in describe_file(conn, file)? {
        table.push_column(column);
    }
    Ok(table)
}

fn read_schema(conn: &Connection, path: &str, mode: Mode, schema: &mut SchemaSnapshot) -> Result<()> {
    match mode {
        Mode::Database => {
            let tables = list_tables(conn)
                .map_err(|e| ScribeError::extraction(format!("fetch tables: {}", e)))?;
            for (schema_name, table_name, comment) in tables {
                let qualified = if schema_name == "main" {
                    table_name.clone()
                } else {
                    format!("{}.{}", schema_name, table_name)
                };
                match table_columns(conn, &schema_name, &table_name) {
                    Ok(columns) => {
                        let mut table = TableInfo::new(qualified);
                        table.comment = comment.filter(|c| !c.trim().is_empty());
                        for column in columns {
                            table.push_column(column);
                        }
                        schema.push_table(table);
                    }
                    Err(e) => skip_table(&qualified, &e),
                }
            }
        }
        Mode::SingleFile => match file_table(conn, path) {
            Ok(table) => schema.push_table(table),
            Err(e) => skip_table(path, &e),
        },
        Mode::FileScan => {
            let files = glob_files(conn, path)
                .map_err(|e| ScribeError::extraction(format!("list files at '{}': {}", path, e)))?;
            debug!(path, files = files.len(), "scanning data files");
            for file in files {
                match file_table(conn, &file) {
                    Ok(table) => schema.push_table(table),
                    Err(e) => skip_table(&file, &e),
                }
            }
        }
    }
    Ok(())
}

#[async_trait]
impl Connector for DuckDbConnector {
    fn kind(&self) -> SourceKind {
        SourceKind::DuckDb
    }

    async fn connect(&mut self) -> Result<()> {
        let mode = self.mode();
        if mode != Mode::FileScan && !Path::new(&self.path).is_file() {
            return Err(connection_error(self.target(), "file does not exist".to_string()));
        }

        let path = self.path.clone();
        let conn = tokio::task::spawn_blocking(move || open(&path, mode))
            .await
            .map_err(|e| connection_error(self.target(), format!("open task failed: {}", e)))?
            .map_err(|e| connection_error(self.target(), format!("failed to open DuckDB: {}", e)))?;

        self.conn = Some(Arc::new(Mutex::new(conn)));
        Ok(())
    }

    async fn extract_schema(&mut self) -> Result<SchemaSnapshot> {
        let conn = self
            .conn
            .clone()
            .ok_or_else(|| ScribeError::extraction("DuckDB connector used before connect()"))?;
        let path = self.path.clone();
        let mode = self.mode();
        let name = self.snapshot_name();

        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| ScribeError::extraction("DuckDB connection lock poisoned"))?;
            let mut schema = SchemaSnapshot::new(SourceKind::DuckDb, name);
            read_schema(&conn, &path, mode, &mut schema)?;
            Ok(schema)
        })
        .await
        .map_err(|e| ScribeError::extraction(format!("DuckDB extraction task failed: {}", e)))?
    }

    async fn close(&mut self) {
        self.conn = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProfileSettings;
    use crate::schema::connector::extract;

    fn create_db(path: &Path, sql: &str) {
        let conn = Connection::open(path).unwrap();
        conn.execute_batch(sql).unwrap();
    }

    fn connector(path: &Path) -> DuckDbConnector {
        DuckDbConnector::new(path.to_string_lossy().into_owned())
    }

    #[tokio::test]
    async fn test_extracts_database_tables_in_creation_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("warehouse.duckdb");
        create_db(
            &path,
            "CREATE TABLE users (id INTEGER NOT NULL, email VARCHAR);
             CREATE TABLE orders (id INTEGER, total DECIMAL(10,2));
             COMMENT ON TABLE users IS 'Registered customers';",
        );

        let schema = extract(&mut connector(&path)).await.unwrap();

        assert_eq!(schema.source, SourceKind::DuckDb);
        assert_eq!(schema.name, "warehouse");
        let names: Vec<&str> = schema.tables.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["users", "orders"]);

        let users = &schema.tables["users"];
        assert_eq!(users.comment.as_deref(), Some("Registered customers"));
        assert_eq!(users.columns["id"].data_type, "INTEGER");
        assert!(!users.columns["id"].nullable);
        assert!(users.columns["email"].nullable);
        assert_eq!(schema.tables["orders"].columns["total"].data_type, "DECIMAL(10,2)");
    }

    #[tokio::test]
    async fn test_non_main_schema_is_qualified() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lake.duckdb");
        create_db(
            &path,
            "CREATE SCHEMA raw; CREATE TABLE raw.events (id BIGINT, kind VARCHAR);",
        );

        let schema = extract(&mut connector(&path)).await.unwrap();
        assert!(schema.tables.contains_key("raw.events"));
    }

    #[tokio::test]
    async fn test_single_csv_file_is_one_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("customers.csv");
        std::fs::write(&path, "id,name\n1,Ada\n2,Grace\n").unwrap();

        let schema = extract(&mut connector(&path)).await.unwrap();

        assert_eq!(schema.name, "customers");
        let table = &schema.tables["customers.csv"];
        assert_eq!(table.column_names(), vec!["id", "name"]);
    }

    #[tokio::test]
    async fn test_directory_scan_reads_each_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b_orders.csv"), "order_id,amount\n1,9.5\n").unwrap();
        std::fs::write(dir.path().join("a_users.csv"), "user_id\n1\n").unwrap();

        let schema = extract(&mut connector(dir.path())).await.unwrap();

        let names: Vec<&str> = schema.tables.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["a_users.csv", "b_orders.csv"]);
        assert_eq!(schema.column_count(), 3);
    }

    #[tokio::test]
    async fn test_missing_database_file_is_connection_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut connector = connector(&dir.path().join("missing.duckdb"));
        let err = connector.connect().await.unwrap_err();
        assert!(matches!(err, ScribeError::Connection { .. }), "got {:?}", err);
    }

    #[test]
    fn test_profile_requires_path() {
        let profile = ConnectionProfile::new("lake", "duckdb", ProfileSettings::new());
        let Err(err) = DuckDbConnector::from_profile(&profile) else {
            panic!("profile without path should be rejected");
        };
        assert!(err.to_string().contains("'path'"));
    }

    #[test]
    fn test_mode_from_path() {
        assert_eq!(DuckDbConnector::new("w.duckdb".into()).mode(), Mode::Database);
        assert_eq!(DuckDbConnector::new("data/*.parquet".into()).mode(), Mode::FileScan);
        assert_eq!(DuckDbConnector::new("data/".into()).mode(), Mode::FileScan);
        assert_eq!(DuckDbConnector::new("events.csv".into()).mode(), Mode::SingleFile);
        assert_eq!(DuckDbConnector::new("data/*.parquet".into()).snapshot_name(), "data");
    }
}
