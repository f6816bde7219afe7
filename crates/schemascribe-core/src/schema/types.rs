use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Top-level representation of one extracted schema.
///
/// Tables keep extraction order and columns keep the order the source
/// reported them in, so everything rendered from a snapshot is reproducible.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    pub name: String,
    pub source: SourceKind,
    pub tables: IndexMap<String, TableInfo>,
}

impl SchemaSnapshot {
    pub fn new(source: SourceKind, name: String) -> Self {
        Self {
            name,
            source,
            tables: IndexMap::new(),
        }
    }

    /// Add a table, replacing any earlier table of the same name.
    pub fn push_table(&mut self, table: TableInfo) {
        self.tables.insert(table.name.clone(), table);
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    pub fn column_count(&self) -> usize {
        self.tables.values().map(|t| t.columns.len()).sum()
    }

    /// Number of columns carrying a generated (not unavailable) description.
    pub fn described_count(&self) -> usize {
        self.columns()
            .filter(|(_, c)| matches!(c.description, Some(Description::Generated(_))))
            .count()
    }

    /// Iterate `(table, column)` pairs in source order.
    pub fn columns(&self) -> impl Iterator<Item = (&TableInfo, &ColumnInfo)> {
        self.tables
            .values()
            .flat_map(|t| t.columns.values().map(move |c| (t, c)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Sqlite,
    Postgres,
    MySql,
    DuckDb,
    Dbt,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Sqlite => write!(f, "SQLite"),
            SourceKind::Postgres => write!(f, "PostgreSQL"),
            SourceKind::MySql => write!(f, "MySQL"),
            SourceKind::DuckDb => write!(f, "DuckDB"),
            SourceKind::Dbt => write!(f, "dbt"),
        }
    }
}

/// A table (or dbt model) with its columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableInfo {
    pub name: String,
    /// Source-provided comment, e.g. a dbt model description or `COMMENT ON TABLE`.
    pub comment: Option<String>,
    /// Path of the file defining this table, relative to the project (dbt only).
    pub source_path: Option<String>,
    /// Model-level description from the LLM, when table descriptions are requested.
    #[serde(default)]
    pub description: Option<Description>,
    pub columns: IndexMap<String, ColumnInfo>,
}

impl TableInfo {
    pub fn new(name: String) -> Self {
        Self {
            name,
            comment: None,
            source_path: None,
            description: None,
            columns: IndexMap::new(),
        }
    }

    pub fn push_column(&mut self, column: ColumnInfo) {
        self.columns.insert(column.name.clone(), column);
    }

    /// Names of every column in this table, in order.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.keys().cloned().collect()
    }
}

/// A single column as reported by the source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    /// Declared type exactly as the source reported it.
    pub data_type: String,
    pub nullable: bool,
    pub description: Option<Description>,
}

impl ColumnInfo {
    pub fn new(name: String, data_type: String) -> Self {
        Self {
            name,
            data_type,
            nullable: true,
            description: None,
        }
    }

    /// Key used to share one LLM answer between identical columns of a run.
    pub fn signature(&self) -> (String, String) {
        (self.name.clone(), self.data_type.clone())
    }
}

/// AI description attached to a column or table by the catalog generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "text", rename_all = "snake_case")]
pub enum Description {
    Generated(String),
    /// The LLM call failed or was interrupted; see the run's failure list.
    Unavailable,
}

impl Description {
    pub fn as_generated(&self) -> Option<&str> {
        match self {
            Description::Generated(text) => Some(text),
            Description::Unavailable => None,
        }
    }
}
