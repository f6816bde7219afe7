use serde::Serialize;

use crate::catalog::{CatalogRun, ColumnFailure, TableFailure};
use crate::error::{Result, ScribeError};
use crate::schema::types::{Description, SourceKind};

#[derive(Serialize)]
struct CatalogDocument<'a> {
    name: &'a str,
    source: SourceKind,
    tables: Vec<TableEntry<'a>>,
    summary: Summary,
    failures: &'a [ColumnFailure],
    table_failures: &'a [TableFailure],
}

#[derive(Serialize)]
struct TableEntry<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    comment: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_path: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    columns: Vec<ColumnEntry<'a>>,
}

#[derive(Serialize)]
struct ColumnEntry<'a> {
    name: &'a str,
    data_type: &'a str,
    nullable: bool,
    /// `null` when the description is unavailable.
    description: Option<&'a str>,
}

#[derive(Serialize)]
struct Summary {
    tables: usize,
    columns: usize,
    described: usize,
    failed: usize,
    llm_calls: usize,
    reused: usize,
    interrupted: bool,
}

/// Render a finished run as pretty-printed JSON, tables and columns in source order.
pub fn render(run: &CatalogRun) -> Result<String> {
    let snapshot = &run.snapshot;
    let tables = snapshot
        .tables
        .values()
        .map(|table| TableEntry {
            name: &table.name,
            comment: table.comment.as_deref(),
            source_path: table.source_path.as_deref(),
            description: table.description.as_ref().and_then(Description::as_generated),
            columns: table
                .columns
                .values()
                .map(|column| ColumnEntry {
                    name: &column.name,
                    data_type: &column.data_type,
                    nullable: column.nullable,
                    description: column.description.as_ref().and_then(Description::as_generated),
                })
                .collect(),
        })
        .collect();

    let document = CatalogDocument {
        name: &snapshot.name,
        source: snapshot.source,
        tables,
        summary: Summary {
            tables: snapshot.table_count(),
            columns: snapshot.column_count(),
            described: snapshot.described_count(),
            failed: run.failure_count(),
            llm_calls: run.llm_calls,
            reused: run.reused,
            interrupted: run.interrupted,
        },
        failures: &run.failures,
        table_failures: &run.table_failures,
    };

    let mut json = serde_json::to_string_pretty(&document).map_err(|e| ScribeError::Render {
        message: format!("Failed to serialize catalog: {}", e),
    })?;
    json.push('\n');
    Ok(json)
}
