//! # Markdown Catalog
//!
//! Renders a described snapshot as a Markdown document: one section per
//! table with a column table, followed by a run summary. Output depends
//! only on the input, in source order, so re-running against an unchanged
//! schema produces an identical file.

use std::fmt::Write;

use crate::catalog::CatalogRun;
use crate::schema::types::{Description, SchemaSnapshot, TableInfo};

/// Cell text for a column whose description could not be generated.
pub const UNAVAILABLE_PLACEHOLDER: &str = "_description unavailable_";

/// Render a finished run, including its failure summary.
pub fn render(run: &CatalogRun) -> String {
    let mut out = String::new();
    write_header(&mut out, &run.snapshot);

    if run.interrupted {
        let _ = writeln!(
            out,
            "> **Warning:** this run was interrupted. Columns marked {} were not described.\n",
            UNAVAILABLE_PLACEHOLDER
        );
    }

    write_tables(&mut out, &run.snapshot);

    out.push_str("## Run Summary\n\n");
    let total = run.snapshot.column_count();
    if run.failures.is_empty() {
        let _ = writeln!(out, "All {} columns were described.", total);
    } else {
        let _ = writeln!(
            out,
            "{} of {} columns could not be described:\n",
            run.failure_count(),
            total
        );
        for failure in &run.failures {
            let _ = writeln!(
                out,
                "- {}: {}",
                code_span(&format!("{}.{}", failure.table, failure.column)),
                escape_inline(&failure.error)
            );
        }
    }

    if !run.table_failures.is_empty() {
        let _ = writeln!(
            out,
            "\n{} of {} table descriptions could not be generated:\n",
            run.table_failures.len(),
            run.snapshot.table_count()
        );
        for failure in &run.table_failures {
            let _ = writeln!(out, "- {}: {}", code_span(&failure.table), escape_inline(&failure.error));
        }
    }

    out
}

fn write_header(out: &mut String, snapshot: &SchemaSnapshot) {
    let _ = writeln!(out, "# Data Catalog: {}\n", snapshot.name);
    let _ = writeln!(out, "- **Source:** {}", snapshot.source);
    let _ = writeln!(out, "- **Tables:** {}", snapshot.table_count());
    let _ = writeln!(out, "- **Columns:** {}\n", snapshot.column_count());
}

fn write_tables(out: &mut String, snapshot: &SchemaSnapshot) {
    for table in snapshot.tables.values() {
        write_table(out, table);
    }
}

fn write_table(out: &mut String, table: &TableInfo) {
    let _ = writeln!(out, "## {}\n", table.name);

    if let Some(comment) = table.comment.as_deref().filter(|c| !c.trim().is_empty()) {
        let _ = writeln!(out, "{}\n", comment.trim());
    }

    if let Some(text) = table
        .description
        .as_ref()
        .and_then(Description::as_generated)
        .filter(|t| !t.trim().is_empty())
    {
        let _ = writeln!(out, "**Generated description:** {}\n", escape_inline(text));
    }

    if table.columns.is_empty() {
        out.push_str("_No columns._\n\n");
        return;
    }

    out.push_str("| Column | Type | Nullable | Description |\n");
    out.push_str("|--------|------|----------|-------------|\n");
    for column in table.columns.values() {
        let description = match &column.description {
            Some(Description::Generated(text)) => escape_cell(text),
            Some(Description::Unavailable) => UNAVAILABLE_PLACEHOLDER.to_string(),
            None => String::new(),
        };
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} |",
            code_span(&column.name),
            code_span(&column.data_type),
            if column.nullable { "YES" } else { "NO" },
            description
        );
    }
    out.push('\n');
}

/// Keep a value on one table row: escape pipes, turn line breaks into `<br>`.
fn escape_cell(text: &str) -> String {
    text.trim()
        .replace('|', "\\|")
        .replace("\r\n", "<br>")
        .replace('\n', "<br>")
}

/// Inline code for a table cell, fenced with more backticks than `text` contains in a row.
fn code_span(text: &str) -> String {
    let text = escape_cell(text);
    if text.is_empty() {
        return text;
    }
    let longest_run = text
        .split(|c| c != '`')
        .map(str::len)
        .max()
        .unwrap_or(0);
    let fence = "`".repeat(longest_run + 1);
    let pad = if text.starts_with('`') || text.ends_with('`') {
        " "
    } else {
        ""
    };
    format!("{}{}{}{}{}", fence, pad, text, pad, fence)
}

fn escape_inline(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
