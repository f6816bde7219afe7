//! # Prompt Templates
//!
//! Builds the messages sent for one column or one model description. The
//! system framing is identical for every backend so that swapping providers
//! changes the wording of answers, not what is being asked.

use crate::schema::types::{ColumnInfo, TableInfo};

/// Framing shared by every LLM backend.
pub const SYSTEM_PROMPT: &str = "You are a data catalog assistant. Given a database column's technical metadata, write a short, non-technical description of what the data represents, for a business audience. Answer in one or two plain sentences. Do not use markdown, do not repeat the column name or its type, and do not speculate about values you cannot infer.";

/// Framing for model-level (table) descriptions.
pub const TABLE_SYSTEM_PROMPT: &str = "You are a data catalog assistant. Given a database table's name and columns, write a short, non-technical description of what one row of the table represents and what the table is used for, for a business audience. Answer in one to three plain sentences. Do not use markdown and do not list the columns back.";

/// Sibling columns listed in a prompt before the list is cut off.
const MAX_SIBLINGS: usize = 30;

/// Everything the LLM is told about one column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnContext {
    pub table: String,
    pub column: String,
    pub data_type: String,
    pub nullable: bool,
    pub table_comment: Option<String>,
    /// Other columns of the same table, in source order.
    pub sibling_columns: Vec<String>,
}

impl ColumnContext {
    pub fn new(table: &TableInfo, column: &ColumnInfo) -> Self {
        Self {
            table: table.name.clone(),
            column: column.name.clone(),
            data_type: column.data_type.clone(),
            nullable: column.nullable,
            table_comment: table.comment.clone(),
            sibling_columns: table
                .columns
                .keys()
                .filter(|name| **name != column.name)
                .cloned()
                .collect(),
        }
    }
}

/// Everything the LLM is told about one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableContext {
    pub table: String,
    pub comment: Option<String>,
    /// `(name, type)` of every column, in source order.
    pub columns: Vec<(String, String)>,
}

impl TableContext {
    pub fn new(table: &TableInfo) -> Self {
        Self {
            table: table.name.clone(),
            comment: table.comment.clone(),
            columns: table
                .columns
                .values()
                .map(|c| (c.name.clone(), c.data_type.clone()))
                .collect(),
        }
    }
}

/// Build the user message describing a single column.
pub fn column_prompt(ctx: &ColumnContext) -> String {
    let mut prompt = format!(
        "Table: {}\nColumn: {}\nType: {}\nNullable: {}\n",
        ctx.table,
        ctx.column,
        ctx.data_type,
        if ctx.nullable { "yes" } else { "no" },
    );

    if let Some(comment) = ctx.table_comment.as_deref().filter(|c| !c.trim().is_empty()) {
        prompt.push_str(&format!("Table description: {}\n", comment.trim()));
    }

    if !ctx.sibling_columns.is_empty() {
        let shown: Vec<&str> = ctx
            .sibling_columns
            .iter()
            .take(MAX_SIBLINGS)
            .map(String::as_str)
            .collect();
        prompt.push_str(&format!("Other columns in this table: {}", shown.join(", ")));
        if ctx.sibling_columns.len() > MAX_SIBLINGS {
            prompt.push_str(&format!(
                " (and {} more)",
                ctx.sibling_columns.len() - MAX_SIBLINGS
            ));
        }
        prompt.push('\n');
    }

    prompt.push_str("\nDescribe what this column represents.");
    prompt
}

/// Build the user message describing a whole table.
pub fn table_prompt(ctx: &TableContext) -> String {
    let mut prompt = format!("Table: {}\n", ctx.table);

    if let Some(comment) = ctx.comment.as_deref().filter(|c| !c.trim().is_empty()) {
        prompt.push_str(&format!("Existing description: {}\n", comment.trim()));
    }

    if ctx.columns.is_empty() {
        prompt.push_str("Columns: none\n");
    } else {
        let shown: Vec<String> = ctx
            .columns
            .iter()
            .take(MAX_SIBLINGS)
            .map(|(name, data_type)| format!("{} ({})", name, data_type))
            .collect();
        prompt.push_str(&format!("Columns: {}", shown.join(", ")));
        if ctx.columns.len() > MAX_SIBLINGS {
            prompt.push_str(&format!(" (and {} more)", ctx.columns.len() - MAX_SIBLINGS));
        }
        prompt.push('\n');
    }

    prompt.push_str("\nDescribe what this table represents.");
    prompt
}
