use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::{Result, ScribeError};
use crate::schema::types::{SchemaSnapshot, SourceKind};

/// A source that can be turned into a [`SchemaSnapshot`].
///
/// Implementations own their connection handle: `connect` opens it,
/// `extract_schema` reads metadata through it and `close` releases it.
/// Callers should go through [`extract`], which guarantees `close` runs on
/// every exit path.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Which kind of source this connector reads.
    fn kind(&self) -> SourceKind;

    /// Open the underlying connection or file.
    async fn connect(&mut self) -> Result<()>;

    /// Read tables and columns. Requires a prior successful `connect`.
    async fn extract_schema(&mut self) -> Result<SchemaSnapshot>;

    /// Release the connection. Safe to call more than once, or without `connect`.
    async fn close(&mut self);
}

/// Connect, extract and close, in that order, closing even when extraction fails.
///
/// A snapshot with zero tables is an extraction error: there is nothing to
/// document, and producing an empty catalog would look like a success.
pub async fn extract(connector: &mut dyn Connector) -> Result<SchemaSnapshot> {
    let kind = connector.kind();
    connector.connect().await?;

    let result = connector.extract_schema().await;
    connector.close().await;

    let snapshot = result?;
    if snapshot.tables.is_empty() {
        return Err(ScribeError::extraction(format!(
            "no tables found in {} source '{}'",
            kind, snapshot.name
        )));
    }

    info!(
        source = %kind,
        tables = snapshot.table_count(),
        columns = snapshot.column_count(),
        "schema extracted"
    );
    Ok(snapshot)
}

/// Log and drop a table whose metadata could not be read.
pub(crate) fn skip_table(table: &str, err: &dyn std::fmt::Display) {
    warn!(table, error = %err, "skipping table: column metadata unreadable");
}

/// Hide the password of a connection URL so it can be shown in errors and logs.
pub fn redact_url(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("****"));
            }
            parsed.to_string()
        }
        Err(_) => raw.to_string(),
    }
}
