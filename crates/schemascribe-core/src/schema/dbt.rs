//! # dbt Project Connector
//!
//! Reads a dbt project's compiled `target/manifest.json` instead of querying
//! a live database. Every node with `resource_type = "model"` becomes a
//! table; the model description becomes the table comment and the model's
//! documented columns become its columns, in manifest order.
//!
//! The manifest only knows column types when the project declares them
//! (`data_type:` in schema.yml or a contract), so undeclared types are
//! reported as `N/A`. Columns are nullable unless they carry a `not_null`
//! constraint.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::Deserialize;

use crate::config::ConnectionProfile;
use crate::error::{Result, ScribeError};
use crate::schema::connector::{skip_table, Connector};
use crate::schema::types::*;

/// Type reported for columns whose type the manifest does not declare.
pub const UNKNOWN_TYPE: &str = "N/A";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Manifest {
    metadata: ManifestMetadata,
    nodes: IndexMap<String, serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ManifestMetadata {
    project_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ModelNode {
    resource_type: String,
    name: String,
    description: String,
    config: ModelConfig,
    columns: IndexMap<String, ManifestColumn>,
    original_file_path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ModelConfig {
    description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ManifestColumn {
    name: String,
    data_type: Option<String>,
    constraints: Vec<ColumnConstraint>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ColumnConstraint {
    #[serde(rename = "type")]
    kind: String,
}

pub struct DbtConnector {
    project_dir: PathBuf,
    manifest: Option<String>,
}

impl DbtConnector {
    pub fn new(project_dir: PathBuf) -> Self {
        Self {
            project_dir,
            manifest: None,
        }
    }

    pub fn from_profile(profile: &ConnectionProfile) -> Result<Self> {
        let dir = profile.settings.require(&profile.name, "project_dir")?;
        Ok(Self::new(PathBuf::from(dir)))
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.project_dir.join("target").join("manifest.json")
    }

    fn project_name(&self, manifest: &Manifest) -> String {
        manifest
            .metadata
            .project_name
            .clone()
            .or_else(|| dir_name(&self.project_dir))
            .unwrap_or_else(|| "dbt".to_string())
    }
}

fn dir_name(path: &Path) -> Option<String> {
    let canonical = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    canonical
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
}

/// Convert one manifest model node into a table.
fn model_to_table(node: ModelNode) -> TableInfo {
    let mut table = TableInfo::new(node.name);

    let description = if node.description.trim().is_empty() {
        node.config.description.unwrap_or_default()
    } else {
        node.description
    };
    if !description.trim().is_empty() {
        table.comment = Some(description);
    }
    table.source_path = node.original_file_path;

    for (key, col) in node.columns {
        let name = if col.name.is_empty() { key } else { col.name };
        let data_type = col
            .data_type
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN_TYPE.to_string());

        let mut column = ColumnInfo::new(name, data_type);
        column.nullable = !col.constraints.iter().any(|c| c.kind == "not_null");
        table.push_column(column);
    }
    table
}

#[async_trait]
impl Connector for DbtConnector {
    fn kind(&self) -> SourceKind {
        SourceKind::Dbt
    }

    async fn connect(&mut self) -> Result<()> {
        let path = self.manifest_path();
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| ScribeError::Connection {
                message: format!(
                    "cannot read manifest.json ({}). Run `dbt compile` or `dbt run` in the project first",
                    e
                ),
                target: path.display().to_string(),
                source: None,
            })?;
        self.manifest = Some(content);
        Ok(())
    }

    async fn extract_schema(&mut self) -> Result<SchemaSnapshot> {
        let content = self
            .manifest
            .as_deref()
            .ok_or_else(|| ScribeError::extraction("dbt connector used before connect()"))?;

        let manifest: Manifest = serde_json::from_str(content).map_err(|e| {
            ScribeError::extraction(format!(
                "failed to parse {}: {}",
                self.manifest_path().display(),
                e
            ))
        })?;

        let mut schema = SchemaSnapshot::new(SourceKind::Dbt, self.project_name(&manifest));

        for (unique_id, raw) in manifest.nodes {
            if raw.get("resource_type").and_then(|v| v.as_str()) != Some("model") {
                continue;
            }
            match serde_json::from_value::<ModelNode>(raw) {
                Ok(node) if node.resource_type == "model" && !node.name.is_empty() => {
                    schema.push_table(model_to_table(node));
                }
                Ok(_) => skip_table(&unique_id, &"model node has no name"),
                Err(e) => skip_table(&unique_id, &e),
            }
        }

        Ok(schema)
    }

    async fn close(&mut self) {
        self.manifest = None;
    }
}
