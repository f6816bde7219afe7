//! # dbt schema.yml Writer
//!
//! Merges generated model and column descriptions back into a dbt
//! project's property files. Existing YAML is edited in place as a [`serde_yaml::Value`]: keys
//! the writer does not own (tests, meta, tags, docs blocks) are carried
//! through untouched and mapping key order is kept.
//!
//! Models the project documents nowhere get a stub in a `schema.yml` next
//! to their SQL file. Changed files are replaced atomically.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_yaml::{Mapping, Value};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::error::{Result, ScribeError};
use crate::output::write_atomic;
use crate::schema::types::{Description, SchemaSnapshot, TableInfo};

/// Top-level sections of a property file whose nodes carry `columns`.
const NODE_SECTIONS: [&str; 3] = ["models", "seeds", "snapshots"];

/// Project directories searched for property files.
const SEARCH_DIRS: [&str; 3] = ["models", "seeds", "snapshots"];

/// How generated text interacts with descriptions already in the YAML.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MergeMode {
    /// Only fill columns whose description is missing or empty.
    #[default]
    FillMissing,
    /// Replace existing descriptions with generated ones.
    Overwrite,
}

/// Result of merging one property document.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub document: Value,
    /// Snapshot tables that this document defines.
    pub matched_models: Vec<String>,
    /// Models whose own `description` was written.
    pub updated_models: Vec<String>,
    /// `model.column` entries whose description was written.
    pub updated_columns: Vec<String>,
}

impl MergeOutcome {
    pub fn changed(&self) -> bool {
        !self.updated_models.is_empty() || !self.updated_columns.is_empty()
    }
}

/// Fill `description` for every model and column of `existing` that the snapshot knows.
///
/// Unknown models and columns are left alone, as is every key other than a
/// `description`. Unavailable descriptions are never written.
pub fn merge_into(mut existing: Value, snapshot: &SchemaSnapshot, mode: MergeMode) -> MergeOutcome {
    let mut matched_models = Vec::new();
    let mut updated_models = Vec::new();
    let mut updated_columns = Vec::new();

    if let Value::Mapping(root) = &mut existing {
        for section in NODE_SECTIONS {
            let Some(Value::Sequence(nodes)) = root.get_mut(section) else {
                continue;
            };
            for node in nodes.iter_mut() {
                let Some(name) = node.get("name").and_then(Value::as_str).map(str::to_string) else {
                    continue;
                };
                let Some(table) = snapshot.tables.get(&name) else {
                    continue;
                };
                matched_models.push(name.clone());

                if let Some(text) = generated_text(table.description.as_ref()) {
                    if let Some(map) = node.as_mapping_mut() {
                        if set_description(map, text, mode) {
                            updated_models.push(name.clone());
                        }
                    }
                }

                let Some(Value::Sequence(columns)) = node.get_mut("columns") else {
                    continue;
                };
                for column in columns.iter_mut() {
                    if merge_column(column, table, mode) {
                        if let Some(col_name) = column.get("name").and_then(Value::as_str) {
                            updated_columns.push(format!("{}.{}", name, col_name));
                        }
                    }
                }
            }
        }
    }

    MergeOutcome {
        document: existing,
        matched_models,
        updated_models,
        updated_columns,
    }
}

/// Generated, non-empty text of a description.
fn generated_text(description: Option<&Description>) -> Option<&str> {
    description
        .and_then(Description::as_generated)
        .map(str::trim)
        .filter(|text| !text.is_empty())
}

/// Write `description` under the merge policy. Returns whether the mapping changed.
fn set_description(map: &mut Mapping, text: &str, mode: MergeMode) -> bool {
    let current = map.get("description").and_then(Value::as_str).map(str::trim);
    let write = match (mode, current) {
        (_, None) | (_, Some("")) => true,
        (MergeMode::FillMissing, Some(_)) => false,
        (MergeMode::Overwrite, Some(existing)) => existing != text,
    };
    if write {
        map.insert(Value::from("description"), Value::from(text));
    }
    write
}

/// Apply one column's generated description. Returns whether the YAML changed.
fn merge_column(column: &mut Value, table: &TableInfo, mode: MergeMode) -> bool {
    let Value::Mapping(map) = column else {
        return false;
    };
    let Some(text) = map
        .get("name")
        .and_then(Value::as_str)
        .and_then(|name| table.columns.get(name))
        .and_then(|info| generated_text(info.description.as_ref()))
        .map(str::to_string)
    else {
        return false;
    };
    set_description(map, &text, mode)
}

/// What a writer pass did, or in check mode would do.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct YamlReport {
    pub files_updated: Vec<PathBuf>,
    pub files_created: Vec<PathBuf>,
    /// Existing models whose own description was filled or replaced.
    pub models_updated: Vec<String>,
    pub columns_updated: Vec<String>,
    /// Models that received a new stub.
    pub models_created: Vec<String>,
    /// Models documented nowhere and without a known SQL path.
    pub models_skipped: Vec<String>,
    /// False in check mode.
    pub written: bool,
}

impl YamlReport {
    pub fn has_changes(&self) -> bool {
        !self.files_updated.is_empty() || !self.files_created.is_empty()
    }
}

struct PendingFile {
    path: PathBuf,
    document: Value,
    created: bool,
    changed: bool,
}

pub struct DbtYamlWriter {
    project_dir: PathBuf,
    mode: MergeMode,
}

impl DbtYamlWriter {
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
            mode: MergeMode::default(),
        }
    }

    pub fn with_mode(mut self, mode: MergeMode) -> Self {
        self.mode = mode;
        self
    }

    /// Every `.yml` / `.yaml` file under `models/`, `seeds/` and `snapshots/`, sorted.
    pub fn discover(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for dir in SEARCH_DIRS {
            let root = self.project_dir.join(dir);
            if !root.is_dir() {
                continue;
            }
            for entry in WalkDir::new(&root) {
                let entry = entry.map_err(|e| ScribeError::Render {
                    message: format!("Failed to scan {}: {}", root.display(), e),
                })?;
                if entry.file_type().is_file() && is_property_file(entry.path()) {
                    files.push(entry.into_path());
                }
            }
        }
        files.sort();
        Ok(files)
    }

    /// Merge and write every changed or new property file.
    pub fn apply(&self, snapshot: &SchemaSnapshot) -> Result<YamlReport> {
        let (pending, mut report) = self.plan(snapshot)?;

        for file in pending.iter().filter(|f| f.changed) {
            let yaml = serde_yaml::to_string(&file.document).map_err(|e| ScribeError::Render {
                message: format!("Failed to serialize {}: {}", file.path.display(), e),
            })?;
            write_atomic(&file.path, yaml.as_bytes())?;
            info!(file = %file.path.display(), created = file.created, "wrote dbt properties");
        }

        report.written = true;
        Ok(report)
    }

    /// Report what [`apply`](Self::apply) would change without touching the project.
    pub fn check(&self, snapshot: &SchemaSnapshot) -> Result<YamlReport> {
        let (_, report) = self.plan(snapshot)?;
        for model in &report.models_updated {
            warn!(model = %model, "check: missing model description");
        }
        for column in &report.columns_updated {
            warn!(column = %column, "check: missing description");
        }
        for model in &report.models_created {
            warn!(model = %model, "check: model has no documentation");
        }
        Ok(report)
    }

    fn plan(&self, snapshot: &SchemaSnapshot) -> Result<(Vec<PendingFile>, YamlReport)> {
        let mut report = YamlReport::default();
        let mut pending = Vec::new();
        let mut documented = BTreeSet::new();

        for path in self.discover()? {
            let content = std::fs::read_to_string(&path).map_err(|e| ScribeError::Output {
                message: format!("Failed to read {}", path.display()),
                source: e,
            })?;
            let existing: Value = serde_yaml::from_str(&content).map_err(|e| ScribeError::Render {
                message: format!("Failed to parse {}: {}", path.display(), e),
            })?;

            let outcome = merge_into(existing, snapshot, self.mode);
            documented.extend(outcome.matched_models.iter().cloned());
            let changed = outcome.changed();
            if changed {
                report.files_updated.push(path.clone());
                report.models_updated.extend(outcome.updated_models);
                report.columns_updated.extend(outcome.updated_columns);
            }
            pending.push(PendingFile {
                path,
                document: outcome.document,
                created: false,
                changed,
            });
        }

        for table in snapshot.tables.values() {
            if documented.contains(&table.name) {
                continue;
            }
            let Some(source_path) = table.source_path.as_deref() else {
                warn!(model = %table.name, "no SQL path known, cannot create a documentation stub");
                report.models_skipped.push(table.name.clone());
                continue;
            };

            let target = self.stub_path(source_path);
            let stub = model_stub(table);
            match pending.iter_mut().find(|f| f.path == target) {
                Some(file) => {
                    append_model(&mut file.document, stub);
                    if !file.changed && !file.created {
                        report.files_updated.push(target.clone());
                    }
                    file.changed = true;
                }
                None => {
                    let mut root = Mapping::new();
                    root.insert(Value::from("version"), Value::from(2));
                    root.insert(Value::from("models"), Value::Sequence(vec![stub]));
                    report.files_created.push(target.clone());
                    pending.push(PendingFile {
                        path: target,
                        document: Value::Mapping(root),
                        created: true,
                        changed: true,
                    });
                }
            }
            report.models_created.push(table.name.clone());
        }

        Ok((pending, report))
    }

    /// `schema.yml` in the directory of a model's SQL file.
    fn stub_path(&self, source_path: &str) -> PathBuf {
        let dir = Path::new(source_path).parent().unwrap_or(Path::new(""));
        self.project_dir.join(dir).join("schema.yml")
    }
}

fn is_property_file(path: &Path) -> bool {
    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yml") | Some("yaml")
    );
    let is_project_file = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with("dbt_project."))
        .unwrap_or(false);
    is_yaml && !is_project_file
}

/// A `models:` entry listing every column, with descriptions where available.
fn model_stub(table: &TableInfo) -> Value {
    let columns = table
        .columns
        .values()
        .map(|column| {
            let mut entry = Mapping::new();
            entry.insert(Value::from("name"), Value::from(column.name.as_str()));
            if let Some(text) = generated_text(column.description.as_ref()) {
                entry.insert(Value::from("description"), Value::from(text));
            }
            Value::Mapping(entry)
        })
        .collect();

    let mut model = Mapping::new();
    model.insert(Value::from("name"), Value::from(table.name.as_str()));
    if let Some(text) = generated_text(table.description.as_ref()) {
        model.insert(Value::from("description"), Value::from(text));
    }
    model.insert(Value::from("columns"), Value::Sequence(columns));
    Value::Mapping(model)
}

fn append_model(document: &mut Value, stub: Value) {
    if !matches!(document, Value::Mapping(_)) {
        // An empty file parses as null.
        let mut root = Mapping::new();
        root.insert(Value::from("version"), Value::from(2));
        *document = Value::Mapping(root);
    }
    let Value::Mapping(root) = document else {
        return;
    };
    match root.get_mut("models") {
        Some(Value::Sequence(models)) => models.push(stub),
        _ => {
            root.insert(Value::from("models"), Value::Sequence(vec![stub]));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::types::{ColumnInfo, SourceKind};

    fn described_snapshot() -> SchemaSnapshot {
        let mut snapshot = SchemaSnapshot::new(SourceKind::Dbt, "jaffle_shop".to_string());

        let mut customers = TableInfo::new("customers".to_string());
        customers.source_path = Some("models/customers.sql".to_string());
        let mut id = ColumnInfo::new("customer_id".to_string(), "integer".to_string());
        id.description = Some(Description::Generated("Unique customer number.".to_string()));
        customers.push_column(id);
        let mut name = ColumnInfo::new("first_name".to_string(), "N/A".to_string());
        name.description = Some(Description::Generated("Customer's given name.".to_string()));
        customers.push_column(name);
        let mut ltv = ColumnInfo::new("lifetime_value".to_string(), "N/A".to_string());
        ltv.description = Some(Description::Unavailable);
        customers.push_column(ltv);
        snapshot.push_table(customers);

        snapshot
    }

    const EXISTING: &str = r#"
version: 2
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
      - name: lifetime_value
      - name: legacy_col
  - name: orders
    columns:
      - name: order_id
"#;

    fn existing() -> Value {
        serde_yaml::from_str(EXISTING).unwrap()
    }

    #[test]
    fn test_fill_missing_preserves_other_keys() {
        let outcome = merge_into(existing(), &described_snapshot(), MergeMode::FillMissing);
        assert_eq!(outcome.updated_columns, vec!["customers.customer_id"]);
        assert_eq!(outcome.matched_models, vec!["customers"]);

        let doc = &outcome.document;
        let customers = &doc["models"][0];
        assert_eq!(customers["meta"]["owner"], "analytics");
        assert_eq!(customers["description"], "One row per customer");
        assert_eq!(customers["columns"][0]["description"], "Unique customer number.");
        assert_eq!(customers["columns"][0]["tests"][1], "not_null");
        assert_eq!(customers["columns"][1]["description"], "Hand written.");
        // Unavailable descriptions are never written.
        assert!(customers["columns"][2].get("description").is_none());
        assert!(customers["columns"][3].get("description").is_none());
        // Unknown model untouched.
        assert!(doc["models"][1]["columns"][0].get("description").is_none());
    }

    #[test]
    fn test_overwrite_replaces_existing() {
        let outcome = merge_into(existing(), &described_snapshot(), MergeMode::Overwrite);
        assert_eq!(
            outcome.updated_columns,
            vec!["customers.customer_id", "customers.first_name"]
        );
        assert_eq!(
            outcome.document["models"][0]["columns"][1]["description"],
            "Customer's given name."
        );
    }

    fn snapshot_with_model_descriptions() -> SchemaSnapshot {
        let mut snapshot = described_snapshot();
        snapshot.tables.get_mut("customers").unwrap().description =
            Some(Description::Generated("Customers and their lifetime value.".to_string()));
        let mut orders = TableInfo::new("orders".to_string());
        orders.description = Some(Description::Generated("One row per order.".to_string()));
        orders.push_column(ColumnInfo::new("order_id".to_string(), "integer".to_string()));
        snapshot.push_table(orders);
        snapshot
    }

    #[test]
    fn test_model_description_fill_missing() {
        let outcome = merge_into(
            existing(),
            &snapshot_with_model_descriptions(),
            MergeMode::FillMissing,
        );
        // customers already has a description; orders has none.
        assert_eq!(outcome.updated_models, vec!["orders"]);
        assert_eq!(outcome.document["models"][0]["description"], "One row per customer");
        assert_eq!(outcome.document["models"][1]["description"], "One row per order.");
    }

    #[test]
    fn test_model_description_overwrite() {
        let outcome = merge_into(
            existing(),
            &snapshot_with_model_descriptions(),
            MergeMode::Overwrite,
        );
        assert_eq!(outcome.updated_models, vec!["customers", "orders"]);
        assert_eq!(
            outcome.document["models"][0]["description"],
            "Customers and their lifetime value."
        );
    }

    #[test]
    fn test_unavailable_model_description_not_written() {
        let mut snapshot = snapshot_with_model_descriptions();
        snapshot.tables.get_mut("orders").unwrap().description = Some(Description::Unavailable);
        let outcome = merge_into(existing(), &snapshot, MergeMode::FillMissing);
        assert!(outcome.updated_models.is_empty());
        assert!(outcome.document["models"][1].get("description").is_none());
    }

    #[test]
    fn test_stub_carries_model_description() {
        let mut snapshot = snapshot_with_model_descriptions();
        snapshot.tables.shift_remove("orders");
        let stub = model_stub(&snapshot.tables["customers"]);
        assert_eq!(stub["description"], "Customers and their lifetime value.");

        let rendered = serde_yaml::to_string(&stub).unwrap();
        let name = rendered.find("name").unwrap();
        let description = rendered.find("description").unwrap();
        let columns = rendered.find("columns").unwrap();
        assert!(name < description && description < columns);
    }

    #[test]
    fn test_merge_keeps_key_order() {
        let outcome = merge_into(existing(), &described_snapshot(), MergeMode::FillMissing);
        let rendered = serde_yaml::to_string(&outcome.document).unwrap();
        let version = rendered.find("version").unwrap();
        let models = rendered.find("models").unwrap();
        let meta = rendered.find("meta").unwrap();
        let columns = rendered.find("columns").unwrap();
        assert!(version < models);
        assert!(meta < columns);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let once = merge_into(existing(), &described_snapshot(), MergeMode::FillMissing);
        let twice = merge_into(once.document.clone(), &described_snapshot(), MergeMode::FillMissing);
        assert!(!twice.changed());
        assert_eq!(once.document, twice.document);
    }

    #[test]
    fn test_merge_non_mapping_untouched() {
        let outcome = merge_into(Value::Null, &described_snapshot(), MergeMode::FillMissing);
        assert_eq!(outcome.document, Value::Null);
        assert!(outcome.matched_models.is_empty());
    }

    #[test]
    fn test_seeds_section_is_merged() {
        let doc: Value = serde_yaml::from_str(
            "version: 2\nseeds:\n  - name: customers\n    columns:\n      - name: customer_id\n",
        )
        .unwrap();
        let outcome = merge_into(doc, &described_snapshot(), MergeMode::FillMissing);
        assert!(outcome.changed());
    }

    fn project_with(files: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (path, content) in files {
            let full = dir.path().join(path);
            std::fs::create_dir_all(full.parent().unwrap()).unwrap();
            std::fs::write(full, content).unwrap();
        }
        dir
    }

    #[test]
    fn test_discover_skips_project_file_and_other_dirs() {
        let project = project_with(&[
            ("dbt_project.yml", "name: jaffle_shop\n"),
            ("models/schema.yml", "version: 2\n"),
            ("models/staging/stg.yaml", "version: 2\n"),
            ("seeds/seeds.yml", "version: 2\n"),
            ("macros/macros.yml", "version: 2\n"),
            ("models/customers.sql", "select 1"),
        ]);
        let writer = DbtYamlWriter::new(project.path());
        let found: Vec<String> = writer
            .discover()
            .unwrap()
            .iter()
            .map(|p| p.strip_prefix(project.path()).unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            found,
            vec!["models/schema.yml", "models/staging/stg.yaml", "seeds/seeds.yml"]
        );
    }

    #[test]
    fn test_apply_updates_existing_file() {
        let project = project_with(&[("models/schema.yml", EXISTING)]);
        let report = DbtYamlWriter::new(project.path())
            .apply(&described_snapshot())
            .unwrap();

        assert!(report.written);
        assert_eq!(report.files_updated.len(), 1);
        assert!(report.files_created.is_empty());

        let written = std::fs::read_to_string(project.path().join("models/schema.yml")).unwrap();
        assert!(written.contains("Unique customer number."));
        assert!(written.contains("owner: analytics"));
    }

    #[test]
    fn test_apply_creates_stub_for_undocumented_model() {
        let project = project_with(&[("models/customers.sql", "select 1")]);
        let report = DbtYamlWriter::new(project.path())
            .apply(&described_snapshot())
            .unwrap();

        assert_eq!(report.models_created, vec!["customers"]);
        let stub_path = project.path().join("models/schema.yml");
        assert_eq!(report.files_created, vec![stub_path.clone()]);

        let doc: Value = serde_yaml::from_str(&std::fs::read_to_string(stub_path).unwrap()).unwrap();
        assert_eq!(doc["version"], 2);
        assert_eq!(doc["models"][0]["name"], "customers");
        assert_eq!(doc["models"][0]["columns"][0]["description"], "Unique customer number.");
        assert!(doc["models"][0]["columns"][2].get("description").is_none());
    }

    #[test]
    fn test_stub_appended_to_existing_file_in_same_directory() {
        let project = project_with(&[(
            "models/schema.yml",
            "version: 2\nmodels:\n  - name: orders\n    columns: []\n",
        )]);
        let report = DbtYamlWriter::new(project.path())
            .apply(&described_snapshot())
            .unwrap();
        assert!(report.files_created.is_empty());
        assert_eq!(report.files_updated.len(), 1);

        let doc: Value = serde_yaml::from_str(
            &std::fs::read_to_string(project.path().join("models/schema.yml")).unwrap(),
        )
        .unwrap();
        assert_eq!(doc["models"][0]["name"], "orders");
        assert_eq!(doc["models"][1]["name"], "customers");
    }

    #[test]
    fn test_check_does_not_write() {
        let project = project_with(&[("models/schema.yml", EXISTING)]);
        let report = DbtYamlWriter::new(project.path())
            .check(&described_snapshot())
            .unwrap();

        assert!(report.has_changes());
        assert!(!report.written);
        let content = std::fs::read_to_string(project.path().join("models/schema.yml")).unwrap();
        assert_eq!(content, EXISTING);
    }

    #[test]
    fn test_check_passes_when_documented() {
        let project = project_with(&[("models/schema.yml", EXISTING)]);
        let writer = DbtYamlWriter::new(project.path());
        writer.apply(&described_snapshot()).unwrap();
        assert!(!writer.check(&described_snapshot()).unwrap().has_changes());
    }

    #[test]
    fn test_invalid_yaml_is_render_error() {
        let project = project_with(&[("models/schema.yml", "models: [unclosed\n")]);
        let err = DbtYamlWriter::new(project.path())
            .check(&described_snapshot())
            .unwrap_err();
        assert!(matches!(err, ScribeError::Render { .. }));
    }

    #[test]
    fn test_model_without_sql_path_is_skipped() {
        let project = project_with(&[]);
        let mut snapshot = described_snapshot();
        snapshot.tables.get_mut("customers").unwrap().source_path = None;
        let report = DbtYamlWriter::new(project.path()).apply(&snapshot).unwrap();
        assert_eq!(report.models_skipped, vec!["customers"]);
        assert!(!report.has_changes());
    }
}
