//! # Workflows
//!
//! Entry points used by the CLI. A workflow resolves profiles from the
//! config, builds components through the registry, runs the catalog
//! generator and renders the result. Writing the catalog file is left to
//! the caller; only the dbt update mode touches disk here.

use std::future::Future;
use std::path::Path;

use tracing::info;

use crate::catalog::{CatalogGenerator, CatalogRun, GeneratorOptions};
use crate::config::{ConnectionProfile, ScribeConfig};
use crate::error::{Result, ScribeError};
use crate::registry::Registry;
use crate::render::dbt_yaml::{DbtYamlWriter, MergeMode, YamlReport};

/// What to do with a dbt project besides rendering the catalog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DbtMode {
    /// Render the catalog only.
    #[default]
    Document,
    /// Merge descriptions into the project's property files.
    Update,
    /// Report missing documentation without writing.
    Check,
}

/// Everything a workflow produced.
#[derive(Debug, Clone)]
pub struct CatalogOutput {
    pub markdown: String,
    pub run: CatalogRun,
    /// Present for [`DbtMode::Update`] and [`DbtMode::Check`].
    pub yaml: Option<YamlReport>,
    pub db_profile: String,
    pub llm_profile: String,
}

impl CatalogOutput {
    /// Fail when a check-mode report found documentation to add, or models
    /// it could not place anywhere.
    pub fn check_result(&self) -> Result<()> {
        let Some(report) = self.yaml.as_ref().filter(|r| !r.written) else {
            return Ok(());
        };
        if !report.has_changes() && report.models_skipped.is_empty() {
            return Ok(());
        }

        let mut message = format!(
            "{} column description(s), {} model description(s) and {} model(s) are undocumented",
            report.columns_updated.len(),
            report.models_updated.len(),
            report.models_created.len()
        );
        if !report.models_skipped.is_empty() {
            message.push_str(&format!(
                "; {} model(s) have no known SQL file: {}",
                report.models_skipped.len(),
                report.models_skipped.join(", ")
            ));
        }
        message.push_str("; run with --update");
        Err(ScribeError::CheckFailed { message })
    }
}

pub struct Workflow<'r> {
    config: ScribeConfig,
    registry: &'r Registry,
    merge_mode: MergeMode,
}

impl<'r> Workflow<'r> {
    pub fn new(config: ScribeConfig, registry: &'r Registry) -> Self {
        Self {
            config,
            registry,
            merge_mode: MergeMode::default(),
        }
    }

    /// How update mode treats descriptions already present in the YAML.
    pub fn with_merge_mode(mut self, mode: MergeMode) -> Self {
        self.merge_mode = mode;
        self
    }

    /// Catalog a database named by a `[db_connections]` profile.
    pub async fn generate_from_db(
        &self,
        db_profile: Option<&str>,
        llm_profile: Option<&str>,
    ) -> Result<CatalogOutput> {
        self.generate_from_db_until(db_profile, llm_profile, std::future::pending())
            .await
    }

    pub async fn generate_from_db_until<F>(
        &self,
        db_profile: Option<&str>,
        llm_profile: Option<&str>,
        shutdown: F,
    ) -> Result<CatalogOutput>
    where
        F: Future<Output = ()>,
    {
        let db = self.config.connection_profile(db_profile)?;
        let options = self.config.generator_options();
        self.generate(db, llm_profile, options, None, shutdown).await
    }

    /// Catalog the models of a compiled dbt project.
    pub async fn generate_from_dbt(
        &self,
        project_dir: &Path,
        llm_profile: Option<&str>,
        mode: DbtMode,
    ) -> Result<CatalogOutput> {
        self.generate_from_dbt_until(project_dir, llm_profile, mode, std::future::pending())
            .await
    }

    pub async fn generate_from_dbt_until<F>(
        &self,
        project_dir: &Path,
        llm_profile: Option<&str>,
        mode: DbtMode,
        shutdown: F,
    ) -> Result<CatalogOutput>
    where
        F: Future<Output = ()>,
    {
        let profile = ConnectionProfile::dbt_project(project_dir);
        let writer = match mode {
            DbtMode::Document => None,
            DbtMode::Update | DbtMode::Check => {
                Some((DbtYamlWriter::new(project_dir).with_mode(self.merge_mode), mode))
            }
        };
        let options = self.config.dbt_generator_options();
        self.generate(profile, llm_profile, options, writer, shutdown).await
    }

    async fn generate<F>(
        &self,
        db: ConnectionProfile,
        llm_profile: Option<&str>,
        options: GeneratorOptions,
        writer: Option<(DbtYamlWriter, DbtMode)>,
        shutdown: F,
    ) -> Result<CatalogOutput>
    where
        F: Future<Output = ()>,
    {
        let llm = self.config.llm_profile(llm_profile)?;

        // Build both components before connecting so config errors surface first.
        let mut connector = self.registry.connector_for(&db)?;
        let client = self.registry.llm_client_for(&llm)?;
        info!(db = %db.name, kind = %db.kind, llm = %llm.name, provider = %llm.provider, "starting catalog run");

        let mut generator = CatalogGenerator::new(client, options);
        let run = generator.run_until(connector.as_mut(), shutdown).await?;
        let markdown = generator.render_markdown(&run)?;

        let yaml = match writer {
            None => None,
            Some((writer, DbtMode::Check)) => Some(writer.check(&run.snapshot)?),
            Some((writer, _)) => Some(writer.apply(&run.snapshot)?),
        };
        generator.finish()?;

        Ok(CatalogOutput {
            markdown,
            run,
            yaml,
            db_profile: db.name,
            llm_profile: llm.name,
        })
    }
}
