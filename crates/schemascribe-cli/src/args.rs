use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use schemascribe_core::config::CONFIG_FILE_NAME;
use schemascribe_core::render::OutputFormat;

#[derive(Parser, Debug)]
#[command(
    name = "schemascribe",
    about = "Write a data catalog for a database or dbt project with an LLM",
    version,
    after_help = "Examples:\n  schemascribe db --output catalog.md              # default profiles from scribe.toml\n  schemascribe db --db warehouse --llm openai --format json\n  schemascribe dbt --project-dir ./analytics --update\n  schemascribe dbt --project-dir ./analytics --check\n  schemascribe profiles"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Catalog a database named by a [db_connections] profile
    Db(DbArgs),

    /// Catalog the models of a compiled dbt project
    Dbt(DbtArgs),

    /// List configured profiles and supported connector / provider types
    Profiles(ProfilesArgs),
}

#[derive(Args, Debug)]
pub struct ConfigArg {
    /// Path to the config file
    #[arg(long, default_value = CONFIG_FILE_NAME)]
    pub config: PathBuf,
}

#[derive(Args, Debug)]
pub struct OutputArgs {
    /// Output file path; the catalog is printed to stdout when omitted
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Output format (auto-detected from file extension if not specified)
    #[arg(long)]
    pub format: Option<CatalogFormat>,
}

#[derive(Parser, Debug)]
pub struct DbArgs {
    /// Database profile (default: [default].db)
    #[arg(long)]
    pub db: Option<String>,

    /// LLM profile (default: [default].llm)
    #[arg(long)]
    pub llm: Option<String>,

    #[command(flatten)]
    pub config: ConfigArg,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Parser, Debug)]
pub struct DbtArgs {
    /// dbt project root; `target/manifest.json` must exist (run `dbt compile`)
    #[arg(long, default_value = ".")]
    pub project_dir: PathBuf,

    /// LLM profile (default: [default].llm)
    #[arg(long)]
    pub llm: Option<String>,

    #[command(flatten)]
    pub config: ConfigArg,

    #[command(flatten)]
    pub output: OutputArgs,

    /// Write generated descriptions into the project's property files
    #[arg(long, conflicts_with = "check")]
    pub update: bool,

    /// Exit 1 when columns or models lack documentation; writes nothing
    #[arg(long)]
    pub check: bool,

    /// With --update, replace descriptions that are already present
    #[arg(long, requires = "update")]
    pub overwrite: bool,
}

#[derive(Parser, Debug)]
pub struct ProfilesArgs {
    #[command(flatten)]
    pub config: ConfigArg,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CatalogFormat {
    Markdown,
    Json,
}

impl From<CatalogFormat> for OutputFormat {
    fn from(format: CatalogFormat) -> Self {
        match format {
            CatalogFormat::Markdown => OutputFormat::Markdown,
            CatalogFormat::Json => OutputFormat::Json,
        }
    }
}

impl OutputArgs {
    /// Determine output format from the explicit flag or the file extension.
    pub fn output_format(&self) -> OutputFormat {
        if let Some(format) = self.format {
            return format.into();
        }
        self.output
            .as_ref()
            .and_then(|p| p.extension())
            .and_then(|e| e.to_str())
            .and_then(|e| e.parse().ok())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_format_from_extension() {
        let cli = Cli::parse_from(["schemascribe", "db", "--output", "catalog.json"]);
        let Command::Db(args) = cli.command else {
            panic!("expected db command");
        };
        assert_eq!(args.output.output_format(), OutputFormat::Json);
        assert_eq!(args.config.config, PathBuf::from(CONFIG_FILE_NAME));
    }

    #[test]
    fn test_explicit_format_wins() {
        let cli = Cli::parse_from([
            "schemascribe", "db", "--output", "catalog.json", "--format", "markdown",
        ]);
        let Command::Db(args) = cli.command else {
            panic!("expected db command");
        };
        assert_eq!(args.output.output_format(), OutputFormat::Markdown);
    }

    #[test]
    fn test_update_and_check_conflict() {
        let result = Cli::try_parse_from(["schemascribe", "dbt", "--update", "--check"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_overwrite_requires_update() {
        assert!(Cli::try_parse_from(["schemascribe", "dbt", "--overwrite"]).is_err());
        assert!(Cli::try_parse_from(["schemascribe", "dbt", "--update", "--overwrite"]).is_ok());
    }
}
