use anyhow::Result;

use schemascribe_core::registry;
use schemascribe_core::render::dbt_yaml::{MergeMode, YamlReport};
use schemascribe_core::{DbtMode, Workflow};

use crate::args::DbtArgs;
use crate::commands::{emit_catalog, load_config, print_run_summary, shutdown_signal, spinner};

pub async fn run(args: &DbtArgs) -> Result<()> {
    let config = load_config(&args.config.config)?;
    let merge_mode = if args.overwrite {
        MergeMode::Overwrite
    } else {
        MergeMode::FillMissing
    };
    let workflow = Workflow::new(config, registry::global()).with_merge_mode(merge_mode);

    let mode = if args.update {
        DbtMode::Update
    } else if args.check {
        DbtMode::Check
    } else {
        DbtMode::Document
    };

    let pb = spinner("dbt", "Reading manifest and describing models...")?;
    let result = workflow
        .generate_from_dbt_until(&args.project_dir, args.llm.as_deref(), mode, shutdown_signal())
        .await;
    pb.finish_and_clear();
    let output = result?;

    print_run_summary(&output);
    if let Some(report) = &output.yaml {
        print_yaml_report(report);
    }
    emit_catalog(&output, &args.output)?;

    output.check_result()?;
    Ok(())
}

fn print_yaml_report(report: &YamlReport) {
    let verb = if report.written { "Updated" } else { "Would update" };
    for path in &report.files_updated {
        eprintln!("  {} {}", verb, path.display());
    }
    let verb = if report.written { "Created" } else { "Would create" };
    for path in &report.files_created {
        eprintln!("  {} {}", verb, path.display());
    }
    eprintln!(
        "Property files: {} column description(s), {} model description(s), {} new model stub(s)",
        report.columns_updated.len(),
        report.models_updated.len(),
        report.models_created.len()
    );
    if !report.models_skipped.is_empty() {
        eprintln!(
            "Skipped models without a known SQL path: {}",
            report.models_skipped.join(", ")
        );
    }
    if !report.has_changes() {
        eprintln!("dbt documentation is up to date");
    }
}
