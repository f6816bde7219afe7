use anyhow::Result;

use schemascribe_core::registry;
use schemascribe_core::Workflow;

use crate::args::DbArgs;
use crate::commands::{emit_catalog, load_config, print_run_summary, shutdown_signal, spinner};

pub async fn run(args: &DbArgs) -> Result<()> {
    let config = load_config(&args.config.config)?;
    let workflow = Workflow::new(config, registry::global());

    let pb = spinner("db", "Extracting schema and describing columns...")?;
    let result = workflow
        .generate_from_db_until(args.db.as_deref(), args.llm.as_deref(), shutdown_signal())
        .await;
    pb.finish_and_clear();
    let output = result?;

    print_run_summary(&output);
    emit_catalog(&output, &args.output)
}
