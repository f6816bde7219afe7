pub mod db;
pub mod dbt;
pub mod profiles;

use std::future::Future;
use std::path::Path;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::oneshot;

use schemascribe_core::config::{read_config, ScribeConfig};
use schemascribe_core::output::write_atomic;
use schemascribe_core::render::OutputFormat;
use schemascribe_core::CatalogOutput;

use crate::args::OutputArgs;

pub(crate) fn load_config(path: &Path) -> Result<ScribeConfig> {
    read_config(path).with_context(|| format!("Failed to load {}", path.display()))
}

pub(crate) fn spinner(prefix: &str, message: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} [{prefix}] {msg}")?);
    pb.set_prefix(prefix.to_string());
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    Ok(pb)
}

/// Exit status for a run stopped by Ctrl-C.
const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Install the Ctrl-C handler and return the future that stops the description phase.
///
/// The first Ctrl-C resolves the returned future, so finished descriptions
/// are kept and the catalog is still emitted. A Ctrl-C that arrives once
/// nothing is waiting on that future (a second one, or one during the
/// YAML or catalog writes) exits immediately with status 130. Files are
/// replaced atomically, so that exit never leaves a half-written file.
/// If the handler cannot be installed, the future never resolves.
pub(crate) fn shutdown_signal() -> impl Future<Output = ()> {
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        let mut graceful = Some(tx);
        while tokio::signal::ctrl_c().await.is_ok() {
            if !route_interrupt(&mut graceful) {
                eprintln!("Interrupted");
                std::process::exit(INTERRUPTED_EXIT_CODE);
            }
        }
    });
    async move {
        if rx.await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Hand one interrupt to the running workflow. Returns false when nothing is
/// listening any more and the process should exit.
fn route_interrupt(graceful: &mut Option<oneshot::Sender<()>>) -> bool {
    match graceful.take() {
        Some(tx) => tx.send(()).is_ok(),
        None => false,
    }
}

/// Render the catalog and write it to `--output`, or print it to stdout.
pub(crate) fn emit_catalog(output: &CatalogOutput, args: &OutputArgs) -> Result<()> {
    let format = args.output_format();
    let document = match format {
        OutputFormat::Markdown => output.markdown.clone(),
        OutputFormat::Json => format.render(&output.run)?,
    };

    match &args.output {
        Some(path) => {
            write_atomic(path, document.as_bytes())
                .with_context(|| format!("Failed to write catalog to {}", path.display()))?;
            eprintln!("Catalog written to {} ({})", path.display(), format);
        }
        None => {
            print!("{}", document);
            eprintln!("Catalog not written to a file (printed to stdout)");
        }
    }
    Ok(())
}

pub(crate) fn print_run_summary(output: &CatalogOutput) {
    let run = &output.run;
    eprintln!(
        "Profiles: db={} llm={}",
        output.db_profile, output.llm_profile
    );
    eprintln!(
        "Described {}/{} columns in {} tables ({} LLM calls, {} reused)",
        run.snapshot.described_count(),
        run.snapshot.column_count(),
        run.snapshot.table_count(),
        run.llm_calls,
        run.reused
    );
    if run.failure_count() > 0 {
        eprintln!("{} column(s) could not be described", run.failure_count());
    }
    if !run.table_failures.is_empty() {
        eprintln!("{} table description(s) could not be generated", run.table_failures.len());
    }
    if run.interrupted {
        eprintln!("Run was interrupted; remaining columns are marked unavailable");
    }
}
