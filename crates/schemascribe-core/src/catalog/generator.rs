//! # Catalog Generator
//!
//! Takes a schema snapshot and asks the LLM client for one description per
//! column. Calls run concurrently up to `concurrency`, each bounded by the
//! retry policy. Every job writes only to its own result slot; once all
//! jobs have finished the slots are reduced back into the snapshot in source
//! order, so the outcome does not depend on which call returned first.
//!
//! Columns sharing a `(name, type)` signature share one call when `dedupe`
//! is on. A failed call never aborts the run: the affected columns get
//! [`Description::Unavailable`] and an entry in [`CatalogRun::failures`].
//!
//! With `describe_tables` on, every table also gets one model-level call,
//! queued after the column calls. Its failures land in
//! [`CatalogRun::table_failures`].

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::catalog::CatalogState;
use crate::error::{Result, ScribeError};
use crate::llm::{ColumnContext, LlmClient, RetryPolicy, TableContext};
use crate::render::markdown;
use crate::schema::connector::{extract, Connector};
use crate::schema::types::{Description, SchemaSnapshot};

/// Failure reason recorded for columns whose call was cut short by shutdown.
pub const INTERRUPTED: &str = "interrupted";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeneratorOptions {
    /// Maximum LLM calls in flight.
    pub concurrency: usize,
    /// Share one call between columns with the same `(name, type)`.
    pub dedupe: bool,
    /// Also ask for one description per table.
    pub describe_tables: bool,
    pub retry: RetryPolicy,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            dedupe: true,
            describe_tables: false,
            retry: RetryPolicy::default(),
        }
    }
}

/// A column whose description could not be produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnFailure {
    pub table: String,
    pub column: String,
    pub error: String,
}

/// A table whose model-level description could not be produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableFailure {
    pub table: String,
    pub error: String,
}

/// Result of describing one snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogRun {
    /// The snapshot with every column's description assigned.
    pub snapshot: SchemaSnapshot,
    /// Failed columns, in source order.
    pub failures: Vec<ColumnFailure>,
    /// Failed table descriptions, in source order.
    pub table_failures: Vec<TableFailure>,
    /// LLM calls that ran to completion, successful or not.
    pub llm_calls: usize,
    /// Columns that took their description from an identical earlier column.
    pub reused: usize,
    /// The run was stopped before every call finished.
    pub interrupted: bool,
}

impl CatalogRun {
    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }
}

/// One LLM call; deduplicated columns point at the same job.
#[derive(Clone)]
enum Job {
    Column(ColumnContext),
    Table(TableContext),
}

impl Job {
    fn label(&self) -> String {
        match self {
            Job::Column(ctx) => format!("{}.{}", ctx.table, ctx.column),
            Job::Table(ctx) => ctx.table.clone(),
        }
    }
}

/// Position of a column in the snapshot and the job that describes it.
struct Assignment {
    table_idx: usize,
    column_idx: usize,
    job_idx: usize,
}

/// A table and the job that describes it.
struct TableAssignment {
    table_idx: usize,
    job_idx: usize,
}

pub struct CatalogGenerator {
    llm: Arc<dyn LlmClient>,
    options: GeneratorOptions,
    state: CatalogState,
}

impl CatalogGenerator {
    pub fn new(llm: Arc<dyn LlmClient>, options: GeneratorOptions) -> Self {
        Self {
            llm,
            options,
            state: CatalogState::Idle,
        }
    }

    pub fn state(&self) -> CatalogState {
        self.state
    }

    fn advance(&mut self, next: CatalogState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(ScribeError::InvalidState {
                from: self.state,
                to: next,
            });
        }
        debug!(from = %self.state, to = %next, "catalog state");
        self.state = next;
        Ok(())
    }

    /// Extract from `connector`, then describe every column.
    pub async fn run(&mut self, connector: &mut dyn Connector) -> Result<CatalogRun> {
        self.run_until(connector, std::future::pending()).await
    }

    /// Like [`run`](Self::run), stopping the description phase early when `shutdown` resolves.
    pub async fn run_until<F>(
        &mut self,
        connector: &mut dyn Connector,
        shutdown: F,
    ) -> Result<CatalogRun>
    where
        F: Future<Output = ()>,
    {
        self.advance(CatalogState::Extracting)?;
        let snapshot = match extract(connector).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                self.advance(CatalogState::Failed)?;
                return Err(err);
            }
        };
        self.describe_until(snapshot, shutdown).await
    }

    /// Describe every column of an already extracted snapshot.
    pub async fn describe(&mut self, snapshot: SchemaSnapshot) -> Result<CatalogRun> {
        self.describe_until(snapshot, std::future::pending()).await
    }

    /// Describe every column, stopping early when `shutdown` resolves.
    ///
    /// On shutdown, in-flight calls are aborted. Descriptions that already
    /// arrived are kept; the remaining columns are marked unavailable with
    /// the reason [`INTERRUPTED`].
    pub async fn describe_until<F>(
        &mut self,
        mut snapshot: SchemaSnapshot,
        shutdown: F,
    ) -> Result<CatalogRun>
    where
        F: Future<Output = ()>,
    {
        self.advance(CatalogState::Describing)?;

        let (mut jobs, assignments) = plan_jobs(&snapshot, self.options.dedupe);
        let column_jobs = jobs.len();
        let table_assignments = if self.options.describe_tables {
            plan_table_jobs(&snapshot, &mut jobs)
        } else {
            Vec::new()
        };
        info!(
            columns = assignments.len(),
            tables = table_assignments.len(),
            llm_calls = jobs.len(),
            concurrency = self.options.concurrency,
            llm = self.llm.name(),
            "describing columns"
        );

        let mut slots: Vec<Option<Result<String>>> = Vec::with_capacity(jobs.len());
        slots.resize_with(jobs.len(), || None);

        let semaphore = Arc::new(Semaphore::new(self.options.concurrency.max(1)));
        let mut tasks = JoinSet::new();
        for (idx, job) in jobs.iter().enumerate() {
            let llm = self.llm.clone();
            let job = job.clone();
            let retry = self.options.retry;
            let semaphore = semaphore.clone();
            tasks.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return (idx, Err(ScribeError::llm_fatal("description pool closed"))),
                };
                let label = job.label();
                let result = match &job {
                    Job::Column(ctx) => retry.run(&label, || llm.describe_column(ctx)).await,
                    Job::Table(ctx) => retry.run(&label, || llm.describe_table(ctx)).await,
                };
                (idx, result)
            });
        }

        tokio::pin!(shutdown);
        let mut interrupted = false;
        loop {
            tokio::select! {
                joined = tasks.join_next() => match joined {
                    None => break,
                    Some(Ok((idx, result))) => slots[idx] = Some(result),
                    Some(Err(e)) if e.is_cancelled() => {}
                    Some(Err(e)) => warn!(error = %e, "description task panicked"),
                },
                _ = &mut shutdown, if !interrupted => {
                    interrupted = true;
                    warn!(pending = tasks.len(), "interrupted, keeping completed descriptions");
                    tasks.abort_all();
                }
            }
        }

        let llm_calls = slots.iter().filter(|slot| slot.is_some()).count();
        let reused = assignments.len() - column_jobs;
        let failures = apply_results(&mut snapshot, &assignments, &slots, interrupted);
        let table_failures =
            apply_table_results(&mut snapshot, &table_assignments, &slots, interrupted);

        info!(
            described = snapshot.described_count(),
            failed = failures.len(),
            tables_failed = table_failures.len(),
            reused,
            interrupted,
            "description finished"
        );

        Ok(CatalogRun {
            snapshot,
            failures,
            table_failures,
            llm_calls,
            reused,
            interrupted,
        })
    }

    /// Render the finished run as Markdown.
    pub fn render_markdown(&mut self, run: &CatalogRun) -> Result<String> {
        self.advance(CatalogState::Rendered)?;
        Ok(markdown::render(run))
    }

    /// Mark the run complete once every output has been produced.
    pub fn finish(&mut self) -> Result<()> {
        self.advance(CatalogState::Done)
    }
}

/// Build one job per column, or per distinct signature when deduplicating.
fn plan_jobs(snapshot: &SchemaSnapshot, dedupe: bool) -> (Vec<Job>, Vec<Assignment>) {
    let mut jobs = Vec::new();
    let mut assignments = Vec::with_capacity(snapshot.column_count());
    let mut by_signature: HashMap<(String, String), usize> = HashMap::new();

    for (table_idx, table) in snapshot.tables.values().enumerate() {
        for (column_idx, column) in table.columns.values().enumerate() {
            let existing = if dedupe {
                by_signature.get(&column.signature()).copied()
            } else {
                None
            };

            let job_idx = match existing {
                Some(job_idx) => job_idx,
                None => {
                    jobs.push(Job::Column(ColumnContext::new(table, column)));
                    let job_idx = jobs.len() - 1;
                    if dedupe {
                        by_signature.insert(column.signature(), job_idx);
                    }
                    job_idx
                }
            };

            assignments.push(Assignment {
                table_idx,
                column_idx,
                job_idx,
            });
        }
    }

    (jobs, assignments)
}

/// Append one job per table after the column jobs.
fn plan_table_jobs(snapshot: &SchemaSnapshot, jobs: &mut Vec<Job>) -> Vec<TableAssignment> {
    snapshot
        .tables
        .values()
        .enumerate()
        .map(|(table_idx, table)| {
            jobs.push(Job::Table(TableContext::new(table)));
            TableAssignment {
                table_idx,
                job_idx: jobs.len() - 1,
            }
        })
        .collect()
}

/// What one job's slot means for the items assigned to it.
fn slot_description(
    slot: &Option<Result<String>>,
    interrupted: bool,
) -> std::result::Result<Description, String> {
    match slot {
        Some(Ok(text)) => Ok(Description::Generated(text.clone())),
        Some(Err(err)) => Err(err.to_string()),
        None if interrupted => Err(INTERRUPTED.to_string()),
        None => Err("description task did not complete".to_string()),
    }
}

/// Write slot results back into the snapshot and collect failures in source order.
fn apply_results(
    snapshot: &mut SchemaSnapshot,
    assignments: &[Assignment],
    slots: &[Option<Result<String>>],
    interrupted: bool,
) -> Vec<ColumnFailure> {
    let mut failures = Vec::new();

    for assignment in assignments {
        let Some((_, table)) = snapshot.tables.get_index_mut(assignment.table_idx) else {
            continue;
        };
        let table_name = table.name.clone();
        let Some((_, column)) = table.columns.get_index_mut(assignment.column_idx) else {
            continue;
        };

        let error = match slot_description(&slots[assignment.job_idx], interrupted) {
            Ok(description) => {
                column.description = Some(description);
                continue;
            }
            Err(error) => error,
        };

        column.description = Some(Description::Unavailable);
        failures.push(ColumnFailure {
            table: table_name,
            column: column.name.clone(),
            error,
        });
    }

    failures
}

fn apply_table_results(
    snapshot: &mut SchemaSnapshot,
    assignments: &[TableAssignment],
    slots: &[Option<Result<String>>],
    interrupted: bool,
) -> Vec<TableFailure> {
    let mut failures = Vec::new();

    for assignment in assignments {
        let Some((_, table)) = snapshot.tables.get_index_mut(assignment.table_idx) else {
            continue;
        };
        match slot_description(&slots[assignment.job_idx], interrupted) {
            Ok(description) => table.description = Some(description),
            Err(error) => {
                table.description = Some(Description::Unavailable);
                failures.push(TableFailure {
                    table: table.name.clone(),
                    error,
                });
            }
        }
    }

    failures
}
