//! Run a plan, and the inspect → diff → filter → plan → apply pipeline.

use crate::change::SchemaDiff;
use crate::diff::{DiffOptions, diff_realms};
use crate::error::{Error, Result};
use crate::filter::{Filtered, partition_destructive};
use crate::introspect::{InspectOptions, inspect_realm};
use crate::plan::{Plan, plan};
use crate::traced::{Connection, ConnectionExt};
use pgsieve_schema::Realm;
use tracing::Instrument;

/// Execute every statement of `plan` in one transaction.
///
/// On failure the transaction is rolled back and the error names the
/// statement that failed. An empty plan doesn't open a transaction.
pub async fn apply(client: &mut tokio_postgres::Client, plan: &Plan) -> Result<()> {
    if plan.is_empty() {
        return Ok(());
    }

    let span = tracing::info_span!("migration.apply", statements = plan.len());
    async {
        let tx = client.transaction().await?;
        for stmt in &plan.statements {
            if let Err(source) = tx.traced().batch_execute(&stmt.sql).await {
                // Dropping `tx` rolls back.
                return Err(Error::Apply {
                    statement: stmt.sql.clone(),
                    source,
                });
            }
        }
        tx.commit().await?;
        Ok::<(), Error>(())
    }
    .instrument(span)
    .await
}

/// How a migration run behaves.
#[derive(Debug, Clone)]
pub struct MigrateOptions {
    /// Apply destructive changes instead of withholding them.
    pub allow_destructive: bool,
    /// Turn likely add/drop pairs into renames.
    pub detect_renames: bool,
    /// Inspect every schema in the database, not just the declared ones.
    /// Undeclared schemas then show up as drops.
    pub whole_realm: bool,
    /// Stop after planning.
    pub dry_run: bool,
}

impl Default for MigrateOptions {
    fn default() -> Self {
        Self {
            allow_destructive: false,
            detect_renames: true,
            whole_realm: false,
            dry_run: false,
        }
    }
}

/// Everything a run computed, whether or not it applied anything.
#[derive(Debug, Clone)]
pub struct MigrationOutcome {
    /// Full diff, destructive changes included.
    pub diff: SchemaDiff,
    /// Kept and withheld changes. With `allow_destructive`, nothing is withheld.
    pub filtered: Filtered,
    /// What was (or would be) executed.
    pub plan: Plan,
    pub applied: bool,
}

/// Compute the diff and plan without touching the database.
pub async fn prepare<C: Connection>(
    conn: &C,
    desired: &Realm,
    opts: &MigrateOptions,
) -> Result<MigrationOutcome> {
    let inspect = if opts.whole_realm {
        InspectOptions::default()
    } else {
        InspectOptions::only(desired.schemas.keys().cloned())
    };
    let current = inspect_realm(conn, &inspect).await?;

    let diff = diff_realms(
        desired,
        &current,
        &DiffOptions {
            detect_renames: opts.detect_renames,
        },
    );

    let filtered = if opts.allow_destructive {
        Filtered {
            kept: diff.changes.clone(),
            withheld: Vec::new(),
        }
    } else {
        partition_destructive(&diff.changes)
    };
    for w in &filtered.withheld {
        tracing::warn!(change = %w, "withholding destructive change");
    }

    let plan = plan(&filtered.kept)?;
    Ok(MigrationOutcome {
        diff,
        filtered,
        plan,
        applied: false,
    })
}

/// Bring the database in line with `desired`.
pub async fn migrate(
    client: &mut tokio_postgres::Client,
    desired: &Realm,
    opts: &MigrateOptions,
) -> Result<MigrationOutcome> {
    let mut outcome = prepare(&*client, desired, opts).await?;

    if outcome.plan.is_empty() {
        tracing::info!("schema is up to date");
        return Ok(outcome);
    }
    if opts.dry_run {
        tracing::info!(statements = outcome.plan.len(), "dry run, not applying");
        return Ok(outcome);
    }

    apply(client, &outcome.plan).await?;
    outcome.applied = true;
    tracing::info!(
        statements = outcome.plan.len(),
        withheld = outcome.filtered.withheld.len(),
        "migration applied"
    );
    Ok(outcome)
}
