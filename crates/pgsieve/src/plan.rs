//! Turn a change tree into SQL.
//!
//! Statements are emitted in three phases:
//!
//! 1. foreign key drops, so nothing that follows trips over a dependency
//! 2. everything else, in tree order
//! 3. foreign key additions, once every referenced table and column exists
//!
//! Foreign keys of newly created tables go to phase 3 as well, which lets
//! tables that reference each other be created in any order.

use crate::change::Change;
use crate::filter::{Scope, WithheldChange};
use pgsieve_schema::{Attr, Check, Column, ForeignKey, Index, PrimaryKey, ReferentialAction, Table};
use pgsieve_sql::{Ident, Lit, quote_qualified, unique_constraint_name};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Schema used for table changes that aren't nested in a [`Change::ModifySchema`].
pub const DEFAULT_SCHEMA: &str = "public";

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("`{change}` is not inside a table")]
    MissingTable { change: String },
}

/// One SQL statement in a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub sql: String,
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

/// An ordered list of statements, meant to run in a single transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    pub statements: Vec<Statement>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    /// The whole plan as a script, one statement per line.
    pub fn to_sql(&self) -> String {
        let mut out = String::new();
        for stmt in &self.statements {
            out.push_str(&stmt.sql);
            out.push('\n');
        }
        out
    }
}

/// Plan a change tree.
pub fn plan(changes: &[Change]) -> Result<Plan, PlanError> {
    let mut planner = Planner::default();
    for change in changes {
        planner.change(&Scope::default(), change)?;
    }
    Ok(planner.finish())
}

/// Plan changes that were withheld by the destructive filter, each in the
/// scope it was found in.
pub fn plan_withheld(withheld: &[WithheldChange]) -> Result<Plan, PlanError> {
    let mut planner = Planner::default();
    for w in withheld {
        planner.change(&w.scope, &w.change)?;
    }
    Ok(planner.finish())
}

#[derive(Default)]
struct Planner {
    pre: Vec<Statement>,
    main: Vec<Statement>,
    post: Vec<Statement>,
    /// `(schema, new name) -> old name`. Phase 1 runs before any rename.
    renamed: HashMap<(String, String), String>,
}

/// Resolved location of a table-level change.
struct Target<'a> {
    schema: &'a str,
    table: &'a str,
}

impl Target<'_> {
    fn qualified(&self) -> String {
        quote_qualified(self.schema, self.table)
    }
}

impl Planner {
    fn finish(self) -> Plan {
        let mut statements = self.pre;
        statements.extend(self.main);
        statements.extend(self.post);
        Plan { statements }
    }

    fn push(phase: &mut Vec<Statement>, sql: String) {
        phase.push(Statement { sql });
    }

    fn change(&mut self, scope: &Scope, change: &Change) -> Result<(), PlanError> {
        let schema = scope.schema.as_deref().unwrap_or(DEFAULT_SCHEMA);

        match change {
            Change::AddSchema(name) => {
                Self::push(&mut self.main, format!("CREATE SCHEMA {};", Ident(name)));
            }
            Change::DropSchema(name) => {
                Self::push(&mut self.main, format!("DROP SCHEMA {} CASCADE;", Ident(name)));
            }
            Change::ModifySchema { name, changes } => {
                let inner = scope.schema(name);
                for c in changes {
                    self.change(&inner, c)?;
                }
            }
            Change::AddTable(table) => self.add_table(schema, table),
            Change::DropTable(table) => {
                // Its own foreign keys go first so drop order between
                // dropped tables doesn't matter.
                let target = quote_qualified(schema, &table.name);
                for fk in &table.foreign_keys {
                    Self::push(&mut self.pre, drop_constraint_sql(&target, &fk.name));
                }
                Self::push(&mut self.main, format!("DROP TABLE {};", target));
            }
            Change::RenameTable { from, to } => {
                self.renamed
                    .insert((schema.to_string(), to.clone()), from.clone());
                Self::push(
                    &mut self.main,
                    format!(
                        "ALTER TABLE {} RENAME TO {};",
                        quote_qualified(schema, from),
                        Ident(to)
                    ),
                );
            }
            Change::ModifyTable { name, changes } => {
                let inner = Scope {
                    schema: Some(schema.to_string()),
                    table: Some(name.clone()),
                };
                for c in changes {
                    self.change(&inner, c)?;
                }
            }
            leaf => {
                let table = scope.table.as_deref().ok_or_else(|| PlanError::MissingTable {
                    change: leaf.to_string(),
                })?;
                self.table_change(Target { schema, table }, leaf);
            }
        }
        Ok(())
    }

    fn add_table(&mut self, schema: &str, table: &Table) {
        Self::push(&mut self.main, create_table_sql(schema, table));
        for idx in &table.indexes {
            Self::push(&mut self.main, create_index_sql(schema, &table.name, idx));
        }
        let target = quote_qualified(schema, &table.name);
        for attr in &table.attrs {
            Self::push(&mut self.main, attr_sql(&target, Some(attr)));
        }
        for fk in &table.foreign_keys {
            Self::push(&mut self.post, add_foreign_key_sql(&target, fk));
        }
    }

    /// Name of the table as it is before phase 2 runs.
    fn pre_rename_target(&self, t: &Target<'_>) -> String {
        let key = (t.schema.to_string(), t.table.to_string());
        match self.renamed.get(&key) {
            Some(old) => quote_qualified(t.schema, old),
            None => t.qualified(),
        }
    }

    fn table_change(&mut self, t: Target<'_>, change: &Change) {
        let q = t.qualified();
        let main = &mut self.main;
        match change {
            Change::AddColumn(col) => {
                Self::push(main, format!("ALTER TABLE {} ADD COLUMN {};", q, column_def(col)));
            }
            Change::DropColumn(name) => {
                Self::push(main, format!("ALTER TABLE {} DROP COLUMN {};", q, Ident(name)));
            }
            Change::AlterColumnType { name, to, .. } => Self::push(
                main,
                format!(
                    "ALTER TABLE {} ALTER COLUMN {} TYPE {} USING {}::{};",
                    q,
                    Ident(name),
                    to,
                    Ident(name),
                    to
                ),
            ),
            Change::AlterColumnNullable { name, to, .. } => {
                let action = if *to { "DROP NOT NULL" } else { "SET NOT NULL" };
                Self::push(
                    main,
                    format!("ALTER TABLE {} ALTER COLUMN {} {};", q, Ident(name), action),
                );
            }
            Change::AlterColumnDefault { name, to, .. } => {
                let action = match to {
                    Some(expr) => format!("SET DEFAULT {}", expr),
                    None => "DROP DEFAULT".to_string(),
                };
                Self::push(
                    main,
                    format!("ALTER TABLE {} ALTER COLUMN {} {};", q, Ident(name), action),
                );
            }
            Change::AddUnique(col) => Self::push(
                main,
                format!(
                    "ALTER TABLE {} ADD CONSTRAINT {} UNIQUE ({});",
                    q,
                    Ident(unique_constraint_name(t.table, col)),
                    Ident(col)
                ),
            ),
            Change::DropUnique { constraint, .. } => {
                Self::push(main, drop_constraint_sql(&q, constraint));
            }
            Change::AddPrimaryKey(pk) => Self::push(main, add_primary_key_sql(&q, pk)),
            Change::DropPrimaryKey(pk) => Self::push(main, drop_constraint_sql(&q, &pk.name)),
            Change::ModifyPrimaryKey { from, to } => {
                Self::push(main, drop_constraint_sql(&q, &from.name));
                Self::push(main, add_primary_key_sql(&q, to));
            }
            Change::AddForeignKey(fk) => Self::push(&mut self.post, add_foreign_key_sql(&q, fk)),
            Change::DropForeignKey(fk) => {
                let pre_q = self.pre_rename_target(&t);
                Self::push(&mut self.pre, drop_constraint_sql(&pre_q, &fk.name));
            }
            Change::ModifyForeignKey { from, to } => {
                let pre_q = self.pre_rename_target(&t);
                Self::push(&mut self.pre, drop_constraint_sql(&pre_q, &from.name));
                Self::push(&mut self.post, add_foreign_key_sql(&q, to));
            }
            Change::AddIndex(idx) => Self::push(main, create_index_sql(t.schema, t.table, idx)),
            Change::DropIndex(name) => Self::push(main, drop_index_sql(t.schema, name)),
            Change::ModifyIndex { from, to } => {
                Self::push(main, drop_index_sql(t.schema, &from.name));
                Self::push(main, create_index_sql(t.schema, t.table, to));
            }
            Change::AddCheck(check) => Self::push(main, add_check_sql(&q, check)),
            Change::DropCheck(name) => Self::push(main, drop_constraint_sql(&q, name)),
            Change::ModifyCheck { from, to } => {
                Self::push(main, drop_constraint_sql(&q, &from.name));
                Self::push(main, add_check_sql(&q, to));
            }
            Change::AddAttr(attr) | Change::ModifyAttr { to: attr, .. } => {
                Self::push(main, attr_sql(&q, Some(attr)));
            }
            Change::DropAttr(_) => Self::push(main, attr_sql(&q, None)),
            // Schema and table level changes never reach here.
            Change::AddSchema(_)
            | Change::DropSchema(_)
            | Change::ModifySchema { .. }
            | Change::AddTable(_)
            | Change::DropTable(_)
            | Change::RenameTable { .. }
            | Change::ModifyTable { .. } => {}
        }
    }
}

/// Column definition as used in `CREATE TABLE` and `ADD COLUMN`.
fn column_def(col: &Column) -> String {
    let mut def = format!("{} {}", Ident(&col.name), col.pg_type);
    if !col.nullable {
        def.push_str(" NOT NULL");
    }
    if col.unique {
        def.push_str(" UNIQUE");
    }
    if let Some(default) = &col.default {
        def.push_str(" DEFAULT ");
        def.push_str(default);
    }
    def
}

fn quoted_columns(columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| Ident(c).to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// `CREATE TABLE` with columns, primary key and checks. Indexes, comments and
/// foreign keys are separate statements.
pub fn create_table_sql(schema: &str, table: &Table) -> String {
    let mut parts: Vec<String> = table
        .columns
        .iter()
        .map(|col| format!("    {}", column_def(col)))
        .collect();

    if let Some(pk) = &table.primary_key {
        parts.push(format!(
            "    CONSTRAINT {} PRIMARY KEY ({})",
            Ident(&pk.name),
            quoted_columns(&pk.columns)
        ));
    }

    for check in &table.checks {
        parts.push(format!(
            "    CONSTRAINT {} CHECK ({})",
            Ident(&check.name),
            check.expr
        ));
    }

    let target = quote_qualified(schema, &table.name);
    if parts.is_empty() {
        return format!("CREATE TABLE {} ();", target);
    }
    format!("CREATE TABLE {} (\n{}\n);", target, parts.join(",\n"))
}

pub fn create_index_sql(schema: &str, table: &str, idx: &Index) -> String {
    let unique = if idx.unique { "UNIQUE " } else { "" };
    let columns: Vec<String> = idx.columns.iter().map(|c| c.to_sql()).collect();
    let where_clause = idx
        .where_clause
        .as_ref()
        .map(|w| format!(" WHERE {}", w))
        .unwrap_or_default();
    format!(
        "CREATE {}INDEX {} ON {} ({}){};",
        unique,
        Ident(&idx.name),
        quote_qualified(schema, table),
        columns.join(", "),
        where_clause
    )
}

fn drop_index_sql(schema: &str, name: &str) -> String {
    format!("DROP INDEX IF EXISTS {};", quote_qualified(schema, name))
}

// `IF EXISTS`: dropping a column already takes its constraints with it.
fn drop_constraint_sql(target: &str, name: &str) -> String {
    format!("ALTER TABLE {} DROP CONSTRAINT IF EXISTS {};", target, Ident(name))
}

fn add_primary_key_sql(target: &str, pk: &PrimaryKey) -> String {
    format!(
        "ALTER TABLE {} ADD CONSTRAINT {} PRIMARY KEY ({});",
        target,
        Ident(&pk.name),
        quoted_columns(&pk.columns)
    )
}

fn add_check_sql(target: &str, check: &Check) -> String {
    format!(
        "ALTER TABLE {} ADD CONSTRAINT {} CHECK ({});",
        target,
        Ident(&check.name),
        check.expr
    )
}

fn add_foreign_key_sql(target: &str, fk: &ForeignKey) -> String {
    let mut sql = format!(
        "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
        target,
        Ident(&fk.name),
        quoted_columns(&fk.columns),
        quote_qualified(&fk.references_schema, &fk.references_table),
        quoted_columns(&fk.references_columns)
    );
    if fk.on_delete != ReferentialAction::NoAction {
        sql.push_str(" ON DELETE ");
        sql.push_str(fk.on_delete.to_sql());
    }
    if fk.on_update != ReferentialAction::NoAction {
        sql.push_str(" ON UPDATE ");
        sql.push_str(fk.on_update.to_sql());
    }
    sql.push(';');
    sql
}

fn attr_sql(target: &str, attr: Option<&Attr>) -> String {
    match attr {
        Some(Attr::Comment(text)) => format!("COMMENT ON TABLE {} IS {};", target, Lit(text)),
        None => format!("COMMENT ON TABLE {} IS NULL;", target),
    }
}
