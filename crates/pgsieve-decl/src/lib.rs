//! Declarative schema language for pgsieve.
//!
//! A schema file describes the desired end state of a database. It is a
//! [styx](https://github.com/bearcove/styx) document deserialized into the
//! facet types below, then validated and lowered into a [`Realm`]:
//!
//! ```text
//! schemas {
//!     public {
//!         tables {
//!             users {
//!                 comment "Registered accounts"
//!                 columns {
//!                     id {type uuid, default "gen_random_uuid()"}
//!                     email {type text, unique true}
//!                     bio {type text, nullable true}
//!                 }
//!                 primary-key (id)
//!                 indexes {
//!                     idx_users_email_lower {columns ("email DESC")}
//!                 }
//!                 checks {
//!                     users_email_not_blank "char_length(email) > 0"
//!                 }
//!             }
//!         }
//!     }
//! }
//! ```
//!
//! Columns are `NOT NULL` unless marked `nullable true`.

use facet::Facet;
use facet_styx::RenderError;
use indexmap::IndexMap;
use pgsieve_schema::{
    Attr, Check, Column, ForeignKey, Index, IndexColumn, PgType, PrimaryKey, Realm,
    ReferentialAction, Schema, Table, parse_fk_reference,
};
use std::path::Path;

mod error;
pub use error::DeclError;

#[cfg(test)]
mod tests;

/// The schema the demo program ships with: users, groups, and a join table.
pub const DEMO_SCHEMA: &str = include_str!("../demo.styx");

/// Root of a schema file.
#[derive(Debug, Facet)]
pub struct SchemaFile {
    /// Schemas by name.
    #[facet(default)]
    pub schemas: IndexMap<String, SchemaDecl>,
}

/// A declared Postgres schema.
#[derive(Debug, Facet)]
pub struct SchemaDecl {
    /// Tables by name.
    #[facet(default)]
    pub tables: IndexMap<String, TableDecl>,
}

/// A declared table.
#[derive(Debug, Facet)]
#[facet(rename_all = "kebab-case")]
pub struct TableDecl {
    /// Table comment.
    #[facet(default)]
    pub comment: Option<String>,

    /// Columns by name, in declaration order.
    #[facet(default)]
    pub columns: IndexMap<String, ColumnDecl>,

    /// Primary key columns.
    #[facet(default)]
    pub primary_key: Option<Vec<String>>,

    /// Foreign keys by constraint name.
    #[facet(default)]
    pub foreign_keys: IndexMap<String, ForeignKeyDecl>,

    /// Indexes by name.
    #[facet(default)]
    pub indexes: IndexMap<String, IndexDecl>,

    /// CHECK constraints: name to boolean expression.
    #[facet(default)]
    pub checks: IndexMap<String, String>,
}

/// A declared column.
#[derive(Debug, Facet)]
pub struct ColumnDecl {
    /// Postgres type name, e.g. `uuid`, `text`, `"varchar(64)"`, `"bigint[]"`.
    #[facet(rename = "type")]
    pub ty: String,

    #[facet(default)]
    pub nullable: bool,

    /// Default value as a raw SQL expression.
    #[facet(default)]
    pub default: Option<String>,

    #[facet(default)]
    pub unique: bool,
}

/// A declared foreign key.
#[derive(Debug, Facet)]
#[facet(rename_all = "kebab-case")]
pub struct ForeignKeyDecl {
    /// Referencing columns in this table.
    pub columns: Vec<String>,

    /// Target: `table.column`, `table(col, ...)` or `schema.table(col, ...)`.
    pub references: String,

    #[facet(default)]
    pub on_delete: Option<String>,

    #[facet(default)]
    pub on_update: Option<String>,
}

/// A declared index.
#[derive(Debug, Facet)]
pub struct IndexDecl {
    /// Column specs: `name`, `name DESC`, `name ASC NULLS FIRST`, ...
    pub columns: Vec<String>,

    #[facet(default)]
    pub unique: bool,

    /// Predicate for a partial index.
    #[facet(default, rename = "where")]
    pub where_clause: Option<String>,
}

/// Parse a schema document. `filename` is only used in diagnostics.
pub fn parse(source: &str, filename: &str) -> Result<SchemaFile, DeclError> {
    facet_styx::from_str(source).map_err(|e| DeclError::Parse {
        rendered: e.render(filename, source).to_string(),
    })
}

/// Parse and lower a schema document.
pub fn load_str(source: &str, filename: &str) -> Result<Realm, DeclError> {
    parse(source, filename)?.to_realm()
}

/// Read, parse and lower a schema file.
pub fn load_file(path: &Path) -> Result<Realm, DeclError> {
    let source = std::fs::read_to_string(path).map_err(|source| DeclError::Io {
        path: path.display().to_string(),
        source,
    })?;
    load_str(&source, &path.display().to_string())
}

/// The bundled demo schema.
pub fn demo_realm() -> Result<Realm, DeclError> {
    load_str(DEMO_SCHEMA, "<demo.styx>")
}

impl SchemaFile {
    /// Validate the document and convert it into the schema model.
    pub fn to_realm(&self) -> Result<Realm, DeclError> {
        let mut realm = Realm::new();

        for (schema_name, schema_decl) in &self.schemas {
            let mut schema = Schema::new(schema_name);
            for (table_name, table_decl) in &schema_decl.tables {
                let table = lower_table(self, schema_name, table_name, table_decl)?;
                schema.tables.insert(table_name.clone(), table);
            }
            realm.schemas.insert(schema_name.clone(), schema);
        }

        Ok(realm)
    }

    fn table(&self, schema: &str, table: &str) -> Option<&TableDecl> {
        self.schemas.get(schema)?.tables.get(table)
    }
}

/// Lowering context for one table, used to build errors.
struct Scope<'a> {
    schema: &'a str,
    table: &'a str,
}

impl Scope<'_> {
    fn unknown_column(&self, column: &str, context: impl Into<String>) -> DeclError {
        DeclError::UnknownColumn {
            schema: self.schema.to_string(),
            table: self.table.to_string(),
            column: column.to_string(),
            context: context.into(),
        }
    }

    fn no_columns(&self, context: impl Into<String>) -> DeclError {
        DeclError::NoColumns {
            schema: self.schema.to_string(),
            table: self.table.to_string(),
            context: context.into(),
        }
    }
}

fn lower_table(
    file: &SchemaFile,
    schema_name: &str,
    table_name: &str,
    decl: &TableDecl,
) -> Result<Table, DeclError> {
    let scope = Scope {
        schema: schema_name,
        table: table_name,
    };
    let mut table = Table::new(table_name);

    for (column_name, col) in &decl.columns {
        let pg_type = PgType::parse(&col.ty).ok_or_else(|| DeclError::UnknownType {
            schema: schema_name.to_string(),
            table: table_name.to_string(),
            column: column_name.clone(),
            ty: col.ty.clone(),
        })?;
        table.columns.push(Column {
            name: column_name.clone(),
            pg_type,
            nullable: col.nullable,
            default: col.default.clone(),
            unique: col.unique,
            unique_constraint: None,
        });
    }

    if let Some(pk_columns) = &decl.primary_key {
        if pk_columns.is_empty() {
            return Err(scope.no_columns("primary key"));
        }
        for col in pk_columns {
            if !decl.columns.contains_key(col) {
                return Err(scope.unknown_column(col, "primary key"));
            }
        }
        table.primary_key = Some(PrimaryKey {
            name: pgsieve_sql::primary_key_name(table_name),
            columns: pk_columns.clone(),
        });
    }

    for (fk_name, fk) in &decl.foreign_keys {
        table
            .foreign_keys
            .push(lower_foreign_key(file, &scope, decl, fk_name, fk)?);
    }

    for (index_name, idx) in &decl.indexes {
        let context = format!("index `{}`", index_name);
        if idx.columns.is_empty() {
            return Err(scope.no_columns(context.as_str()));
        }
        let columns: Vec<IndexColumn> = idx.columns.iter().map(|c| IndexColumn::parse(c)).collect();
        for col in &columns {
            if !decl.columns.contains_key(&col.name) {
                return Err(scope.unknown_column(&col.name, context.as_str()));
            }
        }
        table.indexes.push(Index {
            name: index_name.clone(),
            columns,
            unique: idx.unique,
            where_clause: idx.where_clause.clone(),
        });
    }

    for (check_name, expr) in &decl.checks {
        table.checks.push(Check {
            name: check_name.clone(),
            expr: expr.clone(),
        });
    }

    if let Some(comment) = &decl.comment {
        table.attrs.push(Attr::Comment(comment.clone()));
    }

    Ok(table)
}

fn lower_foreign_key(
    file: &SchemaFile,
    scope: &Scope<'_>,
    decl: &TableDecl,
    fk_name: &str,
    fk: &ForeignKeyDecl,
) -> Result<ForeignKey, DeclError> {
    let context = format!("foreign key `{}`", fk_name);
    if fk.columns.is_empty() {
        return Err(scope.no_columns(context.as_str()));
    }
    for col in &fk.columns {
        if !decl.columns.contains_key(col) {
            return Err(scope.unknown_column(col, context.as_str()));
        }
    }

    let target = parse_fk_reference(&fk.references).ok_or_else(|| DeclError::BadReference {
        schema: scope.schema.to_string(),
        table: scope.table.to_string(),
        name: fk_name.to_string(),
        reference: fk.references.clone(),
    })?;

    if target.columns.len() != fk.columns.len() {
        return Err(DeclError::ReferenceArity {
            schema: scope.schema.to_string(),
            table: scope.table.to_string(),
            name: fk_name.to_string(),
            columns: fk.columns.len(),
            references: target.columns.len(),
        });
    }

    let references_schema = target.schema.unwrap_or(scope.schema);

    // Targets outside the document can't be checked here; the database will.
    if let Some(target_decl) = file.table(references_schema, target.table) {
        for col in &target.columns {
            if !target_decl.columns.contains_key(*col) {
                return Err(DeclError::UnknownColumn {
                    schema: references_schema.to_string(),
                    table: target.table.to_string(),
                    column: col.to_string(),
                    context: format!("foreign key `{}` on {}", fk_name, scope.table),
                });
            }
        }
    }

    let action = |spelling: &Option<String>| -> Result<ReferentialAction, DeclError> {
        match spelling {
            None => Ok(ReferentialAction::NoAction),
            Some(s) => ReferentialAction::parse(s).ok_or_else(|| DeclError::BadAction {
                schema: scope.schema.to_string(),
                table: scope.table.to_string(),
                name: fk_name.to_string(),
                action: s.clone(),
            }),
        }
    };

    Ok(ForeignKey {
        name: fk_name.to_string(),
        columns: fk.columns.clone(),
        references_schema: references_schema.to_string(),
        references_table: target.table.to_string(),
        references_columns: target.columns.iter().map(|c| c.to_string()).collect(),
        on_delete: action(&fk.on_delete)?,
        on_update: action(&fk.on_update)?,
    })
}
