//! The change tree produced by the differ.
//!
//! Changes nest: a [`Change::ModifySchema`] holds table-level changes, and a
//! [`Change::ModifyTable`] holds column, key, index, check and attribute
//! changes. Everything else is a leaf.

use pgsieve_schema::{Attr, Check, Column, ForeignKey, Index, PgType, PrimaryKey, Table};
use std::fmt;

/// A single schema change.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// Create a schema.
    AddSchema(String),
    /// Drop a schema and everything in it.
    DropSchema(String),
    /// Changes inside an existing schema.
    ModifySchema { name: String, changes: Vec<Change> },

    /// Create a table.
    AddTable(Table),
    /// Drop a table. Carries the definition being dropped.
    DropTable(Table),
    /// Rename a table.
    RenameTable { from: String, to: String },
    /// Changes inside an existing table.
    ModifyTable { name: String, changes: Vec<Change> },

    AddColumn(Column),
    DropColumn(String),
    AlterColumnType {
        name: String,
        from: PgType,
        to: PgType,
    },
    AlterColumnNullable {
        name: String,
        from: bool,
        to: bool,
    },
    AlterColumnDefault {
        name: String,
        from: Option<String>,
        to: Option<String>,
    },
    /// Add a single-column unique constraint.
    AddUnique(String),
    /// Drop a single-column unique constraint by its name in the database.
    DropUnique { column: String, constraint: String },

    AddPrimaryKey(PrimaryKey),
    DropPrimaryKey(PrimaryKey),
    ModifyPrimaryKey { from: PrimaryKey, to: PrimaryKey },

    AddForeignKey(ForeignKey),
    DropForeignKey(ForeignKey),
    ModifyForeignKey { from: ForeignKey, to: ForeignKey },

    AddIndex(Index),
    DropIndex(String),
    ModifyIndex { from: Index, to: Index },

    AddCheck(Check),
    DropCheck(String),
    ModifyCheck { from: Check, to: Check },

    AddAttr(Attr),
    DropAttr(Attr),
    ModifyAttr { from: Attr, to: Attr },
}

/// The kind of a [`Change`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    AddSchema,
    DropSchema,
    ModifySchema,
    AddTable,
    DropTable,
    RenameTable,
    ModifyTable,
    AddColumn,
    DropColumn,
    AlterColumnType,
    AlterColumnNullable,
    AlterColumnDefault,
    AddUnique,
    DropUnique,
    AddPrimaryKey,
    DropPrimaryKey,
    ModifyPrimaryKey,
    AddForeignKey,
    DropForeignKey,
    ModifyForeignKey,
    AddIndex,
    DropIndex,
    ModifyIndex,
    AddCheck,
    DropCheck,
    ModifyCheck,
    AddAttr,
    DropAttr,
    ModifyAttr,
}

impl ChangeKind {
    /// Kinds that remove a schema object outright.
    ///
    /// `DropPrimaryKey` and `DropUnique` are included: losing either silently
    /// weakens the data model in the same way as dropping an index.
    pub const DESTRUCTIVE: &'static [ChangeKind] = &[
        ChangeKind::DropSchema,
        ChangeKind::DropTable,
        ChangeKind::DropColumn,
        ChangeKind::DropIndex,
        ChangeKind::DropForeignKey,
        ChangeKind::DropCheck,
        ChangeKind::DropAttr,
        ChangeKind::DropPrimaryKey,
        ChangeKind::DropUnique,
    ];

    /// Whether changes of this kind remove an object.
    pub fn is_destructive(self) -> bool {
        Self::DESTRUCTIVE.contains(&self)
    }
}

impl Change {
    pub fn kind(&self) -> ChangeKind {
        match self {
            Change::AddSchema(_) => ChangeKind::AddSchema,
            Change::DropSchema(_) => ChangeKind::DropSchema,
            Change::ModifySchema { .. } => ChangeKind::ModifySchema,
            Change::AddTable(_) => ChangeKind::AddTable,
            Change::DropTable(_) => ChangeKind::DropTable,
            Change::RenameTable { .. } => ChangeKind::RenameTable,
            Change::ModifyTable { .. } => ChangeKind::ModifyTable,
            Change::AddColumn(_) => ChangeKind::AddColumn,
            Change::DropColumn(_) => ChangeKind::DropColumn,
            Change::AlterColumnType { .. } => ChangeKind::AlterColumnType,
            Change::AlterColumnNullable { .. } => ChangeKind::AlterColumnNullable,
            Change::AlterColumnDefault { .. } => ChangeKind::AlterColumnDefault,
            Change::AddUnique(_) => ChangeKind::AddUnique,
            Change::DropUnique { .. } => ChangeKind::DropUnique,
            Change::AddPrimaryKey(_) => ChangeKind::AddPrimaryKey,
            Change::DropPrimaryKey(_) => ChangeKind::DropPrimaryKey,
            Change::ModifyPrimaryKey { .. } => ChangeKind::ModifyPrimaryKey,
            Change::AddForeignKey(_) => ChangeKind::AddForeignKey,
            Change::DropForeignKey(_) => ChangeKind::DropForeignKey,
            Change::ModifyForeignKey { .. } => ChangeKind::ModifyForeignKey,
            Change::AddIndex(_) => ChangeKind::AddIndex,
            Change::DropIndex(_) => ChangeKind::DropIndex,
            Change::ModifyIndex { .. } => ChangeKind::ModifyIndex,
            Change::AddCheck(_) => ChangeKind::AddCheck,
            Change::DropCheck(_) => ChangeKind::DropCheck,
            Change::ModifyCheck { .. } => ChangeKind::ModifyCheck,
            Change::AddAttr(_) => ChangeKind::AddAttr,
            Change::DropAttr(_) => ChangeKind::DropAttr,
            Change::ModifyAttr { .. } => ChangeKind::ModifyAttr,
        }
    }

    pub fn is_destructive(&self) -> bool {
        self.kind().is_destructive()
    }

    /// Nested changes of a composite, `None` for leaves.
    pub fn children(&self) -> Option<&[Change]> {
        match self {
            Change::ModifySchema { changes, .. } | Change::ModifyTable { changes, .. } => {
                Some(changes)
            }
            _ => None,
        }
    }

    /// Copy of a composite with its nested changes replaced. Leaves come back
    /// as plain clones.
    pub fn with_children(&self, children: Vec<Change>) -> Change {
        match self {
            Change::ModifySchema { name, .. } => Change::ModifySchema {
                name: name.clone(),
                changes: children,
            },
            Change::ModifyTable { name, .. } => Change::ModifyTable {
                name: name.clone(),
                changes: children,
            },
            leaf => leaf.clone(),
        }
    }

    /// Number of leaf changes in this subtree.
    pub fn leaf_count(&self) -> usize {
        match self.children() {
            Some(children) => children.iter().map(Change::leaf_count).sum(),
            None => 1,
        }
    }

    /// Leading marker used when rendering: `+`, `-` or `~`.
    pub fn marker(&self) -> char {
        match self {
            Change::AddSchema(_)
            | Change::AddTable(_)
            | Change::AddColumn(_)
            | Change::AddUnique(_)
            | Change::AddPrimaryKey(_)
            | Change::AddForeignKey(_)
            | Change::AddIndex(_)
            | Change::AddCheck(_)
            | Change::AddAttr(_) => '+',
            other if other.is_destructive() => '-',
            _ => '~',
        }
    }
}

fn column_list(columns: &[String]) -> String {
    columns.join(", ")
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Change::AddSchema(name) => write!(f, "+ schema {}", name),
            Change::DropSchema(name) => write!(f, "- schema {}", name),
            Change::ModifySchema { name, .. } => write!(f, "~ schema {}", name),
            Change::AddTable(t) => write!(f, "+ table {}", t.name),
            Change::DropTable(t) => write!(f, "- table {}", t.name),
            Change::RenameTable { from, to } => write!(f, "~ rename {} -> {}", from, to),
            Change::ModifyTable { name, .. } => write!(f, "~ table {}", name),
            Change::AddColumn(col) => {
                let nullable = if col.nullable { " (nullable)" } else { "" };
                write!(f, "+ {}: {}{}", col.name, col.pg_type, nullable)
            }
            Change::DropColumn(name) => write!(f, "- {}", name),
            Change::AlterColumnType { name, from, to } => {
                write!(f, "~ {}: {} -> {}", name, from, to)
            }
            Change::AlterColumnNullable { name, from, to } => {
                let label = |n: &bool| if *n { "nullable" } else { "not null" };
                write!(f, "~ {}: {} -> {}", name, label(from), label(to))
            }
            Change::AlterColumnDefault { name, from, to } => {
                let label = |d: &Option<String>| d.clone().unwrap_or_else(|| "(none)".into());
                write!(f, "~ {} default: {} -> {}", name, label(from), label(to))
            }
            Change::AddUnique(col) => write!(f, "+ UNIQUE ({})", col),
            Change::DropUnique { column, constraint } => {
                write!(f, "- UNIQUE {} ({})", constraint, column)
            }
            Change::AddPrimaryKey(pk) => write!(f, "+ PRIMARY KEY ({})", column_list(&pk.columns)),
            Change::DropPrimaryKey(pk) => write!(f, "- PRIMARY KEY ({})", column_list(&pk.columns)),
            Change::ModifyPrimaryKey { from, to } => write!(
                f,
                "~ PRIMARY KEY ({}) -> ({})",
                column_list(&from.columns),
                column_list(&to.columns)
            ),
            Change::AddForeignKey(fk) => write!(
                f,
                "+ FOREIGN KEY {} ({}) -> {}.{}({})",
                fk.name,
                column_list(&fk.columns),
                fk.references_schema,
                fk.references_table,
                column_list(&fk.references_columns)
            ),
            Change::DropForeignKey(fk) => write!(f, "- FOREIGN KEY {}", fk.name),
            Change::ModifyForeignKey { to, .. } => write!(f, "~ FOREIGN KEY {}", to.name),
            Change::AddIndex(idx) => {
                let unique = if idx.unique { "UNIQUE " } else { "" };
                let cols: Vec<String> = idx.columns.iter().map(|c| c.to_sql()).collect();
                write!(f, "+ {}INDEX {} ({})", unique, idx.name, cols.join(", "))
            }
            Change::DropIndex(name) => write!(f, "- INDEX {}", name),
            Change::ModifyIndex { to, .. } => write!(f, "~ INDEX {}", to.name),
            Change::AddCheck(check) => write!(f, "+ CHECK {} ({})", check.name, check.expr),
            Change::DropCheck(name) => write!(f, "- CHECK {}", name),
            Change::ModifyCheck { from, to } => {
                write!(f, "~ CHECK {}: ({}) -> ({})", to.name, from.expr, to.expr)
            }
            Change::AddAttr(attr) => write!(f, "+ {}", attr),
            Change::DropAttr(attr) => write!(f, "- {}", attr),
            Change::ModifyAttr { from, to } => write!(f, "~ {} -> {}", from, to),
        }
    }
}

/// A full set of changes between two realms.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaDiff {
    pub changes: Vec<Change>,
}

impl SchemaDiff {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Number of leaf changes.
    pub fn change_count(&self) -> usize {
        self.changes.iter().map(Change::leaf_count).sum()
    }

    /// Number of destructive changes anywhere in the tree.
    pub fn destructive_count(&self) -> usize {
        fn count(changes: &[Change]) -> usize {
            changes
                .iter()
                .map(|c| match c.children() {
                    Some(children) => count(children),
                    None => usize::from(c.is_destructive()),
                })
                .sum()
        }
        count(&self.changes)
    }
}

fn write_tree(f: &mut fmt::Formatter<'_>, changes: &[Change], depth: usize) -> fmt::Result {
    for change in changes {
        writeln!(f, "{:indent$}{}", "", change, indent = depth * 2)?;
        if let Some(children) = change.children() {
            write_tree(f, children, depth + 1)?;
        }
    }
    Ok(())
}

impl fmt::Display for SchemaDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.changes.is_empty() {
            return writeln!(f, "No changes detected.");
        }
        write_tree(f, &self.changes, 0)
    }
}
