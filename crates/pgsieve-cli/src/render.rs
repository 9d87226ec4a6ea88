//! Terminal rendering of diffs and withheld changes.

use owo_colors::OwoColorize;
use pgsieve::{Change, Realm, SchemaDiff, WithheldChange};
use std::fmt::Write;

#[derive(Debug, Clone, Copy)]
pub struct Style {
    pub color: bool,
}

impl Style {
    pub fn detect() -> Self {
        use std::io::IsTerminal;
        Self {
            color: std::io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none(),
        }
    }

    fn paint(&self, change: &Change, line: &str) -> String {
        if !self.color {
            return line.to_string();
        }
        match change.marker() {
            '+' => line.green().to_string(),
            '-' => line.red().to_string(),
            _ => line.yellow().to_string(),
        }
    }

    fn flag(&self) -> String {
        if self.color {
            " [destructive]".red().bold().to_string()
        } else {
            " [destructive]".to_string()
        }
    }

    fn dim(&self, text: &str) -> String {
        if self.color {
            text.dimmed().to_string()
        } else {
            text.to_string()
        }
    }
}

/// The change tree, destructive leaves flagged, followed by a summary line.
pub fn diff(diff: &SchemaDiff, style: Style) -> String {
    if diff.is_empty() {
        return format!("{}\n", style.dim("No changes detected."));
    }
    let mut out = String::new();
    tree(&mut out, &diff.changes, 0, style);
    let _ = writeln!(
        out,
        "\n{}",
        style.dim(&format!(
            "{} change(s), {} destructive",
            diff.change_count(),
            diff.destructive_count()
        ))
    );
    out
}

fn tree(out: &mut String, changes: &[Change], depth: usize, style: Style) {
    for change in changes {
        let line = format!("{:indent$}{}", "", change, indent = depth * 2);
        let _ = write!(out, "{}", style.paint(change, &line));
        if change.is_destructive() {
            out.push_str(&style.flag());
        }
        out.push('\n');
        if let Some(children) = change.children() {
            tree(out, children, depth + 1, style);
        }
    }
}

/// One line per withheld change, with its scope.
pub fn withheld(withheld: &[WithheldChange], style: Style) -> String {
    let mut out = String::new();
    if withheld.is_empty() {
        return out;
    }
    let _ = writeln!(
        out,
        "{}",
        style.dim(&format!(
            "{} destructive change(s) withheld (rerun with --allow-destructive to apply):",
            withheld.len()
        ))
    );
    for w in withheld {
        let _ = writeln!(out, "  {}", style.paint(&w.change, &w.to_string()));
    }
    out
}

/// A readable summary of a desired realm.
pub fn realm(realm: &Realm) -> String {
    let mut out = String::new();
    if realm.table_count() == 0 {
        out.push_str("No tables declared.\n");
        return out;
    }
    let _ = writeln!(out, "Schema ({} tables):", realm.table_count());
    for (schema, table) in realm.iter_tables() {
        let _ = writeln!(
            out,
            "\n  {}.{} ({} columns)",
            schema.name,
            table.name,
            table.columns.len()
        );
        if let Some(comment) = table.comment() {
            let _ = writeln!(out, "    -- {}", comment);
        }
        for col in &table.columns {
            let mut attrs: Vec<String> = Vec::new();
            if table
                .primary_key
                .as_ref()
                .is_some_and(|pk| pk.columns.contains(&col.name))
            {
                attrs.push("PK".into());
            }
            if col.unique {
                attrs.push("UNIQUE".into());
            }
            if !col.nullable {
                attrs.push("NOT NULL".into());
            }
            if let Some(default) = &col.default {
                attrs.push(format!("DEFAULT {}", default));
            }
            let attrs = if attrs.is_empty() {
                String::new()
            } else {
                format!(" [{}]", attrs.join(", "))
            };
            let _ = writeln!(out, "    {}: {}{}", col.name, col.pg_type, attrs);
        }
        for fk in &table.foreign_keys {
            let _ = writeln!(
                out,
                "    FK: {} -> {}.{}({})",
                fk.columns.join(", "),
                fk.references_schema,
                fk.references_table,
                fk.references_columns.join(", ")
            );
        }
        for idx in &table.indexes {
            let cols: Vec<String> = idx.columns.iter().map(|c| c.to_sql()).collect();
            let _ = writeln!(
                out,
                "    {}INDEX {} ({})",
                if idx.unique { "UNIQUE " } else { "" },
                idx.name,
                cols.join(", ")
            );
        }
        for check in &table.checks {
            let _ = writeln!(out, "    CHECK {} ({})", check.name, check.expr);
        }
    }
    out
}
