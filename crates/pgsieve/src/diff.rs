//! Compare a desired realm against the current one.
//!
//! The result is a [`SchemaDiff`]: the change tree that turns the current
//! state into the desired state. It contains every change, destructive or
//! not. Withholding drops is [`crate::filter`]'s job.
//!
//! ## Rename detection
//!
//! When a table exists only in the desired schema and another only in the
//! current one, the pair may be a rename. Each candidate pair is scored:
//!
//! - 0.3 if the names are plural/singular variants (`users`/`user`)
//! - 0.7 × Jaccard similarity of the column name sets
//!
//! Pairs scoring at least 0.6 are matched greedily, best first, and become a
//! [`Change::RenameTable`] followed by a [`Change::ModifyTable`] for any
//! remaining differences. Detection can be disabled with
//! [`DiffOptions::detect_renames`].

use crate::change::{Change, SchemaDiff};
use pgsieve_schema::{Attr, Check, Column, ForeignKey, Index, Realm, Schema, Table};
use pgsieve_sql::{expr_fingerprint, strip_top_level_cast, unique_constraint_name};
use std::collections::{BTreeSet, HashSet};

/// Knobs for [`diff_realms`].
#[derive(Debug, Clone)]
pub struct DiffOptions {
    /// Turn likely add/drop pairs into renames.
    pub detect_renames: bool,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            detect_renames: true,
        }
    }
}

/// Extension trait so callers can write `desired.diff(&current, &opts)`.
pub trait RealmDiff {
    fn diff(&self, current: &Realm, opts: &DiffOptions) -> SchemaDiff;
}

impl RealmDiff for Realm {
    fn diff(&self, current: &Realm, opts: &DiffOptions) -> SchemaDiff {
        diff_realms(self, current, opts)
    }
}

/// Changes needed to turn `current` into `desired`.
///
/// Output is ordered by schema name; within a schema, by table name.
pub fn diff_realms(desired: &Realm, current: &Realm, opts: &DiffOptions) -> SchemaDiff {
    let names: BTreeSet<&str> = desired
        .schemas
        .keys()
        .chain(current.schemas.keys())
        .map(String::as_str)
        .collect();

    let mut changes = Vec::new();
    for name in names {
        match (desired.schema(name), current.schema(name)) {
            (Some(want), None) => {
                changes.push(Change::AddSchema(name.to_string()));
                let empty = Schema::new(name);
                let inner = diff_schema(want, &empty, opts);
                if !inner.is_empty() {
                    changes.push(Change::ModifySchema {
                        name: name.to_string(),
                        changes: inner,
                    });
                }
            }
            (None, Some(_)) => changes.push(Change::DropSchema(name.to_string())),
            (Some(want), Some(have)) => {
                let inner = diff_schema(want, have, opts);
                if !inner.is_empty() {
                    changes.push(Change::ModifySchema {
                        name: name.to_string(),
                        changes: inner,
                    });
                }
            }
            (None, None) => {}
        }
    }

    SchemaDiff { changes }
}

/// Table-level changes inside one schema.
fn diff_schema(desired: &Schema, current: &Schema, opts: &DiffOptions) -> Vec<Change> {
    // (sort key, changes) so a rename and its follow-up stay adjacent.
    let mut groups: Vec<(String, Vec<Change>)> = Vec::new();

    let added: Vec<&Table> = desired
        .tables
        .values()
        .filter(|t| !current.tables.contains_key(&t.name))
        .collect();
    let dropped: Vec<&Table> = current
        .tables
        .values()
        .filter(|t| !desired.tables.contains_key(&t.name))
        .collect();

    let renames = if opts.detect_renames {
        detect_renames(&added, &dropped)
    } else {
        Vec::new()
    };
    let renamed_from: HashSet<&str> = renames.iter().map(|(from, _)| from.as_str()).collect();
    let renamed_to: HashSet<&str> = renames.iter().map(|(_, to)| to.as_str()).collect();

    for (from, to) in &renames {
        let mut group = vec![Change::RenameTable {
            from: from.clone(),
            to: to.clone(),
        }];
        if let (Some(old), Some(new)) = (current.table(from), desired.table(to)) {
            let inner = diff_table(new, old);
            if !inner.is_empty() {
                group.push(Change::ModifyTable {
                    name: to.clone(),
                    changes: inner,
                });
            }
        }
        groups.push((to.clone(), group));
    }

    for table in added {
        if !renamed_to.contains(table.name.as_str()) {
            groups.push((table.name.clone(), vec![Change::AddTable(table.clone())]));
        }
    }

    for table in dropped {
        if !renamed_from.contains(table.name.as_str()) {
            groups.push((table.name.clone(), vec![Change::DropTable(table.clone())]));
        }
    }

    for want in desired.tables.values() {
        if let Some(have) = current.table(&want.name) {
            let inner = diff_table(want, have);
            if !inner.is_empty() {
                groups.push((
                    want.name.clone(),
                    vec![Change::ModifyTable {
                        name: want.name.clone(),
                        changes: inner,
                    }],
                ));
            }
        }
    }

    // Stable: a dropped table and an added one never share a name.
    groups.sort_by(|a, b| a.0.cmp(&b.0));
    groups.into_iter().flat_map(|(_, g)| g).collect()
}

/// Changes inside a table that exists on both sides.
fn diff_table(desired: &Table, current: &Table) -> Vec<Change> {
    let mut changes = diff_columns(&current.name, &desired.columns, &current.columns);

    match (&desired.primary_key, &current.primary_key) {
        (Some(want), None) => changes.push(Change::AddPrimaryKey(want.clone())),
        (None, Some(have)) => changes.push(Change::DropPrimaryKey(have.clone())),
        (Some(want), Some(have)) if want.columns != have.columns => {
            changes.push(Change::ModifyPrimaryKey {
                from: have.clone(),
                to: want.clone(),
            })
        }
        _ => {}
    }

    changes.extend(diff_foreign_keys(&desired.foreign_keys, &current.foreign_keys));
    changes.extend(diff_indexes(&desired.indexes, &current.indexes));
    changes.extend(diff_checks(&desired.checks, &current.checks));
    changes.extend(diff_attrs(&desired.attrs, &current.attrs));
    changes
}

/// Whether two default expressions mean the same thing. The catalog reports
/// `'x'::text` where a schema file says `'x'`, so a top-level cast is ignored.
fn defaults_match(a: &Option<String>, b: &Option<String>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => {
            expr_fingerprint(strip_top_level_cast(a)) == expr_fingerprint(strip_top_level_cast(b))
        }
        _ => false,
    }
}

/// `table` is the current name, which constraints created under it still carry.
fn diff_columns(table: &str, desired: &[Column], current: &[Column]) -> Vec<Change> {
    let mut changes = Vec::new();

    let desired_names: HashSet<&str> = desired.iter().map(|c| c.name.as_str()).collect();
    let current_names: HashSet<&str> = current.iter().map(|c| c.name.as_str()).collect();

    for col in desired {
        if !current_names.contains(col.name.as_str()) {
            changes.push(Change::AddColumn(col.clone()));
        }
    }

    for col in current {
        if !desired_names.contains(col.name.as_str()) {
            changes.push(Change::DropColumn(col.name.clone()));
        }
    }

    for want in desired {
        let Some(have) = current.iter().find(|c| c.name == want.name) else {
            continue;
        };

        if want.pg_type != have.pg_type {
            changes.push(Change::AlterColumnType {
                name: want.name.clone(),
                from: have.pg_type.clone(),
                to: want.pg_type.clone(),
            });
        }

        if want.nullable != have.nullable {
            changes.push(Change::AlterColumnNullable {
                name: want.name.clone(),
                from: have.nullable,
                to: want.nullable,
            });
        }

        if !defaults_match(&want.default, &have.default) {
            changes.push(Change::AlterColumnDefault {
                name: want.name.clone(),
                from: have.default.clone(),
                to: want.default.clone(),
            });
        }

        if want.unique != have.unique {
            if want.unique {
                changes.push(Change::AddUnique(want.name.clone()));
            } else {
                changes.push(Change::DropUnique {
                    column: have.name.clone(),
                    constraint: have
                        .unique_constraint
                        .clone()
                        .unwrap_or_else(|| unique_constraint_name(table, &have.name)),
                });
            }
        }
    }

    changes
}

/// Foreign keys match by name first; an unnamed match falls back to an
/// identical definition under a different name.
fn diff_foreign_keys(desired: &[ForeignKey], current: &[ForeignKey]) -> Vec<Change> {
    let mut changes = Vec::new();
    let mut matched: HashSet<&str> = HashSet::new();

    for want in desired {
        if let Some(have) = current.iter().find(|fk| fk.name == want.name) {
            matched.insert(&have.name);
            if !want.same_definition(have) {
                changes.push(Change::ModifyForeignKey {
                    from: have.clone(),
                    to: want.clone(),
                });
            }
            continue;
        }
        let twin = current.iter().find(|fk| {
            !matched.contains(fk.name.as_str())
                && !desired.iter().any(|d| d.name == fk.name)
                && fk.same_definition(want)
        });
        match twin {
            Some(have) => {
                matched.insert(&have.name);
            }
            None => changes.push(Change::AddForeignKey(want.clone())),
        }
    }

    for have in current {
        if !matched.contains(have.name.as_str()) {
            changes.push(Change::DropForeignKey(have.clone()));
        }
    }

    changes
}

fn diff_indexes(desired: &[Index], current: &[Index]) -> Vec<Change> {
    let mut changes = Vec::new();
    let mut matched: HashSet<&str> = HashSet::new();

    for want in desired {
        if let Some(have) = current.iter().find(|idx| idx.name == want.name) {
            matched.insert(&have.name);
            if !want.same_definition(have) {
                changes.push(Change::ModifyIndex {
                    from: have.clone(),
                    to: want.clone(),
                });
            }
            continue;
        }
        let twin = current.iter().find(|idx| {
            !matched.contains(idx.name.as_str())
                && !desired.iter().any(|d| d.name == idx.name)
                && idx.same_definition(want)
        });
        match twin {
            Some(have) => {
                matched.insert(&have.name);
            }
            None => changes.push(Change::AddIndex(want.clone())),
        }
    }

    for have in current {
        if !matched.contains(have.name.as_str()) {
            changes.push(Change::DropIndex(have.name.clone()));
        }
    }

    changes
}

fn diff_checks(desired: &[Check], current: &[Check]) -> Vec<Change> {
    let mut changes = Vec::new();
    let same_expr = |a: &Check, b: &Check| expr_fingerprint(&a.expr) == expr_fingerprint(&b.expr);
    let mut matched: HashSet<&str> = HashSet::new();

    for want in desired {
        if let Some(have) = current.iter().find(|c| c.name == want.name) {
            matched.insert(&have.name);
            if !same_expr(want, have) {
                changes.push(Change::ModifyCheck {
                    from: have.clone(),
                    to: want.clone(),
                });
            }
            continue;
        }
        let twin = current.iter().find(|c| {
            !matched.contains(c.name.as_str())
                && !desired.iter().any(|d| d.name == c.name)
                && same_expr(c, want)
        });
        match twin {
            Some(have) => {
                matched.insert(&have.name);
            }
            None => changes.push(Change::AddCheck(want.clone())),
        }
    }

    for have in current {
        if !matched.contains(have.name.as_str()) {
            changes.push(Change::DropCheck(have.name.clone()));
        }
    }

    changes
}

fn diff_attrs(desired: &[Attr], current: &[Attr]) -> Vec<Change> {
    let mut changes = Vec::new();

    for want in desired {
        match current.iter().find(|a| a.key() == want.key()) {
            None => changes.push(Change::AddAttr(want.clone())),
            Some(have) if have != want => changes.push(Change::ModifyAttr {
                from: have.clone(),
                to: want.clone(),
            }),
            Some(_) => {}
        }
    }

    for have in current {
        if !desired.iter().any(|a| a.key() == have.key()) {
            changes.push(Change::DropAttr(have.clone()));
        }
    }

    changes
}

/// Whether two names are plural/singular variants of each other.
///
/// Handles a trailing `s`, `ies`/`y`, and the same on the last `_` segment
/// of compound names. Irregular plurals are not recognized.
fn is_plural_singular_pair(a: &str, b: &str) -> bool {
    let (plural, singular) = if a.len() > b.len() { (a, b) } else { (b, a) };

    let word_pair = |p: &str, s: &str| -> bool {
        if p.strip_suffix('s') == Some(s) {
            return true;
        }
        matches!(
            (p.strip_suffix("ies"), s.strip_suffix('y')),
            (Some(ps), Some(ss)) if ps == ss
        )
    };

    if word_pair(plural, singular) {
        return true;
    }

    match (plural.rsplit_once('_'), singular.rsplit_once('_')) {
        (Some((p_prefix, p_last)), Some((s_prefix, s_last))) => {
            p_prefix == s_prefix && word_pair(p_last, s_last)
        }
        _ => false,
    }
}

/// Similarity between two tables, from 0.0 to 1.0.
fn table_similarity(a: &Table, b: &Table) -> f64 {
    let mut score = 0.0;

    if is_plural_singular_pair(&a.name, &b.name) {
        score += 0.3;
    }

    let a_cols: HashSet<&str> = a.columns.iter().map(|c| c.name.as_str()).collect();
    let b_cols: HashSet<&str> = b.columns.iter().map(|c| c.name.as_str()).collect();
    let union = a_cols.union(&b_cols).count();
    if union > 0 {
        let intersection = a_cols.intersection(&b_cols).count();
        score += 0.7 * (intersection as f64 / union as f64);
    }

    score
}

/// Pair up added and dropped tables that look like renames.
/// Returns `(old_name, new_name)` pairs.
fn detect_renames(added: &[&Table], dropped: &[&Table]) -> Vec<(String, String)> {
    const RENAME_THRESHOLD: f64 = 0.6;

    let mut candidates: Vec<(f64, &str, &str)> = Vec::new();
    for old in dropped {
        for new in added {
            let sim = table_similarity(old, new);
            if sim >= RENAME_THRESHOLD {
                candidates.push((sim, &old.name, &new.name));
            }
        }
    }
    candidates.sort_by(|a, b| b.0.total_cmp(&a.0));

    let mut used_old: HashSet<&str> = HashSet::new();
    let mut used_new: HashSet<&str> = HashSet::new();
    let mut renames = Vec::new();
    for (_, from, to) in candidates {
        if !used_old.contains(from) && !used_new.contains(to) {
            used_old.insert(from);
            used_new.insert(to);
            renames.push((from.to_string(), to.to_string()));
        }
    }
    renames
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgsieve_schema::{IndexColumn, PgType, PrimaryKey, ReferentialAction};

    fn col(name: &str, pg_type: PgType) -> Column {
        Column::new(name, pg_type)
    }

    fn realm(tables: Vec<Table>) -> Realm {
        let mut schema = Schema::new("public");
        for t in tables {
            schema = schema.with_table(t);
        }
        Realm::new().with_schema(schema)
    }

    fn table_changes(diff: &SchemaDiff) -> &[Change] {
        match diff.changes.as_slice() {
            [Change::ModifySchema { changes, .. }] => changes,
            other => panic!("expected a single ModifySchema, got {:?}", other),
        }
    }

    fn users() -> Table {
        Table::new("users")
            .with_column(col("id", PgType::BigInt))
            .with_column(col("email", PgType::Text))
            .with_primary_key(&["id"])
    }

    #[test]
    fn test_diff_empty_realms() {
        let diff = Realm::new().diff(&Realm::new(), &DiffOptions::default());
        assert!(diff.is_empty());
        assert_eq!(diff.change_count(), 0);
    }

    #[test]
    fn test_diff_no_changes() {
        let r = realm(vec![users()]);
        assert!(r.diff(&r.clone(), &DiffOptions::default()).is_empty());
    }

    #[test]
    fn test_diff_new_schema() {
        let desired = realm(vec![users()]);
        let diff = desired.diff(&Realm::new(), &DiffOptions::default());

        assert!(matches!(&diff.changes[0], Change::AddSchema(name) if name == "public"));
        let inner = match &diff.changes[1] {
            Change::ModifySchema { changes, .. } => changes,
            other => panic!("unexpected {:?}", other),
        };
        assert!(matches!(&inner[0], Change::AddTable(t) if t.name == "users"));
    }

    #[test]
    fn test_diff_drop_schema() {
        let current = realm(vec![]).with_schema(Schema::new("legacy"));
        let desired = realm(vec![]);
        let diff = desired.diff(&current, &DiffOptions::default());
        assert_eq!(diff.changes, vec![Change::DropSchema("legacy".into())]);
        assert_eq!(diff.destructive_count(), 1);
    }

    #[test]
    fn test_diff_drop_table_carries_definition() {
        let diff = realm(vec![]).diff(&realm(vec![users()]), &DiffOptions::default());
        match table_changes(&diff) {
            [Change::DropTable(t)] => assert_eq!(t.columns.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_diff_columns() {
        let current = realm(vec![
            Table::new("users")
                .with_column(col("id", PgType::Integer))
                .with_column(col("legacy", PgType::Text))
                .with_column(col("bio", PgType::Text)),
        ]);
        let desired = realm(vec![
            Table::new("users")
                .with_column(col("id", PgType::BigInt))
                .with_column(col("bio", PgType::Text).nullable().unique())
                .with_column(col("email", PgType::Text)),
        ]);

        let diff = desired.diff(&current, &DiffOptions::default());
        let Change::ModifyTable { name, changes } = &table_changes(&diff)[0] else {
            panic!("expected ModifyTable");
        };
        assert_eq!(name, "users");
        assert_eq!(
            changes,
            &vec![
                Change::AddColumn(col("email", PgType::Text)),
                Change::DropColumn("legacy".into()),
                Change::AlterColumnType {
                    name: "id".into(),
                    from: PgType::Integer,
                    to: PgType::BigInt,
                },
                Change::AlterColumnNullable {
                    name: "bio".into(),
                    from: false,
                    to: true,
                },
                Change::AddUnique("bio".into()),
            ]
        );
    }

    #[test]
    fn test_diff_unique_drop_names_the_constraint() {
        let mut catalog = col("email", PgType::Text).unique();
        catalog.unique_constraint = Some("users_email_uq".into());
        let current = realm(vec![
            Table::new("users")
                .with_column(catalog)
                .with_column(col("handle", PgType::Text).unique()),
        ]);
        let desired = realm(vec![
            Table::new("users")
                .with_column(col("email", PgType::Text))
                .with_column(col("handle", PgType::Text)),
        ]);

        let diff = desired.diff(&current, &DiffOptions::default());
        let Change::ModifyTable { changes, .. } = &table_changes(&diff)[0] else {
            panic!("expected ModifyTable");
        };
        assert_eq!(
            changes,
            &vec![
                Change::DropUnique {
                    column: "email".into(),
                    constraint: "users_email_uq".into(),
                },
                Change::DropUnique {
                    column: "handle".into(),
                    constraint: "users_handle_key".into(),
                },
            ]
        );
    }

    #[test]
    fn test_diff_defaults_ignore_catalog_casts() {
        let current = realm(vec![Table::new("t").with_column(
            col("status", PgType::Text).with_default("'active'::text"),
        )]);
        let desired =
            realm(vec![Table::new("t").with_column(col("status", PgType::Text).with_default("'active'"))]);
        assert!(desired.diff(&current, &DiffOptions::default()).is_empty());

        let desired =
            realm(vec![Table::new("t").with_column(col("status", PgType::Text).with_default("'idle'"))]);
        let diff = desired.diff(&current, &DiffOptions::default());
        assert!(matches!(
            &table_changes(&diff)[0],
            Change::ModifyTable { changes, .. } if matches!(&changes[0], Change::AlterColumnDefault { .. })
        ));
    }

    #[test]
    fn test_diff_primary_key() {
        let current = realm(vec![users()]);
        let mut t = users();
        t.primary_key = Some(PrimaryKey {
            name: "users_pkey".into(),
            columns: vec!["id".into(), "email".into()],
        });
        let diff = realm(vec![t]).diff(&current, &DiffOptions::default());
        assert!(matches!(
            &table_changes(&diff)[0],
            Change::ModifyTable { changes, .. } if matches!(&changes[0], Change::ModifyPrimaryKey { .. })
        ));

        let mut t = users();
        t.primary_key = None;
        let diff = realm(vec![t]).diff(&current, &DiffOptions::default());
        assert_eq!(diff.destructive_count(), 1);
    }

    fn fk(name: &str, on_delete: ReferentialAction) -> ForeignKey {
        ForeignKey {
            name: name.into(),
            columns: vec!["user_id".into()],
            references_schema: "public".into(),
            references_table: "users".into(),
            references_columns: vec!["id".into()],
            on_delete,
            on_update: ReferentialAction::NoAction,
        }
    }

    fn posts(fks: Vec<ForeignKey>) -> Table {
        let mut t = Table::new("posts")
            .with_column(col("id", PgType::BigInt))
            .with_column(col("user_id", PgType::BigInt));
        t.foreign_keys = fks;
        t
    }

    #[test]
    fn test_diff_foreign_keys() {
        let current = realm(vec![users(), posts(vec![fk("posts_user_id_fkey", ReferentialAction::NoAction)])]);

        // Same definition under another name is not a change.
        let desired = realm(vec![users(), posts(vec![fk("posts_author", ReferentialAction::NoAction)])]);
        assert!(desired.diff(&current, &DiffOptions::default()).is_empty());

        // Same name with a new action is a modification.
        let desired = realm(vec![users(), posts(vec![fk("posts_user_id_fkey", ReferentialAction::Cascade)])]);
        let diff = desired.diff(&current, &DiffOptions::default());
        assert!(matches!(
            &table_changes(&diff)[0],
            Change::ModifyTable { changes, .. } if matches!(&changes[0], Change::ModifyForeignKey { .. })
        ));

        let desired = realm(vec![users(), posts(vec![])]);
        let diff = desired.diff(&current, &DiffOptions::default());
        assert!(matches!(
            &table_changes(&diff)[0],
            Change::ModifyTable { changes, .. } if matches!(&changes[0], Change::DropForeignKey(f) if f.name == "posts_user_id_fkey")
        ));
    }

    #[test]
    fn test_diff_indexes_and_checks() {
        let mut have = users();
        have.indexes.push(Index {
            name: "idx_users_email".into(),
            columns: vec![IndexColumn::new("email")],
            unique: false,
            where_clause: None,
        });
        have.checks.push(Check {
            name: "users_email_not_blank".into(),
            expr: "(char_length(email) > 0)".into(),
        });
        have.attrs.push(Attr::Comment("old".into()));

        let mut want = users();
        want.indexes.push(Index {
            name: "idx_users_email".into(),
            columns: vec![IndexColumn::new("email")],
            unique: true,
            where_clause: None,
        });
        want.checks.push(Check {
            name: "users_email_not_blank".into(),
            expr: "char_length(email) > 0".into(),
        });

        let diff = realm(vec![want]).diff(&realm(vec![have]), &DiffOptions::default());
        let Change::ModifyTable { changes, .. } = &table_changes(&diff)[0] else {
            panic!("expected ModifyTable");
        };
        assert_eq!(changes.len(), 2);
        assert!(matches!(&changes[0], Change::ModifyIndex { to, .. } if to.unique));
        assert_eq!(changes[1], Change::DropAttr(Attr::Comment("old".into())));
    }

    #[test]
    fn test_plural_singular_detection() {
        assert!(is_plural_singular_pair("users", "user"));
        assert!(is_plural_singular_pair("categories", "category"));
        assert!(is_plural_singular_pair("post_tags", "post_tag"));
        assert!(is_plural_singular_pair("post_categories", "post_category"));

        assert!(!is_plural_singular_pair("users", "posts"));
        assert!(!is_plural_singular_pair("user_tags", "post_tag"));
        assert!(!is_plural_singular_pair("foo", "bar"));
    }

    #[test]
    fn test_table_similarity() {
        let mut user = users();
        user.name = "user".into();
        let sim = table_similarity(&users(), &user);
        assert!(sim > 0.9, "expected high similarity, got {}", sim);

        let other = Table::new("posts")
            .with_column(col("id", PgType::BigInt))
            .with_column(col("title", PgType::Text));
        let sim = table_similarity(&users(), &other);
        assert!(sim < 0.5, "expected low similarity, got {}", sim);
    }

    #[test]
    fn test_diff_detects_rename() {
        let mut user = users().with_column(col("name", PgType::Text).nullable());
        user.name = "user".into();
        user.primary_key = Some(PrimaryKey {
            name: "users_pkey".into(),
            columns: vec!["id".into()],
        });

        let diff = realm(vec![user]).diff(&realm(vec![users()]), &DiffOptions::default());
        let changes = table_changes(&diff);
        assert_eq!(
            changes[0],
            Change::RenameTable {
                from: "users".into(),
                to: "user".into()
            }
        );
        assert!(matches!(
            &changes[1],
            Change::ModifyTable { name, changes } if name == "user" && matches!(&changes[0], Change::AddColumn(c) if c.name == "name")
        ));
    }

    #[test]
    fn test_diff_rename_detection_can_be_disabled() {
        let mut user = users();
        user.name = "user".into();
        let opts = DiffOptions {
            detect_renames: false,
        };
        let diff = realm(vec![user]).diff(&realm(vec![users()]), &opts);
        let changes = table_changes(&diff);
        assert!(matches!(&changes[0], Change::AddTable(t) if t.name == "user"));
        assert!(matches!(&changes[1], Change::DropTable(t) if t.name == "users"));
    }

    #[test]
    fn test_diff_display() {
        let diff = realm(vec![]).diff(&realm(vec![users()]), &DiffOptions::default());
        assert_eq!(diff.to_string(), "~ schema public\n  - table users\n");
        assert_eq!(SchemaDiff::default().to_string(), "No changes detected.\n");
    }
}
