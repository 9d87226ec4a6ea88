//! Withholding destructive changes.
//!
//! Applying a declarative schema to a live database would normally drop
//! anything the schema doesn't mention. [`filter_destructive`] takes the full
//! change tree and returns a copy with every destructive node removed, so a
//! migration only ever adds or alters.
//!
//! Composite changes ([`Change::ModifySchema`], [`Change::ModifyTable`]) are
//! never destructive themselves; they are rebuilt with their children
//! filtered. A destructive node is removed whole, without looking inside.
//! The input is never mutated.

use crate::change::Change;
use std::fmt;

/// Remove every destructive change from `changes`, recursively.
///
/// Order is preserved. A composite whose children are all destructive stays
/// in the output with an empty change list.
pub fn filter_destructive(changes: &[Change]) -> Vec<Change> {
    changes
        .iter()
        .filter(|change| !change.is_destructive())
        .map(|change| match change.children() {
            Some(children) => change.with_children(filter_destructive(children)),
            None => change.clone(),
        })
        .collect()
}

/// Where in the tree a change sits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scope {
    pub schema: Option<String>,
    pub table: Option<String>,
}

impl Scope {
    pub fn schema(&self, name: &str) -> Scope {
        Scope {
            schema: Some(name.to_string()),
            table: None,
        }
    }

    pub fn table(&self, name: &str) -> Scope {
        Scope {
            schema: self.schema.clone(),
            table: Some(name.to_string()),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.schema, &self.table) {
            (Some(s), Some(t)) => write!(f, "{}.{}", s, t),
            (Some(s), None) => write!(f, "{}", s),
            (None, Some(t)) => write!(f, "{}", t),
            (None, None) => write!(f, "(realm)"),
        }
    }
}

/// A destructive change that was kept out of the plan.
#[derive(Debug, Clone, PartialEq)]
pub struct WithheldChange {
    /// Schema and table the change belongs to.
    pub scope: Scope,
    pub change: Change,
}

impl fmt::Display for WithheldChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.scope, self.change)
    }
}

/// Result of [`partition_destructive`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filtered {
    /// Same as [`filter_destructive`] would return.
    pub kept: Vec<Change>,
    /// The removed nodes, in tree order.
    pub withheld: Vec<WithheldChange>,
}

/// Like [`filter_destructive`], but also report what was removed and where.
pub fn partition_destructive(changes: &[Change]) -> Filtered {
    let mut withheld = Vec::new();
    let kept = partition_into(changes, &Scope::default(), &mut withheld);
    Filtered { kept, withheld }
}

fn partition_into(
    changes: &[Change],
    scope: &Scope,
    withheld: &mut Vec<WithheldChange>,
) -> Vec<Change> {
    let mut kept = Vec::with_capacity(changes.len());
    for change in changes {
        if change.is_destructive() {
            withheld.push(WithheldChange {
                scope: scope.clone(),
                change: change.clone(),
            });
            continue;
        }
        let inner = match change {
            Change::ModifySchema { name, .. } => scope.schema(name),
            Change::ModifyTable { name, .. } => scope.table(name),
            leaf => {
                kept.push(leaf.clone());
                continue;
            }
        };
        let children = change.children().unwrap_or_default();
        kept.push(change.with_children(partition_into(children, &inner, withheld)));
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::ChangeKind;
    use pgsieve_schema::{
        Attr, Check, Column, ForeignKey, Index, IndexColumn, PgType, PrimaryKey,
        ReferentialAction, Table,
    };
    use proptest::prelude::*;

    fn users_table() -> Table {
        Table::new("users")
            .with_column(Column::new("id", PgType::Uuid))
            .with_column(Column::new("name", PgType::Text))
    }

    #[test]
    fn keeps_an_add_table() {
        let changes = vec![Change::AddTable(users_table())];
        assert_eq!(filter_destructive(&changes), changes);
    }

    #[test]
    fn removes_a_drop_index_inside_modify_table() {
        let changes = vec![Change::ModifyTable {
            name: "users".into(),
            changes: vec![
                Change::AddColumn(Column::new("email", PgType::Text)),
                Change::DropIndex("idx_x".into()),
            ],
        }];
        assert_eq!(
            filter_destructive(&changes),
            vec![Change::ModifyTable {
                name: "users".into(),
                changes: vec![Change::AddColumn(Column::new("email", PgType::Text))],
            }]
        );
    }

    #[test]
    fn removes_a_top_level_drop_table_with_its_contents() {
        let changes = vec![Change::DropTable(users_table())];
        assert!(filter_destructive(&changes).is_empty());
    }

    #[test]
    fn recurses_through_modify_schema() {
        let changes = vec![Change::ModifySchema {
            name: "public".into(),
            changes: vec![
                Change::DropTable(Table::new("t1")),
                Change::AddTable(Table::new("t2")),
            ],
        }];
        assert_eq!(
            filter_destructive(&changes),
            vec![Change::ModifySchema {
                name: "public".into(),
                changes: vec![Change::AddTable(Table::new("t2"))],
            }]
        );
    }

    #[test]
    fn drops_a_column_between_two_additions() {
        let email = Column::new("email", PgType::Text);
        let changes = vec![
            Change::AddTable(users_table()),
            Change::DropColumn("legacy".into()),
            Change::AddColumn(email.clone()),
        ];
        assert_eq!(
            filter_destructive(&changes),
            vec![Change::AddTable(users_table()), Change::AddColumn(email)]
        );
    }

    #[test]
    fn removes_a_drop_column_inside_modify_table() {
        let email = Column::new("email", PgType::Text);
        let changes = vec![Change::ModifyTable {
            name: "users".into(),
            changes: vec![
                Change::AddColumn(email.clone()),
                Change::DropColumn("legacy".into()),
            ],
        }];
        let filtered = partition_destructive(&changes);
        assert_eq!(
            filtered.kept,
            vec![Change::ModifyTable {
                name: "users".into(),
                changes: vec![Change::AddColumn(email)],
            }]
        );
        assert_eq!(
            filtered.withheld,
            vec![WithheldChange {
                scope: Scope {
                    schema: None,
                    table: Some("users".into()),
                },
                change: Change::DropColumn("legacy".into()),
            }]
        );
    }

    #[test]
    fn keeps_table_changes_next_to_a_dropped_table() {
        let email = Column::new("email", PgType::Text);
        let changes = vec![Change::ModifySchema {
            name: "public".into(),
            changes: vec![
                Change::DropTable(Table::new("old")),
                Change::ModifyTable {
                    name: "users".into(),
                    changes: vec![Change::AddColumn(email.clone())],
                },
            ],
        }];
        assert_eq!(
            filter_destructive(&changes),
            vec![Change::ModifySchema {
                name: "public".into(),
                changes: vec![Change::ModifyTable {
                    name: "users".into(),
                    changes: vec![Change::AddColumn(email)],
                }],
            }]
        );
    }

    #[test]
    fn empty_input_gives_empty_output() {
        assert!(filter_destructive(&[]).is_empty());
        assert_eq!(partition_destructive(&[]), Filtered::default());
    }

    #[test]
    fn emptied_composite_is_kept() {
        let changes = vec![Change::ModifyTable {
            name: "users".into(),
            changes: vec![Change::DropColumn("legacy".into())],
        }];
        assert_eq!(
            filter_destructive(&changes),
            vec![Change::ModifyTable {
                name: "users".into(),
                changes: vec![],
            }]
        );
    }

    #[test]
    fn input_is_untouched() {
        let changes = vec![Change::ModifySchema {
            name: "public".into(),
            changes: vec![Change::DropSchema("x".into())],
        }];
        let before = changes.clone();
        let _ = filter_destructive(&changes);
        assert_eq!(changes, before);
    }

    #[test]
    fn partition_reports_scope() {
        let changes = vec![
            Change::DropSchema("legacy".into()),
            Change::ModifySchema {
                name: "public".into(),
                changes: vec![
                    Change::DropTable(Table::new("old")),
                    Change::ModifyTable {
                        name: "users".into(),
                        changes: vec![
                            Change::DropColumn("nickname".into()),
                            Change::AddColumn(Column::new("email", PgType::Text)),
                        ],
                    },
                ],
            },
        ];

        let filtered = partition_destructive(&changes);
        assert_eq!(filtered.kept, filter_destructive(&changes));

        let rendered: Vec<String> = filtered.withheld.iter().map(|w| w.to_string()).collect();
        assert_eq!(
            rendered,
            vec![
                "(realm): - schema legacy",
                "public: - table old",
                "public.users: - nickname",
            ]
        );
    }

    #[test]
    fn destructive_allow_list() {
        let destructive: Vec<ChangeKind> = ChangeKind::DESTRUCTIVE.to_vec();
        for kind in [
            ChangeKind::DropSchema,
            ChangeKind::DropTable,
            ChangeKind::DropIndex,
            ChangeKind::DropCheck,
            ChangeKind::DropAttr,
            ChangeKind::DropForeignKey,
            ChangeKind::DropColumn,
        ] {
            assert!(destructive.contains(&kind), "{:?}", kind);
        }
        for kind in [
            ChangeKind::ModifySchema,
            ChangeKind::ModifyTable,
            ChangeKind::RenameTable,
            ChangeKind::AlterColumnType,
            ChangeKind::ModifyIndex,
            ChangeKind::ModifyForeignKey,
        ] {
            assert!(!kind.is_destructive(), "{:?}", kind);
        }
    }

    // Every leaf variant, so generated trees cover all kinds.
    fn sample_leaf(n: u8) -> Change {
        let fk = ForeignKey {
            name: "fk".into(),
            columns: vec!["a".into()],
            references_schema: "public".into(),
            references_table: "t".into(),
            references_columns: vec!["id".into()],
            on_delete: ReferentialAction::NoAction,
            on_update: ReferentialAction::NoAction,
        };
        let idx = Index {
            name: "idx".into(),
            columns: vec![IndexColumn::new("a")],
            unique: false,
            where_clause: None,
        };
        let check = Check {
            name: "ck".into(),
            expr: "a > 0".into(),
        };
        let pk = PrimaryKey {
            name: "t_pkey".into(),
            columns: vec!["id".into()],
        };
        match n % 27 {
            0 => Change::AddSchema("s".into()),
            1 => Change::DropSchema("s".into()),
            2 => Change::AddTable(Table::new("t")),
            3 => Change::DropTable(Table::new("t")),
            4 => Change::RenameTable {
                from: "a".into(),
                to: "b".into(),
            },
            5 => Change::AddColumn(Column::new("c", PgType::Text)),
            6 => Change::DropColumn("c".into()),
            7 => Change::AlterColumnType {
                name: "c".into(),
                from: PgType::Integer,
                to: PgType::BigInt,
            },
            8 => Change::AlterColumnNullable {
                name: "c".into(),
                from: false,
                to: true,
            },
            9 => Change::AlterColumnDefault {
                name: "c".into(),
                from: None,
                to: Some("0".into()),
            },
            10 => Change::AddUnique("c".into()),
            11 => Change::DropUnique {
                column: "c".into(),
                constraint: "t_c_key".into(),
            },
            12 => Change::AddPrimaryKey(pk),
            13 => Change::DropPrimaryKey(pk),
            14 => Change::ModifyPrimaryKey {
                from: pk.clone(),
                to: pk,
            },
            15 => Change::AddForeignKey(fk),
            16 => Change::DropForeignKey(fk),
            17 => Change::ModifyForeignKey {
                from: fk.clone(),
                to: fk,
            },
            18 => Change::AddIndex(idx),
            19 => Change::DropIndex("idx".into()),
            20 => Change::ModifyIndex {
                from: idx.clone(),
                to: idx,
            },
            21 => Change::AddCheck(check),
            22 => Change::DropCheck("ck".into()),
            23 => Change::ModifyCheck {
                from: check.clone(),
                to: check,
            },
            24 => Change::AddAttr(Attr::Comment("x".into())),
            25 => Change::DropAttr(Attr::Comment("x".into())),
            _ => Change::ModifyAttr {
                from: Attr::Comment("x".into()),
                to: Attr::Comment("y".into()),
            },
        }
    }

    fn change_tree() -> impl Strategy<Value = Change> {
        let leaf = any::<u8>().prop_map(sample_leaf);
        leaf.prop_recursive(3, 48, 6, |inner| {
            prop_oneof![
                (
                    "[a-z]{1,6}",
                    prop::collection::vec(inner.clone(), 0..6)
                )
                    .prop_map(|(name, changes)| Change::ModifyTable { name, changes }),
                ("[a-z]{1,6}", prop::collection::vec(inner, 0..6))
                    .prop_map(|(name, changes)| Change::ModifySchema { name, changes }),
            ]
        })
    }

    fn contains_destructive(changes: &[Change]) -> bool {
        changes.iter().any(|c| {
            c.is_destructive() || c.children().is_some_and(contains_destructive)
        })
    }

    /// Whether `sub` is `full` with some nodes removed, order kept.
    fn is_filtered_subsequence(sub: &[Change], full: &[Change]) -> bool {
        let mut rest = full.iter();
        sub.iter().all(|s| {
            rest.by_ref().any(|f| match (s.children(), f.children()) {
                (Some(sc), Some(fc)) => {
                    s.to_string() == f.to_string() && is_filtered_subsequence(sc, fc)
                }
                _ => s == f,
            })
        })
    }

    proptest! {
        #[test]
        fn output_has_no_destructive_changes(tree in prop::collection::vec(change_tree(), 0..8)) {
            prop_assert!(!contains_destructive(&filter_destructive(&tree)));
        }

        #[test]
        fn filtering_is_idempotent(tree in prop::collection::vec(change_tree(), 0..8)) {
            let once = filter_destructive(&tree);
            prop_assert_eq!(filter_destructive(&once), once);
        }

        #[test]
        fn output_preserves_order(tree in prop::collection::vec(change_tree(), 0..8)) {
            prop_assert!(is_filtered_subsequence(&filter_destructive(&tree), &tree));
        }

        #[test]
        fn non_destructive_leaves_survive(tree in prop::collection::vec(change_tree(), 0..8)) {
            fn kept_leaves(changes: &[Change]) -> usize {
                changes
                    .iter()
                    .filter(|c| !c.is_destructive())
                    .map(|c| c.children().map_or(1, kept_leaves))
                    .sum()
            }
            let out = filter_destructive(&tree);
            let count: usize = out.iter().map(Change::leaf_count).sum();
            prop_assert_eq!(count, kept_leaves(&tree));
        }

        #[test]
        fn partition_agrees_with_filter(tree in prop::collection::vec(change_tree(), 0..8)) {
            let filtered = partition_destructive(&tree);
            prop_assert_eq!(&filtered.kept, &filter_destructive(&tree));
            prop_assert!(filtered.withheld.iter().all(|w| w.change.is_destructive()));
        }
    }
}
