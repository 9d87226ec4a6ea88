//! Read the current state of a database from `pg_catalog`.

use crate::error::Result;
use crate::traced::{Connection, ConnectionExt};
use pgsieve_schema::{
    Attr, Check, Column, ForeignKey, Index, IndexColumn, NullsOrder, PgType, PrimaryKey, Realm,
    ReferentialAction, Schema, SortOrder, Table,
};

/// Which schemas to inspect.
#[derive(Debug, Clone, Default)]
pub struct InspectOptions {
    /// Only these schemas. `None` means every non-system schema.
    pub schemas: Option<Vec<String>>,
}

impl InspectOptions {
    pub fn only(schemas: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            schemas: Some(schemas.into_iter().map(Into::into).collect()),
        }
    }
}

const SCHEMAS_SQL: &str = r#"
SELECT nspname::text
FROM pg_catalog.pg_namespace
WHERE nspname !~ '^pg_' AND nspname <> 'information_schema'
ORDER BY nspname
"#;

const TABLES_SQL: &str = r#"
SELECT n.nspname::text, c.relname::text, pg_catalog.obj_description(c.oid, 'pg_class')
FROM pg_catalog.pg_class c
JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
WHERE c.relkind IN ('r', 'p') AND NOT c.relispartition AND n.nspname::text = ANY($1::text[])
ORDER BY n.nspname, c.relname
"#;

const COLUMNS_SQL: &str = r#"
SELECT n.nspname::text, c.relname::text, a.attname::text,
       pg_catalog.format_type(a.atttypid, a.atttypmod),
       a.attnotnull,
       pg_catalog.pg_get_expr(d.adbin, d.adrelid)
FROM pg_catalog.pg_attribute a
JOIN pg_catalog.pg_class c ON c.oid = a.attrelid
JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
LEFT JOIN pg_catalog.pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum
WHERE c.relkind IN ('r', 'p') AND a.attnum > 0 AND NOT a.attisdropped
  AND n.nspname::text = ANY($1::text[])
ORDER BY n.nspname, c.relname, a.attnum
"#;

const CONSTRAINTS_SQL: &str = r#"
SELECT n.nspname::text, c.relname::text, con.conname::text, con.contype::text,
       ARRAY(SELECT a.attname::text
             FROM unnest(con.conkey) WITH ORDINALITY AS k(attnum, ord)
             JOIN pg_catalog.pg_attribute a ON a.attrelid = con.conrelid AND a.attnum = k.attnum
             ORDER BY k.ord),
       fn.nspname::text, fc.relname::text,
       ARRAY(SELECT a.attname::text
             FROM unnest(con.confkey) WITH ORDINALITY AS k(attnum, ord)
             JOIN pg_catalog.pg_attribute a ON a.attrelid = con.confrelid AND a.attnum = k.attnum
             ORDER BY k.ord),
       con.confdeltype::text, con.confupdtype::text,
       pg_catalog.pg_get_constraintdef(con.oid)
FROM pg_catalog.pg_constraint con
JOIN pg_catalog.pg_class c ON c.oid = con.conrelid
JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
LEFT JOIN pg_catalog.pg_class fc ON fc.oid = con.confrelid
LEFT JOIN pg_catalog.pg_namespace fn ON fn.oid = fc.relnamespace
WHERE con.contype IN ('p', 'u', 'f', 'c') AND n.nspname::text = ANY($1::text[])
ORDER BY n.nspname, c.relname, con.conname
"#;

// Indexes that back a constraint are covered by CONSTRAINTS_SQL.
const INDEXES_SQL: &str = r#"
SELECT n.nspname::text, t.relname::text, i.relname::text, ix.indisunique,
       ARRAY(SELECT a.attname::text
             FROM unnest(ix.indkey::int2[]) WITH ORDINALITY AS k(attnum, ord)
             JOIN pg_catalog.pg_attribute a ON a.attrelid = ix.indrelid AND a.attnum = k.attnum
             ORDER BY k.ord),
       ix.indoption::int2[],
       pg_catalog.pg_get_expr(ix.indpred, ix.indrelid),
       ix.indexprs IS NOT NULL
FROM pg_catalog.pg_index ix
JOIN pg_catalog.pg_class i ON i.oid = ix.indexrelid
JOIN pg_catalog.pg_class t ON t.oid = ix.indrelid
JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
WHERE n.nspname::text = ANY($1::text[])
  AND NOT EXISTS (
      SELECT 1 FROM pg_catalog.pg_constraint con
      WHERE con.conindid = ix.indexrelid AND con.contype IN ('p', 'u', 'x')
  )
ORDER BY n.nspname, t.relname, i.relname
"#;

/// Inspect the database behind `conn`.
///
/// Schemas listed in `opts` that don't exist are simply absent from the
/// result, so the differ sees them as new.
pub async fn inspect_realm<C: Connection>(conn: &C, opts: &InspectOptions) -> Result<Realm> {
    let conn = conn.traced();
    let mut realm = Realm::new();

    for row in conn.query(SCHEMAS_SQL, &[]).await? {
        let name: String = row.try_get(0)?;
        let wanted = match &opts.schemas {
            Some(list) => list.contains(&name),
            None => true,
        };
        if wanted {
            realm.schemas.insert(name.clone(), Schema::new(name));
        }
    }

    let names: Vec<String> = realm.schemas.keys().cloned().collect();
    if names.is_empty() {
        return Ok(realm);
    }

    for row in conn.query(TABLES_SQL, &[&names]).await? {
        let schema: String = row.try_get(0)?;
        let name: String = row.try_get(1)?;
        let comment: Option<String> = row.try_get(2)?;

        let mut table = Table::new(name.clone());
        if let Some(text) = comment {
            table.attrs.push(Attr::Comment(text));
        }
        if let Some(s) = realm.schemas.get_mut(&schema) {
            s.tables.insert(name, table);
        }
    }

    for row in conn.query(COLUMNS_SQL, &[&names]).await? {
        let schema: String = row.try_get(0)?;
        let table: String = row.try_get(1)?;
        let Some(t) = table_mut(&mut realm, &schema, &table) else {
            continue;
        };
        let type_name: String = row.try_get(3)?;
        let not_null: bool = row.try_get(4)?;
        t.columns.push(Column {
            name: row.try_get(2)?,
            pg_type: PgType::from_catalog(&type_name),
            nullable: !not_null,
            default: row.try_get(5)?,
            unique: false,
            unique_constraint: None,
        });
    }

    for row in conn.query(CONSTRAINTS_SQL, &[&names]).await? {
        let schema: String = row.try_get(0)?;
        let table: String = row.try_get(1)?;
        let Some(t) = table_mut(&mut realm, &schema, &table) else {
            continue;
        };
        let name: String = row.try_get(2)?;
        let kind: String = row.try_get(3)?;
        let columns: Vec<String> = row.try_get(4)?;

        match kind.as_str() {
            "p" => t.primary_key = Some(PrimaryKey { name, columns }),
            "u" => match columns.as_slice() {
                [single] => {
                    if let Some(col) = t.columns.iter_mut().find(|c| &c.name == single) {
                        col.unique = true;
                        col.unique_constraint = Some(name);
                    }
                }
                _ => tracing::debug!(%schema, %table, constraint = %name, "skipping multi-column unique constraint"),
            },
            "f" => {
                let references_schema: Option<String> = row.try_get(5)?;
                let references_table: Option<String> = row.try_get(6)?;
                let references_columns: Vec<String> = row.try_get(7)?;
                let on_delete: String = row.try_get(8)?;
                let on_update: String = row.try_get(9)?;
                t.foreign_keys.push(ForeignKey {
                    name,
                    columns,
                    references_schema: references_schema.unwrap_or_default(),
                    references_table: references_table.unwrap_or_default(),
                    references_columns,
                    on_delete: ReferentialAction::from_catalog_code(&on_delete),
                    on_update: ReferentialAction::from_catalog_code(&on_update),
                });
            }
            "c" => {
                let def: String = row.try_get(10)?;
                t.checks.push(Check {
                    name,
                    expr: check_expr(&def).to_string(),
                });
            }
            _ => {}
        }
    }

    for row in conn.query(INDEXES_SQL, &[&names]).await? {
        let schema: String = row.try_get(0)?;
        let table: String = row.try_get(1)?;
        let name: String = row.try_get(2)?;
        let has_expressions: bool = row.try_get(7)?;
        if has_expressions {
            tracing::debug!(%schema, %table, index = %name, "skipping expression index");
            continue;
        }
        let Some(t) = table_mut(&mut realm, &schema, &table) else {
            continue;
        };
        let column_names: Vec<String> = row.try_get(4)?;
        let options: Vec<i16> = row.try_get(5)?;
        t.indexes.push(Index {
            name,
            columns: column_names
                .into_iter()
                .enumerate()
                .map(|(i, col)| index_column(col, options.get(i).copied().unwrap_or(0)))
                .collect(),
            unique: row.try_get(3)?,
            where_clause: row.try_get(6)?,
        });
    }

    tracing::debug!(
        schemas = realm.schemas.len(),
        tables = realm.table_count(),
        "inspected database"
    );
    Ok(realm)
}

fn table_mut<'r>(realm: &'r mut Realm, schema: &str, table: &str) -> Option<&'r mut Table> {
    realm.schemas.get_mut(schema)?.tables.get_mut(table)
}

/// `pg_get_constraintdef` renders checks as `CHECK ((expr))`, possibly with a
/// trailing `NOT VALID`. Keep just the expression.
fn check_expr(def: &str) -> &str {
    let def = def.trim();
    let def = def.strip_suffix("NOT VALID").map(str::trim_end).unwrap_or(def);
    let def = def.strip_prefix("CHECK").map(str::trim_start).unwrap_or(def);
    match def.strip_prefix('(').and_then(|d| d.strip_suffix(')')) {
        Some(inner) => inner,
        None => def,
    }
}

/// Decode one entry of `pg_index.indoption`: bit 0 is DESC, bit 1 NULLS FIRST.
fn index_column(name: String, option: i16) -> IndexColumn {
    let desc = option & 1 != 0;
    let nulls_first = option & 2 != 0;
    let (order, nulls) = match (desc, nulls_first) {
        (false, false) => (SortOrder::Asc, NullsOrder::Default),
        (false, true) => (SortOrder::Asc, NullsOrder::First),
        (true, true) => (SortOrder::Desc, NullsOrder::Default),
        (true, false) => (SortOrder::Desc, NullsOrder::Last),
    };
    IndexColumn { name, order, nulls }
}
