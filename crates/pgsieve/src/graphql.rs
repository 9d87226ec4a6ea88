//! Read-only GraphQL over the declared tables.
//!
//! The schema is built at runtime from the desired [`Realm`]: one query field
//! per table, returning rows as a JSON array. Fields are named after the
//! table (`users`) for the `public` schema and `<schema>_<table>` otherwise.
//!
//! ```graphql
//! {
//!   tables
//!   users(limit: 10, offset: 20, order_by: "name")
//! }
//! ```

use crate::error::{Error, Result};
use crate::traced::ConnectionExt;
use async_graphql::dynamic::{
    Field, FieldFuture, FieldValue, InputValue, Object, ResolverContext, Scalar, Schema, TypeRef,
};
use async_graphql::{Request, Response, Value, Variables};
use deadpool_postgres::Pool;
use pgsieve_schema::Realm;
use pgsieve_sql::{Ident, quote_qualified};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;

const JSON_SCALAR: &str = "JSON";

/// Row limits applied to every table field.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub default: i64,
    pub max: i64,
}

/// A table exposed as a query field.
#[derive(Debug, Clone)]
struct TableSource {
    schema: String,
    table: String,
    columns: Vec<String>,
    /// Order used when the query doesn't ask for one, so paging is stable.
    default_order: Vec<String>,
    limits: Limits,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Page {
    limit: i64,
    offset: i64,
    order_by: Vec<String>,
}

impl TableSource {
    fn page(&self, limit: Option<i64>, offset: Option<i64>, order_by: Option<&str>) -> Result<Page, String> {
        let limit = match limit {
            None => self.limits.default,
            Some(n) if n < 0 => return Err(format!("limit must not be negative, got {}", n)),
            Some(n) => n.min(self.limits.max),
        };
        let offset = match offset {
            None => 0,
            Some(n) if n < 0 => return Err(format!("offset must not be negative, got {}", n)),
            Some(n) => n,
        };
        let order_by = match order_by {
            None => self.default_order.clone(),
            Some(col) if self.columns.iter().any(|c| c == col) => vec![col.to_string()],
            Some(col) => {
                return Err(format!(
                    "unknown column `{}` on {}.{}",
                    col, self.schema, self.table
                ));
            }
        };
        Ok(Page {
            limit,
            offset,
            order_by,
        })
    }

    /// `LIMIT` and `OFFSET` are bound as `$1` and `$2`.
    fn select_sql(&self, page: &Page) -> String {
        let order = if page.order_by.is_empty() {
            String::new()
        } else {
            let cols: Vec<String> = page.order_by.iter().map(|c| Ident(c).to_string()).collect();
            format!(" ORDER BY {}", cols.join(", "))
        };
        format!(
            "SELECT coalesce(json_agg(row_to_json(t)), '[]'::json)::text FROM (SELECT * FROM {}{} LIMIT $1 OFFSET $2) t",
            quote_qualified(&self.schema, &self.table),
            order
        )
    }
}

/// Make `name` a valid GraphQL name.
fn graphql_name(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) || out.starts_with("__") {
        out.insert(0, 't');
    }
    out
}

fn field_name(schema: &str, table: &str) -> String {
    if schema == "public" {
        graphql_name(table)
    } else {
        graphql_name(&format!("{}_{}", schema, table))
    }
}

fn int_arg(ctx: &ResolverContext<'_>, name: &str) -> async_graphql::Result<Option<i64>> {
    match ctx.args.get(name) {
        Some(v) if !v.is_null() => Ok(Some(v.i64()?)),
        _ => Ok(None),
    }
}

async fn fetch_rows(ctx: &ResolverContext<'_>, source: &TableSource) -> async_graphql::Result<Value> {
    let order_by = match ctx.args.get("order_by") {
        Some(v) if !v.is_null() => Some(v.string()?.to_string()),
        _ => None,
    };
    let page = source
        .page(int_arg(ctx, "limit")?, int_arg(ctx, "offset")?, order_by.as_deref())
        .map_err(async_graphql::Error::new)?;

    let pool = ctx.data::<Pool>()?;
    let conn = pool.get().await?;
    let sql = source.select_sql(&page);
    let row = conn.traced().query_one(&sql, &[&page.limit, &page.offset]).await?;
    let text: String = row.try_get(0)?;
    let json: serde_json::Value = serde_json::from_str(&text)?;
    Ok(Value::from_json(json)?)
}

/// Build the GraphQL schema for `realm`. Queries run against `pool`.
pub fn build_schema(realm: &Realm, pool: Pool, limits: Limits) -> Result<Schema> {
    let mut query = Object::new("Query");
    let mut exposed: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for (schema, table) in realm.iter_tables() {
        let name = field_name(&schema.name, &table.name);
        if name == "tables" || !seen.insert(name.clone()) {
            tracing::warn!(schema = %schema.name, table = %table.name, field = %name, "field name taken, table not exposed");
            continue;
        }
        exposed.push(format!("{}.{}", schema.name, table.name));

        let source = Arc::new(TableSource {
            schema: schema.name.clone(),
            table: table.name.clone(),
            columns: table.columns.iter().map(|c| c.name.clone()).collect(),
            default_order: table
                .primary_key
                .as_ref()
                .map(|pk| pk.columns.clone())
                .unwrap_or_default(),
            limits,
        });

        let mut field = Field::new(name, TypeRef::named_nn(JSON_SCALAR), move |ctx| {
            let source = source.clone();
            FieldFuture::new(async move {
                let rows = fetch_rows(&ctx, &source).await?;
                Ok(Some(FieldValue::value(rows)))
            })
        })
        .argument(InputValue::new("limit", TypeRef::named(TypeRef::INT)))
        .argument(InputValue::new("offset", TypeRef::named(TypeRef::INT)))
        .argument(InputValue::new("order_by", TypeRef::named(TypeRef::STRING)));
        if let Some(comment) = table.comment() {
            field = field.description(comment);
        }
        query = query.field(field);
    }

    let names = Arc::new(exposed);
    query = query.field(
        Field::new("tables", TypeRef::named_nn_list_nn(TypeRef::STRING), move |_| {
            let names = names.clone();
            FieldFuture::new(async move {
                Ok(Some(FieldValue::list(
                    names.iter().map(|n| FieldValue::value(n.clone())),
                )))
            })
        })
        .description("Qualified names of the tables exposed by this endpoint"),
    );

    Schema::build("Query", None, None)
        .register(Scalar::new(JSON_SCALAR).description("Arbitrary JSON"))
        .register(query)
        .data(pool)
        .finish()
        .map_err(|e| Error::GraphQl(e.to_string()))
}

/// A GraphQL-over-HTTP request body.
#[derive(Debug, Clone, Deserialize)]
pub struct GraphQlRequest {
    pub query: String,
    #[serde(default)]
    pub variables: Option<serde_json::Value>,
    #[serde(default, rename = "operationName")]
    pub operation_name: Option<String>,
}

/// Run one request against `schema`.
pub async fn execute(schema: &Schema, req: GraphQlRequest) -> Response {
    let mut request = Request::new(req.query);
    if let Some(vars) = req.variables {
        request = request.variables(Variables::from_json(vars));
    }
    if let Some(op) = req.operation_name {
        request = request.operation_name(op);
    }
    schema.execute(request).await
}
