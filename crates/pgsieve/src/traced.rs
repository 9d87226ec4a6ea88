//! Traced database access.
//!
//! Every catalog query, DDL statement and GraphQL fetch pgsieve sends goes
//! through [`TracedConn`], which wraps it in a `debug` span carrying the SQL
//! text, the row count and how long it took. Run with
//! `RUST_LOG=pgsieve=debug` to see them.

use std::future::Future;
use std::pin::Pin;
use std::time::Instant;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Error, Row};
use tracing::{Instrument, Span};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, Error>> + Send + 'a>>;
type Params<'a> = &'a [&'a (dyn ToSql + Sync)];

/// Something statements can be sent through: a plain client, a pooled
/// connection, or an open transaction.
pub trait Connection: Send + Sync {
    fn query<'a>(&'a self, sql: &'a str, params: Params<'a>) -> BoxFuture<'a, Vec<Row>>;

    fn query_one<'a>(&'a self, sql: &'a str, params: Params<'a>) -> BoxFuture<'a, Row>;

    /// Run one or more statements through the simple query protocol.
    fn batch_execute<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, ()>;
}

impl Connection for tokio_postgres::Client {
    fn query<'a>(&'a self, sql: &'a str, params: Params<'a>) -> BoxFuture<'a, Vec<Row>> {
        Box::pin(tokio_postgres::Client::query(self, sql, params))
    }

    fn query_one<'a>(&'a self, sql: &'a str, params: Params<'a>) -> BoxFuture<'a, Row> {
        Box::pin(tokio_postgres::Client::query_one(self, sql, params))
    }

    fn batch_execute<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, ()> {
        Box::pin(tokio_postgres::Client::batch_execute(self, sql))
    }
}

// Pooled connections deref to a client; delegate to its impl.
impl Connection for deadpool_postgres::Object {
    fn query<'a>(&'a self, sql: &'a str, params: Params<'a>) -> BoxFuture<'a, Vec<Row>> {
        Connection::query(client(self), sql, params)
    }

    fn query_one<'a>(&'a self, sql: &'a str, params: Params<'a>) -> BoxFuture<'a, Row> {
        Connection::query_one(client(self), sql, params)
    }

    fn batch_execute<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, ()> {
        Connection::batch_execute(client(self), sql)
    }
}

fn client(obj: &deadpool_postgres::Object) -> &tokio_postgres::Client {
    obj
}

impl Connection for tokio_postgres::Transaction<'_> {
    fn query<'a>(&'a self, sql: &'a str, params: Params<'a>) -> BoxFuture<'a, Vec<Row>> {
        Box::pin(tokio_postgres::Transaction::query(self, sql, params))
    }

    fn query_one<'a>(&'a self, sql: &'a str, params: Params<'a>) -> BoxFuture<'a, Row> {
        Box::pin(tokio_postgres::Transaction::query_one(self, sql, params))
    }

    fn batch_execute<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, ()> {
        Box::pin(tokio_postgres::Transaction::batch_execute(self, sql))
    }
}

/// Borrowed [`Connection`] whose calls are each wrapped in a span.
pub struct TracedConn<'a, C: Connection> {
    conn: &'a C,
}

impl<'a, C: Connection> TracedConn<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    pub async fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> Result<Vec<Row>, Error> {
        let span = query_span(sql, params.len());
        let rows = timed(&span, self.conn.query(sql, params)).await?;
        span.record("rows", rows.len());
        Ok(rows)
    }

    pub async fn query_one(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> Result<Row, Error> {
        let span = query_span(sql, params.len());
        let row = timed(&span, self.conn.query_one(sql, params)).await?;
        span.record("rows", 1u64);
        Ok(row)
    }

    /// Run a parameterless statement, such as one step of a migration plan.
    pub async fn batch_execute(&self, sql: &str) -> Result<(), Error> {
        let span = tracing::debug_span!(
            "db.execute",
            sql = %sql,
            elapsed_ms = tracing::field::Empty,
        );
        timed(&span, self.conn.batch_execute(sql)).await
    }
}

fn query_span(sql: &str, params: usize) -> Span {
    tracing::debug_span!(
        "db.query",
        sql = %sql.trim(),
        params,
        rows = tracing::field::Empty,
        elapsed_ms = tracing::field::Empty,
    )
}

/// Run `fut` inside `span`, recording how long it took even when it fails.
async fn timed<T>(span: &Span, fut: BoxFuture<'_, T>) -> Result<T, Error> {
    let start = Instant::now();
    let result = fut.instrument(span.clone()).await;
    span.record("elapsed_ms", start.elapsed().as_millis() as u64);
    if let Err(e) = &result {
        span.in_scope(|| tracing::debug!(error = %e, "statement failed"));
    }
    result
}

/// Extension trait to get a traced wrapper from a connection.
pub trait ConnectionExt: Connection + Sized {
    fn traced(&self) -> TracedConn<'_, Self> {
        TracedConn::new(self)
    }
}

impl<C: Connection> ConnectionExt for C {}
