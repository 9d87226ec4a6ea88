use crate::plan::PlanError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Decl(#[from] pgsieve_decl::DeclError),

    #[error("cannot plan migration: {0}")]
    Plan(#[from] PlanError),

    #[error("migration failed at `{statement}`: {source}")]
    Apply {
        statement: String,
        #[source]
        source: tokio_postgres::Error,
    },

    #[error("failed to build GraphQL schema: {0}")]
    GraphQl(String),

    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
