//! Errors raised while loading a schema file.

use thiserror::Error;

/// Error loading or validating a declarative schema.
#[derive(Debug, Error)]
pub enum DeclError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The document is not valid styx, or doesn't match the schema layout.
    /// Carries the rendered diagnostic.
    #[error("{rendered}")]
    Parse { rendered: String },

    #[error("{schema}.{table}.{column}: unknown type `{ty}`")]
    UnknownType {
        schema: String,
        table: String,
        column: String,
        ty: String,
    },

    #[error("{schema}.{table}: {context} references unknown column `{column}`")]
    UnknownColumn {
        schema: String,
        table: String,
        column: String,
        context: String,
    },

    #[error("{schema}.{table}: foreign key `{name}` has invalid reference `{reference}`")]
    BadReference {
        schema: String,
        table: String,
        name: String,
        reference: String,
    },

    #[error(
        "{schema}.{table}: foreign key `{name}` has {columns} column(s) but references {references}"
    )]
    ReferenceArity {
        schema: String,
        table: String,
        name: String,
        columns: usize,
        references: usize,
    },

    #[error("{schema}.{table}: foreign key `{name}` has invalid action `{action}`")]
    BadAction {
        schema: String,
        table: String,
        name: String,
        action: String,
    },

    #[error("{schema}.{table}: {context} must list at least one column")]
    NoColumns {
        schema: String,
        table: String,
        context: String,
    },
}
