//! Declarative Postgres migrations that never drop anything by accident.
//!
//! Describe the schema you want as a [`Realm`], and pgsieve works out how to
//! get there from what the database has:
//!
//! 1. [`inspect_realm`] reads the current state from `pg_catalog`.
//! 2. [`diff_realms`] compares desired against current, producing a tree of
//!    [`Change`]s (schema → table → column/constraint/index/attribute).
//! 3. [`filter_destructive`] prunes every drop out of the tree. Withheld
//!    changes are reported, not applied, unless explicitly allowed.
//! 4. [`plan`] orders what's left into SQL statements.
//! 5. [`apply`] runs them in a single transaction.
//!
//! [`migrate`] does all of the above in one call.
//!
//! ```ignore
//! let desired = pgsieve_decl::load_file(".config/pgsieve.styx")?;
//! let mut client = Settings::from_env()?.database.connect().await?;
//! let outcome = migrate(&mut client, &desired, &MigrateOptions::default()).await?;
//! for w in &outcome.filtered.withheld {
//!     println!("withheld: {}", w);
//! }
//! ```
//!
//! The same realm can then be served read-only over GraphQL, see
//! [`build_schema`] and [`serve()`].

mod apply;
mod change;
mod config;
mod diff;
mod error;
mod filter;
mod graphql;
mod introspect;
mod plan;
mod serve;
mod traced;

pub use apply::{MigrateOptions, MigrationOutcome, apply, migrate, prepare};
pub use change::{Change, ChangeKind, SchemaDiff};
pub use config::{DatabaseSettings, ServerSettings, Settings};
pub use diff::{DiffOptions, RealmDiff, diff_realms};
pub use error::{Error, Result};
pub use filter::{Filtered, Scope, WithheldChange, filter_destructive, partition_destructive};
pub use graphql::{GraphQlRequest, Limits, build_schema, execute};
pub use introspect::{InspectOptions, inspect_realm};
pub use plan::{
    DEFAULT_SCHEMA, Plan, PlanError, Statement, create_index_sql, create_table_sql, plan,
    plan_withheld,
};
pub use serve::{router, serve};
pub use traced::{Connection, ConnectionExt, TracedConn};

pub use pgsieve_schema::{self as schema, Realm};
