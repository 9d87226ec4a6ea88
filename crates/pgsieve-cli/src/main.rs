use clap::{Parser, Subcommand};
use pgsieve::{
    DiffOptions, MigrateOptions, Realm, Settings, build_schema, diff_realms, plan, plan_withheld,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

mod config;
mod render;

/// Declarative Postgres migrations that hold back destructive changes,
/// plus a read-only GraphQL endpoint over the declared tables.
#[derive(Parser, Debug)]
#[command(name = "pgsieve", version)]
struct Cli {
    /// Desired schema file (default: `.config/pgsieve.styx`, searched upward)
    #[arg(long, global = true, value_name = "FILE", env = "PGSIEVE_SCHEMA")]
    schema: Option<PathBuf>,

    /// Inspect every schema in the database, not just the declared ones
    #[arg(long, global = true)]
    whole_realm: bool,

    /// Don't turn add/drop table pairs into renames
    #[arg(long, global = true)]
    no_renames: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compare the desired schema to the database
    Diff,
    /// Print the SQL a migration would run
    Plan {
        /// Include destructive changes
        #[arg(long)]
        allow_destructive: bool,
        /// Print the SQL for the withheld destructive changes instead
        #[arg(long, conflicts_with = "allow_destructive")]
        withheld: bool,
    },
    /// Bring the database in line with the desired schema
    Migrate {
        /// Apply destructive changes too
        #[arg(long)]
        allow_destructive: bool,
        /// Plan and report, but don't apply
        #[arg(long)]
        dry_run: bool,
    },
    /// Migrate, then serve GraphQL (default)
    Serve {
        /// Serve without migrating first
        #[arg(long)]
        skip_migrate: bool,
        /// Apply destructive changes when migrating
        #[arg(long)]
        allow_destructive: bool,
        /// Listen address, overrides LISTEN_ADDR
        #[arg(long, value_name = "ADDR")]
        listen: Option<SocketAddr>,
    },
    /// Print the desired schema
    Schema {
        /// Print it as a CREATE script instead
        #[arg(long)]
        sql: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(e) = dotenvy::dotenv()
        && !e.not_found()
    {
        eprintln!("warning: failed to load .env: {}", e);
    }

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> pgsieve::Result<()> {
    let (desired, source) = config::load(cli.schema.as_deref())?;
    tracing::info!(
        %source,
        schemas = desired.schemas.len(),
        tables = desired.table_count(),
        "loaded desired schema"
    );

    let options = |allow_destructive: bool, dry_run: bool| MigrateOptions {
        allow_destructive,
        detect_renames: !cli.no_renames,
        whole_realm: cli.whole_realm,
        dry_run,
    };
    let style = render::Style::detect();

    let command = cli.command.unwrap_or(Command::Serve {
        skip_migrate: false,
        allow_destructive: false,
        listen: None,
    });

    match command {
        Command::Schema { sql } => {
            if sql {
                print!("{}", create_script(&desired)?);
            } else {
                print!("{}", render::realm(&desired));
            }
        }
        Command::Diff => {
            let settings = Settings::from_env()?;
            let client = connect(&settings).await?;
            let outcome = pgsieve::prepare(&client, &desired, &options(false, true)).await?;
            print!("{}", render::diff(&outcome.diff, style));
        }
        Command::Plan {
            allow_destructive,
            withheld,
        } => {
            let settings = Settings::from_env()?;
            let client = connect(&settings).await?;
            let outcome =
                pgsieve::prepare(&client, &desired, &options(allow_destructive, true)).await?;
            if withheld {
                print!("{}", plan_withheld(&outcome.filtered.withheld)?.to_sql());
            } else {
                print!("{}", outcome.plan.to_sql());
                eprint!("{}", render::withheld(&outcome.filtered.withheld, style));
            }
        }
        Command::Migrate {
            allow_destructive,
            dry_run,
        } => {
            let settings = Settings::from_env()?;
            let mut client = connect(&settings).await?;
            let outcome =
                pgsieve::migrate(&mut client, &desired, &options(allow_destructive, dry_run))
                    .await?;
            if dry_run {
                print!("{}", outcome.plan.to_sql());
            } else if outcome.applied {
                println!("Applied {} statement(s).", outcome.plan.len());
            } else {
                println!("Schema is up to date.");
            }
            eprint!("{}", render::withheld(&outcome.filtered.withheld, style));
        }
        Command::Serve {
            skip_migrate,
            allow_destructive,
            listen,
        } => {
            let mut settings = Settings::from_env()?;
            if let Some(addr) = listen {
                settings.server.listen = addr;
            }
            if !skip_migrate {
                let mut client = connect(&settings).await?;
                let outcome =
                    pgsieve::migrate(&mut client, &desired, &options(allow_destructive, false))
                        .await?;
                eprint!("{}", render::withheld(&outcome.filtered.withheld, style));
            }
            let pool = settings.server.pool(&settings.database)?;
            let schema = build_schema(&desired, pool, settings.server.limits())?;
            pgsieve::serve(schema, &settings.server).await?;
        }
    }
    Ok(())
}

async fn connect(settings: &Settings) -> pgsieve::Result<tokio_postgres::Client> {
    tracing::info!(database = %settings.database.redacted(), "connecting");
    settings.database.connect().await
}

/// The SQL that creates `desired` from an empty database.
fn create_script(desired: &Realm) -> pgsieve::Result<String> {
    let diff = diff_realms(
        desired,
        &Realm::new(),
        &DiffOptions {
            detect_renames: false,
        },
    );
    Ok(plan(&diff.changes)?.to_sql())
}
