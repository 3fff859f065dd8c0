#![warn(
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::pedantic
)]
#![forbid(unsafe_code)]
#![allow(clippy::module_name_repetitions, clippy::similar_names)]

use std::time::Duration;

use clap::{Parser, Subcommand};
use ods_loader_core::config::CONFIG;
use ods_loader_core::db;
use tracing_subscriber::{EnvFilter, filter::LevelFilter};

mod config;

pub(crate) use config::CONFIG_BIN;
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run pending database migrations
    Migrate {},
    /// Wait for the database to be reachable and migrated
    WaitForDb {
        #[clap(
            default_value = "false",
            short = 'm',
            help = "Also check that migrations have been applied, implies connectivity check."
        )]
        check_migrations: bool,
        #[clap(
            default_value_t = 15,
            long,
            short,
            help = "Number of retries to connect to the database."
        )]
        retries: u32,
        #[clap(
            default_value_t = 2,
            long,
            short,
            help = "Delay in seconds between retries to connect to the database."
        )]
        backoff: u64,
    },
    /// Run one full pipeline tick: validate the environment, guard against a
    /// duplicate ECS task, migrate the database to head, mirror every DMAP
    /// dataset, load every QLIK table, then refresh materialized views.
    Run {},
    /// Run a single QLIK table's CDC ETL. This is the subcommand the `run`
    /// pipeline re-invokes per table, in its own child process, for fault
    /// isolation.
    RunQlikTable {
        /// QLIK source table name, e.g. `cubic.edw_fct_dim_foo`.
        table: String,
    },
    /// Check that the database is reachable
    Healthcheck {},
    /// Print the version of the loader
    Version {},
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .json()
        .flatten_event(true)
        .with_current_span(true)
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    match cli.command {
        Some(Commands::WaitForDb {
            check_migrations,
            retries,
            backoff,
        }) => {
            wait_for_db(check_migrations, retries, backoff).await?;
        }
        Some(Commands::Migrate {}) => {
            migrate().await?;
        }
        Some(Commands::Run {}) => {
            print_info();
            run_and_maybe_migrate().await?;
        }
        Some(Commands::RunQlikTable { table }) => {
            print_info();
            run_qlik_table_and_maybe_migrate(&table).await?;
        }
        Some(Commands::Healthcheck {}) => {
            healthcheck().await?;
        }
        Some(Commands::Version {}) => {
            println!("{VERSION}");
        }
        None => {
            if CONFIG_BIN.debug.auto_run {
                print_info();
                run_and_maybe_migrate().await?;
            } else {
                eprintln!("No subcommand provided. Use --help for more information.");
                anyhow::bail!("No subcommand provided");
            }
        }
    }

    Ok(())
}

async fn run_and_maybe_migrate() -> anyhow::Result<()> {
    if CONFIG_BIN.debug.migrate_before_run {
        wait_for_db(true, 15, 2).await?;
        migrate().await?;
    }
    let s3 = ods_loader_io::S3Client::from_env().await;
    let warehouse = db::connect(&CONFIG).await?;
    ods_loader_core::pipeline::run_pipeline(&s3, &warehouse, &CONFIG).await
}

async fn run_qlik_table_and_maybe_migrate(table: &str) -> anyhow::Result<()> {
    if CONFIG_BIN.debug.migrate_before_run {
        wait_for_db(true, 15, 2).await?;
        migrate().await?;
    }
    let s3 = ods_loader_io::S3Client::from_env().await;
    let warehouse = db::connect(&CONFIG).await?;
    ods_loader_core::pipeline::run_one_qlik_table(&s3, &warehouse, &CONFIG, table).await
}

async fn migrate() -> anyhow::Result<()> {
    println!("Migrating database...");
    let warehouse = db::connect(&CONFIG).await?;
    db::migrations::MIGRATOR.run(warehouse.pool()).await?;
    println!("Database migration complete.");
    Ok(())
}

async fn wait_for_db(check_migrations: bool, retries: u32, backoff: u64) -> anyhow::Result<()> {
    let mut attempt = 0;
    let warehouse = loop {
        match db::connect(&CONFIG).await {
            Ok(warehouse) => break warehouse,
            Err(e) if attempt < retries => {
                attempt += 1;
                tracing::warn!(attempt, error = %e, "database not yet reachable, retrying");
                tokio::time::sleep(Duration::from_secs(backoff)).await;
            }
            Err(e) => return Err(e),
        }
    };

    if check_migrations {
        db::migrations::MIGRATOR.run(warehouse.pool()).await?;
    }

    println!("Database is reachable.");
    Ok(())
}

async fn healthcheck() -> anyhow::Result<()> {
    let warehouse = db::connect(&CONFIG).await?;
    warehouse.execute("SELECT 1;").await?;
    println!("ok");
    Ok(())
}

fn print_info() {
    tracing::info!(service = %CONFIG.service_name, version = %VERSION, "starting ods-loader");
}
