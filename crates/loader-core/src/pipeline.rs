use tracing::{error, info, instrument};

use ods_loader_io::S3Client;

use crate::config::Config;
use crate::db::Warehouse;
use crate::dmap::{job_urls, run_api_copy};
use crate::guard::check_for_parallel_tasks;
use crate::qlik::CUBIC_ODS_TABLES;
use crate::runtime::validate_environment;

/// Runs every DMAP job in `produce_job_list` order. A failed job is logged
/// and skipped; it is naturally retried on the next invocation since its
/// `last_updated` watermark was never advanced.
///
/// Grounded on `pipeline.start_dmap`.
#[instrument(skip(warehouse, config))]
pub async fn start_dmap(warehouse: &Warehouse, config: &Config) -> anyhow::Result<()> {
    let client = reqwest::Client::new();
    for (url, table) in job_urls(&config.dmap_base_url) {
        match run_api_copy(&client, warehouse, &url, table).await {
            Ok(()) => info!(url = %url, table = table.table, "dmap job complete"),
            Err(err) => error!(url = %url, table = table.table, error = %err, "dmap job failed"),
        }
    }
    Ok(())
}

/// Runs one table's ETL in a freshly spawned child process of the current
/// binary, matching the original's per-table `multiprocessing.Process`
/// isolation: a crash loading one table (OOM, panic, native extension
/// fault) can't take the rest of the batch down with it.
///
/// Grounded on `pipeline.start_qlik_load`, reimplemented via
/// `tokio::process::Command` re-invoking this executable's
/// `run-qlik-table` subcommand rather than `multiprocessing.get_context
/// ("spawn").Process`, since Rust has no in-process fork/spawn primitive
/// analogous to Python's.
#[instrument]
pub async fn run_qlik_table_isolated(table: &str) -> anyhow::Result<()> {
    let exe = std::env::current_exe()?;
    let status = tokio::process::Command::new(exe)
        .arg("run-qlik-table")
        .arg(table)
        .status()
        .await?;

    if !status.success() {
        anyhow::bail!("qlik table job for {table} died with status {status}");
    }
    Ok(())
}

/// Loads every table in [`CUBIC_ODS_TABLES`], then refreshes the schema's
/// materialized views.
///
/// Grounded on `pipeline.start_qlik_load`.
#[instrument(skip(warehouse, config))]
pub async fn start_qlik_load(warehouse: &Warehouse, config: &Config) -> anyhow::Result<()> {
    for table in CUBIC_ODS_TABLES {
        match run_qlik_table_isolated(table).await {
            Ok(()) => info!(table = %table, "qlik table load complete"),
            Err(err) => error!(table = %table, error = %err, "qlik table load failed"),
        }
    }

    let views = warehouse.materialized_views_in_schema(&config.ods_schema()).await?;
    warehouse.refresh_materialized_views(&views).await?;
    Ok(())
}

/// Loads a single QLIK table end to end: used both by the `run-qlik-table`
/// subcommand (the isolated child process) and directly by tests.
#[instrument(skip(s3, warehouse, config))]
pub async fn run_one_qlik_table(s3: &S3Client, warehouse: &Warehouse, config: &Config, table: &str) -> anyhow::Result<()> {
    crate::qlik::run_table_etl(s3, warehouse, config, table).await?;
    Ok(())
}

/// Validates the environment, guards against a duplicate ECS task, migrates
/// the database to head, mirrors every DMAP dataset, loads every QLIK table,
/// then refreshes the schema's materialized views.
///
/// Grounded on `pipeline.main`.
#[instrument(skip(s3, warehouse, config))]
pub async fn run_pipeline(s3: &S3Client, warehouse: &Warehouse, config: &Config) -> anyhow::Result<()> {
    let _ = s3;
    validate_environment(
        config,
        &["CONTROLLED_KEY", "PUBLIC_KEY", "DMAP_BASE_URL", "ARCHIVE_BUCKET", "ERROR_BUCKET"],
        &["CONTROLLED_KEY", "PUBLIC_KEY"],
        &["ECS_CLUSTER", "ECS_TASK_GROUP"],
        true,
    )?;

    check_for_parallel_tasks(config).await?;

    crate::db::migrations::MIGRATOR.run(warehouse.pool()).await?;

    start_dmap(warehouse, config).await?;
    start_qlik_load(warehouse, config).await
}
