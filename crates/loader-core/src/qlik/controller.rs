use tracing::{info, instrument};

use ods_loader_io::S3Client;

use crate::config::Config;
use crate::db::Warehouse;
use crate::ddl;
use crate::error::LoaderResult;
use crate::status::{StatusStore, initial_status};

use super::batch::{TableContext, process_cdc_files};
use super::dfm;
use super::discover::{cdc_gz_csvs, snapshot_dfms};
use super::snapshot::rds_snapshot_load;

/// Drives one table's full ETL cycle: detect a new snapshot (resetting
/// history if one has arrived), ensure tables and partitions exist, run the
/// initial snapshot load when needed, then process every outstanding CDC
/// file.
///
/// Grounded on `ods_qlik.CubicODSQlik.run_etl`.
#[instrument(skip(s3, warehouse, config))]
pub async fn run_table_etl(s3: &S3Client, warehouse: &Warehouse, config: &Config, table: &str) -> LoaderResult<()> {
    let schema_name = config.ods_schema();
    let db_fact_table = format!("{schema_name}.{}", table.replace('.', "_").to_lowercase());
    let db_history_table = format!("{db_fact_table}_history");
    let status_path = format!("{}/{table}.json", config.status_prefix());
    let status_store = StatusStore::new(s3, status_path);

    let snapshots = snapshot_dfms(s3, config, table).await?;
    let latest_snapshot = snapshots.last().expect("snapshot_dfms never returns empty");

    let mut etl_status = match status_store.load().await? {
        Some(status) => status,
        None => {
            let schema = dfm::fetch_schema(s3, &latest_snapshot.path).await?;
            let status = initial_status(&db_fact_table, &latest_snapshot.ts, schema);
            status_store.save(&status).await?;
            status
        }
    };

    if etl_status.current_snapshot_ts != latest_snapshot.ts {
        info!(
            old_snapshot = %etl_status.current_snapshot_ts,
            new_snapshot = %latest_snapshot.ts,
            "new qlik snapshot detected, resetting history"
        );
        snapshot_reset(warehouse, &status_store, &db_fact_table, &db_history_table).await?;
        let schema = dfm::fetch_schema(s3, &latest_snapshot.path).await?;
        etl_status = initial_status(&db_fact_table, &latest_snapshot.ts, schema);
    }

    warehouse
        .execute(&ddl::create_tables_from_schema(&etl_status.last_schema, &db_fact_table)?)
        .await?;
    warehouse
        .execute(&ddl::create_history_table_partitions(&db_history_table, None))
        .await?;

    let mut ctx = TableContext {
        s3,
        warehouse,
        db_fact_table: db_fact_table.clone(),
        db_history_table: db_history_table.clone(),
        schema: etl_status.last_schema.clone(),
    };

    if etl_status.last_cdc_ts.is_empty() {
        rds_snapshot_load(&ctx, s3, &config.archive_bucket, latest_snapshot).await?;
        etl_status.last_cdc_ts = "0".to_string();
        status_store.save(&etl_status).await?;
    }

    let cdc_objects = cdc_gz_csvs(s3, config, table, &etl_status.current_snapshot_ts, &etl_status.last_cdc_ts).await?;
    let max_ts = process_cdc_files(&mut ctx, cdc_objects).await?;
    if max_ts.as_str() > etl_status.last_cdc_ts.as_str() {
        etl_status.last_cdc_ts = max_ts;
    }
    etl_status.last_schema = ctx.schema;

    warehouse
        .execute(&ddl::drop_table(&format!("{db_fact_table}_load")))
        .await?;
    status_store.save(&etl_status).await?;

    Ok(())
}

/// Drops the `_history` table and truncates the fact table, discarding the
/// saved status so the next ETL cycle starts fresh against the new
/// snapshot.
///
/// Grounded on `ods_qlik.CubicODSQlik.snapshot_reset`.
async fn snapshot_reset(
    warehouse: &Warehouse,
    status_store: &StatusStore<'_>,
    db_fact_table: &str,
    db_history_table: &str,
) -> LoaderResult<()> {
    status_store.reset().await?;
    warehouse.execute(&ddl::drop_table(db_history_table)).await?;
    warehouse.truncate(db_fact_table, true, true).await?;
    Ok(())
}
