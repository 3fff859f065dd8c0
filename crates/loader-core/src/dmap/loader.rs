use std::collections::HashSet;

use tracing::{info, instrument, warn};

use crate::db::{Warehouse, copy_csv_gz_into};
use crate::error::{LoaderError, LoaderResult};

use super::client::{ApiResult, download_from_url, get_api_results};
use super::tables::DatasetTable;

/// Compares a downloaded CSV's header against `table`'s expected column
/// list. Extra columns the warehouse doesn't know about are fatal; missing
/// columns are only logged, since DMAP endpoints are free to omit optional
/// fields on any given day.
///
/// Grounded on `api_copy_job.schema_compare`.
pub fn schema_compare(url: &str, header_line: &str, table: &DatasetTable) -> LoaderResult<()> {
    let local_columns: HashSet<&str> = header_line.trim().to_lowercase().split(',').collect();
    let expected: HashSet<&str> = table.columns.iter().copied().collect();

    let not_in_dest: Vec<String> = local_columns.difference(&expected).map(|s| s.to_string()).collect();
    let not_in_local: Vec<&str> = expected.difference(&local_columns).copied().collect();
    if !not_in_local.is_empty() {
        warn!(table = table.table, missing = ?not_in_local, "dmap result omits expected columns");
    }

    if !not_in_dest.is_empty() {
        return Err(LoaderError::SchemaCsvUnknownColumns {
            url: url.to_string(),
            table: table.table.to_string(),
            columns: not_in_dest,
        });
    }

    Ok(())
}

/// Upserts the `api_metadata.last_updated` watermark for `url`.
///
/// Grounded on `api_copy_job.insert_update_last_updated`.
#[instrument(skip(warehouse, result))]
async fn insert_update_last_updated(warehouse: &Warehouse, url: &str, result: &ApiResult) -> LoaderResult<()> {
    let last_updated = chrono::NaiveDateTime::parse_from_str(&result.last_updated, "%Y-%m-%dT%H:%M:%S%.f")
        .map_err(|_| LoaderError::TimestampNotFound {
            haystack: result.last_updated.clone(),
        })?;

    sqlx::query(
        "INSERT INTO ods.api_metadata (url, last_updated) VALUES ($1, $2) \
         ON CONFLICT ON CONSTRAINT api_metadata_url_key DO UPDATE SET last_updated = EXCLUDED.last_updated",
    )
    .bind(url)
    .bind(last_updated)
    .execute(warehouse.pool())
    .await?;

    Ok(())
}

/// Deletes any row left with `dataset_id IS NULL`, a leftover from a
/// previous run that failed partway through loading a result.
///
/// Grounded on `api_copy_job.drop_dataset_id_null`.
async fn drop_dataset_id_null(warehouse: &Warehouse, table: &str) -> LoaderResult<u64> {
    warehouse
        .execute(&format!("DELETE FROM {table} WHERE dataset_id IS NULL;"))
        .await
}

/// Runs one DMAP endpoint's full copy cycle: fetch outstanding results,
/// download, verify schema, stage via `COPY`, stamp `dataset_id`, advance
/// the watermark. A failed result aborts the whole job without advancing
/// the watermark past it, so it is retried on the next run.
///
/// Grounded on `api_copy_job.run_api_copy`.
#[instrument(skip(client, warehouse, table))]
pub async fn run_api_copy(client: &reqwest::Client, warehouse: &Warehouse, url: &str, table: &DatasetTable) -> LoaderResult<()> {
    let results = get_api_results(client, warehouse, url).await?;

    for result in &results {
        let load_result = load_one_result(client, warehouse, url, table, result).await;

        // Always re-sweep dataset_id IS NULL regardless of outcome, the
        // same way the original's `finally` block does.
        if let Err(sweep_err) = drop_dataset_id_null(warehouse, table.table).await {
            warn!(error = %sweep_err, table = table.table, "post-load dataset_id sweep failed");
        }

        load_result?;
    }

    Ok(())
}

async fn load_one_result(
    client: &reqwest::Client,
    warehouse: &Warehouse,
    url: &str,
    table: &DatasetTable,
    result: &ApiResult,
) -> LoaderResult<()> {
    let file_name = result.url.split('?').next().unwrap_or(&result.url);
    let file_name = file_name.rsplit('/').next().unwrap_or("dmap_result.csv.gz");

    let tmp_dir = tempfile::Builder::new().prefix("ods-loader-dmap-").tempdir()?;
    let local_path = tmp_dir.path().join(file_name);

    if !download_from_url(client, &result.url, &local_path).await? {
        return Err(LoaderError::AuthRejected { url: result.url.clone() });
    }

    let header = crate::db::header_from_csv_gz(&local_path)?;
    schema_compare(url, &header, table)?;

    drop_dataset_id_null(warehouse, table.table).await?;

    let columns: Vec<String> = table.columns.iter().map(|s| s.to_string()).collect();
    copy_csv_gz_into(warehouse, &local_path, table.table, &columns).await?;
    warehouse.vacuum_analyze(table.table).await?;

    sqlx::query(&format!("DELETE FROM {} WHERE dataset_id = $1;", table.table))
        .bind(&result.dataset_id)
        .execute(warehouse.pool())
        .await?;

    sqlx::query(&format!(
        "UPDATE {} SET dataset_id = $1 WHERE dataset_id IS NULL;",
        table.table
    ))
    .bind(&result.dataset_id)
    .execute(warehouse.pool())
    .await?;

    insert_update_last_updated(warehouse, url, result).await?;

    info!(table = table.table, dataset_id = %result.dataset_id, "dmap result loaded");
    Ok(())
}
