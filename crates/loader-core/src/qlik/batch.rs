use std::collections::HashSet;
use std::path::{Path, PathBuf};

use sha1::{Digest, Sha1};
use tracing::{info, instrument, warn};

use ods_loader_io::S3Client;

use crate::db::{Warehouse, copy_csv_gz_into, header_from_csv_gz};
use crate::ddl;
use crate::error::{LoaderError, LoaderResult};
use crate::qlik::dfm;
use crate::qlik::types::{CDC_COLUMNS, ColumnSpec, MERGED_FNAME};

/// Fixed inputs for loading CDC batches into one table, bundled so the
/// per-folder helpers below don't carry a dozen loose parameters.
pub struct TableContext<'a> {
    pub s3: &'a S3Client,
    pub warehouse: &'a Warehouse,
    pub db_fact_table: String,
    pub db_history_table: String,
    pub schema: Vec<ColumnSpec>,
}

impl<'a> TableContext<'a> {
    fn load_table(&self) -> String {
        format!("{}_load", self.db_fact_table)
    }

    fn key_columns(&self) -> Vec<String> {
        self.schema
            .iter()
            .filter(|c| c.is_key())
            .map(|c| c.name.to_lowercase())
            .collect()
    }

    fn schema_columns(&self) -> Vec<String> {
        self.schema.iter().map(|c| c.name.clone()).collect()
    }
}

/// Downloads one CDC `.csv.gz` object into `tmp_dir`, hashes its header row
/// and moves the file into a subdirectory named after that hash, so that
/// later merging only ever combines files sharing an identical column set.
///
/// Grounded on `ods_qlik.thread_save_csv_file`.
#[instrument(skip(s3, tmp_dir))]
pub async fn download_and_partition(s3: &S3Client, csv_object: &str, tmp_dir: &Path) -> LoaderResult<()> {
    let local_name = csv_object.replace("s3://", "").replace('/', "|");
    let local_path = tmp_dir.join(&local_name);
    s3.download(csv_object, &local_path).await?;

    let header = header_from_csv_gz(&local_path)?;
    let mut hasher = Sha1::new();
    hasher.update(header.as_bytes());
    let hash_folder = tmp_dir.join(format!("{:x}", hasher.finalize()));

    tokio::fs::create_dir_all(&hash_folder).await?;
    tokio::fs::rename(&local_path, hash_folder.join(&local_name)).await?;
    Ok(())
}

/// Concatenates every `.csv.gz` file in `load_folder` into a single
/// [`MERGED_FNAME`] file, keeping the header row only from the first file
/// (every file in a hash folder shares the same header by construction).
///
/// Returns the greatest CDC timestamp embedded in any of the merged file
/// names, used to advance the watermark.
///
/// Grounded on the original's `merge_cdc_csv_gz_files` (absent from the
/// retrieval pack; reconstructed from its call site in `cdc_load_folder`,
/// which expects a merged file plus the max timestamp of the batch).
pub async fn merge_cdc_csv_gz_files(load_folder: &Path) -> LoaderResult<String> {
    use std::io::Write;

    let mut entries: Vec<PathBuf> = tokio::fs::read_dir(load_folder)
        .await
        .map_err(LoaderError::Io)?
        .into_iter_sync()
        .await?;
    entries.sort();

    let merged_path = load_folder.join(MERGED_FNAME);
    let out_file = std::fs::File::create(&merged_path)?;
    let mut encoder = flate2::write::GzEncoder::new(out_file, flate2::Compression::default());

    let mut max_ts = String::new();
    for (index, path) in entries.iter().enumerate() {
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        if let Ok(ts) = super::types::re_get_first(name, &super::types::RE_CDC_TS) {
            if ts.as_str() > max_ts.as_str() {
                max_ts = ts;
            }
        }

        let raw = std::fs::read(path)?;
        let mut decoder = flate2::read::GzDecoder::new(raw.as_slice());
        let mut text = String::new();
        std::io::Read::read_to_string(&mut decoder, &mut text)?;

        let mut lines = text.lines();
        if index == 0 {
            if let Some(header) = lines.next() {
                writeln!(encoder, "{header}")?;
            }
        } else {
            lines.next();
        }
        for line in lines {
            writeln!(encoder, "{line}")?;
        }
    }
    encoder.finish()?;

    Ok(max_ts)
}

/// Small adapter so [`tokio::fs::ReadDir`] can be drained into a `Vec`
/// without pulling in `tokio-stream` for a single call site.
trait ReadDirExt {
    async fn into_iter_sync(self) -> std::io::Result<Vec<PathBuf>>;
}

impl ReadDirExt for tokio::fs::ReadDir {
    async fn into_iter_sync(mut self) -> std::io::Result<Vec<PathBuf>> {
        let mut out = Vec::new();
        while let Some(entry) = self.next_entry().await? {
            out.push(entry.path());
        }
        Ok(out)
    }
}

/// Verifies the merged batch's schema against the table's current schema,
/// extending the fact/history/load tables when new, non-key columns appear
/// and failing loudly when an existing column's dimension (type or key
/// status) has changed.
///
/// Grounded on `ods_qlik.CubicODSQlik.cdc_verify_schema`.
#[instrument(skip(ctx))]
pub async fn verify_schema(ctx: &mut TableContext<'_>, dfm_object: &str) -> LoaderResult<()> {
    let cdc_schema = dfm::fetch_schema(ctx.s3, dfm_object).await?;
    let cdc_names: HashSet<&str> = cdc_schema.iter().map(|c| c.name.as_str()).collect();

    for required in CDC_COLUMNS {
        if !cdc_names.contains(required) {
            return Err(LoaderError::SchemaCsvUnknownColumns {
                url: dfm_object.to_string(),
                table: ctx.db_fact_table.clone(),
                columns: vec![required.to_string()],
            });
        }
    }

    let candidates: Vec<ColumnSpec> = cdc_schema
        .into_iter()
        .filter(|c| !CDC_COLUMNS.contains(&c.name.as_str()))
        .collect();

    let mut new_columns = Vec::new();
    for column in candidates {
        match ctx.schema.iter().find(|existing| existing.name == column.name) {
            Some(existing) if *existing == column => {}
            Some(_) => {
                return Err(LoaderError::SchemaConflict {
                    table: ctx.db_fact_table.clone(),
                    column: column.name.clone(),
                });
            }
            None => new_columns.push(column),
        }
    }

    if new_columns.is_empty() {
        return Ok(());
    }

    ctx.warehouse
        .execute(&ddl::add_columns_to_table(&new_columns, &ctx.db_fact_table))
        .await?;
    ctx.schema.extend(new_columns);
    Ok(())
}

/// Loads one hash-partitioned CDC folder into the warehouse: merge, verify,
/// stage, apply insert/update/delete, then remove the folder.
///
/// Grounded on `ods_qlik.CubicODSQlik.cdc_load_folder`.
#[instrument(skip(ctx), fields(load_folder = %load_folder.display()))]
pub async fn load_folder(ctx: &mut TableContext<'_>, load_folder: &Path) -> LoaderResult<String> {
    let result = load_folder_inner(ctx, load_folder).await;

    let _ = tokio::fs::remove_dir_all(load_folder).await;
    ctx.warehouse.vacuum_analyze(&ctx.db_history_table).await?;
    ctx.warehouse.vacuum_analyze(&ctx.db_fact_table).await?;

    result
}

async fn load_folder_inner(ctx: &mut TableContext<'_>, load_folder: &Path) -> LoaderResult<String> {
    let mut dfm_object = String::new();
    let mut entries = tokio::fs::read_dir(load_folder).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        dfm_object = name.replace(".csv.gz", ".dfm").replace('|', "/");
        break;
    }

    let max_ts = merge_cdc_csv_gz_files(load_folder).await?;
    verify_schema(ctx, &dfm_object).await?;

    let merged_path = load_folder.join(MERGED_FNAME);
    let load_table = ctx.load_table();
    let columns = ctx.schema_columns();
    let header_and_columns: Vec<String> = CDC_COLUMNS.iter().map(|s| s.to_string()).chain(columns.clone()).collect();

    ctx.warehouse.truncate(&load_table, false, false).await?;
    copy_csv_gz_into(ctx.warehouse, &merged_path, &load_table, &header_and_columns).await?;

    ctx.warehouse
        .execute(&ddl::bulk_insert_from_temp(&ctx.db_history_table, &load_table, &header_and_columns))
        .await?;

    ctx.warehouse
        .execute(&ddl::bulk_insert_inserts_from_temp(&ctx.db_fact_table, &load_table, &columns))
        .await?;

    let key_columns = ctx.key_columns();
    for column in &columns {
        if key_columns.contains(&column.to_lowercase()) || CDC_COLUMNS.contains(&column.as_str()) {
            continue;
        }
        ctx.warehouse
            .execute(&ddl::bulk_update_from_temp(&ctx.db_fact_table, column, &key_columns))
            .await?;
    }

    ctx.warehouse
        .execute(&ddl::bulk_delete_from_temp(&ctx.db_fact_table, &key_columns))
        .await?;

    Ok(max_ts)
}

/// Scans every hash folder under `tmp_dir` and loads any whose size or file
/// count has crossed the flush threshold. Passing `max_folder_bytes: 0`
/// flushes every non-empty folder unconditionally — used for the final
/// drain after the last download batch.
///
/// Grounded on `ods_qlik.CubicODSQlik.cdc_check_load_folders`.
#[instrument(skip(ctx))]
pub async fn check_and_flush(ctx: &mut TableContext<'_>, tmp_dir: &Path, max_folder_bytes: u64) -> LoaderResult<String> {
    let mut max_ts = String::new();
    let mut entries = tokio::fs::read_dir(tmp_dir).await?;
    let mut folders = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.is_dir() {
            folders.push(path);
        }
    }

    for folder in folders {
        let mut file_count = 0_u64;
        let mut folder_bytes = 0_u64;
        let mut inner = tokio::fs::read_dir(&folder).await?;
        while let Some(entry) = inner.next_entry().await? {
            file_count += 1;
            if let Ok(meta) = entry.metadata().await {
                folder_bytes += meta.len();
            }
        }
        if file_count == 0 {
            continue;
        }
        if folder_bytes > max_folder_bytes || file_count > 5_000 {
            match load_folder(ctx, &folder).await {
                Ok(ts) if ts.as_str() > max_ts.as_str() => max_ts = ts,
                Ok(_) => {}
                Err(err) => warn!(error = %err, folder = %folder.display(), "cdc folder load failed"),
            }
        }
    }

    Ok(max_ts)
}

/// Downloads and loads every outstanding CDC file for a table, ten objects
/// at a time, flushing hash folders that cross the 60MB threshold between
/// batches and draining everything left over at the end.
///
/// Grounded on `ods_qlik.CubicODSQlik.process_cdc_files`.
#[instrument(skip(ctx, objects))]
pub async fn process_cdc_files(ctx: &mut TableContext<'_>, objects: Vec<String>) -> LoaderResult<String> {
    const BATCH_SIZE: usize = 10;
    const FLUSH_THRESHOLD_BYTES: u64 = 60_000_000;

    let tmp_dir = tempfile::Builder::new().prefix("ods-loader-cdc-").tempdir()?;
    let mut max_ts = String::new();
    let concurrency = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4);

    for batch in objects.chunks(BATCH_SIZE) {
        let mut join_set = tokio::task::JoinSet::new();
        for object in batch {
            let s3 = ctx.s3.clone();
            let object = object.clone();
            let dir = tmp_dir.path().to_path_buf();
            join_set.spawn(async move { download_and_partition(&s3, &object, &dir).await });
            if join_set.len() >= concurrency {
                if let Some(result) = join_set.join_next().await {
                    log_download_result(result);
                }
            }
        }
        while let Some(result) = join_set.join_next().await {
            log_download_result(result);
        }

        let ts = check_and_flush(ctx, tmp_dir.path(), FLUSH_THRESHOLD_BYTES).await?;
        if ts.as_str() > max_ts.as_str() {
            max_ts = ts;
        }
    }

    let ts = check_and_flush(ctx, tmp_dir.path(), 0).await?;
    if ts.as_str() > max_ts.as_str() {
        max_ts = ts;
    }

    info!(max_ts = %max_ts, "cdc batch processing complete");
    Ok(max_ts)
}

fn log_download_result(result: Result<LoaderResult<()>, tokio::task::JoinError>) {
    match result {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!(error = %err, "cdc file download failed"),
        Err(err) => warn!(error = %err, "cdc download task panicked"),
    }
}
