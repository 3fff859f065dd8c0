use ods_loader_io::S3Client;

use crate::config::Config;
use crate::error::LoaderResult;

use super::types::{DfmDetails, RE_CDC_TS, RE_SNAPSHOT_TS, re_get_first};

/// Finds every snapshot `.dfm` file for `table` under the archive bucket's
/// `odin/archive/cubic_qlik/processed/cubic/ods_qlik/<table>/` prefix,
/// sorted ascending by embedded timestamp.
///
/// Grounded on `ods_qlik.get_snapshot_dfms`.
pub async fn snapshot_dfms(s3: &S3Client, config: &Config, table: &str) -> LoaderResult<Vec<DfmDetails>> {
    let prefix = format!("{}/{}/{table}/", config.odin_processed_prefix(), config.qlik_prefix());
    let objects = s3.list(&config.archive_bucket, &prefix, Some(".dfm")).await?;

    let mut found = Vec::with_capacity(objects.len());
    for object in objects {
        let path = object.to_string();
        let ts = re_get_first(&path, &RE_SNAPSHOT_TS)?;
        found.push(DfmDetails { path, ts });
    }
    found.sort_by(|a, b| a.ts.cmp(&b.ts));

    if found.is_empty() {
        return Err(crate::error::LoaderError::TimestampNotFound {
            haystack: format!("no snapshot .dfm files under {prefix}"),
        });
    }

    Ok(found)
}

/// Finds every CDC `.csv.gz` file for a table's current snapshot whose
/// embedded timestamp is strictly greater than `min_ts`, sorted ascending.
///
/// Grounded on `ods_qlik.get_cdc_gz_csvs`/`utils.s3_list_cdc_gz_objects`.
pub async fn cdc_gz_csvs(
    s3: &S3Client,
    config: &Config,
    table: &str,
    snapshot_ts: &str,
    min_ts: &str,
) -> LoaderResult<Vec<String>> {
    let prefix = format!("{}/{table}__ct/snapshot={snapshot_ts}/", config.qlik_prefix());
    let objects = s3.list(&config.archive_bucket, &prefix, Some(".csv.gz")).await?;

    let mut matches = Vec::with_capacity(objects.len());
    for object in objects {
        let path = object.to_string();
        let ts = re_get_first(&path, &RE_CDC_TS)?;
        if ts.as_str() > min_ts {
            matches.push((ts, path));
        }
    }
    matches.sort_by(|a, b| a.0.cmp(&b.0));

    Ok(matches.into_iter().map(|(_, path)| path).collect())
}
