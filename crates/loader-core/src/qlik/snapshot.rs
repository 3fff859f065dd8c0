use ods_loader_io::S3Client;
use tracing::instrument;

use crate::ddl;
use crate::error::LoaderResult;

use super::batch::TableContext;
use super::types::DfmDetails;

/// Performs the initial bulk load of a table's snapshot files into its
/// `_history` and fact tables.
///
/// Grounded on `ods_qlik.CubicODSQlik.rds_snapshot_load`.
#[instrument(skip(ctx, s3))]
pub async fn rds_snapshot_load(
    ctx: &TableContext<'_>,
    s3: &S3Client,
    archive_bucket: &str,
    snapshot_dfm: &DfmDetails,
) -> LoaderResult<()> {
    ctx.warehouse
        .execute(&ddl::create_history_table_partitions(&ctx.db_history_table, Some(&snapshot_dfm.ts)))
        .await?;

    let snapshot_prefix = match snapshot_dfm.path.rsplit_once('/') {
        Some((dir, _)) => format!("{dir}/"),
        None => snapshot_dfm.path.clone(),
    };
    let load_table = format!("{}_load", ctx.db_fact_table);
    ctx.warehouse.truncate(&load_table, false, false).await?;

    for object in s3.list(archive_bucket, &snapshot_prefix, Some(".csv.gz")).await? {
        let local = tempfile::NamedTempFile::new()?;
        s3.download(&object.to_string(), local.path()).await?;
        let header_and_columns: Vec<String> = super::types::CDC_COLUMNS
            .iter()
            .map(|s| s.to_string())
            .chain(ctx.schema.iter().map(|c| c.name.clone()))
            .collect();
        crate::db::copy_csv_gz_into(ctx.warehouse, local.path(), &load_table, &header_and_columns).await?;
    }

    let seq = snapshot_dfm.ts.replace(|c: char| !c.is_ascii_digit(), "");
    let load_update = format!(
        "UPDATE {load_table} SET header__timestamp=to_timestamp('{ts}','YYYYMMDDTHH24MISSZ'), \
         header__change_oper='L', header__change_seq=rpad('{seq}',35,'0')::numeric \
         WHERE header__timestamp IS NULL;",
        ts = snapshot_dfm.ts,
    );
    ctx.warehouse.execute(&load_update).await?;

    ctx.warehouse
        .execute(&format!(
            "INSERT INTO {} SELECT * FROM {load_table};",
            ctx.db_history_table
        ))
        .await?;
    ctx.warehouse.vacuum_analyze(&ctx.db_history_table).await?;

    let columns: Vec<String> = ctx.schema.iter().map(|c| c.name.clone()).collect();
    let columns_str = columns.join(",");
    ctx.warehouse
        .execute(&format!(
            "INSERT INTO {} ({columns_str}) SELECT {columns_str} FROM {load_table};",
            ctx.db_fact_table
        ))
        .await?;
    ctx.warehouse.vacuum_analyze(&ctx.db_fact_table).await?;

    Ok(())
}
