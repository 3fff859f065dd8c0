use ods_loader_io::S3Client;
use tracing::instrument;

use crate::error::LoaderResult;
use crate::qlik::types::{ColumnSpec, TableStatus};

/// Loads and persists a table's [`TableStatus`] document in object storage.
///
/// Grounded on `ods_qlik.CubicODSQlik.load_etl_status`/`save_status`: the
/// status document is the only durable state the ETL keeps between runs, so
/// every write goes through a single small JSON blob rather than a database
/// table of its own.
pub struct StatusStore<'a> {
    s3: &'a S3Client,
    status_path: String,
}

impl<'a> StatusStore<'a> {
    pub fn new(s3: &'a S3Client, status_path: impl Into<String>) -> Self {
        Self {
            s3,
            status_path: status_path.into(),
        }
    }

    #[instrument(skip(self))]
    pub async fn load(&self) -> LoaderResult<Option<TableStatus>> {
        if !self.s3.exists(&self.status_path).await? {
            return Ok(None);
        }
        let bytes = self.s3.get(&self.status_path).await?;
        let status: TableStatus = serde_json::from_slice(&bytes)?;
        Ok(Some(status))
    }

    #[instrument(skip(self, status))]
    pub async fn save(&self, status: &TableStatus) -> LoaderResult<()> {
        let bytes = serde_json::to_vec(status)?;
        self.s3.put_bytes(bytes, &self.status_path).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn reset(&self) -> LoaderResult<()> {
        if self.s3.exists(&self.status_path).await? {
            self.s3.delete(&self.status_path).await?;
        }
        Ok(())
    }
}

/// Builds the initial status for a table that has never been loaded,
/// anchored to the latest known snapshot.
pub fn initial_status(db_fact_table: &str, snapshot_ts: &str, schema: Vec<ColumnSpec>) -> TableStatus {
    TableStatus {
        db_fact_table: db_fact_table.to_string(),
        current_snapshot_ts: snapshot_ts.to_string(),
        last_cdc_ts: String::new(),
        last_schema: schema,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_initial_status_with_empty_cdc_watermark() {
        let status = initial_status("ods.edw_foo", "20240101T010203Z", vec![]);
        assert_eq!(status.last_cdc_ts, "");
        assert_eq!(status.current_snapshot_ts, "20240101T010203Z");
    }
}
