use std::io::Read;
use std::path::Path;

use flate2::read::GzDecoder;
use tracing::{instrument, warn};

use crate::error::{DbErrorHandler, LoaderError, LoaderResult};

use super::pool::Warehouse;

/// Reads the first line of a (possibly gzipped) CSV file, lower-cased and
/// with quotes stripped, matching the original's `header_from_csv_gz`.
pub fn header_from_csv_gz(path: &Path) -> std::io::Result<String> {
    let file = std::fs::File::open(path)?;
    let mut reader: Box<dyn Read> = if path.extension().is_some_and(|e| e == "gz") {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };

    let mut buf = Vec::new();
    let mut byte = [0_u8; 1];
    loop {
        if reader.read(&mut byte)? == 0 || byte[0] == b'\n' {
            break;
        }
        buf.push(byte[0]);
    }
    let line = String::from_utf8_lossy(&buf);
    Ok(line.trim().to_lowercase().replace('"', ""))
}

const MAX_RETRIES: u32 = 3;
const RETRY_BACKOFF: std::time::Duration = std::time::Duration::from_secs(2);

/// Streams a local `.csv`/`.csv.gz` file into `table` via `COPY FROM STDIN`.
///
/// Retries up to 3 times with a fixed 2 second backoff, but only when the
/// failure's SQLSTATE (per [`DbErrorHandler::is_retryable`]) indicates a
/// transient condition — mirroring the original's `run_psql_subprocess`
/// retry loop (reimplemented here against `sqlx`'s native `COPY` support
/// instead of shelling out to `psql`, since Rust has no equivalent of the
/// original's `subprocess.run(["psql", ...])` pattern and `PgCopyIn` gives
/// the same guarantee without a new process).
#[instrument(skip(warehouse))]
pub async fn copy_csv_gz_into(
    warehouse: &Warehouse,
    local_path: &Path,
    table: &str,
    columns: &[String],
) -> LoaderResult<u64> {
    let columns_str = columns.join(",");
    let copy_sql = format!("COPY {table} ({columns_str}) FROM STDIN WITH (FORMAT csv, HEADER true)");

    let mut attempt = 0;
    loop {
        match copy_once(warehouse, local_path, &copy_sql).await {
            Ok(rows) => return Ok(rows),
            Err(LoaderError::DbStatementFailure(e)) if e.is_retryable() && attempt < MAX_RETRIES => {
                attempt += 1;
                warn!(attempt, error = %e, table, "retrying COPY after transient database error");
                tokio::time::sleep(RETRY_BACKOFF).await;
            }
            Err(e) => return Err(e),
        }
    }
}

async fn copy_once(warehouse: &Warehouse, local_path: &Path, copy_sql: &str) -> LoaderResult<u64> {
    let is_gz = local_path.extension().is_some_and(|e| e == "gz");
    let raw = std::fs::read(local_path)?;
    let plain = if is_gz {
        let mut decoder = GzDecoder::new(raw.as_slice());
        let mut out = Vec::new();
        decoder.read_to_end(&mut out)?;
        out
    } else {
        raw
    };

    let mut copy_in = warehouse.pool().copy_in_raw(copy_sql).await?;
    copy_in.send(plain).await?;
    let rows = copy_in.finish().await?;
    Ok(rows)
}
