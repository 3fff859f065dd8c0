use lazy_regex::{Lazy, Regex, lazy_regex};
use serde::{Deserialize, Serialize};

use crate::error::{LoaderError, LoaderResult};

/// One column of an ODS QLIK `.dfm` schema file.
///
/// Field names match the original's `DFMSchemaFields` TypedDict exactly,
/// since they are read directly off the upstream `.dfm` JSON documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub ordinal: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub length: i64,
    pub precision: i64,
    pub scale: i64,
    #[serde(rename = "primaryKeyPos")]
    pub primary_key_pos: i64,
}

impl ColumnSpec {
    pub fn is_key(&self) -> bool {
        self.primary_key_pos > 0
    }
}

/// A discovered snapshot `.dfm` file, paired with the timestamp extracted
/// from its path.
#[derive(Debug, Clone)]
pub struct DfmDetails {
    pub path: String,
    pub ts: String,
}

/// Persisted per-table progress, round-tripped to/from the status JSON
/// document in object storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableStatus {
    pub db_fact_table: String,
    pub current_snapshot_ts: String,
    pub last_cdc_ts: String,
    pub last_schema: Vec<ColumnSpec>,
}

/// Header columns present on every CDC row, absent from the raw DFM schema
/// (attached to the fact table's schema when building the `_history` and
/// `_load` tables). Grounded on `rds_utils.create_tables_from_schema`'s
/// `header_fields` tuple.
pub const CDC_COLUMNS: [&str; 3] = [
    "header__timestamp",
    "header__change_oper",
    "header__change_seq",
];

/// Name given to the single file produced by merging a hash-partitioned CDC
/// batch before loading it into the warehouse.
pub const MERGED_FNAME: &str = "merged.csv.gz";

pub static RE_SNAPSHOT_TS: Lazy<Regex> = lazy_regex!(r"(\d{8}T\d{6}Z)");
pub static RE_CDC_TS: Lazy<Regex> = lazy_regex!(r"(\d{8}-\d{9})");

/// Pulls the first regex match out of `haystack`, failing loudly rather
/// than silently skipping a file whose name doesn't carry a timestamp.
pub fn re_get_first(haystack: &str, pattern: &Regex) -> LoaderResult<String> {
    pattern
        .find(haystack)
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| LoaderError::TimestampNotFound {
            haystack: haystack.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_snapshot_timestamp() {
        let path = "odin/archive/cubic_qlik/processed/cubic/ods_qlik/EDW.FOO/20240101T010203Z/data.csv.gz";
        assert_eq!(re_get_first(path, &RE_SNAPSHOT_TS).unwrap(), "20240101T010203Z");
    }

    #[test]
    fn extracts_cdc_timestamp() {
        let path = "EDW.FOO__ct/snapshot=20240101T010203Z/LOAD00000001-20240102-030405678.csv.gz";
        assert_eq!(re_get_first(path, &RE_CDC_TS).unwrap(), "20240102-030405678");
    }

    #[test]
    fn missing_timestamp_errors() {
        assert!(re_get_first("no-timestamp-here", &RE_CDC_TS).is_err());
    }
}
