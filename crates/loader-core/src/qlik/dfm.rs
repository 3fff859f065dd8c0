use serde::Deserialize;

use ods_loader_io::S3Client;

use crate::error::LoaderResult;

use super::types::ColumnSpec;

/// Mirrors the subset of an Attunity/QLIK `.dfm` document this loader reads:
/// a `dataInfo` object carrying the ordered column list under `dataInfo`.
#[derive(Debug, Deserialize)]
struct DfmDocument {
    #[serde(rename = "dataInfo")]
    data_info: DataInfo,
}

#[derive(Debug, Deserialize)]
struct DataInfo {
    #[serde(rename = "dataInfo")]
    columns: Vec<ColumnSpec>,
}

/// Parses a `.dfm` file's bytes into its ordered column schema.
pub fn parse_dfm(bytes: &[u8]) -> LoaderResult<Vec<ColumnSpec>> {
    let doc: DfmDocument = serde_json::from_slice(bytes)?;
    Ok(doc.data_info.columns)
}

/// Downloads and parses a `.dfm` object from the archive bucket.
///
/// Grounded on the original's `dfm_schema_to_json`/`dfm_schema_to_df`.
pub async fn fetch_schema(s3: &S3Client, dfm_object: &str) -> LoaderResult<Vec<ColumnSpec>> {
    let bytes = s3.get(dfm_object).await?;
    parse_dfm(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dfm_column_list() {
        let raw = br#"{
            "dataInfo": {
                "dataInfo": [
                    {"ordinal": 1, "name": "id", "type": "INT4", "length": 0, "precision": 0, "scale": 0, "primaryKeyPos": 1},
                    {"ordinal": 2, "name": "note", "type": "VARCHAR2", "length": 255, "precision": 0, "scale": 0, "primaryKeyPos": 0}
                ]
            }
        }"#;
        let columns = parse_dfm(raw).unwrap();
        assert_eq!(columns.len(), 2);
        assert!(columns[0].is_key());
        assert!(!columns[1].is_key());
    }
}
