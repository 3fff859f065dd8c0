use chrono::{Datelike, NaiveDate, Utc};

use crate::error::{LoaderError, LoaderResult};
use crate::qlik::types::{CDC_COLUMNS, ColumnSpec};

/// Converts a QLIK DFM column type into its Postgres equivalent.
///
/// Grounded on the original's `qlik_type_to_pg`, exact-match table first,
/// then substring fallbacks, finally `VARCHAR`.
pub fn qlik_type_to_pg(qlik_type: &str, scale: i64, precision: i64) -> String {
    match qlik_type {
        "CHANGE_OPER" => return "CHAR(1)".to_string(),
        "CHANGE_SEQ" => return "NUMERIC(35,0)".to_string(),
        "REAL4" => return "REAL".to_string(),
        "REAL8" => return "DOUBLE PRECISION".to_string(),
        "BOOLEAN" => return "BOOLEAN".to_string(),
        "DATE" => return "DATE".to_string(),
        "TIME" => return "TIME WITHOUT TIME ZONE".to_string(),
        "DATETIME" => return "TIMESTAMP WITHOUT TIME ZONE".to_string(),
        _ => {}
    }

    if qlik_type.contains("INT1") || qlik_type.contains("INT2") {
        "SMALLINT".to_string()
    } else if qlik_type.contains("INT3") {
        "INTEGER".to_string()
    } else if qlik_type.contains("INT4") {
        "BIGINT".to_string()
    } else if qlik_type.contains("NUMERIC") && scale == 0 && precision < 19 {
        "BIGINT".to_string()
    } else if qlik_type.contains("NUMERIC") {
        format!("NUMERIC({precision},{scale})")
    } else {
        "VARCHAR".to_string()
    }
}

fn header_columns() -> [(&'static str, &'static str); 3] {
    [
        ("header__timestamp", "DATETIME"),
        ("header__change_oper", "CHANGE_OPER"),
        ("header__change_seq", "CHANGE_SEQ"),
    ]
}

/// Builds the `CREATE TABLE`/`CREATE INDEX` statements for a table's FACT,
/// HISTORY and LOAD tables from its DFM schema.
///
/// Grounded on `rds_utils.create_tables_from_schema`. FACT tables carry no
/// primary key constraint (upstream Oracle source tables allow NULLs in key
/// columns, which Postgres primary keys do not) — an ordinary index on the
/// key columns stands in for it.
pub fn create_tables_from_schema(schema: &[ColumnSpec], schema_and_table: &str) -> LoaderResult<String> {
    let dfm_columns: Vec<String> = schema
        .iter()
        .map(|c| format!("{} {}", c.name, qlik_type_to_pg(&c.type_, c.scale, c.precision)))
        .collect();
    let dfm_keys: Vec<&str> = schema
        .iter()
        .filter(|c| c.is_key())
        .map(|c| c.name.as_str())
        .collect();
    if dfm_keys.is_empty() {
        return Err(LoaderError::SchemaMissingKeyColumns {
            table: schema_and_table.to_string(),
        });
    }

    let idx_prefix = schema_and_table.replace('.', "_");
    let mut ops = Vec::new();

    ops.push(format!(
        "CREATE TABLE IF NOT EXISTS {schema_and_table} ({});",
        dfm_columns.join(",")
    ));
    ops.push(format!(
        "CREATE INDEX IF NOT EXISTS {idx_prefix}_fact_pk_idx on {schema_and_table} ({});",
        dfm_keys.join(",")
    ));

    let header_cols: Vec<String> = header_columns()
        .iter()
        .map(|(name, ty)| format!("{name} {}", qlik_type_to_pg(ty, 0, 0)))
        .collect();
    let history_columns: Vec<String> = header_cols.iter().cloned().chain(dfm_columns.iter().cloned()).collect();

    ops.push(format!(
        "CREATE TABLE IF NOT EXISTS {schema_and_table}_history ({}) PARTITION BY RANGE (header__timestamp);",
        history_columns.join(",")
    ));
    ops.push(format!(
        "CREATE TABLE IF NOT EXISTS {schema_and_table}_load ({});",
        history_columns.join(",")
    ));

    let mut index_columns: Vec<String> = dfm_keys.iter().map(|k| k.to_string()).collect();
    index_columns.push("header__change_oper".to_string());
    index_columns.push("header__change_seq DESC".to_string());
    ops.push(format!(
        "CREATE INDEX IF NOT EXISTS {idx_prefix}_to_fact_idx on {schema_and_table}_history ({});",
        index_columns.join(",")
    ));

    Ok(ops.join(" "))
}

/// Builds `CREATE TABLE ... PARTITION OF` statements covering the month of
/// `start_ts` (or the current month, if `None`) through three months from
/// today, one partition per calendar month.
///
/// Grounded on `rds_utils.create_history_table_partitions`.
pub fn create_history_table_partitions(schema_and_table: &str, start_ts: Option<&str>) -> String {
    let today = Utc::now().date_naive();
    let mut part_date = match start_ts {
        Some(ts) => NaiveDate::parse_from_str(&ts[..8], "%Y%m%d").unwrap_or(today),
        None => today,
    };
    part_date = part_date.with_day(1).expect("day 1 always valid");

    let part_end = first_of_month(today)
        .checked_add_months(chrono::Months::new(3))
        .expect("date arithmetic in range");

    let mut statements = Vec::new();
    while part_date < part_end {
        let next_month = part_date
            .checked_add_months(chrono::Months::new(1))
            .expect("date arithmetic in range");
        let part_table = format!("{schema_and_table}_y{}m{}", part_date.year(), part_date.month());
        statements.push(format!(
            "CREATE TABLE IF NOT EXISTS {part_table} PARTITION OF {schema_and_table} FOR VALUES FROM ('{part_date}') TO ('{next_month}');"
        ));
        part_date = next_month;
    }

    statements.join(" ")
}

fn first_of_month(d: NaiveDate) -> NaiveDate {
    d.with_day(1).expect("day 1 always valid")
}

pub fn drop_table(schema_and_table: &str) -> String {
    format!("DROP TABLE IF EXISTS {schema_and_table} CASCADE;")
}

/// Adds `new_columns` to a table's FACT, HISTORY and LOAD variants.
pub fn add_columns_to_table(new_columns: &[ColumnSpec], schema_and_table: &str) -> String {
    let tables = [
        schema_and_table.to_string(),
        format!("{schema_and_table}_history"),
        format!("{schema_and_table}_load"),
    ];
    let mut statements = Vec::new();
    for column in new_columns {
        let pg_type = qlik_type_to_pg(&column.type_, column.scale, column.precision);
        for table in &tables {
            statements.push(format!(
                "ALTER TABLE {table} ADD COLUMN IF NOT EXISTS {} {pg_type};",
                column.name
            ));
        }
    }
    statements.join(" ")
}

/// Join operator used for every key-column comparison between a fact table
/// and its staging table.
///
/// Grounded on the original's `key_column_join_type`, which inspects each
/// key column's null-count to decide between `=` and `IS NOT DISTINCT FROM`.
/// Here the null-safe form is used unconditionally: the upstream Oracle
/// source tables allow NULLs in any key column, and computing per-column
/// nullability would require an extra round trip per table per load. The
/// null-safe comparison is always correct, just occasionally more work for
/// the planner than a plain `=` would be.
const KEY_JOIN_OP: &str = "IS NOT DISTINCT FROM";

/// Builds the `DELETE ... USING ... WHERE` statement that removes rows from
/// `schema_and_table` whose keys appear in its `_load` staging table,
/// deduplicating to one (latest `header__change_seq`) row per key first.
///
/// Grounded on `rds_utils.bulk_delete_from_temp`, adapted to dedup in SQL
/// against the full staging table rather than assume it already holds only
/// deduplicated rows (the original dedups in memory via polars before the
/// staging table is populated).
pub fn bulk_delete_from_temp(schema_and_table: &str, key_columns: &[String]) -> String {
    let tmp_table = format!("{schema_and_table}_load");
    let keys: Vec<&str> = key_columns.iter().map(String::as_str).collect();
    let dedup = dedup_cte(&tmp_table, &keys, "header__change_oper = 'D'");
    let where_clause: Vec<String> = keys
        .iter()
        .map(|k| format!("{schema_and_table}.{k} {KEY_JOIN_OP} dedup.{k}"))
        .collect();
    format!(
        "WITH dedup AS ({dedup}) DELETE FROM {schema_and_table} USING dedup WHERE {};",
        where_clause.join(" AND ")
    )
}

/// Builds the `UPDATE ... FROM ... WHERE` statement for a single
/// non-key column, deduplicating the staging table to the latest
/// non-null value per key first.
///
/// Grounded on `rds_utils.bulk_update_from_temp`.
pub fn bulk_update_from_temp(schema_and_table: &str, update_column: &str, key_columns: &[String]) -> String {
    let tmp_table = format!("{schema_and_table}_load");
    let keys: Vec<&str> = key_columns.iter().map(String::as_str).collect();
    let predicate = format!("header__change_oper = 'U' AND {update_column} IS NOT NULL");
    let dedup = dedup_cte_with_columns(&tmp_table, &keys, &[update_column], &predicate);
    let where_clause: Vec<String> = keys
        .iter()
        .map(|k| format!("{schema_and_table}.{k} {KEY_JOIN_OP} dedup.{k}"))
        .collect();
    format!(
        "WITH dedup AS ({dedup}) UPDATE {schema_and_table} SET {update_column}=dedup.{update_column} FROM dedup WHERE {};",
        where_clause.join(" AND ")
    )
}

/// Builds the `INSERT ... SELECT ... ON CONFLICT DO NOTHING` statement that
/// copies rows from a staging table into a fact or history table.
///
/// Grounded on `rds_utils.bulk_insert_from_temp`. No dedup is required here:
/// inserts are deliberately left to `ON CONFLICT DO NOTHING` to absorb
/// duplicate `I` rows the same way the original's post-filter/pre-dedup CSV
/// would have.
pub fn bulk_insert_from_temp(insert_table: &str, temp_table: &str, columns: &[String]) -> String {
    let columns_str = columns.join(",");
    format!(
        "INSERT INTO {insert_table} ({columns_str}) SELECT {columns_str} FROM {temp_table} ON CONFLICT DO NOTHING;"
    )
}

/// Same as [`bulk_insert_from_temp`] but scoped to `header__change_oper='I'`
/// rows only, used for fact-table inserts from a CDC staging table that also
/// holds update/delete rows.
pub fn bulk_insert_inserts_from_temp(insert_table: &str, temp_table: &str, columns: &[String]) -> String {
    let columns_str = columns.join(",");
    format!(
        "INSERT INTO {insert_table} ({columns_str}) SELECT {columns_str} FROM {temp_table} WHERE header__change_oper = 'I' ON CONFLICT DO NOTHING;"
    )
}

fn dedup_cte(table: &str, keys: &[&str], predicate: &str) -> String {
    dedup_cte_with_columns(table, keys, &[], predicate)
}

fn dedup_cte_with_columns(table: &str, keys: &[&str], extra_columns: &[&str], predicate: &str) -> String {
    let select_cols: Vec<&str> = keys.iter().chain(extra_columns.iter()).copied().collect();
    format!(
        "SELECT DISTINCT ON ({keys_list}) {select_list} FROM {table} WHERE {predicate} ORDER BY {keys_list}, header__change_seq DESC, ctid DESC",
        keys_list = keys.join(","),
        select_list = select_cols.join(","),
    )
}

/// Columns carried by a CDC staging table beyond the table's own schema.
pub fn cdc_header_columns() -> &'static [&'static str; 3] {
    &CDC_COLUMNS
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(name: &str, ty: &str, key: bool) -> ColumnSpec {
        ColumnSpec {
            ordinal: 1,
            name: name.to_string(),
            type_: ty.to_string(),
            length: 0,
            precision: 0,
            scale: 0,
            primary_key_pos: if key { 1 } else { 0 },
        }
    }

    #[test]
    fn maps_exact_types() {
        assert_eq!(qlik_type_to_pg("CHANGE_OPER", 0, 0), "CHAR(1)");
        assert_eq!(qlik_type_to_pg("DATETIME", 0, 0), "TIMESTAMP WITHOUT TIME ZONE");
    }

    #[test]
    fn maps_numeric_to_bigint_when_scale_zero_and_small_precision() {
        assert_eq!(qlik_type_to_pg("NUMERIC", 0, 10), "BIGINT");
        assert_eq!(qlik_type_to_pg("NUMERIC", 2, 10), "NUMERIC(10,2)");
    }

    #[test]
    fn maps_unknown_type_to_varchar() {
        assert_eq!(qlik_type_to_pg("CLOB", 0, 0), "VARCHAR");
    }

    #[test]
    fn builds_create_table_statements() {
        let schema = vec![col("id", "INT4", true), col("note", "VARCHAR2", false)];
        let sql = create_tables_from_schema(&schema, "ods.edw_foo").unwrap();
        assert!(sql.contains("CREATE TABLE IF NOT EXISTS ods.edw_foo (id BIGINT,note VARCHAR)"));
        assert!(sql.contains("ods_edw_foo_fact_pk_idx"));
        assert!(sql.contains("PARTITION BY RANGE (header__timestamp)"));
    }

    #[test]
    fn rejects_schema_with_no_key_columns() {
        let schema = vec![col("note", "VARCHAR2", false)];
        let err = create_tables_from_schema(&schema, "ods.edw_foo").unwrap_err();
        assert!(matches!(err, LoaderError::SchemaMissingKeyColumns { table } if table == "ods.edw_foo"));
    }

    #[test]
    fn bulk_delete_dedups_on_latest_change_seq() {
        let sql = bulk_delete_from_temp("ods.edw_foo", &["id".to_string()]);
        assert!(sql.contains("DISTINCT ON (id)"));
        assert!(sql.contains("ORDER BY id, header__change_seq DESC, ctid DESC"));
        assert!(sql.contains("ods.edw_foo.id IS NOT DISTINCT FROM dedup.id"));
    }

    #[test]
    fn bulk_update_dedups_per_column() {
        let sql = bulk_update_from_temp("ods.edw_foo", "status", &["id".to_string()]);
        assert!(sql.contains("status IS NOT NULL"));
        assert!(sql.contains("SET status=dedup.status"));
    }
}
