/// One DMAP endpoint-to-table mapping.
///
/// `columns` lists every column `run_api_copy` expects in the downloaded
/// CSV, excluding the two that only ever originate in the warehouse itself
/// (`pk_id`, `dataset_id`) — mirrors `api_copy_job.schema_compare`'s
/// `ignore_columns`.
pub struct DatasetTable {
    pub url_path: &'static str,
    pub table: &'static str,
    pub columns: &'static [&'static str],
}

/// The full DMAP job catalog.
///
/// Grounded on `api_job_list.produce_job_list` for the URL paths and table
/// names. Column lists for `agg_average_boardings_by_day_type_month`,
/// `agg_boardings_fareprod_mode_month`, `agg_daily_fareprod_station`,
/// `agg_total_boardings_month_mode` and `citation` are taken directly from
/// their SQLAlchemy models. The remaining tables
/// (`agg_daily_fareprod_route`, `agg_daily_fareprod`,
/// `agg_daily_transfers_route`, `agg_daily_transfers_station`,
/// `agg_hourly_entry_exit_count`, `device_event`, `sale_transaction`,
/// `use_transaction_location`, `use_transaction_longitudinal`) had no schema
/// file in the retrieval pack; their column lists below are inferred from
/// the naming and shape of their sibling aggregation/transactional tables
/// and should be reconciled against the live DMAP response the first time
/// each job runs.
pub const DATASET_TABLES: &[DatasetTable] = &[
    DatasetTable {
        url_path: "datasetpublicusersapi/aggregations/agg_average_boardings_by_day_type_month",
        table: "ods.agg_average_boardings_by_day_type_month",
        columns: &["month", "day_of_week", "boardings_entries", "year"],
    },
    DatasetTable {
        url_path: "datasetpublicusersapi/aggregations/agg_boardings_fareprod_mode_month",
        table: "ods.agg_boardings_fareprod_mode_month",
        columns: &["year", "month", "day_of_week", "service", "fare_product_type", "count"],
    },
    DatasetTable {
        // inferred: no schema file retrieved, shaped after agg_daily_fareprod_station
        url_path: "datasetpublicusersapi/aggregations/agg_daily_fareprod_route",
        table: "ods.agg_daily_fareprod_route",
        columns: &["date", "day_of_week", "service", "route", "fare_product_type", "count"],
    },
    DatasetTable {
        url_path: "datasetpublicusersapi/aggregations/agg_daily_fareprod_station",
        table: "ods.agg_daily_fareprod_station",
        columns: &["date", "day_of_week", "service", "station", "fare_product_type", "count"],
    },
    DatasetTable {
        // inferred: no schema file retrieved, shaped after agg_daily_fareprod_station
        url_path: "datasetpublicusersapi/aggregations/agg_daily_fareprod",
        table: "ods.agg_daily_fareprod",
        columns: &["date", "day_of_week", "service", "fare_product_type", "count"],
    },
    DatasetTable {
        // inferred: no schema file retrieved, shaped after agg_daily_fareprod_route
        url_path: "datasetpublicusersapi/aggregations/agg_daily_transfers_route",
        table: "ods.agg_daily_transfers_route",
        columns: &["date", "day_of_week", "service", "route", "count"],
    },
    DatasetTable {
        // inferred: no schema file retrieved, shaped after agg_daily_fareprod_station
        url_path: "datasetpublicusersapi/aggregations/agg_daily_transfers_station",
        table: "ods.agg_daily_transfers_station",
        columns: &["date", "day_of_week", "service", "station", "count"],
    },
    DatasetTable {
        // inferred: no schema file retrieved, shaped after agg_total_boardings_month_mode
        url_path: "datasetpublicusersapi/aggregations/agg_hourly_entry_exit_count",
        table: "ods.agg_hourly_entry_exit_count",
        columns: &["date", "hour", "station", "entry_count", "exit_count"],
    },
    DatasetTable {
        url_path: "datasetpublicusersapi/aggregations/agg_total_boardings_month_mode",
        table: "ods.agg_total_boardings_month_mode",
        columns: &["year", "month", "day_of_week", "service", "boardings_entries"],
    },
    DatasetTable {
        // inferred: no schema file retrieved, shaped after citation's transactional columns
        url_path: "datasetcontrolleduserapi/transactional/use_transaction_longitudinal",
        table: "ods.use_transaction_longitudinal",
        columns: &["id", "trip_id", "travel_dtm", "origin_stop", "destination_stop", "fare_product_type"],
    },
    DatasetTable {
        // inferred: no schema file retrieved, shaped after citation's transactional columns
        url_path: "datasetcontrolleduserapi/transactional/use_transaction_location",
        table: "ods.use_transaction_location",
        columns: &["id", "transaction_dtm", "location_id", "route", "service", "fare_product_type"],
    },
    DatasetTable {
        // inferred: no schema file retrieved, shaped after citation's transactional columns
        url_path: "datasetcontrolleduserapi/transactional/sale_transaction",
        table: "ods.sale_transaction",
        columns: &["id", "sale_dtm", "fare_product_type", "sale_amount", "payment_method", "location_id"],
    },
    DatasetTable {
        // inferred: no schema file retrieved, shaped after citation's transactional columns
        url_path: "datasetcontrolleduserapi/transactional/device_event",
        table: "ods.device_event",
        columns: &["id", "event_dtm", "device_id", "event_type", "location_id"],
    },
    DatasetTable {
        url_path: "datasetcontrolleduserapi/transactional/citation",
        table: "ods.citation",
        columns: &[
            "id",
            "inserted_dtm",
            "updated_dtm",
            "depersonalized_dtm",
            "updated_flag",
            "citation_type_id",
            "citation_type_name",
            "citation_dtm",
            "inspector_id",
            "citation_reason_name",
            "citation_amount",
            "direction_id",
            "block_number",
            "recommendation",
            "recommendation_override",
            "manually_entered",
            "inspection_result",
            "citation_history_match_type",
            "inspection_id",
            "operating_day",
            "citation_status_id",
            "_exported_dtm",
        ],
    },
];

/// Builds the full job list by combining `base_url` with each catalog
/// entry's path.
///
/// Grounded on `api_job_list.produce_job_list`.
pub fn job_urls(base_url: &str) -> Vec<(String, &'static DatasetTable)> {
    DATASET_TABLES
        .iter()
        .map(|entry| (format!("{base_url}/{}", entry.url_path), entry))
        .collect()
}
