use thiserror::Error;

/// The ingestion engine's error taxonomy.
///
/// Each variant corresponds to exactly one row of the error handling design:
/// some are locally absorbed at a component boundary (auth rejection, schema
/// extension), some abort only the current table/URL (schema conflict,
/// unknown CSV columns), and some are startup-fatal (env validation,
/// parallel instance).
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("transient transport failure: {0}")]
    TransientTransport(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),

    #[error("authentication rejected for {url}")]
    AuthRejected { url: String },

    #[error("schema extension required for {table}: {columns:?}")]
    SchemaExtension { table: String, columns: Vec<String> },

    #[error("schema conflict for {table}: column `{column}` changed dimension")]
    SchemaConflict { table: String, column: String },

    #[error("schema for {table} has no primary key columns")]
    SchemaMissingKeyColumns { table: String },

    #[error("CSV for {url} has columns not present in warehouse table {table}: {columns:?}")]
    SchemaCsvUnknownColumns {
        url: String,
        table: String,
        columns: Vec<String>,
    },

    #[error("object store unavailable: {0}")]
    ObjectStoreUnavailable(#[from] ods_loader_io::S3Error),

    #[error("database statement failed: {0}")]
    DbStatementFailure(#[from] sqlx::Error),

    #[error("multiple parallel instances detected in cluster {cluster}")]
    ParallelInstance { cluster: String, match_count: usize },

    #[error("missing required environment variables: {0:?}")]
    EnvValidation(Vec<String>),

    #[error("regex pattern not found in `{haystack}`")]
    TimestampNotFound { haystack: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type LoaderResult<T> = Result<T, LoaderError>;

/// Maps `sqlx::Error` Postgres error codes onto the taxonomy above.
///
/// Grounded on the teacher's `DBErrorHandler` trait
/// (`implementations/postgres/dbutils.rs`): inspect the SQLSTATE code rather
/// than the error message, since messages are not a stable contract.
pub trait DbErrorHandler {
    fn is_retryable(&self) -> bool;
}

impl DbErrorHandler for sqlx::Error {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Database(db) => matches!(
                db.code().as_deref(),
                Some(
                    "2D000" | "25000" | "25001" | "25P01" | "25P02" | "25P03" | "40000"
                        | "40001" | "40002" | "40003" | "40004"
                )
            ),
            Self::PoolTimedOut | Self::Io(_) => true,
            _ => false,
        }
    }
}
