use std::time::Duration;

use sqlx::pool::{PoolConnectMetadata, PoolConnector};
use sqlx::postgres::{PgConnectOptions, PgConnection, PgPoolOptions};
use sqlx::{PgPool, Row};
use tracing::instrument;

use crate::config::Config;
use crate::error::LoaderResult;

use super::iam_auth::generate_auth_token;

/// Thin wrapper over `sqlx::PgPool` carrying the bits of the original's
/// `DatabaseManager` that have no direct sqlx equivalent (`vacuum_analyze`,
/// `truncate`, `schema_exists`, `table_exists`).
#[derive(Clone)]
pub struct Warehouse {
    pool: PgPool,
}

impl Warehouse {
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    #[instrument(skip(self))]
    pub async fn execute(&self, sql: &str) -> LoaderResult<u64> {
        let result = sqlx::query(sql).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    #[instrument(skip(self))]
    pub async fn vacuum_analyze(&self, table: &str) -> LoaderResult<()> {
        sqlx::query(&format!("VACUUM (ANALYZE) {table};"))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn truncate(&self, table: &str, restart_identity: bool, cascade: bool) -> LoaderResult<()> {
        let mut sql = format!("TRUNCATE {table}");
        if restart_identity {
            sql.push_str(" RESTART IDENTITY");
        }
        if cascade {
            sql.push_str(" CASCADE");
        }
        sql.push(';');
        self.execute(&sql).await?;
        self.vacuum_analyze(table).await
    }

    #[instrument(skip(self))]
    pub async fn schema_exists(&self, schema: &str, create_if_missing: bool) -> LoaderResult<bool> {
        let schema = schema.to_lowercase();
        let row = sqlx::query(
            "SELECT EXISTS(SELECT 1 FROM pg_namespace WHERE nspname = $1) AS exists",
        )
        .bind(&schema)
        .fetch_one(&self.pool)
        .await?;
        let exists: bool = row.try_get("exists")?;
        if exists || !create_if_missing {
            return Ok(exists);
        }
        self.execute(&format!("CREATE SCHEMA IF NOT EXISTS {schema}"))
            .await?;
        Ok(true)
    }

    #[instrument(skip(self))]
    pub async fn table_exists(&self, schema: &str, table: &str) -> LoaderResult<bool> {
        let row = sqlx::query(
            "SELECT EXISTS (SELECT FROM pg_tables WHERE schemaname = $1 AND tablename = $2) AS exists",
        )
        .bind(schema.to_lowercase())
        .bind(table.to_lowercase())
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("exists")?)
    }

    #[instrument(skip(self))]
    pub async fn refresh_materialized_views(&self, views: &[String]) -> LoaderResult<()> {
        for view in views {
            self.execute(&format!("REFRESH MATERIALIZED VIEW CONCURRENTLY {view};"))
                .await?;
        }
        Ok(())
    }

    /// Lists every materialized view in `schema`, for callers that want to
    /// refresh "everything in this schema" without hardcoding view names.
    #[instrument(skip(self))]
    pub async fn materialized_views_in_schema(&self, schema: &str) -> LoaderResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT schemaname || '.' || matviewname FROM pg_matviews WHERE schemaname = $1",
        )
        .bind(schema.to_lowercase())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }
}

/// Determines the connect host the same way the original's `get_db_host`
/// does: `127.0.0.1` when running neither in Docker nor on AWS, since that
/// indicates a developer running the CLI directly against a local Postgres.
fn resolve_host(config: &Config) -> String {
    let running_in_docker = std::path::Path::new("/.dockerenv").exists();
    if !running_in_docker && !config.running_in_aws() {
        return "127.0.0.1".to_string();
    }
    config.db_host.clone()
}

/// Mints a fresh RDS IAM auth token for every physical connection the pool
/// opens, since a token is only valid for 15 minutes and a pooled connection
/// can outlive that (or be replaced long after the pool itself was built).
///
/// Grounded on the original's SQLAlchemy `do_connect` event listener, which
/// re-derives the password on every new DBAPI connection rather than once.
struct IamTokenConnector {
    base_options: PgConnectOptions,
    host: String,
    port: u16,
    user: String,
    region: String,
}

impl PoolConnector<sqlx::Postgres> for IamTokenConnector {
    fn connect(
        &self,
        _meta: PoolConnectMetadata,
    ) -> futures::future::BoxFuture<'_, Result<PgConnection, sqlx::Error>> {
        Box::pin(async move {
            let sdk_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
            let identity: aws_smithy_runtime_api::client::identity::Identity = sdk_config
                .credentials_provider()
                .ok_or_else(|| sqlx::Error::Configuration("no AWS credentials provider configured".into()))?
                .provide_credentials()
                .await
                .map_err(|e| sqlx::Error::Configuration(format!("failed to load AWS credentials: {e}").into()))?
                .into();

            let token = generate_auth_token(&self.host, self.port, &self.user, &self.region, &identity)
                .await
                .map_err(|e| sqlx::Error::Configuration(format!("failed to mint RDS auth token: {e}").into()))?;

            let options = self.base_options.clone().password(&token);
            sqlx::ConnectOptions::connect(&options).await
        })
    }
}

/// Builds the pool. When `DB_PASSWORD` is unset, a fresh RDS IAM token is
/// minted per physical connection via [`IamTokenConnector`] rather than
/// once at pool-build time, since a token is only good for 15 minutes and
/// `max_lifetime` below is longer than that.
pub async fn connect(config: &Config) -> anyhow::Result<Warehouse> {
    let host = resolve_host(config);

    let base_options = PgConnectOptions::new()
        .host(&host)
        .port(config.db_port)
        .username(&config.db_user)
        .database(&config.db_name);

    // sqlx has no TCP keepalive knob to match the original's
    // `connect_args={"keepalives": 1, ...}`; `test_before_acquire` below is
    // the closest available substitute for catching a connection the OS
    // has silently dropped before it's handed to a caller.
    let pool_options = PgPoolOptions::new()
        .max_connections(3)
        .min_connections(0)
        .max_lifetime(Duration::from_secs(30 * 60))
        .test_before_acquire(true)
        .acquire_timeout(Duration::from_secs(30));

    let pool = if let Some(password) = &config.db_password {
        let options = base_options.password(password);
        pool_options.connect_with(options).await?
    } else {
        let region = config
            .db_region
            .clone()
            .ok_or_else(|| anyhow::anyhow!("DB_REGION is required when DB_PASSWORD is unset"))?;
        let options = base_options.ssl_mode(sqlx::postgres::PgSslMode::VerifyFull);
        let connector = IamTokenConnector {
            base_options: options,
            host,
            port: config.db_port,
            user: config.db_user.clone(),
            region,
        };
        pool_options.connect_with_connector(connector).await?
    };

    Ok(Warehouse { pool })
}
