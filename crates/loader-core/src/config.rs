use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

pub static CONFIG: LazyLock<Config> = LazyLock::new(get_config);

/// Environment-driven configuration for the ingestion engine.
///
/// Loaded with `figment`, mirroring the binary crate's `DynAppConfig`
/// pattern but unprefixed: these are the literal environment variable names
/// the upstream system expects, not a namespaced application config.
#[derive(Clone, Deserialize, Serialize, Debug)]
pub struct Config {
    pub service_name: String,

    pub db_host: String,
    pub db_name: String,
    pub db_port: u16,
    pub db_user: String,
    #[serde(default)]
    pub db_password: Option<String>,
    #[serde(default)]
    pub db_region: Option<String>,

    pub archive_bucket: String,
    pub error_bucket: String,

    pub dmap_base_url: String,
    #[serde(default)]
    pub public_key: Option<String>,
    #[serde(default)]
    pub controlled_key: Option<String>,

    #[serde(default)]
    pub ecs_cluster: Option<String>,
    #[serde(default)]
    pub ecs_task_group: Option<String>,

    #[serde(default)]
    pub aws_default_region: Option<String>,
}

impl Config {
    pub fn running_in_aws(&self) -> bool {
        self.aws_default_region.is_some()
    }

    pub fn ods_schema(&self) -> &'static str {
        "ods"
    }

    pub fn qlik_prefix(&self) -> &'static str {
        "cubic/ods_qlik"
    }

    pub fn odin_processed_prefix(&self) -> &'static str {
        "odin/archive/cubic_qlik/processed"
    }

    pub fn status_prefix(&self) -> String {
        format!("{}/{}/rds_load_status", self.archive_bucket, self.qlik_prefix())
    }
}

fn get_config() -> Config {
    let figment = figment::Figment::new().merge(figment::providers::Env::raw());

    match figment.extract::<Config>() {
        Ok(c) => c,
        Err(e) => panic!("Failed to extract ods-loader config: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_jail(jail: &mut figment::Jail) {
        jail.set_env("SERVICE_NAME", "test_loader");
        jail.set_env("DB_HOST", "localhost");
        jail.set_env("DB_NAME", "ods");
        jail.set_env("DB_PORT", "5432");
        jail.set_env("DB_USER", "ods_user");
        jail.set_env("ARCHIVE_BUCKET", "archive-bucket");
        jail.set_env("ERROR_BUCKET", "error-bucket");
        jail.set_env("DMAP_BASE_URL", "https://dmap.example.com");
    }

    #[test]
    fn loads_required_fields() {
        figment::Jail::expect_with(|jail| {
            base_jail(jail);
            let config = get_config();
            assert_eq!(config.db_host, "localhost");
            assert_eq!(config.db_port, 5432);
            assert!(config.db_password.is_none());
            assert!(!config.running_in_aws());
            Ok(())
        });
    }

    #[test]
    fn detects_aws_environment() {
        figment::Jail::expect_with(|jail| {
            base_jail(jail);
            jail.set_env("AWS_DEFAULT_REGION", "us-east-1");
            let config = get_config();
            assert!(config.running_in_aws());
            Ok(())
        });
    }
}
