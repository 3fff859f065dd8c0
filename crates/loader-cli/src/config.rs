use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

pub(crate) static CONFIG_BIN: LazyLock<DynAppConfig> = LazyLock::new(get_config);

/// Binary-level knobs that sit alongside, but separate from,
/// `ods_loader_core::Config`'s pipeline environment variables.
#[derive(Clone, Deserialize, Serialize, Debug, Default)]
pub(crate) struct DynAppConfig {
    /// Run pending migrations before `run`/`run-qlik-table` execute. Not
    /// recommended in production, especially with more than one task
    /// running against the same database.
    pub(crate) debug: DebugConfig,
}

#[derive(Clone, Deserialize, Serialize, Debug, Default)]
pub(crate) struct DebugConfig {
    pub(crate) migrate_before_run: bool,
    /// Run the `run` subcommand unless another command is specified.
    pub(crate) auto_run: bool,
}

fn get_config() -> DynAppConfig {
    let defaults = figment::providers::Serialized::defaults(DynAppConfig::default());

    #[cfg(not(test))]
    let prefixes = &["ODS_LOADER_CLI__"];
    #[cfg(test)]
    let prefixes = &["ODS_LOADER_CLI_TEST__"];

    let mut config = figment::Figment::from(defaults);
    for prefix in prefixes {
        let env = figment::providers::Env::prefixed(prefix).split("__");
        config = config.merge(env);
    }

    match config.extract::<DynAppConfig>() {
        Ok(c) => c,
        Err(e) => {
            panic!("Failed to extract ods-loader-cli config: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrate_before_run_env_vars() {
        figment::Jail::expect_with(|_jail| {
            let config = get_config();
            assert!(!config.debug.migrate_before_run);
            Ok(())
        });

        figment::Jail::expect_with(|jail| {
            jail.set_env("ODS_LOADER_CLI_TEST__DEBUG__MIGRATE_BEFORE_RUN", "true");
            let config = get_config();
            assert!(config.debug.migrate_before_run);
            Ok(())
        });
    }

    #[test]
    fn test_auto_run_env_vars() {
        figment::Jail::expect_with(|_jail| {
            let config = get_config();
            assert!(!config.debug.auto_run);
            Ok(())
        });

        figment::Jail::expect_with(|jail| {
            jail.set_env("ODS_LOADER_CLI_TEST__DEBUG__AUTO_RUN", "true");
            let config = get_config();
            assert!(config.debug.auto_run);
            Ok(())
        });
    }
}
