use tracing::{info, instrument};

use crate::config::Config;
use crate::error::{LoaderError, LoaderResult};

/// Checks that every variable the pipeline will need is set before doing
/// any work, so a misconfigured deploy fails fast with one clear error
/// instead of dying partway through the first job.
///
/// Grounded on `runtime.validate_environment`. `private_variables` are
/// logged as redacted rather than omitted, matching the original's
/// `"**********"` placeholder.
#[instrument(skip(config))]
pub fn validate_environment(
    config: &Config,
    required_variables: &[&str],
    private_variables: &[&str],
    aws_variables: &[&str],
    validate_db: bool,
) -> LoaderResult<()> {
    let mut required: Vec<String> = required_variables.iter().map(|s| s.to_string()).collect();
    required.push("SERVICE_NAME".to_string());

    if config.running_in_aws() {
        required.extend(aws_variables.iter().map(|s| s.to_string()));
    }

    if validate_db {
        required.extend(
            ["DB_HOST", "DB_NAME", "DB_PORT", "DB_USER"]
                .iter()
                .map(|s| s.to_string()),
        );
    }

    let mut missing = Vec::new();
    for key in &required {
        let value = std::env::var(key).ok();
        if value.is_none() {
            missing.push(key.clone());
        }
        if private_variables.contains(&key.as_str()) {
            info!(variable = %key, value = "**********");
        } else {
            info!(variable = %key, value = value.as_deref().unwrap_or("<unset>"));
        }
    }

    if validate_db && config.db_password.is_none() && config.db_region.is_none() {
        missing.push("DB_REGION".to_string());
    }

    if !missing.is_empty() {
        return Err(LoaderError::EnvValidation(missing));
    }

    Ok(())
}
