use crate::config::types::{
    ApiConfig, BackoffConfig, Config, HarvestConfig, IdentityConfig, OutputConfig,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_api_config(&config.api)?;
    validate_identity_config(&config.identity)?;
    validate_harvest_config(&config.harvest)?;
    validate_backoff_config(&config.backoff)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates the remote API section
fn validate_api_config(config: &ApiConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.endpoint)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid endpoint: {}", e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::InvalidUrl(format!(
            "Endpoint '{}' must use http or https",
            config.endpoint
        )));
    }

    if config.id_param.is_empty() {
        return Err(ConfigError::Validation(
            "id_param cannot be empty".to_string(),
        ));
    }

    if config.name_field.is_empty() {
        return Err(ConfigError::Validation(
            "name_field cannot be empty".to_string(),
        ));
    }

    if config.request_timeout_ms == 0 || config.connect_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "request and connect timeouts must be > 0".to_string(),
        ));
    }

    Ok(())
}

/// Validates the identity pool
fn validate_identity_config(config: &IdentityConfig) -> Result<(), ConfigError> {
    if config.user_agents.is_empty() {
        return Err(ConfigError::Validation(
            "user_agents must contain at least one entry".to_string(),
        ));
    }

    if let Some(blank) = config.user_agents.iter().find(|ua| ua.trim().is_empty()) {
        return Err(ConfigError::Validation(format!(
            "user_agents contains a blank entry: '{}'",
            blank
        )));
    }

    Ok(())
}

/// Validates the identifier range, pool size and pacing windows
fn validate_harvest_config(config: &HarvestConfig) -> Result<(), ConfigError> {
    if config.first_id == 0 {
        return Err(ConfigError::Validation(
            "first_id must be >= 1".to_string(),
        ));
    }

    if config.total_ids == 0 {
        return Err(ConfigError::Validation(
            "total_ids must be >= 1".to_string(),
        ));
    }

    if config
        .first_id
        .checked_add(config.total_ids - 1)
        .is_none()
    {
        return Err(ConfigError::Validation(format!(
            "identifier range starting at {} with {} ids overflows",
            config.first_id, config.total_ids
        )));
    }

    if config.max_concurrent_requests < 1 || config.max_concurrent_requests > 64 {
        return Err(ConfigError::Validation(format!(
            "max_concurrent_requests must be between 1 and 64, got {}",
            config.max_concurrent_requests
        )));
    }

    if config.save_every < 1 {
        return Err(ConfigError::Validation(
            "save_every must be >= 1".to_string(),
        ));
    }

    validate_window("delay", config.min_delay_ms, config.max_delay_ms)?;
    validate_window("jitter", config.jitter_min_ms, config.jitter_max_ms)?;
    validate_window("cooldown", config.cooldown_min_ms, config.cooldown_max_ms)?;

    Ok(())
}

/// Validates retry and backoff settings
fn validate_backoff_config(config: &BackoffConfig) -> Result<(), ConfigError> {
    if config.factor < 1.0 || !config.factor.is_finite() {
        return Err(ConfigError::Validation(format!(
            "backoff factor must be >= 1.0, got {}",
            config.factor
        )));
    }

    if config.transient_factor < 1.0 || !config.transient_factor.is_finite() {
        return Err(ConfigError::Validation(format!(
            "transient_factor must be >= 1.0, got {}",
            config.transient_factor
        )));
    }

    if config.initial_ms > config.max_ms {
        return Err(ConfigError::Validation(format!(
            "backoff initial_ms ({}) exceeds max_ms ({})",
            config.initial_ms, config.max_ms
        )));
    }

    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(
            "max_attempts must be >= 1".to_string(),
        ));
    }

    if config.max_elapsed_secs == 0 {
        return Err(ConfigError::Validation(
            "max_elapsed_secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.dataset_path.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "dataset_path cannot be empty".to_string(),
        ));
    }

    if config.progress_path.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "progress_path cannot be empty".to_string(),
        ));
    }

    if config.dataset_path == config.progress_path {
        return Err(ConfigError::Validation(
            "dataset_path and progress_path must differ".to_string(),
        ));
    }

    Ok(())
}

/// Checks that a `[min, max]` millisecond window is well formed
fn validate_window(name: &str, min: u64, max: u64) -> Result<(), ConfigError> {
    if min > max {
        return Err(ConfigError::Validation(format!(
            "{} window is inverted: min {}ms > max {}ms",
            name, min, max
        )));
    }
    Ok(())
}
