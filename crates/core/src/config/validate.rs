use super::{
    types::{Config, TrackerBackend},
    ConfigError,
};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - The selected tracker backend has its section, with owner/repo set
/// - Timeouts and automation defaults are positive
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    // Server validation
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    match config.tracker.backend {
        TrackerBackend::Github => {
            let github = config.tracker.github.as_ref().ok_or_else(|| {
                ConfigError::ValidationError(
                    "tracker.backend is \"github\" but [tracker.github] is missing".to_string(),
                )
            })?;
            if github.owner.trim().is_empty() || github.repo.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "tracker.github.owner and tracker.github.repo are required".to_string(),
                ));
            }
            if github.timeout_secs == 0 {
                return Err(ConfigError::ValidationError(
                    "tracker.github.timeout_secs cannot be 0".to_string(),
                ));
            }
        }
    }

    if config.automation.default_estimated_minutes == 0 {
        return Err(ConfigError::ValidationError(
            "automation.default_estimated_minutes cannot be 0".to_string(),
        ));
    }

    Ok(())
}
