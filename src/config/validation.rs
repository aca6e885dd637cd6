use crate::config::types::CrawlerOptions;
use crate::ConfigError;

/// Validates the entire options set
pub fn validate(options: &CrawlerOptions) -> Result<(), ConfigError> {
    validate_user_agent(&options.user_agent)?;
    validate_robot_user_agent(&options.robot_user_agent)?;
    validate_timing(options)?;

    if options.result_buffer < 1 {
        return Err(ConfigError::Validation(format!(
            "result_buffer must be >= 1, got {}",
            options.result_buffer
        )));
    }

    Ok(())
}

/// Validates the request user agent
fn validate_user_agent(user_agent: &str) -> Result<(), ConfigError> {
    if user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    if user_agent.chars().any(|c| c.is_control()) {
        return Err(ConfigError::Validation(format!(
            "user_agent contains control characters: {:?}",
            user_agent
        )));
    }

    Ok(())
}

/// Validates the robots.txt agent token
///
/// robots.txt groups are matched on a product token, so only letters,
/// digits, hyphens and underscores are meaningful.
fn validate_robot_user_agent(token: &str) -> Result<(), ConfigError> {
    if token.is_empty() {
        return Err(ConfigError::Validation(
            "robot_user_agent cannot be empty".to_string(),
        ));
    }

    if !token
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ConfigError::Validation(format!(
            "robot_user_agent must contain only letters, digits, '-' and '_', got '{}'",
            token
        )));
    }

    Ok(())
}

/// Validates delays and idle time-to-live
fn validate_timing(options: &CrawlerOptions) -> Result<(), ConfigError> {
    if options.worker_idle_ttl_ms < 1 {
        return Err(ConfigError::Validation(format!(
            "worker_idle_ttl_ms must be >= 1, got {}",
            options.worker_idle_ttl_ms
        )));
    }

    Ok(())
}
