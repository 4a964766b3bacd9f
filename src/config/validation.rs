use crate::config::types::{Config, CrawlerConfig, OutputConfig, PortalConfig, SeedConfig};
use crate::prefix::{seed, Alphabet, SeedPlan};
use crate::ConfigError;
use regex::Regex;
use url::Url;

/// Validates the entire configuration
///
/// Called by the loader and again after command-line overrides are applied.
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_seed_config(&config.seeds)?;
    validate_portal_config(&config.portal)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.workers < 1 || config.workers > 100 {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and 100, got {}",
            config.workers
        )));
    }

    if config.max_pages < 1 {
        return Err(ConfigError::Validation(format!(
            "max-pages must be >= 1, got {}",
            config.max_pages
        )));
    }

    if config.result_ceiling < 1 {
        return Err(ConfigError::Validation(format!(
            "result-ceiling must be >= 1, got {}",
            config.result_ceiling
        )));
    }

    if config.ceiling_margin >= config.result_ceiling {
        return Err(ConfigError::Validation(format!(
            "ceiling-margin ({}) must be smaller than result-ceiling ({})",
            config.ceiling_margin, config.result_ceiling
        )));
    }

    Ok(())
}

/// Validates the alphabet and that the seed plan produces at least one prefix
fn validate_seed_config(config: &SeedConfig) -> Result<(), ConfigError> {
    let alphabet = Alphabet::new(&config.alphabet)?;

    if config.prefixes.is_empty() {
        if config.depth < 1 {
            return Err(ConfigError::Validation(format!(
                "seeds.depth must be >= 1, got {}",
                config.depth
            )));
        }
        if config.breadth == Some(0) {
            return Err(ConfigError::Validation(
                "seeds.breadth must be >= 1 when set".to_string(),
            ));
        }
        return Ok(());
    }

    // Explicit lists are checked letter by letter against the alphabet
    let plan = SeedPlan::Explicit(config.prefixes.clone());
    seed(&plan, &alphabet)?;

    Ok(())
}

/// Validates portal endpoints and patterns
fn validate_portal_config(config: &PortalConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url: {}", e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "base-url '{}' must use http or https",
            config.base_url
        )));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    if config.request_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "request-timeout-secs must be >= 1".to_string(),
        ));
    }

    for (name, path) in [
        ("landing-path", &config.landing_path),
        ("search-path", &config.search_path),
        ("results-path", &config.results_path),
        ("detail-path", &config.detail_path),
    ] {
        if !path.starts_with('/') {
            return Err(ConfigError::Validation(format!(
                "{} must start with '/', got '{}'",
                name, path
            )));
        }
    }

    let pattern = Regex::new(&config.token_pattern).map_err(|e| {
        ConfigError::Validation(format!("token-pattern is not a valid regex: {}", e))
    })?;
    if pattern.captures_len() < 2 {
        return Err(ConfigError::Validation(
            "token-pattern must contain a capture group".to_string(),
        ));
    }

    for (name, value) in [
        ("token-param", &config.token_param),
        ("search-field", &config.search_field),
        ("page-param", &config.page_param),
        ("identity-param", &config.identity_param),
    ] {
        if value.is_empty() {
            return Err(ConfigError::Validation(format!("{} cannot be empty", name)));
        }
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }

    if config.report_path.is_empty() {
        return Err(ConfigError::Validation(
            "report-path cannot be empty".to_string(),
        ));
    }

    Ok(())
}
