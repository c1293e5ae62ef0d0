use crate::config::types::{
    Config, CrawlerConfig, I2pProxyConfig, MediaConfig, ReadinessConfig, SchedulerConfig,
    StorageConfig, TorProxyConfig, UserAgentConfig, MAX_SKIP_RECENT_HOURS,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_media_config(&config.media)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_storage_config(&config.storage)?;
    validate_tor_config(&config.proxy.tor)?;
    validate_i2p_config(&config.proxy.i2p)?;
    validate_readiness_config(&config.readiness)?;
    validate_scheduler_config(&config.scheduler)?;
    Ok(())
}

fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_concurrent_crawlers < 1 || config.max_concurrent_crawlers > 100 {
        return Err(ConfigError::Validation(format!(
            "max_concurrent_crawlers must be between 1 and 100, got {}",
            config.max_concurrent_crawlers
        )));
    }

    if config.max_links_per_page < 1 {
        return Err(ConfigError::Validation(
            "max_links_per_page must be >= 1".to_string(),
        ));
    }

    if config.max_retries < 1 {
        return Err(ConfigError::Validation(
            "max_retries counts the first attempt and must be >= 1".to_string(),
        ));
    }

    if let Some(hours) = config.skip_recent_hours {
        if hours > MAX_SKIP_RECENT_HOURS {
            return Err(ConfigError::Validation(format!(
                "skip_recent_hours must be <= {}, got {}",
                MAX_SKIP_RECENT_HOURS, hours
            )));
        }
    }

    if config.max_page_bytes == 0 {
        return Err(ConfigError::Validation(
            "max_page_bytes must be > 0".to_string(),
        ));
    }

    if config.request_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "request_timeout_secs must be > 0".to_string(),
        ));
    }

    Ok(())
}

fn validate_media_config(config: &MediaConfig) -> Result<(), ConfigError> {
    if config.max_media_bytes == 0 {
        return Err(ConfigError::Validation(
            "max_media_bytes must be > 0".to_string(),
        ));
    }

    if !(config.max_bytes_per_pixel > 0.0) {
        return Err(ConfigError::Validation(format!(
            "max_bytes_per_pixel must be positive, got {}",
            config.max_bytes_per_pixel
        )));
    }

    Ok(())
}

fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if config.content_dir.is_empty() {
        return Err(ConfigError::Validation(
            "content_dir cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_tor_config(config: &TorProxyConfig) -> Result<(), ConfigError> {
    validate_host_port("proxy.tor", &config.host, config.port)?;
    Url::parse(&config.check_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid tor check_url: {}", e)))?;
    Ok(())
}

fn validate_i2p_config(config: &I2pProxyConfig) -> Result<(), ConfigError> {
    validate_host_port("proxy.i2p", &config.host, config.port)?;

    for site in &config.test_sites {
        Url::parse(site)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid i2p test site '{}': {}", site, e)))?;
    }

    for endpoint in &config.internal_proxies {
        validate_endpoint(endpoint)?;
    }

    // An empty list disables the internal proxy tier entirely.
    if !config.internal_proxies.is_empty()
        && config.min_active_proxies > config.internal_proxies.len()
    {
        return Err(ConfigError::Validation(format!(
            "min_active_proxies ({}) exceeds the number of internal proxies ({})",
            config.min_active_proxies,
            config.internal_proxies.len()
        )));
    }

    Ok(())
}

fn validate_readiness_config(config: &ReadinessConfig) -> Result<(), ConfigError> {
    if config.bootstrap_ttl_secs == 0 || config.steady_ttl_secs == 0 || config.degraded_ttl_secs == 0
    {
        return Err(ConfigError::Validation(
            "readiness TTLs must be > 0".to_string(),
        ));
    }

    if config.bootstrap_ttl_secs > config.steady_ttl_secs {
        return Err(ConfigError::Validation(format!(
            "bootstrap_ttl_secs ({}) must not exceed steady_ttl_secs ({})",
            config.bootstrap_ttl_secs, config.steady_ttl_secs
        )));
    }

    if config.probe_timeout_secs == 0 || config.per_test_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "probe timeouts must be > 0".to_string(),
        ));
    }

    if config.probe_concurrency < 1 {
        return Err(ConfigError::Validation(
            "probe_concurrency must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_scheduler_config(config: &SchedulerConfig) -> Result<(), ConfigError> {
    if config.poll_interval_secs == 0 {
        return Err(ConfigError::Validation(
            "poll_interval_secs must be > 0".to_string(),
        ));
    }

    if config.required_consecutive_checks == 0 {
        return Err(ConfigError::Validation(
            "required_consecutive_checks must be >= 1".to_string(),
        ));
    }

    if config.networks.is_empty() {
        return Err(ConfigError::Validation(
            "scheduler needs at least one network".to_string(),
        ));
    }

    Ok(())
}

fn validate_host_port(section: &str, host: &str, port: u16) -> Result<(), ConfigError> {
    if host.is_empty() {
        return Err(ConfigError::Validation(format!("{}.host cannot be empty", section)));
    }

    if port == 0 {
        return Err(ConfigError::Validation(format!("{}.port cannot be 0", section)));
    }

    Ok(())
}

/// Validates a `host:port` endpoint
fn validate_endpoint(endpoint: &str) -> Result<(), ConfigError> {
    let (host, port) = endpoint
        .rsplit_once(':')
        .ok_or_else(|| ConfigError::InvalidEndpoint(format!("'{}' is not host:port", endpoint)))?;

    if host.is_empty() {
        return Err(ConfigError::InvalidEndpoint(format!(
            "'{}' has an empty host",
            endpoint
        )));
    }

    match port.parse::<u16>() {
        Ok(p) if p > 0 => Ok(()),
        _ => Err(ConfigError::InvalidEndpoint(format!(
            "'{}' has an invalid port",
            endpoint
        ))),
    }
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !parts[1].contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
