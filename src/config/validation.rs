use crate::config::types::{Config, CrawlerConfig, OutputConfig, ProberConfig, ProxyConfig};
use crate::{ConfigError, ConfigResult};

/// Validates the entire configuration
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_crawler_config(&config.crawler)?;
    if let Some(executable) = &config.browser.executable {
        validate_program("browser.executable", executable)?;
    }
    validate_prober_config(&config.prober)?;
    validate_proxy_config(&config.proxy)?;
    validate_program("synth.program", &config.synth.program)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> ConfigResult<()> {
    if config.navigation_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "navigation_timeout_ms must be > 0".to_string(),
        ));
    }

    if config.submit_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "submit_timeout_ms must be > 0".to_string(),
        ));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "crawler user_agent cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates prober configuration
fn validate_prober_config(config: &ProberConfig) -> ConfigResult<()> {
    if config.samples < 1 {
        return Err(ConfigError::Validation(format!(
            "samples must be >= 1, got {}",
            config.samples
        )));
    }

    if config.min_delay_ms > config.max_delay_ms {
        return Err(ConfigError::Validation(format!(
            "min_delay_ms ({}) must not exceed max_delay_ms ({})",
            config.min_delay_ms, config.max_delay_ms
        )));
    }

    if config.request_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "request_timeout_ms must be > 0".to_string(),
        ));
    }

    Ok(())
}

/// Validates proxy configuration
fn validate_proxy_config(config: &ProxyConfig) -> ConfigResult<()> {
    validate_program("proxy.program", &config.program)?;

    if config.port == 0 {
        return Err(ConfigError::Validation(
            "proxy port must be between 1 and 65535".to_string(),
        ));
    }

    Ok(())
}

/// Validates output paths
fn validate_output_config(config: &OutputConfig) -> ConfigResult<()> {
    let paths = [
        ("traffic_path", &config.traffic_path),
        ("checkpoint_path", &config.checkpoint_path),
        ("initial_spec_path", &config.initial_spec_path),
        ("proxy_dump_path", &config.proxy_dump_path),
        ("final_spec_path", &config.final_spec_path),
    ];

    for (name, value) in paths {
        if value.trim().is_empty() {
            return Err(ConfigError::Validation(format!("{} cannot be empty", name)));
        }
    }

    Ok(())
}

fn validate_program(field: &str, program: &str) -> ConfigResult<()> {
    if program.trim().is_empty() {
        return Err(ConfigError::Validation(format!("{} cannot be empty", field)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_zero_samples_rejected() {
        let mut config = Config::default();
        config.prober.samples = 0;
        assert!(matches!(
            validate(&config),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_inverted_delay_range_rejected() {
        let mut config = Config::default();
        config.prober.min_delay_ms = 600;
        config.prober.max_delay_ms = 100;
        assert!(validate(&config).is_err());

        config.prober.min_delay_ms = 100;
        config.prober.max_delay_ms = 100;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_blank_browser_executable_rejected() {
        let mut config = Config::default();
        config.browser.executable = Some("  ".to_string());
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_port_rejected() {
        let mut config = Config::default();
        config.proxy.port = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_empty_paths_rejected() {
        let mut config = Config::default();
        config.output.checkpoint_path = "  ".to_string();
        assert!(validate(&config).is_err());

        let mut config = Config::default();
        config.synth.program = String::new();
        assert!(validate(&config).is_err());
    }
}
