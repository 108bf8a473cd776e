use std::path::Path;
use std::time::Duration;

use crate::config::schema::{Config, Settings};
use crate::error::ConfigError;

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let config: Config = if content.trim().is_empty() {
        Config::default()
    } else {
        serde_yaml::from_str(content)?
    };

    validate_config(&config)?;

    Ok(config)
}

/// Validates runtime settings. Shared by config loading and live settings updates.
pub fn validate_settings(settings: &Settings) -> Result<(), ConfigError> {
    if settings.articles_per_hour == 0 {
        return Err(ConfigError::InvalidSetting {
            name: "articles_per_hour".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }
    if settings.concurrent_jobs == 0 {
        return Err(ConfigError::InvalidSetting {
            name: "concurrent_jobs".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }
    Ok(())
}

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    validate_settings(&config.settings)?;

    let scraping = &config.scraping;
    if !scraping.min_delay_secs.is_finite()
        || !scraping.max_delay_secs.is_finite()
        || scraping.min_delay_secs < 0.0
    {
        return Err(ConfigError::Validation {
            message: "scraping delays must be finite and non-negative".to_string(),
        });
    }
    for (name, secs) in [
        ("min_delay_secs", scraping.min_delay_secs),
        ("max_delay_secs", scraping.max_delay_secs),
    ] {
        if Duration::try_from_secs_f64(secs).is_err() {
            return Err(ConfigError::Validation {
                message: format!("scraping.{} ({}) is out of range", name, secs),
            });
        }
    }
    if scraping.min_delay_secs > scraping.max_delay_secs {
        return Err(ConfigError::Validation {
            message: format!(
                "scraping.min_delay_secs ({}) exceeds scraping.max_delay_secs ({})",
                scraping.min_delay_secs, scraping.max_delay_secs
            ),
        });
    }

    let pricing = &config.pricing;
    if pricing.input_per_million < 0.0 || pricing.output_per_million < 0.0 {
        return Err(ConfigError::Validation {
            message: "token prices must be non-negative".to_string(),
        });
    }

    if config.scheduler.tick_interval_ms == 0 {
        return Err(ConfigError::Validation {
            message: "scheduler.tick_interval_ms must be greater than 0".to_string(),
        });
    }
    if config.stats.interval_ms == 0 {
        return Err(ConfigError::Validation {
            message: "stats.interval_ms must be greater than 0".to_string(),
        });
    }
    if config.stats.channel_capacity == 0 {
        return Err(ConfigError::Validation {
            message: "stats.channel_capacity must be greater than 0".to_string(),
        });
    }

    for (alias, target) in &config.categories.aliases {
        if alias.is_empty() || target.is_empty() {
            return Err(ConfigError::Validation {
                message: "category aliases must not be empty".to_string(),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_valid_config() {
        let config_yaml = r#"
settings:
  articles_per_hour: 20
  concurrent_jobs: 4
  auto_publish: true
scraping:
  max_retries: 2
  min_delay_secs: 0.5
  max_delay_secs: 1.5
pricing:
  input_per_million: 1.0
  output_per_million: 5.0
categories:
  uncategorized_id: 7
  aliases:
    焼鳥: 焼き鳥
"#;

        let config = load_config_from_str(config_yaml).unwrap();
        assert_eq!(config.settings.articles_per_hour, 20);
        assert_eq!(config.settings.concurrent_jobs, 4);
        assert!(config.settings.auto_publish);
        assert_eq!(config.scraping.max_retries, 2);
        assert_eq!(config.pricing.output_per_million, 5.0);
        assert_eq!(config.categories.uncategorized_id, 7);
        assert_eq!(
            config.categories.aliases.get("焼鳥").map(String::as_str),
            Some("焼き鳥")
        );
        // Untouched sections fall back to defaults
        assert_eq!(config.scheduler.tick_interval_ms, 500);
        assert_eq!(config.scraping.min_photo_count, 4);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config.settings.articles_per_hour, 10);
        assert_eq!(config.settings.concurrent_jobs, 3);
        assert!(!config.settings.auto_publish);
        assert_eq!(config.pricing.input_per_million, 3.0);
        assert!(config.categories.include_ancestors);
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let result = load_config_from_str("settings:\n  concurrent_jobs: 0\n");
        assert!(matches!(
            result,
            Err(ConfigError::InvalidSetting { ref name, .. }) if name == "concurrent_jobs"
        ));
    }

    #[test]
    fn test_zero_rate_rejected() {
        let result = load_config_from_str("settings:\n  articles_per_hour: 0\n");
        assert!(matches!(result, Err(ConfigError::InvalidSetting { .. })));
    }

    #[test]
    fn test_inverted_delays_rejected() {
        let result =
            load_config_from_str("scraping:\n  min_delay_secs: 5\n  max_delay_secs: 1\n");
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_oversized_delay_rejected() {
        let result =
            load_config_from_str("scraping:\n  min_delay_secs: 1.0\n  max_delay_secs: 1.0e+20\n");
        assert!(matches!(
            result,
            Err(ConfigError::Validation { ref message }) if message.contains("max_delay_secs")
        ));
    }

    #[test]
    fn test_negative_price_rejected() {
        let result = load_config_from_str("pricing:\n  input_per_million: -1\n");
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_invalid_yaml() {
        let result = load_config_from_str("settings: [unclosed");
        assert!(matches!(result, Err(ConfigError::ParseYaml(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "settings:\n  concurrent_jobs: 2").unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.settings.concurrent_jobs, 2);
    }

    #[test]
    fn test_missing_file() {
        let result = load_config("/nonexistent/umaten/config.yaml");
        assert!(matches!(result, Err(ConfigError::ReadFile { .. })));
    }
}
