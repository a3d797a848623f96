use super::models::Config;
use config::{ConfigError, Environment, File, FileFormat};
use std::env;
use std::path::{Path, PathBuf};

const CONFIG_ENV_VAR: &str = "SITEKICK_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/sitekick.toml";
const CONFIG_FILE_NAME: &str = "sitekick.toml";
const ENV_PREFIX: &str = "SITEKICK";
const ENV_SEPARATOR: &str = "__";
const LIST_SEPARATOR: &str = ",";

const TOKEN_ENV_VAR: &str = "SITEKICK_TOKEN";
const GDPR_PSK_ENV_VAR: &str = "SITEKICK_GDPR_PSK";

/// Load configuration from multiple sources with priority:
/// 1. Defaults (embedded in structs)
/// 2. TOML file (if exists)
/// 3. Environment variables from .env file (via dotenvy)
/// 4. System environment variables
/// 5. Secret variables (`SITEKICK_TOKEN`, `SITEKICK_GDPR_PSK`)
pub fn load(explicit_path: Option<PathBuf>) -> Result<Config, ConfigError> {
    // Missing .env is fine
    let _ = dotenvy::dotenv();

    let config_path = explicit_path
        .or_else(|| env::var(CONFIG_ENV_VAR).ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    let mut config = load_from_sources(config_path)?;
    load_secrets(&mut config);

    Ok(config)
}

/// Secrets from the environment win over anything in the file
fn load_secrets(config: &mut Config) {
    if let Ok(token) = env::var(TOKEN_ENV_VAR) {
        if !token.is_empty() {
            config.push.token = Some(token);
        }
    }
    if let Ok(psk) = env::var(GDPR_PSK_ENV_VAR) {
        if !psk.is_empty() {
            config.gdpr.psk = Some(psk);
        }
    }
}

/// A directory resolves to the config file inside it
pub fn resolve_path(path: &Path) -> PathBuf {
    if path.is_dir() {
        path.join(CONFIG_FILE_NAME)
    } else {
        path.to_path_buf()
    }
}

/// Load configuration from a specific path and environment
/// Useful for testing with custom config files
pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    let config_path = resolve_path(&config_path);
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::info!("Loading configuration from: {}", config_path.display());
        builder = builder.add_source(
            File::from(config_path)
                .format(FileFormat::Toml)
                .required(false),
        );
    } else {
        tracing::debug!(
            "Configuration file not found at {}, using defaults and environment overrides",
            config_path.display()
        );
    }

    // SITEKICK__PUSH__BATCH_SIZE -> push.batch_size
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .prefix_separator(ENV_SEPARATOR)
            .list_separator(LIST_SEPARATOR)
            .with_list_parse_key("runner.providers")
            .with_list_parse_key("gdpr.fields")
            .try_parsing(true),
    );

    let config = builder.build()?;
    config.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_load_defaults_only() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nonexistent.toml");

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.queue.path, PathBuf::from("data/queue"));
        assert_eq!(config.push.attempts, 10);
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[queue]
path = "/var/spool/sitekick"
cleanup = true

[push]
url = "http://collector.local/queues/plesk"
batch_size = 50
interval = "2m"
first_retry = "250ms"
last_retry = 30

[gdpr]
enabled = true
psk = "from-file"
fields = ["email"]
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.queue.path, PathBuf::from("/var/spool/sitekick"));
        assert!(config.queue.cleanup);
        assert_eq!(config.push.url, "http://collector.local/queues/plesk");
        assert_eq!(config.push.batch_size, Some(50));
        assert_eq!(
            config.push.interval.map(|d| d.as_duration()),
            Some(Duration::from_secs(120))
        );
        assert_eq!(config.push.first_retry.as_duration(), Duration::from_millis(250));
        assert_eq!(config.push.last_retry.as_duration(), Duration::from_secs(30));
        assert!(config.gdpr.enabled);
        assert_eq!(config.gdpr.psk.as_deref(), Some("from-file"));
        assert_eq!(config.gdpr.fields, vec!["email"]);
    }

    #[test]
    fn test_directory_resolves_to_config_file() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join(CONFIG_FILE_NAME),
            "[runner]\nparallel = false\nproviders = [\"server\"]\n",
        )
        .unwrap();

        let config = load_from_sources(temp_dir.path().to_path_buf()).unwrap();
        assert_eq!(config.runner.parallel, Some(false));
        assert_eq!(config.runner.providers, vec!["server"]);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("bad.toml");
        fs::write(&config_path, "[push\nurl = ").unwrap();

        assert!(load_from_sources(config_path).is_err());
    }

    // Environment overrides are not exercised here; set_var is unsafe under
    // a multi-threaded test harness.
}
