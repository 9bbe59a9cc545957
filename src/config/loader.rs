//! Configuration loading from disk and the environment.

use std::fs;
use std::path::Path;

use crate::config::schema::ServerConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid environment variable {name}={value:?}")]
    Env { name: &'static str, value: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file, then apply environment overrides.
pub fn load_config(path: &Path) -> Result<ServerConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: ServerConfig = toml::from_str(&content)?;
    finish(config)
}

/// Default configuration with environment overrides applied.
pub fn config_from_env() -> Result<ServerConfig, ConfigError> {
    finish(ServerConfig::default())
}

fn finish(mut config: ServerConfig) -> Result<ServerConfig, ConfigError> {
    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Overlay environment values onto a configuration.
///
/// Recognized variables: `PORT`, `PROBE_PORT`, `TRACE_PROBE` and
/// `WEBSOCKET_ALLOWED_ORIGINS` (comma-separated, `*` allowed).
pub fn apply_env_overrides<F>(config: &mut ServerConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = lookup("PORT") {
        config.port = parse_port("PORT", &value)?;
    }
    if let Some(value) = lookup("PROBE_PORT") {
        config.probe_port = parse_port("PROBE_PORT", &value)?;
    }
    if let Some(value) = lookup("TRACE_PROBE") {
        config.trace_probe = parse_bool("TRACE_PROBE", &value)?;
    }
    if let Some(value) = lookup("WEBSOCKET_ALLOWED_ORIGINS") {
        config.websocket.allowed_origins = split_list(&value);
    }
    Ok(())
}

fn parse_port(name: &'static str, value: &str) -> Result<u16, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Env {
        name,
        value: value.to_string(),
    })
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Env {
            name,
            value: value.to_string(),
        }),
    }
}

/// Split a comma-separated list, dropping blank entries.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn parses_toml_sections() {
        let config: ServerConfig = toml::from_str(
            r#"
            port = 9898
            probe_port = 9899
            shutdown_timeout_secs = 5

            [cors]
            allowed_methods = ["GET", "POST"]
            max_age_secs = 3600

            [listener]
            write_timeout_secs = 10
            keep_alive = false

            [websocket]
            allowed_origins = ["http://good.example"]
            "#,
        )
        .unwrap();

        assert_eq!(config.port, 9898);
        assert_eq!(config.probe_port, 9899);
        assert_eq!(config.address, "0.0.0.0");
        assert_eq!(config.health_root_path, "/healthz");
        assert!(config.cors.is_enabled());
        assert!(!config.listener.keep_alive);
        assert_eq!(config.websocket.allowed_origins, vec!["http://good.example"]);
    }

    #[test]
    fn negative_port_is_rejected_by_parser() {
        let parsed: Result<ServerConfig, _> = toml::from_str("port = -1");
        assert!(parsed.is_err());
    }

    #[test]
    fn environment_overrides_file_values() {
        let mut config = ServerConfig::default();
        apply_env_overrides(
            &mut config,
            env(&[
                ("PORT", "8080"),
                ("PROBE_PORT", "8081"),
                ("TRACE_PROBE", "True"),
                ("WEBSOCKET_ALLOWED_ORIGINS", "http://a.example, *,,"),
            ]),
        )
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.probe_port, 8081);
        assert!(config.trace_probe);
        assert_eq!(config.websocket.allowed_origins, vec!["http://a.example", "*"]);
    }

    #[test]
    fn bad_environment_value_is_reported() {
        let mut config = ServerConfig::default();
        let err = apply_env_overrides(&mut config, env(&[("PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, ConfigError::Env { name: "PORT", .. }));

        let err = apply_env_overrides(&mut config, env(&[("TRACE_PROBE", "maybe")])).unwrap_err();
        assert!(matches!(err, ConfigError::Env { name: "TRACE_PROBE", .. }));
    }

    #[test]
    fn load_config_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wess.toml");
        std::fs::write(&path, "port = 9000\nhealth_root_path = \"/\"\n").unwrap();

        let err = load_config(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));

        std::fs::write(&path, "port = 9000\n").unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.health_root_path, "/healthz");
    }
}
