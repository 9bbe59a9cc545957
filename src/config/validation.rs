//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges and path shapes
//! - Detect CORS values the header machinery cannot represent
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs when a config file is loaded; `Server::new` itself never fails

use axum::http::{HeaderName, HeaderValue, Method, StatusCode};

use crate::config::schema::ServerConfig;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("health_root_path {0:?} must start with '/' and must not be '/'")]
    HealthRootPath(String),

    #[error("cors.{field} contains an invalid value {value:?}")]
    CorsValue { field: &'static str, value: String },

    #[error("cors.options_success_status {0} is not a 2xx status")]
    CorsSuccessStatus(u16),

    #[error("websocket.allowed_origins contains an empty entry")]
    EmptyWebSocketOrigin,
}

/// Validate a configuration, collecting every problem.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let root = config.health_root_path.as_str();
    if !root.is_empty() && (!root.starts_with('/') || root == "/") {
        errors.push(ValidationError::HealthRootPath(root.to_string()));
    }

    let cors = &config.cors;
    for method in &cors.allowed_methods {
        if method != "*" && Method::from_bytes(method.as_bytes()).is_err() {
            errors.push(ValidationError::CorsValue {
                field: "allowed_methods",
                value: method.clone(),
            });
        }
    }
    for (field, names) in [
        ("allowed_headers", &cors.allowed_headers),
        ("exposed_headers", &cors.exposed_headers),
    ] {
        for name in names {
            if name != "*" && HeaderName::from_bytes(name.as_bytes()).is_err() {
                errors.push(ValidationError::CorsValue {
                    field,
                    value: name.clone(),
                });
            }
        }
    }
    for origin in &cors.allowed_origins {
        if origin != "*" && HeaderValue::from_str(origin).is_err() {
            errors.push(ValidationError::CorsValue {
                field: "allowed_origins",
                value: origin.clone(),
            });
        }
    }
    if let Some(status) = cors.options_success_status {
        let is_success = StatusCode::from_u16(status)
            .map(|s| s.is_success())
            .unwrap_or(false);
        if !is_success {
            errors.push(ValidationError::CorsSuccessStatus(status));
        }
    }

    if config
        .websocket
        .allowed_origins
        .iter()
        .any(|origin| origin.trim().is_empty())
    {
        errors.push(ValidationError::EmptyWebSocketOrigin);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
