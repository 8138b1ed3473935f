//! Telemetry configuration from environment variables.

use std::env;

/// Configuration for logging and metrics.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name attached to startup logs
    pub service_name: String,

    /// Plant or site identifier, for multi-site log aggregation
    pub site: String,

    /// Log level filter (trace, debug, info, warn, error) or full directive
    pub log_level: String,

    /// Whether to write logs to stdout at all
    pub console_output: bool,

    /// Whether to emit JSON formatted logs
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "andon-relay".to_string(),
            site: "default".to_string(),
            log_level: "info".to_string(),
            console_output: true,
            json_logs: false,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `ANDON_SERVICE_NAME`: Service name (default: andon-relay)
    /// - `ANDON_SITE`: Site identifier (default: default)
    /// - `ANDON_LOG_LEVEL`: Log level (default: info; `RUST_LOG` wins at init)
    /// - `ANDON_CONSOLE_OUTPUT`: Enable console output (default: true)
    /// - `ANDON_JSON_LOGS`: Enable JSON logs (default: false in dev, true in containers)
    pub fn from_env() -> Self {
        let is_container =
            env::var("KUBERNETES_SERVICE_HOST").is_ok() || env::var("DOCKER_CONTAINER").is_ok();

        Self {
            service_name: env::var("ANDON_SERVICE_NAME")
                .unwrap_or_else(|_| "andon-relay".to_string()),

            site: env::var("ANDON_SITE").unwrap_or_else(|_| "default".to_string()),

            log_level: env::var("ANDON_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            console_output: env::var("ANDON_CONSOLE_OUTPUT")
                .map(|v| parse_flag(&v).unwrap_or(true))
                .unwrap_or(true),

            json_logs: env::var("ANDON_JSON_LOGS")
                .map(|v| parse_flag(&v).unwrap_or(is_container))
                .unwrap_or(is_container),
        }
    }

    /// Service name qualified with the site, unless the site is the default.
    pub fn full_service_name(&self) -> String {
        if self.site == "default" {
            self.service_name.clone()
        } else {
            format!("{}@{}", self.service_name, self.site)
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
