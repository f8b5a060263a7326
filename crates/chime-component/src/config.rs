//! Settings file loading.
//!
//! Settings are a TOML file with fabric-level keys at the top and one
//! table per service name:
//!
//! ```toml
//! host = "xmpp.example.org"
//! port = 5275
//!
//! [echo]
//! interval = 60
//! max_threadpool_size = 8
//! max_queue_size = 256
//! secret_key = "hunter2"
//! ```
//!
//! Every problem here is fatal at startup; the service never runs in a
//! partially-configured state.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::ComponentError;

/// Default port for XEP-0114 component connections.
pub const DEFAULT_COMPONENT_PORT: u16 = 5275;

fn default_port() -> u16 {
    DEFAULT_COMPONENT_PORT
}

/// Per-service settings table.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceSettings {
    /// Minutes between time signals
    pub interval: u64,
    /// Maximum number of concurrent inbound handlers
    pub max_threadpool_size: usize,
    /// Depth of the bounded inbound queue
    pub max_queue_size: usize,
    /// Shared secret for the component handshake
    pub secret_key: String,
}

/// Settings for the routing fabric plus any number of services.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Routing-fabric host
    pub host: String,
    /// Component port on the routing fabric
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(flatten)]
    services: HashMap<String, ServiceSettings>,
}

impl Settings {
    /// Load and validate settings from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ComponentError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ComponentError::config(format!(
                "Failed to read settings file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::parse(&raw)
    }

    /// Parse and validate settings from TOML text.
    pub fn parse(raw: &str) -> Result<Self, ComponentError> {
        let settings: Settings = toml::from_str(raw)
            .map_err(|e| ComponentError::config(format!("Malformed settings: {}", e)))?;
        settings.validate()?;
        Ok(settings)
    }

    /// The settings table for a service name.
    pub fn service(&self, name: &str) -> Result<&ServiceSettings, ComponentError> {
        self.services
            .get(name)
            .ok_or_else(|| ComponentError::config(format!("No settings for service \"{}\"", name)))
    }

    fn validate(&self) -> Result<(), ComponentError> {
        if self.host.is_empty() {
            return Err(ComponentError::config("host must not be empty"));
        }
        for (name, service) in &self.services {
            if service.interval == 0 {
                return Err(ComponentError::config(format!(
                    "{}.interval must be at least 1 minute",
                    name
                )));
            }
            if service.max_threadpool_size == 0 {
                return Err(ComponentError::config(format!(
                    "{}.max_threadpool_size must be positive",
                    name
                )));
            }
            if service.max_queue_size == 0 {
                return Err(ComponentError::config(format!(
                    "{}.max_queue_size must be positive",
                    name
                )));
            }
            if service.secret_key.is_empty() {
                return Err(ComponentError::config(format!(
                    "{}.secret_key must not be empty",
                    name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const GOOD: &str = r#"
host = "xmpp.example.org"

[echo]
interval = 60
max_threadpool_size = 8
max_queue_size = 256
secret_key = "hunter2"
"#;

    #[test]
    fn parse_good_settings() {
        let settings = Settings::parse(GOOD).unwrap();
        assert_eq!(settings.host, "xmpp.example.org");
        assert_eq!(settings.port, DEFAULT_COMPONENT_PORT);

        let echo = settings.service("echo").unwrap();
        assert_eq!(echo.interval, 60);
        assert_eq!(echo.max_threadpool_size, 8);
        assert_eq!(echo.max_queue_size, 256);
        assert_eq!(echo.secret_key, "hunter2");
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(GOOD.as_bytes()).unwrap();

        let settings = Settings::load(file.path()).unwrap();
        assert!(settings.service("echo").is_ok());
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = Settings::load(Path::new("/nonexistent/component.toml")).unwrap_err();
        assert!(matches!(err, ComponentError::Config(_)));
    }

    #[test]
    fn unknown_service_is_a_config_error() {
        let settings = Settings::parse(GOOD).unwrap();
        let err = settings.service("clock").unwrap_err();
        assert!(matches!(err, ComponentError::Config(_)));
    }

    #[test]
    fn malformed_numeric_is_a_config_error() {
        let raw = GOOD.replace("interval = 60", "interval = \"soon\"");
        let err = Settings::parse(&raw).unwrap_err();
        assert!(matches!(err, ComponentError::Config(_)));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let raw = GOOD.replace("interval = 60", "interval = 0");
        let err = Settings::parse(&raw).unwrap_err();
        assert!(err.to_string().contains("echo.interval"));
    }

    #[test]
    fn missing_secret_is_rejected() {
        let raw = GOOD.replace("secret_key = \"hunter2\"", "secret_key = \"\"");
        let err = Settings::parse(&raw).unwrap_err();
        assert!(matches!(err, ComponentError::Config(_)));
    }
}
