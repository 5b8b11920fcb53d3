use serde::Deserialize;
use std::{fs, io};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// Bucket for sensor samples that carry no location.
    pub default_location: String,
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8000".to_string(),
            default_location: "default_location".to_string(),
            max_body_bytes: 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InfluxDbConfig {
    pub url: String,
    pub token: String,
    pub org: String,
    pub request_timeout_ms: u64,
}

impl Default for InfluxDbConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            token: String::new(),
            org: String::new(),
            request_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub enabled: bool,
    /// Base URL of the authorization and provisioning service.
    pub api_url: Option<String>,
    pub request_timeout_ms: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_url: None,
            request_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub influxdb: InfluxDbConfig,
    pub auth: AuthConfig,
    pub metrics: Option<MetricsConfig>,
}

impl AppConfig {
    /// Load the TOML file named by `TELEMETRY_CONFIG` (if present), then
    /// apply environment overrides and validate.
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        let path = env::var("TELEMETRY_CONFIG").unwrap_or_else(|_| "telemetry-config.toml".to_string());
        let mut cfg = match fs::read_to_string(&path) {
            Ok(contents) => Self::from_toml_str(&contents)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::info!(path = %path, "no config file, using defaults and environment");
                Self::default()
            }
            Err(e) => return Err(anyhow::anyhow!("reading {path}: {e}")),
        };

        cfg.apply_env(|key| env::var(key).ok());
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(v) = get("INFLUXDB_URL") {
            self.influxdb.url = v;
        }
        if let Some(v) = get("INFLUXDB_TOKEN") {
            self.influxdb.token = v;
        }
        if let Some(v) = get("INFLUXDB_ORG") {
            self.influxdb.org = v;
        }
        if let Some(v) = get("DEFAULT_LOCATION") {
            self.server.default_location = v;
        }
        if let Some(v) = get("API_URL") {
            self.auth.api_url = Some(v);
        }
        if let Some(port) = get("PORT") {
            self.server.bind_addr = format!("0.0.0.0:{port}");
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let db = &self.influxdb;
        if db.url.is_empty() || db.token.is_empty() || db.org.is_empty() {
            anyhow::bail!(
                "InfluxDB configuration is incomplete; set influxdb.url, influxdb.token and influxdb.org \
                 (or INFLUXDB_URL, INFLUXDB_TOKEN, INFLUXDB_ORG)"
            );
        }
        if self.server.default_location.is_empty() {
            anyhow::bail!("server.default_location must not be empty");
        }
        if self.auth.enabled && self.auth.api_url.as_deref().map_or(true, str::is_empty) {
            anyhow::bail!("auth.api_url (or API_URL) is required when authorization is enabled");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn file_values_with_defaults_for_missing_sections() {
        let cfg = AppConfig::from_toml_str(
            r#"
            [influxdb]
            url = "http://influx:8086"
            token = "t"
            org = "capiot"

            [auth]
            api_url = "http://auth:3000"

            [metrics]
            bind_addr = "0.0.0.0:9100"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.influxdb.org, "capiot");
        assert_eq!(cfg.influxdb.request_timeout_ms, 30_000);
        assert_eq!(cfg.server.bind_addr, "0.0.0.0:8000");
        assert_eq!(cfg.server.default_location, "default_location");
        assert!(cfg.auth.enabled);
        assert_eq!(cfg.metrics.unwrap().bind_addr, "0.0.0.0:9100");
    }

    #[test]
    fn environment_overrides_file() {
        let mut cfg = AppConfig::default();
        cfg.apply_env(env(&[
            ("INFLUXDB_URL", "http://localhost:8086"),
            ("INFLUXDB_TOKEN", "secret"),
            ("INFLUXDB_ORG", "org"),
            ("API_URL", "http://auth"),
            ("PORT", "9000"),
            ("DEFAULT_LOCATION", ""),
        ]));

        assert_eq!(cfg.influxdb.token, "secret");
        assert_eq!(cfg.server.bind_addr, "0.0.0.0:9000");
        assert_eq!(cfg.server.default_location, "default_location");
        cfg.validate().unwrap();
    }

    #[test]
    fn incomplete_influx_settings_are_rejected() {
        let mut cfg = AppConfig::default();
        cfg.auth.enabled = false;
        cfg.apply_env(env(&[("INFLUXDB_URL", "http://localhost:8086")]));
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn auth_requires_api_url_unless_disabled() {
        let mut cfg = AppConfig::default();
        cfg.apply_env(env(&[("INFLUXDB_URL", "u"), ("INFLUXDB_TOKEN", "t"), ("INFLUXDB_ORG", "o")]));
        assert!(cfg.validate().is_err());

        cfg.auth.enabled = false;
        cfg.validate().unwrap();
    }
}
