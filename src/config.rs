use crate::error::{Error, Result};
use serde::Deserialize;
use std::fs;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Address for incoming client connections.
    #[serde(default = "default_proxy_addr")]
    pub proxy_addr: String,
    /// Address of the destination MongoDB server.
    #[serde(default = "default_mongo_addr")]
    pub mongo_addr: String,
    /// How long until a client connection is considered idle and
    /// disconnected to release its resources.
    #[serde(default = "default_client_idle_timeout_ms")]
    pub client_idle_timeout_ms: u64,
    /// Budget for a single request/response round trip.
    #[serde(default = "default_message_timeout_ms")]
    pub message_timeout_ms: u64,
    pub log_level: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            proxy_addr: default_proxy_addr(),
            mongo_addr: default_mongo_addr(),
            client_idle_timeout_ms: default_client_idle_timeout_ms(),
            message_timeout_ms: default_message_timeout_ms(),
            log_level: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file. If `path_opt` is None or the file is
    /// missing/unreadable, returns defaults. Parsing errors are returned.
    pub fn load_from_file(path_opt: Option<&str>) -> Result<Self> {
        let path = path_opt.unwrap_or("config.toml");
        match fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<Config>(&contents) {
                Ok(cfg) => Ok(cfg),
                Err(e) => Err(Error::Config(format!("Failed to parse {}: {}", path, e))),
            },
            Err(_e) => Ok(Self::default()),
        }
    }

    /// Apply CLI/env overrides (highest precedence) to an existing config.
    pub fn with_overrides(
        mut self,
        proxy_addr: Option<String>,
        mongo_addr: Option<String>,
        log_level: Option<String>,
        client_idle_timeout_ms: Option<u64>,
        message_timeout_ms: Option<u64>,
    ) -> Self {
        if let Some(addr) = proxy_addr {
            self.proxy_addr = addr;
        }
        if let Some(addr) = mongo_addr {
            self.mongo_addr = addr;
        }
        if let Some(ll) = log_level {
            self.log_level = Some(ll);
        }
        if let Some(ms) = client_idle_timeout_ms {
            self.client_idle_timeout_ms = ms;
        }
        if let Some(ms) = message_timeout_ms {
            self.message_timeout_ms = ms;
        }
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        for (name, addr) in [("proxy_addr", &self.proxy_addr), ("mongo_addr", &self.mongo_addr)] {
            if addr.is_empty() {
                return Err(Error::Config(format!("{} cannot be empty", name)));
            }
            if !addr.contains(':') {
                return Err(Error::Config(format!(
                    "{} '{}' must be in host:port format",
                    name, addr
                )));
            }
        }

        if self.client_idle_timeout_ms == 0 {
            return Err(Error::Config(
                "client_idle_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.message_timeout_ms == 0 {
            return Err(Error::Config(
                "message_timeout_ms must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    pub fn client_idle_timeout(&self) -> Duration {
        Duration::from_millis(self.client_idle_timeout_ms)
    }

    pub fn message_timeout(&self) -> Duration {
        Duration::from_millis(self.message_timeout_ms)
    }
}

fn default_proxy_addr() -> String {
    "127.0.0.1:2000".to_string()
}

fn default_mongo_addr() -> String {
    // Mongo's standard port locally
    "127.0.0.1:27017".to_string()
}

fn default_client_idle_timeout_ms() -> u64 {
    5 * 60 * 1000
}

fn default_message_timeout_ms() -> u64 {
    5 * 1000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.proxy_addr, "127.0.0.1:2000");
        assert_eq!(cfg.mongo_addr, "127.0.0.1:27017");
        assert_eq!(cfg.client_idle_timeout(), Duration::from_secs(300));
        assert_eq!(cfg.message_timeout(), Duration::from_secs(5));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_parse_toml() {
        let cfg: Config = toml::from_str(
            r#"
            proxy_addr = "0.0.0.0:2000"
            mongo_addr = "10.0.0.1:27017"
            message_timeout_ms = 2500
            log_level = "debug"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.proxy_addr, "0.0.0.0:2000");
        assert_eq!(cfg.mongo_addr, "10.0.0.1:27017");
        assert_eq!(cfg.message_timeout_ms, 2500);
        // omitted keys fall back to defaults
        assert_eq!(cfg.client_idle_timeout_ms, 300_000);
        assert_eq!(cfg.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_overrides() {
        let cfg = Config::default().with_overrides(
            Some("0.0.0.0:3000".to_string()),
            None,
            Some("trace".to_string()),
            Some(1000),
            None,
        );
        assert_eq!(cfg.proxy_addr, "0.0.0.0:3000");
        assert_eq!(cfg.mongo_addr, "127.0.0.1:27017");
        assert_eq!(cfg.log_level.as_deref(), Some("trace"));
        assert_eq!(cfg.client_idle_timeout_ms, 1000);
        assert_eq!(cfg.message_timeout_ms, 5000);
    }

    #[test]
    fn test_validate_rejects_bad_addrs() {
        let mut cfg = Config::default();
        cfg.proxy_addr = "nocolon".to_string();
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.mongo_addr = String::new();
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.message_timeout_ms = 0;
        assert!(cfg.validate().is_err());
    }
}
