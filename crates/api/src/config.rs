//! HTTP server configuration.

use std::net::SocketAddr;

use loyalty_infra::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    /// `RUN_ADDRESS`, default `0.0.0.0:8080`.
    pub run_address: SocketAddr,
    /// `DATABASE_URI`; the in-memory store is used when unset.
    pub database_uri: Option<String>,
    /// `LOG_LEVEL`, fallback filter when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            run_address: SocketAddr::from(([0, 0, 0, 0], 8080)),
            database_uri: None,
            log_level: "info".to_string(),
        }
    }
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let run_address = match get("RUN_ADDRESS") {
            None => Self::default().run_address,
            Some(raw) => match raw.trim().parse::<SocketAddr>() {
                Ok(addr) => addr,
                Err(e) => {
                    return Err(ConfigError::Invalid {
                        key: "RUN_ADDRESS",
                        reason: format!("{e}"),
                        value: raw,
                    })
                }
            },
        };

        Ok(Self {
            run_address,
            database_uri: get("DATABASE_URI"),
            log_level: get("LOG_LEVEL").unwrap_or_else(|| Self::default().log_level),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_in_memory_on_8080() {
        let cfg = ApiConfig::from_lookup(|_| None).unwrap();
        assert_eq!(cfg, ApiConfig::default());
        assert!(cfg.database_uri.is_none());
    }

    #[test]
    fn reads_address_and_database() {
        let cfg = ApiConfig::from_lookup(|key| match key {
            "RUN_ADDRESS" => Some("127.0.0.1:9090".to_string()),
            "DATABASE_URI" => Some("postgres://localhost/loyalty".to_string()),
            "LOG_LEVEL" => Some("debug".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(cfg.run_address.port(), 9090);
        assert_eq!(cfg.database_uri.as_deref(), Some("postgres://localhost/loyalty"));
        assert_eq!(cfg.log_level, "debug");
    }

    #[test]
    fn bad_address_names_the_key() {
        let err = ApiConfig::from_lookup(|key| (key == "RUN_ADDRESS").then(|| "localhost".to_string())).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "RUN_ADDRESS", .. }));
    }
}
