use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &["dev-secret-change-me", "change-me"];

/// Longest accepted token lifetime: one year.
const MAX_TOKEN_TTL_MINUTES: i64 = 525_600;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("AGORA_JWT_SECRET is unset or still a placeholder")]
    MissingSecret,

    #[error("{name} has an invalid value {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: &'static str,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub token_ttl_minutes: i64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a config from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let jwt_secret = lookup("AGORA_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            return Err(ConfigError::MissingSecret);
        }

        let db_path = lookup("AGORA_DB_PATH").unwrap_or_else(|| "agora.db".into());
        let host = lookup("AGORA_HOST").unwrap_or_else(|| "0.0.0.0".into());

        let port = match lookup("AGORA_PORT") {
            Some(raw) => raw.parse::<u16>().map_err(|_| ConfigError::Invalid {
                name: "AGORA_PORT",
                value: raw,
                reason: "expected a port number",
            })?,
            None => 3000,
        };

        let token_ttl_minutes = match lookup("AGORA_TOKEN_TTL_MINUTES") {
            Some(raw) => match raw.parse::<i64>() {
                Ok(minutes) if (1..=MAX_TOKEN_TTL_MINUTES).contains(&minutes) => minutes,
                _ => {
                    return Err(ConfigError::Invalid {
                        name: "AGORA_TOKEN_TTL_MINUTES",
                        value: raw,
                        reason: "expected between 1 and 525600 minutes",
                    });
                }
            },
            None => 60,
        };

        Ok(Self {
            jwt_secret,
            db_path: db_path.into(),
            host,
            port,
            token_ttl_minutes,
        })
    }

    pub fn token_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.token_ttl_minutes)
    }

    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_apply_when_only_secret_is_set() {
        let config = Config::from_lookup(lookup_from(&[("AGORA_JWT_SECRET", "s3cret")])).unwrap();
        assert_eq!(config.db_path, PathBuf::from("agora.db"));
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.token_ttl_minutes, 60);
        assert_eq!(config.bind_addr().unwrap().port(), 3000);
    }

    #[test]
    fn missing_or_placeholder_secret_is_fatal() {
        assert_eq!(
            Config::from_lookup(lookup_from(&[])).unwrap_err(),
            ConfigError::MissingSecret
        );
        for placeholder in PLACEHOLDER_SECRETS {
            let err = Config::from_lookup(lookup_from(&[("AGORA_JWT_SECRET", *placeholder)]))
                .unwrap_err();
            assert_eq!(err, ConfigError::MissingSecret);
        }
    }

    #[test]
    fn overrides_are_parsed() {
        let config = Config::from_lookup(lookup_from(&[
            ("AGORA_JWT_SECRET", "s3cret"),
            ("AGORA_DB_PATH", "/tmp/test.db"),
            ("AGORA_HOST", "127.0.0.1"),
            ("AGORA_PORT", "8080"),
            ("AGORA_TOKEN_TTL_MINUTES", "15"),
        ]))
        .unwrap();
        assert_eq!(config.db_path, PathBuf::from("/tmp/test.db"));
        assert_eq!(config.port, 8080);
        assert_eq!(config.token_ttl(), chrono::Duration::minutes(15));
        assert_eq!(config.bind_addr().unwrap().to_string(), "127.0.0.1:8080");
    }

    #[test]
    fn bad_numbers_are_rejected() {
        let err = Config::from_lookup(lookup_from(&[
            ("AGORA_JWT_SECRET", "s3cret"),
            ("AGORA_PORT", "99999"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "AGORA_PORT", .. }));

        for ttl in ["0", "-5", "soon", "525601", "1000000000000"] {
            let err = Config::from_lookup(lookup_from(&[
                ("AGORA_JWT_SECRET", "s3cret"),
                ("AGORA_TOKEN_TTL_MINUTES", ttl),
            ]))
            .unwrap_err();
            assert!(matches!(err, ConfigError::Invalid { name: "AGORA_TOKEN_TTL_MINUTES", .. }));
        }

        let config = Config::from_lookup(lookup_from(&[
            ("AGORA_JWT_SECRET", "s3cret"),
            ("AGORA_TOKEN_TTL_MINUTES", "525600"),
        ]))
        .unwrap();
        assert_eq!(config.token_ttl(), chrono::Duration::days(365));
    }
}
