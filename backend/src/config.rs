use std::{env, fmt::Display, str::FromStr};

use rocket::figment::Figment;
use thiserror::Error;
use tracing::{info, warn};

const DEFAULT_PORT: &str = "80";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid {key} value: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Settings read from the environment. Service hosts are fixed and not part of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub port: u16,
    pub postgres_db: Option<String>,
    pub postgres_user: Option<String>,
    pub postgres_password: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            port: try_load(&lookup, "PORT", DEFAULT_PORT)?,
            postgres_db: optional(&lookup, "POSTGRES_DB"),
            postgres_user: optional(&lookup, "POSTGRES_USER"),
            postgres_password: optional(&lookup, "POSTGRES_PASSWORD"),
        })
    }

    /// Rocket settings for the HTTP services: listen on every interface at `port`.
    pub fn figment(&self) -> Figment {
        rocket::Config::figment()
            .merge(("address", "0.0.0.0"))
            .merge(("port", self.port))
    }
}

fn optional<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(key);
    if value.is_none() {
        warn!("Environment variable {key} not found, using driver default");
    }
    value
}

fn try_load<F, T>(lookup: &F, key: &'static str, default: &str) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    lookup(key)
        .unwrap_or_else(|| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e: T::Err| ConfigError::Invalid { key, reason: e.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.port, 80);
        assert_eq!(config.postgres_db, None);
        assert_eq!(config.postgres_user, None);
        assert_eq!(config.postgres_password, None);
    }

    #[test]
    fn test_reads_credentials() {
        let config = Config::from_lookup(lookup(&[
            ("PORT", "8080"),
            ("POSTGRES_DB", "votes"),
            ("POSTGRES_USER", "postgres"),
            ("POSTGRES_PASSWORD", "secret"),
        ]))
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.postgres_db.as_deref(), Some("votes"));
        assert_eq!(config.postgres_user.as_deref(), Some("postgres"));
        assert_eq!(config.postgres_password.as_deref(), Some("secret"));
    }

    #[test]
    fn test_bad_port() {
        let err = Config::from_lookup(lookup(&[("PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "PORT", .. }));
    }

    #[test]
    fn test_figment_binds_port() {
        let config = Config::from_lookup(lookup(&[("PORT", "9090")])).unwrap();
        let rocket_config = rocket::Config::from(config.figment());
        assert_eq!(rocket_config.port, 9090);
        assert_eq!(rocket_config.address.to_string(), "0.0.0.0");
    }
}
