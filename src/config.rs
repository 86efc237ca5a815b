//! Service configuration, read from the environment.
//!
//! | Variable | Default | |
//! |---|---|---|
//! | `APP_HOST` | `0.0.0.0` | bind host |
//! | `APP_PORT` | `3000` | bind port |
//! | `APP_ENV` | `development` | `development`, `production` or `test` |
//! | `APP_SECRET_KEY` | unset | HMAC secret for access tokens |
//! | `APP_DOMAIN` | `localhost` | token issuer |
//! | `APP_BODY_LIMIT` | `10485760` | max request body, in bytes |
//! | `APP_RATE_LIMIT` | `100` | requests per client per window |
//! | `APP_RATE_LIMIT_WINDOW_SECS` | `900` | rate limit window |

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroU32;
use std::str::FromStr;
use std::time::Duration;

use tracing::info;

use crate::error::Error;

/// Deployment environment. Production hides request detail from error
/// messages; every environment but development is rate limited.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Environment {
    #[default]
    Development,
    Production,
    Test,
}

impl Environment {
    pub fn is_production(self) -> bool {
        self == Self::Production
    }

    pub fn is_development(self) -> bool {
        self == Self::Development
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production  => "production",
            Self::Test        => "test",
        }
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            "test"                => Ok(Self::Test),
            other => Err(format!("unknown environment `{other}`")),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub environment: Environment,
    pub secret_key: Option<String>,
    pub domain: String,
    pub body_limit: usize,
    pub rate_limit: NonZeroU32,
    pub rate_limit_window: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup, so tests need not touch
    /// the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        Ok(Self {
            host: load(&lookup, "APP_HOST", "0.0.0.0")?,
            port: load(&lookup, "APP_PORT", "3000")?,
            environment: load(&lookup, "APP_ENV", "development")?,
            secret_key: lookup("APP_SECRET_KEY").filter(|s| !s.is_empty()),
            domain: load(&lookup, "APP_DOMAIN", "localhost")?,
            body_limit: load(&lookup, "APP_BODY_LIMIT", "10485760")?,
            rate_limit: load(&lookup, "APP_RATE_LIMIT", "100")?,
            rate_limit_window: Duration::from_secs(load(&lookup, "APP_RATE_LIMIT_WINDOW_SECS", "900")?),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("environment", &self.environment)
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<redacted>"))
            .field("domain", &self.domain)
            .field("body_limit", &self.body_limit)
            .field("rate_limit", &self.rate_limit)
            .field("rate_limit_window", &self.rate_limit_window)
            .finish()
    }
}

fn load<T>(lookup: &impl Fn(&str) -> Option<String>, key: &'static str, default: &str) -> Result<T, Error>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    let raw = lookup(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_owned()
    });
    raw.trim()
        .parse()
        .map_err(|e: T::Err| Error::Config { key, message: e.to_string() })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from(pairs: &[(&str, &str)]) -> Result<Config, Error> {
        let vars: HashMap<String, String> =
            pairs.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let config = from(&[]).unwrap();
        assert!(config.environment.is_development());
        assert_eq!(config.addr(), "0.0.0.0:3000".parse::<SocketAddr>().unwrap());
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.secret_key, None);
        assert_eq!(config.domain, "localhost");
        assert_eq!(config.body_limit, 10 * 1024 * 1024);
        assert_eq!(config.rate_limit.get(), 100);
        assert_eq!(config.rate_limit_window, Duration::from_secs(900));
    }

    #[test]
    fn reads_every_variable() {
        let config = from(&[
            ("APP_HOST", "127.0.0.1"),
            ("APP_PORT", "8080"),
            ("APP_ENV", "Production"),
            ("APP_SECRET_KEY", "s3cret"),
            ("APP_DOMAIN", "finance.example"),
            ("APP_BODY_LIMIT", "1024"),
            ("APP_RATE_LIMIT", "20"),
            ("APP_RATE_LIMIT_WINDOW_SECS", "60"),
        ])
        .unwrap();

        assert_eq!(config.addr(), "127.0.0.1:8080".parse::<SocketAddr>().unwrap());
        assert!(config.environment.is_production());
        assert_eq!(config.secret_key.as_deref(), Some("s3cret"));
        assert_eq!(config.body_limit, 1024);
        assert_eq!(config.rate_limit.get(), 20);
        assert_eq!(config.rate_limit_window, Duration::from_secs(60));
        assert!(!format!("{config:?}").contains("s3cret"));
    }

    #[test]
    fn invalid_values_name_the_variable() {
        let err = from(&[("APP_PORT", "eighty")]).unwrap_err();
        assert!(matches!(err, Error::Config { key: "APP_PORT", .. }));

        let err = from(&[("APP_ENV", "staging")]).unwrap_err();
        assert!(err.to_string().contains("APP_ENV"));

        let err = from(&[("APP_RATE_LIMIT", "0")]).unwrap_err();
        assert!(matches!(err, Error::Config { key: "APP_RATE_LIMIT", .. }));
    }
}
