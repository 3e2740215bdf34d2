//! Process configuration.
//!
//! ```toml
//! listen = "0.0.0.0:3000"
//! body_timeout_ms = 5000
//!
//! [[cors]]
//! origin = "https://app.example"
//! allowed_methods = ["GET", "PUT"]
//! allowed_headers = ["X-Token"]
//! max_age = 600
//! ```

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::cors::CorsOrigin;
use crate::error::Error;

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub listen: SocketAddr,
    pub body_timeout_ms: u64,
    pub cors: Vec<CorsOrigin>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 3000)),
            body_timeout_ms: 10_000,
            cors: Vec::new(),
        }
    }
}

impl Config {
    pub fn from_toml(source: &str) -> Result<Self, Error> {
        Ok(toml::from_str(source)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        Self::from_toml(&std::fs::read_to_string(path)?)
    }

    pub fn body_timeout(&self) -> Duration {
        Duration::from_millis(self.body_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use http::Method;

    use super::*;

    #[test]
    fn empty_source_gives_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.body_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn reads_cors_allow_list() {
        let config = Config::from_toml(r#"
            listen = "127.0.0.1:8080"
            body_timeout_ms = 250

            [[cors]]
            origin = "https://app.example"
            allowed_methods = ["GET", "put"]
            max_age = 60
        "#).unwrap();

        assert_eq!(config.listen.port(), 8080);
        assert_eq!(config.body_timeout(), Duration::from_millis(250));
        assert_eq!(config.cors.len(), 1);
        assert_eq!(config.cors[0].allowed_methods, [Method::GET, Method::PUT]);
        assert_eq!(config.cors[0].max_age, Some(60));
    }

    #[test]
    fn rejects_bad_types() {
        let err = Config::from_toml("body_timeout_ms = \"soon\"").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
