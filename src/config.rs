//! Command line and environment configuration for the server.

use std::net::{IpAddr, SocketAddr};

use clap::Parser;

/// The default port to serve the API from.
pub const DEFAULT_PORT: u16 = 8085;

/// The REST API server for tally_rs.
///
/// Every option can also be set with the environment variable shown in its
/// help text.
#[derive(Parser, Clone)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// File path to the application SQLite database.
    #[arg(long, env = "DB_PATH")]
    pub db_path: String,

    /// The key clients must send in the `X-API-Key` header.
    #[arg(long, env = "API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// The secret used to sign bearer tokens.
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: String,

    /// The address to listen on.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    /// The port to serve the API from.
    #[arg(short, long, env = "PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("db_path", &self.db_path)
            .field("api_key", &"[REDACTED]")
            .field("jwt_secret", &"[REDACTED]")
            .field("host", &self.host)
            .field("port", &self.port)
            .finish()
    }
}

/// Problems with a [Config] that stop the server from starting.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    /// The API key is empty or only whitespace.
    #[error("the API key must not be empty")]
    EmptyApiKey,

    /// The token signing secret is empty or only whitespace.
    #[error("the JWT secret must not be empty")]
    EmptyJwtSecret,
}

impl Config {
    /// Check the secrets are usable.
    ///
    /// # Errors
    ///
    /// Returns a [ConfigError] naming the first secret that is blank.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::EmptyApiKey);
        }

        if self.jwt_secret.trim().is_empty() {
            return Err(ConfigError::EmptyJwtSecret);
        }

        Ok(())
    }

    /// The socket address to bind the server to.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}
