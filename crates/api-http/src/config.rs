//! Server runtime configuration.
//!
//! Resolved once at startup (from flags or environment) and passed into
//! [`crate::server::StateServer`]; request handlers never read process
//! environment themselves.

use std::net::SocketAddr;

use crate::error::{ServerError, ServerResult};

/// Configuration for the HTTP server.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Address to listen on.
    pub bind_addr: SocketAddr,
    /// Optional HTTP Basic credentials guarding every route.
    pub basic_auth: Option<BasicAuth>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            basic_auth: None,
        }
    }
}

/// HTTP Basic credentials.
#[derive(Clone, Debug)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

impl BasicAuth {
    /// Parse a `user:password` spec as supplied on the command line or
    /// in `STSV_AUTH`.
    pub fn parse(spec: &str) -> ServerResult<Self> {
        match spec.split_once(':') {
            Some((username, password)) if !username.is_empty() => Ok(Self {
                username: username.to_owned(),
                password: password.to_owned(),
            }),
            _ => Err(ServerError::InvalidAuth),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr, SocketAddr::from(([0, 0, 0, 0], 3000)));
        assert!(config.basic_auth.is_none());
    }

    #[test]
    fn basic_auth_spec_parsing() {
        let auth = BasicAuth::parse("operator:hunter2").unwrap();
        assert_eq!(auth.username, "operator");
        assert_eq!(auth.password, "hunter2");

        // Passwords may contain colons; usernames may not be empty.
        let auth = BasicAuth::parse("op:a:b").unwrap();
        assert_eq!(auth.password, "a:b");
        assert!(BasicAuth::parse("no-colon").is_err());
        assert!(BasicAuth::parse(":password").is_err());
    }
}
