//! Static configuration, loaded once at startup from a TOML file. Every
//! section is optional; command-line flags override file values in `main`.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub log: LogConfig,
    pub router: RouterConfig,
    /// Identity -> access level name (guest/user/admin/master).
    pub access: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub password: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 27015,
            password: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Address the log-stream listener binds; the game server must be told
    /// to forward log lines here (`logaddress`).
    pub bind: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:27115".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Prefix for commands whose handler output is shown.
    pub verbose_prefix: String,
    /// Prefix for commands whose handler output is suppressed.
    pub silent_prefix: String,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            verbose_prefix: "!".to_string(),
            silent_prefix: "/".to_string(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 27015);
        assert_eq!(config.log.bind, "0.0.0.0:27115");
        assert_eq!(config.router.verbose_prefix, "!");
        assert_eq!(config.router.silent_prefix, "/");
        assert!(config.access.is_empty());
    }

    #[test]
    fn test_parse_full_file() {
        let text = r#"
            [server]
            host = "game.example.net"
            port = 27016
            password = "hunter2"

            [log]
            bind = "0.0.0.0:27117"

            [router]
            verbose_prefix = "."
            silent_prefix = "~"

            [access]
            "STEAM_0:1:111" = "admin"
            "STEAM_0:0:42" = "master"
        "#;
        let config: Config = toml::from_str(text).unwrap();

        assert_eq!(config.server.host, "game.example.net");
        assert_eq!(config.server.port, 27016);
        assert_eq!(config.server.password, "hunter2");
        assert_eq!(config.log.bind, "0.0.0.0:27117");
        assert_eq!(config.router.verbose_prefix, ".");
        assert_eq!(
            config.access.get("STEAM_0:1:111").map(String::as_str),
            Some("admin")
        );
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: Config = toml::from_str("[server]\npassword = \"s3cret\"\n").unwrap();
        assert_eq!(config.server.password, "s3cret");
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.log.bind, "0.0.0.0:27115");
    }
}
