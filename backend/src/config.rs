//! Server configuration from the environment.
//!
//! | Variable                  | Default | Meaning                          |
//! |---------------------------|---------|----------------------------------|
//! | `KPIREPORT_PORT`          | 3000    | HTTP listen port                 |
//! | `KPIREPORT_MAX_UPLOAD_MB` | 50      | Multipart body limit             |
//! | `KPIREPORT_CATALOG`       | unset   | JSON KPI catalog (else built-in) |
//!
//! A `.env` file is honoured through `dotenvy`.

use std::env;
use std::path::PathBuf;

use crate::error::{ServerError, ServerResult};

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_MAX_UPLOAD_MB: usize = 50;

/// Rows returned by `/api/preview`.
pub const PREVIEW_ROWS: usize = 20;

pub const ENV_PORT: &str = "KPIREPORT_PORT";
pub const ENV_MAX_UPLOAD_MB: &str = "KPIREPORT_MAX_UPLOAD_MB";
pub const ENV_CATALOG: &str = "KPIREPORT_CATALOG";

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub port: u16,
    pub max_upload_bytes: usize,
    pub catalog_path: Option<PathBuf>,
    pub preview_rows: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_MB * 1024 * 1024,
            catalog_path: None,
            preview_rows: PREVIEW_ROWS,
        }
    }
}

impl ServerConfig {
    /// Read the process environment (after loading `.env`, if any).
    pub fn from_env() -> ServerResult<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; unset or blank keys keep their default.
    pub fn from_lookup<F>(lookup: F) -> ServerResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(port) = get(ENV_PORT) {
            config.port = port
                .parse()
                .map_err(|_| ServerError::Config(format!("{} must be a port number, got '{}'", ENV_PORT, port)))?;
        }

        if let Some(mb) = get(ENV_MAX_UPLOAD_MB) {
            let mb: usize = mb.parse().map_err(|_| {
                ServerError::Config(format!("{} must be a whole number of megabytes, got '{}'", ENV_MAX_UPLOAD_MB, mb))
            })?;
            if mb == 0 {
                return Err(ServerError::Config(format!("{} must be at least 1", ENV_MAX_UPLOAD_MB)));
            }
            config.max_upload_bytes = mb
                .checked_mul(1024 * 1024)
                .ok_or_else(|| ServerError::Config(format!("{} is too large: {} MB", ENV_MAX_UPLOAD_MB, mb)))?;
        }

        config.catalog_path = get(ENV_CATALOG).map(PathBuf::from);

        Ok(config)
    }

    /// Override the port (CLI `--port` wins over the environment).
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_catalog(mut self, path: PathBuf) -> Self {
        self.catalog_path = Some(path);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.port, 3000);
        assert_eq!(config.max_upload_bytes, 50 * 1024 * 1024);
        assert!(config.catalog_path.is_none());
    }

    #[test]
    fn test_values_from_environment() {
        let config = ServerConfig::from_lookup(lookup(&[
            (ENV_PORT, "8080"),
            (ENV_MAX_UPLOAD_MB, " 10 "),
            (ENV_CATALOG, "kpis.json"),
        ]))
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.max_upload_bytes, 10 * 1024 * 1024);
        assert_eq!(config.catalog_path, Some(PathBuf::from("kpis.json")));
    }

    #[test]
    fn test_blank_values_keep_defaults() {
        let config = ServerConfig::from_lookup(lookup(&[(ENV_PORT, ""), (ENV_CATALOG, "  ")])).unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        assert!(config.catalog_path.is_none());
    }

    #[test]
    fn test_invalid_values_are_config_errors() {
        for pairs in [
            [(ENV_PORT, "http")],
            [(ENV_PORT, "70000")],
            [(ENV_MAX_UPLOAD_MB, "-1")],
            [(ENV_MAX_UPLOAD_MB, "0")],
            [(ENV_MAX_UPLOAD_MB, "18446744073709551615")],
        ] {
            let err = ServerConfig::from_lookup(lookup(&pairs)).unwrap_err();
            assert!(matches!(err, ServerError::Config(_)), "{:?}", pairs);
        }
    }

    #[test]
    fn test_upload_limit_that_overflows_bytes() {
        let too_big = (usize::MAX / (1024 * 1024) + 1).to_string();
        let err = ServerConfig::from_lookup(lookup(&[(ENV_MAX_UPLOAD_MB, too_big.as_str())])).unwrap_err();
        assert!(err.to_string().contains("too large"), "{}", err);

        let largest = (usize::MAX / (1024 * 1024)).to_string();
        let config = ServerConfig::from_lookup(lookup(&[(ENV_MAX_UPLOAD_MB, largest.as_str())])).unwrap();
        assert_eq!(config.max_upload_bytes, usize::MAX / (1024 * 1024) * 1024 * 1024);
    }

    #[test]
    fn test_cli_overrides() {
        let config = ServerConfig::default()
            .with_port(9000)
            .with_catalog(PathBuf::from("custom.json"));
        assert_eq!(config.port, 9000);
        assert_eq!(config.catalog_path, Some(PathBuf::from("custom.json")));
    }
}
