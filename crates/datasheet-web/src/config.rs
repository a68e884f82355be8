use std::path::PathBuf;

use thiserror::Error;

pub const DEFAULT_PORT: u16 = 8501;
pub const DEFAULT_MAX_UPLOAD_MB: usize = 200;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ServerConfigError {
    #[error("Invalid value for {var}: {value}")]
    Invalid { var: &'static str, value: String },
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub static_dir: PathBuf,
    /// Upper bound on one multipart request, in bytes
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            static_dir: PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/static")),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_MB * 1024 * 1024,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ServerConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ServerConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let port = match lookup("DATASHEET_PORT") {
            Some(v) => v
                .trim()
                .parse()
                .map_err(|_| ServerConfigError::Invalid { var: "DATASHEET_PORT", value: v })?,
            None => defaults.port,
        };

        let max_upload_bytes = match lookup("DATASHEET_MAX_UPLOAD_MB") {
            Some(v) => v
                .trim()
                .parse::<usize>()
                .map(|mb| mb * 1024 * 1024)
                .map_err(|_| ServerConfigError::Invalid {
                    var: "DATASHEET_MAX_UPLOAD_MB",
                    value: v,
                })?,
            None => defaults.max_upload_bytes,
        };

        let static_dir = lookup("DATASHEET_STATIC").map_or(defaults.static_dir, PathBuf::from);

        Ok(Self {
            port,
            static_dir,
            max_upload_bytes,
        })
    }
}
