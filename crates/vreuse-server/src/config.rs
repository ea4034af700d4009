use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::warn;

const DEFAULT_JWT_SECRET: &str = "dev-secret-change-me";

/// Server settings, read from `VREUSE_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    /// Allowed browser origin. Unset means permissive CORS.
    pub cors_origin: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let jwt_secret = lookup("VREUSE_JWT_SECRET").unwrap_or_else(|| {
            warn!("VREUSE_JWT_SECRET not set, using the development secret");
            DEFAULT_JWT_SECRET.into()
        });

        let port = match lookup("VREUSE_PORT") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("VREUSE_PORT is not a port number: '{}'", raw))?,
            None => 3000,
        };

        Ok(Self {
            jwt_secret,
            db_path: lookup("VREUSE_DB_PATH").unwrap_or_else(|| "vreuse.db".into()).into(),
            host: lookup("VREUSE_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            cors_origin: lookup("VREUSE_CORS_ORIGIN").filter(|origin| !origin.is_empty()),
        })
    }

    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }
}
