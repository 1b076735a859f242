use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};

use duet_db::pagination::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, PageLimits};

/// Secrets that ship in examples and must never reach production.
const PLACEHOLDER_SECRETS: &[&str] = &["dev-secret-change-me", "changeme", "secret", "CHANGE_ME"];

#[derive(Debug, Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub limits: PageLimits,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_vars(std::env::vars().collect())
    }

    fn from_vars(vars: HashMap<String, String>) -> Result<Self> {
        let get = |key: &str| vars.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());

        let jwt_secret = get("DUET_JWT_SECRET")
            .context("DUET_JWT_SECRET must be set")?
            .to_string();
        if PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("DUET_JWT_SECRET is a placeholder value; set a real secret");
        }

        let port = match get("DUET_PORT") {
            Some(v) => v.parse().with_context(|| format!("DUET_PORT is not a port: {}", v))?,
            None => 3000,
        };
        let default_size = match get("DUET_PAGE_SIZE") {
            Some(v) => v.parse().with_context(|| format!("DUET_PAGE_SIZE is not a number: {}", v))?,
            None => DEFAULT_PAGE_SIZE,
        };
        let max_size = match get("DUET_MAX_PAGE_SIZE") {
            Some(v) => v
                .parse()
                .with_context(|| format!("DUET_MAX_PAGE_SIZE is not a number: {}", v))?,
            None => MAX_PAGE_SIZE,
        };
        if default_size == 0 || max_size == 0 || default_size > max_size {
            bail!("page sizes must satisfy 0 < DUET_PAGE_SIZE <= DUET_MAX_PAGE_SIZE");
        }

        Ok(Self {
            jwt_secret,
            db_path: PathBuf::from(get("DUET_DB_PATH").unwrap_or("duet.db")),
            host: get("DUET_HOST").unwrap_or("0.0.0.0").to_string(),
            port,
            limits: PageLimits {
                default_size,
                max_size,
            },
        })
    }

    pub fn addr(&self) -> Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}
