//! Layered configuration.
//!
//! Sources, lowest precedence first: the embedded `config/default.toml`, an
//! optional `bookclub.toml` in the working directory, the file named by
//! `BOOKCLUB_CONFIG`, then `BOOKCLUB__SECTION__KEY` environment variables
//! (a `.env` file is loaded into the environment first).

use std::path::Path;

use ::config::{Config, ConfigBuilder, Environment, File, FileFormat};
use anyhow::{ensure, Context};
use serde::Deserialize;

const EMBEDDED_DEFAULTS: &str = include_str!("../config/default.toml");
const ENV_PREFIX: &str = "BOOKCLUB";

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

/// Where uploaded files live and how large they may be.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadsConfig {
    pub dir: String,
    pub max_image_bytes: usize,
    pub max_pdf_bytes: usize,
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaginationConfig {
    pub default_limit: i64,
    pub max_limit: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

/// Optional `[security]` section; every header it controls is off when unset.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct SecurityConfig {
    pub enable_hsts: Option<bool>,
    pub hsts_max_age: Option<u64>,
    pub hsts_include_subdomains: Option<bool>,
    pub csp: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub uploads: UploadsConfig,
    pub pagination: PaginationConfig,
    pub cors: CorsConfig,
    pub security: Option<SecurityConfig>,
}

fn with_defaults() -> ConfigBuilder<::config::builder::DefaultState> {
    Config::builder().add_source(File::from_str(EMBEDDED_DEFAULTS, FileFormat::Toml))
}

impl Default for AppConfig {
    /// The embedded defaults alone. They ship with the binary, so a parse
    /// failure here is a build defect.
    fn default() -> Self {
        match with_defaults().build().and_then(Config::try_deserialize) {
            Ok(cfg) => cfg,
            Err(e) => panic!("embedded config/default.toml is invalid: {}", e),
        }
    }
}

impl CorsConfig {
    /// `true` when any origin may call the API.
    pub fn allows_any_origin(&self) -> bool {
        self.allowed_origins.is_empty() || self.allowed_origins.iter().any(|o| o.trim() == "*")
    }
}

pub fn load() -> anyhow::Result<AppConfig> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            tracing::warn!("Ignoring unreadable .env file: {}", e);
        }
    }

    let mut builder = with_defaults().add_source(File::with_name("bookclub").required(false));
    if let Ok(custom_path) = std::env::var("BOOKCLUB_CONFIG") {
        builder = builder.add_source(File::with_name(&custom_path).required(false));
    }
    let env = Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .list_separator(",")
        .with_list_parse_key("cors.allowed_origins")
        .try_parsing(true);

    let app_cfg: AppConfig = builder
        .add_source(env)
        .build()
        .and_then(Config::try_deserialize)
        .context("loading configuration")?;
    validate(&app_cfg)?;
    Ok(app_cfg)
}

/// Rejects settings the server cannot run with.
pub fn validate(cfg: &AppConfig) -> anyhow::Result<()> {
    ensure!(cfg.server.port != 0, "invalid server.port: {}", cfg.server.port);
    #[cfg(unix)]
    if cfg.server.port < 1024 {
        tracing::warn!("Port {} is privileged and may need elevated permissions", cfg.server.port);
    }

    let uploads = &cfg.uploads;
    ensure!(!uploads.dir.trim().is_empty(), "uploads.dir must not be empty");
    ensure!(
        uploads.max_image_bytes > 0 && uploads.max_pdf_bytes > 0,
        "uploads.max_image_bytes and uploads.max_pdf_bytes must be > 0"
    );
    let largest_file = uploads.max_image_bytes.max(uploads.max_pdf_bytes);
    ensure!(
        uploads.max_body_bytes >= largest_file,
        "uploads.max_body_bytes ({}) must be >= the largest per-file limit ({})",
        uploads.max_body_bytes,
        largest_file
    );

    let pages = &cfg.pagination;
    ensure!(pages.max_limit >= 1, "pagination.max_limit must be >= 1");
    ensure!(
        (1..=pages.max_limit).contains(&pages.default_limit),
        "pagination.default_limit must be in 1..={}",
        pages.max_limit
    );
    Ok(())
}

/// Creates the directory holding a `sqlite://` database file. Other URLs are
/// left alone.
pub fn ensure_sqlite_parent_dir(url: &str) -> anyhow::Result<()> {
    let Some(rest) = url.strip_prefix("sqlite://") else {
        return Ok(());
    };
    let file = rest.split('?').next().unwrap_or(rest);
    match Path::new(file).parent() {
        Some(dir) if !dir.as_os_str().is_empty() => std::fs::create_dir_all(dir)
            .with_context(|| format!("creating database directory {}", dir.display())),
        _ => Ok(()),
    }
}
