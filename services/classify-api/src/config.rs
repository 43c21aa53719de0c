//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The admin secret digest is loaded from the ADMIN_SECRET_HASH env var or
//! secret_hash_file, never stored in the TOML directly, so it can be
//! rotated without touching the config or the binary.

use argon2::password_hash::PasswordHash;
use common::Secret;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    pub inference: InferenceConfig,
    #[serde(default)]
    pub admin: AdminConfig,
}

/// HTTP listener settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Allowed CORS origins; `"*"` permits any origin
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

/// User store settings
#[derive(Debug, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    /// Balance granted to every newly registered user
    #[serde(default = "default_starting_tokens")]
    pub starting_tokens: u64,
}

/// Image retrieval bounds
#[derive(Debug, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_image_mb")]
    pub max_image_mb: usize,
}

/// Inference backend settings
#[derive(Debug, Deserialize)]
pub struct InferenceConfig {
    pub url: String,
    #[serde(default = "default_inference_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

/// Admin secret resolution
#[derive(Debug, Deserialize, Default)]
pub struct AdminConfig {
    /// Path to a file containing the Argon2 PHC digest of the admin secret
    /// (alternative to the ADMIN_SECRET_HASH env var)
    #[serde(default)]
    pub secret_hash_file: Option<PathBuf>,
    #[serde(skip)]
    pub secret_hash: Option<Secret<String>>,
}

fn default_listen_addr() -> SocketAddr {
    "0.0.0.0:5025".parse().expect("static default addr")
}

fn default_max_connections() -> usize {
    1000
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_store_path() -> PathBuf {
    PathBuf::from("users.json")
}

fn default_starting_tokens() -> u64 {
    6
}

fn default_fetch_timeout() -> u64 {
    10
}

fn default_max_image_mb() -> usize {
    8
}

fn default_inference_timeout() -> u64 {
    30
}

fn default_top_k() -> usize {
    5
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            max_connections: default_max_connections(),
            cors_origins: default_cors_origins(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            starting_tokens: default_starting_tokens(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_fetch_timeout(),
            max_image_mb: default_max_image_mb(),
        }
    }
}

impl FetchConfig {
    /// Payload cap in bytes.
    pub fn max_bytes(&self) -> usize {
        self.max_image_mb * 1024 * 1024
    }
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Admin digest resolution order:
    /// 1. ADMIN_SECRET_HASH env var
    /// 2. secret_hash_file path from config
    ///
    /// The digest is required and must parse as a PHC string; a service
    /// that cannot verify refills refuses to start rather than running
    /// with an unguarded admin path.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if !config.inference.url.starts_with("http://")
            && !config.inference.url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "inference url must start with http:// or https://, got: {}",
                config.inference.url
            )));
        }

        if config.fetch.timeout_secs == 0 {
            return Err(common::Error::Config(
                "fetch timeout_secs must be greater than 0".into(),
            ));
        }

        if config.fetch.max_image_mb == 0 {
            return Err(common::Error::Config(
                "max_image_mb must be greater than 0".into(),
            ));
        }

        if config.inference.timeout_secs == 0 {
            return Err(common::Error::Config(
                "inference timeout_secs must be greater than 0".into(),
            ));
        }

        if config.inference.top_k == 0 {
            return Err(common::Error::Config(
                "top_k must be greater than 0".into(),
            ));
        }

        if config.server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }

        // Resolve admin digest: env var takes precedence over file
        let digest = if let Ok(hash) = std::env::var("ADMIN_SECRET_HASH") {
            Some(hash)
        } else if let Some(ref hash_file) = config.admin.secret_hash_file {
            let hash = std::fs::read_to_string(hash_file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read secret_hash_file {}: {e}",
                    hash_file.display()
                ))
            })?;
            let hash = hash.trim().to_owned();
            if hash.is_empty() { None } else { Some(hash) }
        } else {
            None
        };

        let Some(digest) = digest else {
            return Err(common::Error::Config(
                "admin secret digest missing: set ADMIN_SECRET_HASH or admin.secret_hash_file"
                    .into(),
            ));
        };

        if PasswordHash::new(&digest).is_err() {
            return Err(common::Error::Config(
                "admin secret digest is not a valid PHC string".into(),
            ));
        }
        config.admin.secret_hash = Some(Secret::new(digest));

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("classify-api.toml")
    }
}
