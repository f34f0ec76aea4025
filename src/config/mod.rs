mod secret;

pub use secret::{generate_ephemeral_secret, validate_secret_strength, SecretStrength};

use anyhow::bail;
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub jwt: JwtConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub env: Environment,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default = "default_store_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            url: default_store_url(),
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    /// HS256 signing secret. Required in production.
    pub secret: Option<String>,
    #[serde(default = "default_expiry_minutes")]
    pub expiry_minutes: i64,
    #[serde(default = "default_leeway_secs")]
    pub leeway_secs: u64,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: None,
            expiry_minutes: default_expiry_minutes(),
            leeway_secs: default_leeway_secs(),
        }
    }
}

/// Argon2id cost parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    #[serde(default = "default_argon2_memory_kib")]
    pub argon2_memory_kib: u32,
    #[serde(default = "default_argon2_iterations")]
    pub argon2_iterations: u32,
    #[serde(default = "default_argon2_parallelism")]
    pub argon2_parallelism: u32,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            argon2_memory_kib: default_argon2_memory_kib(),
            argon2_iterations: default_argon2_iterations(),
            argon2_parallelism: default_argon2_parallelism(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogConfig {
    #[serde(default)]
    pub format: LogFormat,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_store_url() -> String {
    "postgres://localhost/event_hub".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_expiry_minutes() -> i64 {
    60
}

fn default_leeway_secs() -> u64 {
    0
}

fn default_argon2_memory_kib() -> u32 {
    argon2::Params::DEFAULT_M_COST
}

fn default_argon2_iterations() -> u32 {
    argon2::Params::DEFAULT_T_COST
}

fn default_argon2_parallelism() -> u32 {
    argon2::Params::DEFAULT_P_COST
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::Environment::default().separator("__"))
            .set_default("app.env", "development")?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("store.backend", "postgres")?
            .set_default("store.url", "postgres://localhost/event_hub")?
            .set_default("store.max_connections", 10)?
            .set_default("jwt.expiry_minutes", 60)?
            .set_default("jwt.leeway_secs", 0)?
            .set_default("log.format", "pretty")?
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Resolve the token signing secret.
    ///
    /// Production refuses to start without a strong explicit secret.
    /// Development falls back to a random per-process key.
    pub fn signing_secret(&self) -> anyhow::Result<String> {
        let production = self.app.env == Environment::Production;
        let configured = self.jwt.secret.as_deref().filter(|s| !s.trim().is_empty());

        match configured {
            Some(secret) => {
                if validate_secret_strength(secret) == SecretStrength::Weak {
                    if production {
                        bail!("JWT__SECRET is too weak for production (need 32+ random bytes)");
                    }
                    tracing::warn!("JWT__SECRET is weak; acceptable only in development");
                }
                Ok(secret.to_string())
            }
            None if production => bail!("JWT__SECRET must be set in production"),
            None => {
                tracing::warn!(
                    "JWT__SECRET not set; using an ephemeral signing key, tokens will not survive a restart"
                );
                Ok(generate_ephemeral_secret())
            }
        }
    }
}
