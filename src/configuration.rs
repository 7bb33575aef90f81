use std::time::Duration;

use config::ConfigError;

#[derive(serde::Deserialize, Clone, Debug)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub application: ApplicationSettings,
    pub jwt: JwtSettings,
    #[serde(default)]
    pub token_store: TokenStoreSettings,
    #[serde(default)]
    pub services: ServiceSettings,
    #[serde(default)]
    pub login: LoginSettings,
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct ApplicationSettings {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
    /// Service-to-service listener; keep it off the public network
    #[serde(default = "default_host")]
    pub internal_host: String,
    pub internal_port: u16,
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub port: u16,
    pub host: String,
    pub database_name: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl DatabaseSettings {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database_name
        )
    }
}

/// JWT signing settings, injected at startup
#[derive(serde::Deserialize, Clone, Debug)]
pub struct JwtSettings {
    pub secret: String,
    pub issuer: String,
    #[serde(default = "default_access_token_expiry")]
    pub access_token_expiry: i64, // seconds, 15 minutes
    #[serde(default = "default_refresh_token_expiry")]
    pub refresh_token_expiry: i64, // seconds, 90 days
}

/// Where refresh token entries live
#[derive(serde::Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TokenStoreBackend {
    #[default]
    Postgres,
    Memory,
    /// Another instance owns the store; reached over its `/tokens` API
    Remote,
}

impl TokenStoreBackend {
    pub fn is_local(&self) -> bool {
        !matches!(self, TokenStoreBackend::Remote)
    }
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct TokenStoreSettings {
    #[serde(default)]
    pub backend: TokenStoreBackend,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_sweep_initial_delay_secs")]
    pub sweep_initial_delay_secs: u64,
}

impl TokenStoreSettings {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn sweep_initial_delay(&self) -> Duration {
        Duration::from_secs(self.sweep_initial_delay_secs)
    }
}

impl Default for TokenStoreSettings {
    fn default() -> Self {
        Self {
            backend: TokenStoreBackend::default(),
            sweep_interval_secs: default_sweep_interval_secs(),
            sweep_initial_delay_secs: default_sweep_initial_delay_secs(),
        }
    }
}

/// Service-to-service call settings
#[derive(serde::Deserialize, Clone, Debug)]
pub struct ServiceSettings {
    /// Internal listener of the instance that owns the refresh token store
    #[serde(default = "default_token_store_url")]
    pub token_store_url: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_millis")]
    pub retry_delay_millis: u64,
    #[serde(default = "default_request_timeout_millis")]
    pub request_timeout_millis: u64,
    /// Keep issuing tokens when the refresh token cannot be stored
    #[serde(default)]
    pub degrade_on_store_failure: bool,
}

impl ServiceSettings {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_millis)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_millis)
    }
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            token_store_url: default_token_store_url(),
            max_retries: default_max_retries(),
            retry_delay_millis: default_retry_delay_millis(),
            request_timeout_millis: default_request_timeout_millis(),
            degrade_on_store_failure: false,
        }
    }
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct LoginSettings {
    /// Fixed delay before answering a failed login
    #[serde(default = "default_mismatch_delay_millis")]
    pub mismatch_delay_millis: u64,
}

impl LoginSettings {
    pub fn mismatch_delay(&self) -> Duration {
        Duration::from_millis(self.mismatch_delay_millis)
    }
}

impl Default for LoginSettings {
    fn default() -> Self {
        Self {
            mismatch_delay_millis: default_mismatch_delay_millis(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_access_token_expiry() -> i64 {
    15 * 60
}

fn default_refresh_token_expiry() -> i64 {
    90 * 24 * 60 * 60
}

fn default_sweep_interval_secs() -> u64 {
    5 * 60
}

fn default_sweep_initial_delay_secs() -> u64 {
    60
}

fn default_token_store_url() -> String {
    "http://127.0.0.1:8001".to_string()
}

fn default_max_retries() -> u32 {
    1
}

fn default_retry_delay_millis() -> u64 {
    3000
}

fn default_request_timeout_millis() -> u64 {
    5000
}

fn default_mismatch_delay_millis() -> u64 {
    3000
}

/// Load settings from `configuration.{yaml,toml,json}` overlaid by
/// `APP__SECTION__KEY` environment variables
pub fn get_configuration() -> Result<Settings, ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("configuration").required(false))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;
    settings.try_deserialize::<Settings>()
}
