use config::{Config, ConfigError};
use serde::Deserialize;
use tracing::debug;
use url::Url;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub registry: Option<RegistryConfig>,
    pub facade: Option<FacadeConfig>,
    #[serde(default)]
    pub resolution: ResolutionConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub etl: EtlConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RegistryConfig {
    pub base_url: Url,
    pub bearer_token: Option<String>,
    #[serde(default = "default_registry_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FacadeConfig {
    /// Public URI space used for channel ids and rewritten redirects.
    pub base_url: Url,
    #[serde(default = "default_api_port")]
    pub port: u16,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionMode {
    Live,
    #[default]
    LiveWithFallback,
    CacheOnly,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ResolutionConfig {
    #[serde(default)]
    pub mode: ResolutionMode,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    S3,
    #[default]
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default)]
    pub backend: CacheBackend,
    #[serde(default = "default_cache_prefix")]
    pub prefix: String,
    pub s3: Option<S3Config>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::default(),
            prefix: default_cache_prefix(),
            s3: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct S3Config {
    #[serde(default = "default_s3_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_s3_region")]
    pub region: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    #[serde(default)]
    pub allow_http: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EtlConfig {
    pub extract_path: Option<String>,
    #[serde(default = "default_max_rejected_ratio")]
    pub max_rejected_ratio: f64,
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self {
            extract_path: None,
            max_rejected_ratio: default_max_rejected_ratio(),
            retries: default_retries(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            filter: default_log_filter(),
        }
    }
}

fn default_registry_timeout_ms() -> u64 {
    5000
}

fn default_api_port() -> u16 {
    3000
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_cache_prefix() -> String {
    "channels".to_string()
}

fn default_s3_endpoint() -> String {
    "http://localhost:9000".to_string()
}

fn default_s3_region() -> String {
    "us-east-1".to_string()
}

fn default_max_rejected_ratio() -> f64 {
    0.1
}

fn default_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    200
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Settings {
    pub fn new(path: &str) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        Self::from_config(builder.build()?)
    }

    /// Parses settings from TOML text, without file or environment sources.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(config::File::from_str(text, config::FileFormat::Toml))
            .build()?;

        Self::from_config(config)
    }

    fn from_config(config: Config) -> Result<Self, ConfigError> {
        let settings: Settings = config.try_deserialize()?;

        debug!(
            mode = ?settings.resolution.mode,
            backend = ?settings.cache.backend,
            "Parsed settings"
        );

        Ok(settings)
    }

    pub fn registry(&self) -> Result<&RegistryConfig, ConfigError> {
        self.registry
            .as_ref()
            .ok_or_else(|| ConfigError::NotFound("registry".to_string()))
    }

    pub fn facade(&self) -> Result<&FacadeConfig, ConfigError> {
        self.facade
            .as_ref()
            .ok_or_else(|| ConfigError::NotFound("facade".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_settings_use_defaults() {
        let settings = Settings::from_toml("").unwrap();

        assert!(settings.registry.is_none());
        assert_eq!(settings.resolution.mode, ResolutionMode::LiveWithFallback);
        assert_eq!(settings.cache.backend, CacheBackend::Memory);
        assert_eq!(settings.cache.prefix, "channels");
        assert_eq!(settings.etl.retries, 3);
        assert_eq!(settings.logging.format, LogFormat::Pretty);
        assert!(settings.facade().is_err());
    }

    #[test]
    fn test_full_settings_parse() {
        let settings = Settings::from_toml(
            r#"
            [registry]
            base_url = "https://registry.example.org/api"
            bearer_token = "secret"

            [facade]
            base_url = "https://api.example.org/publication-channels"
            port = 8080

            [resolution]
            mode = "cache-only"

            [cache]
            backend = "s3"
            [cache.s3]
            bucket = "channel-cache"
            access_key = "minio"
            secret_key = "minio123"
            allow_http = true

            [logging]
            format = "json"
            "#,
        )
        .unwrap();

        let registry = settings.registry().unwrap();
        assert_eq!(registry.base_url.as_str(), "https://registry.example.org/api");
        assert_eq!(registry.timeout_ms, 5000);
        assert_eq!(settings.facade().unwrap().port, 8080);
        assert_eq!(settings.resolution.mode, ResolutionMode::CacheOnly);
        assert_eq!(settings.cache.backend, CacheBackend::S3);
        assert_eq!(settings.cache.s3.as_ref().unwrap().region, "us-east-1");
        assert_eq!(settings.logging.format, LogFormat::Json);
    }
}
