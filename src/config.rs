use crate::store::StoreConfig;

use chrono::NaiveTime;
use hyper::http::uri::{InvalidUri, Uri};
use serde::Deserialize;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::num::NonZeroU64;
#[cfg(feature = "multi-thread")]
use std::num::NonZeroUsize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Environment variable taking precedence over `source.uri`
pub const DATA_URI_ENV: &str = "IP_DATA_URL";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("No data source is configured, set IP_DATA_URL or source.uri")]
    NoDataUri,
    #[error(r#"Data source URI "{uri}" is invalid: {error}"#)]
    InvalidDataUri { uri: String, error: InvalidUri },
    #[error(r#"threads must be a positive integer or "cores", not "{0}""#)]
    InvalidThreads(String),
}

#[derive(Deserialize, Debug)]
pub struct Config {
    #[serde(default = "Config::default_host")]
    pub host: SocketAddr,
    #[serde(default = "Config::default_log_level")]
    pub log_level: log::Level,
    #[cfg(feature = "multi-thread")]
    #[serde(default)]
    pub threads: ConfigThreads,
    #[serde(default = "Config::default_ip_headers")]
    pub ip_headers: Vec<String>,
    #[serde(default = "Config::default_ip_headers_recursive")]
    pub ip_headers_recursive: bool,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub source: SourceConfig,
}

impl Config {
    fn default_host() -> SocketAddr {
        ([127, 0, 0, 1], 8080).into()
    }

    fn default_log_level() -> log::Level {
        log::Level::Info
    }

    fn default_ip_headers() -> Vec<String> {
        vec!["X-FORWARDED-FOR".into()]
    }

    fn default_ip_headers_recursive() -> bool {
        true
    }

    /// Take the data source URI from `value` if it is set, usually the environment
    pub fn with_data_uri_from(mut self, value: Option<String>) -> Result<Self, ConfigError> {
        if let Some(uri) = value.filter(|uri| !uri.trim().is_empty()) {
            let parsed = uri
                .trim()
                .parse()
                .map_err(|error| ConfigError::InvalidDataUri { uri, error })?;
            self.source.uri = Some(DataUri(parsed));
        }
        Ok(self)
    }

    pub fn data_uri(&self) -> Result<&Uri, ConfigError> {
        self.source
            .uri
            .as_ref()
            .map(|uri| &uri.0)
            .ok_or(ConfigError::NoDataUri)
    }
}

#[cfg(feature = "multi-thread")]
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(try_from = "ThreadsConfig")]
pub enum ConfigThreads {
    #[default]
    Cores,
    Custom(NonZeroUsize),
}

#[cfg(feature = "multi-thread")]
#[derive(Deserialize)]
#[serde(untagged)]
enum ThreadsConfig {
    Number(NonZeroUsize),
    Keyword(String),
}

#[cfg(feature = "multi-thread")]
impl TryFrom<ThreadsConfig> for ConfigThreads {
    type Error = ConfigError;

    fn try_from(value: ThreadsConfig) -> Result<Self, Self::Error> {
        match value {
            ThreadsConfig::Number(threads) => Ok(Self::Custom(threads)),
            ThreadsConfig::Keyword(keyword) if keyword.eq_ignore_ascii_case("cores") => {
                Ok(Self::Cores)
            }
            ThreadsConfig::Keyword(keyword) => Err(ConfigError::InvalidThreads(keyword)),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct DataUri(#[serde(with = "http_serde::uri")] Uri);

#[derive(Deserialize, Debug, Clone)]
pub struct SourceConfig {
    #[serde(default, alias = "url")]
    uri: Option<DataUri>,
    #[serde(default)]
    timeout: FetchTimeout,
    #[serde(default = "SourceConfig::default_refresh_at")]
    pub refresh_at: NaiveTime,
}

impl SourceConfig {
    fn default_refresh_at() -> NaiveTime {
        NaiveTime::from_hms_opt(0, 30, 0).unwrap_or_default()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout.0
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            uri: None,
            timeout: FetchTimeout::default(),
            refresh_at: Self::default_refresh_at(),
        }
    }
}

const DEFAULT_FETCH_TIMEOUT_SECONDS: u64 = 600;

#[derive(Deserialize, Debug, Clone, Copy)]
#[serde(from = "NonZeroU64")]
struct FetchTimeout(Duration);

impl Default for FetchTimeout {
    fn default() -> Self {
        Self(Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECONDS))
    }
}

impl From<NonZeroU64> for FetchTimeout {
    fn from(value: NonZeroU64) -> Self {
        Self(Duration::from_secs(value.get()))
    }
}

/// Read the TOML config, a missing file means defaults everywhere
pub fn parse_config<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let toml_string = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(error) if error.kind() == ErrorKind::NotFound => String::new(),
        Err(error) => return Err(error.into()),
    };
    let config: Config = toml::from_str(&toml_string)?;
    Ok(config.with_data_uri_from(std::env::var(DATA_URI_ENV).ok())?)
}
