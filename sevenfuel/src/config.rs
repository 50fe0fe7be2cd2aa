use std::{
    path::{Path, PathBuf},
    time::Duration,
};

/// Root of the store locator API, the price feed lives under `/fuelPrices`.
pub const DEFAULT_BASE_URL: &str = "https://www.7eleven.com.au/storelocator-retail/mulesoft";
/// Store number of the Chadstone store.
pub const DEFAULT_STORE_ID: &str = "1259";
/// Position of the E95 (PULP) quote in the feed of [DEFAULT_STORE_ID].
pub const DEFAULT_GRADE_INDEX: usize = 5;
pub const DEFAULT_OUTPUT_PATH: &str = "fuel_prices.csv";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_GRADE_LABEL: &str = "E95 (PULP)";
pub const DEFAULT_STORE_LABEL: &str = "Chadstone";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("base url '{0}' must start with http:// or https://")]
    InvalidBaseUrl(String),
    #[error("store id must not be empty")]
    EmptyStoreId,
    #[error("store id '{0}' may only contain ASCII letters and digits")]
    InvalidStoreId(String),
    #[error("output path must not be empty")]
    EmptyOutputPath,
    #[error("poll interval must be greater than zero")]
    ZeroPollInterval,
    #[error("request timeout must be greater than zero when set")]
    ZeroRequestTimeout,
}

/// Validated settings of a [crate::PriceLogger]. Can only be created through [Config::builder].
#[derive(Debug, Clone)]
pub struct Config {
    base_url: String,
    store_id: String,
    grade_index: usize,
    output_path: PathBuf,
    poll_interval: Duration,
    request_timeout: Option<Duration>,
    grade_label: String,
    store_label: String,
}

/// Allows to override the defaults of a [Config], see [Config::builder].
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    base_url: String,
    store_id: String,
    grade_index: usize,
    output_path: PathBuf,
    poll_interval: Duration,
    request_timeout: Option<Duration>,
    grade_label: String,
    store_label: String,
}

impl Config {
    /// Create a [ConfigBuilder] starting from the default store and fuel grade.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder {
            base_url: DEFAULT_BASE_URL.into(),
            store_id: DEFAULT_STORE_ID.into(),
            grade_index: DEFAULT_GRADE_INDEX,
            output_path: DEFAULT_OUTPUT_PATH.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            request_timeout: None,
            grade_label: DEFAULT_GRADE_LABEL.into(),
            store_label: DEFAULT_STORE_LABEL.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn store_id(&self) -> &str {
        &self.store_id
    }

    pub fn grade_index(&self) -> usize {
        self.grade_index
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Requests never time out when this is `None`.
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout
    }

    pub fn grade_label(&self) -> &str {
        &self.grade_label
    }

    pub fn store_label(&self) -> &str {
        &self.store_label
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::builder()
            .build()
            .expect("default configuration must be valid")
    }
}

impl ConfigBuilder {
    /// Root of the API, without a trailing `/fuelPrices`.
    pub fn base_url(self, base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..self
        }
    }

    pub fn store_id(self, store_id: impl Into<String>) -> Self {
        Self {
            store_id: store_id.into(),
            ..self
        }
    }

    /// Position of the wanted fuel grade in the array returned by the feed.
    pub fn grade_index(self, grade_index: usize) -> Self {
        Self {
            grade_index,
            ..self
        }
    }

    pub fn output_path(self, output_path: impl Into<PathBuf>) -> Self {
        Self {
            output_path: output_path.into(),
            ..self
        }
    }

    pub fn poll_interval(self, poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            ..self
        }
    }

    pub fn request_timeout(self, request_timeout: Option<Duration>) -> Self {
        Self {
            request_timeout,
            ..self
        }
    }

    pub fn grade_label(self, grade_label: impl Into<String>) -> Self {
        Self {
            grade_label: grade_label.into(),
            ..self
        }
    }

    pub fn store_label(self, store_label: impl Into<String>) -> Self {
        Self {
            store_label: store_label.into(),
            ..self
        }
    }

    /// Validate the options and create the [Config].
    pub fn build(self) -> Result<Config, ConfigError> {
        let base_url = self.base_url.trim_end_matches('/').to_owned();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::InvalidBaseUrl(self.base_url));
        }

        if self.store_id.trim().is_empty() {
            return Err(ConfigError::EmptyStoreId);
        }

        let store_id = self.store_id.trim();
        if !store_id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ConfigError::InvalidStoreId(self.store_id));
        }
        let store_id = store_id.to_owned();

        if self.output_path.as_os_str().is_empty() {
            return Err(ConfigError::EmptyOutputPath);
        }

        if self.poll_interval.is_zero() {
            return Err(ConfigError::ZeroPollInterval);
        }

        if self.request_timeout.is_some_and(|t| t.is_zero()) {
            return Err(ConfigError::ZeroRequestTimeout);
        }

        Ok(Config {
            base_url,
            store_id,
            grade_index: self.grade_index,
            output_path: self.output_path,
            poll_interval: self.poll_interval,
            request_timeout: self.request_timeout,
            grade_label: self.grade_label,
            store_label: self.store_label,
        })
    }
}
