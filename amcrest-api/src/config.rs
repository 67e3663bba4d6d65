//! Device connection configuration

use std::time::Duration;

use amcrest_stream::StreamConfig;
use http_transport::Url;

use crate::error::{ApiError, Result};

/// Device model the client talks to unless told otherwise
pub const DEFAULT_DEVICE_TYPE: &str = "AD410";

/// Configuration for connecting to an Amcrest device
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Base URL of the device, e.g. `http://192.168.1.108`
    pub url: String,

    /// Default: "admin"
    pub username: String,

    pub password: String,

    /// Reject devices reporting another type. `None` accepts any device.
    /// Default: Some("AD410")
    pub expected_device_type: Option<String>,

    /// Timeout for short metadata and configuration requests
    /// Default: 5 seconds
    pub metadata_timeout: Duration,

    /// Attempts per metadata request
    /// Default: 5
    pub metadata_retries: u32,

    /// Settings for the long-lived event stream
    pub stream: StreamConfig,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            username: "admin".to_string(),
            password: String::new(),
            expected_device_type: Some(DEFAULT_DEVICE_TYPE.to_string()),
            metadata_timeout: Duration::from_secs(5),
            metadata_retries: 5,
            stream: StreamConfig::default(),
        }
    }
}

impl DeviceConfig {
    pub fn new(url: impl Into<String>, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            username: username.into(),
            password: password.into(),
            ..Default::default()
        }
    }

    /// Read `AD410_URL`, `AD410_USERNAME` and `AD410_PASSWORD`.
    ///
    /// The URL is required; the username defaults to `admin` and the password
    /// to empty.
    pub fn from_env() -> Result<Self> {
        let url = std::env::var("AD410_URL")
            .map_err(|_| ApiError::Configuration("AD410_URL is not set".to_string()))?;
        let username = std::env::var("AD410_USERNAME").unwrap_or_else(|_| "admin".to_string());
        let password = std::env::var("AD410_PASSWORD").unwrap_or_default();

        let config = Self::new(url, username, password);
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.url)
            .map_err(|e| ApiError::Configuration(format!("Invalid device URL {:?}: {e}", self.url)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ApiError::Configuration(format!(
                "Device URL must be http or https, got {}",
                url.scheme()
            )));
        }

        if self.metadata_timeout == Duration::ZERO {
            return Err(ApiError::Configuration(
                "Metadata timeout must be greater than 0".to_string(),
            ));
        }

        if self.metadata_retries == 0 {
            return Err(ApiError::Configuration(
                "Metadata retries must be greater than 0".to_string(),
            ));
        }

        self.stream.validate()?;
        Ok(())
    }

    /// Accept any device type
    pub fn any_device(mut self) -> Self {
        self.expected_device_type = None;
        self
    }

    pub fn with_expected_device_type(mut self, device_type: impl Into<String>) -> Self {
        self.expected_device_type = Some(device_type.into());
        self
    }

    pub fn with_metadata_timeout(mut self, timeout: Duration) -> Self {
        self.metadata_timeout = timeout;
        self
    }

    pub fn with_metadata_retries(mut self, retries: u32) -> Self {
        self.metadata_retries = retries;
        self
    }

    pub fn with_stream_config(mut self, stream: StreamConfig) -> Self {
        self.stream = stream;
        self
    }

    /// Base URL without a trailing slash
    pub(crate) fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }
}
