//! Amcrest device client.
//!
//! [`AmcrestDevice`] holds two transport stacks built from the same
//! credentials: a retried, digest-authenticated one with a short timeout for
//! metadata and configuration calls, and a digest-authenticated one for the
//! long-lived event stream. Each stack has its own digest session.

use std::collections::HashMap;
use std::sync::Arc;

use amcrest_stream::{
    CancellationToken, EventSource, EventStream, EventStreamReader, SupervisedStream,
    StreamSupervisor, SupervisorConfig, EVENT_STREAM_PATH,
};
use http_transport::{DigestAuth, HttpTransport, Request, Retry, RetryPolicy, Transport};
use serde::{Deserialize, Serialize};

use crate::config::DeviceConfig;
use crate::error::{ApiError, Result};
use crate::parsers::{parse_many_kv, parse_one_kv};

const STORAGE_TOTAL_KEY: &str = "list.info[0].Detail[0].TotalBytes";
const STORAGE_USED_KEY: &str = "list.info[0].Detail[0].UsedBytes";
const CONFIG_KEY_PREFIX: &str = "table.All.";
const LIGHT_MODE_KEY: &str = "Lighting_V2[0][0][1].Mode";
const LIGHT_STATE_KEY: &str = "Lighting_V2[0][0][1].State";

/// Static device metadata read on connect
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub serial_number: String,
    pub device_type: String,
    pub software_version: String,
}

/// Storage figures from the device's SD card
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StorageUsage {
    pub total_bytes: f64,
    pub used_bytes: f64,
}

impl StorageUsage {
    /// Used space as a percentage, 0 when the card reports no capacity
    pub fn used_percent(&self) -> f64 {
        if self.total_bytes <= 0.0 {
            return 0.0;
        }
        self.used_bytes * 100.0 / self.total_bytes
    }

    pub fn used_gib(&self) -> f64 {
        self.used_bytes / 1024.0 / 1024.0 / 1024.0
    }
}

/// A connected Amcrest device
pub struct AmcrestDevice {
    url: String,
    client: Arc<dyn Transport>,
    stream_client: Arc<dyn Transport>,
    config: DeviceConfig,
    info: DeviceInfo,
}

impl AmcrestDevice {
    /// Connect to a device and read its metadata.
    ///
    /// Fails if any metadata call fails, or if the device type does not match
    /// [`DeviceConfig::expected_device_type`].
    pub async fn connect(config: DeviceConfig) -> Result<Self> {
        config.validate()?;

        let client = Retry::new(
            DigestAuth::new(
                HttpTransport::with_timeout(config.metadata_timeout),
                config.username.clone(),
                config.password.clone(),
            ),
            RetryPolicy::default().with_max_attempts(config.metadata_retries),
        );
        let stream_client = DigestAuth::new(
            HttpTransport::with_timeout(config.stream.stream_timeout),
            config.username.clone(),
            config.password.clone(),
        );

        Self::connect_with(config, Arc::new(client), Arc::new(stream_client)).await
    }

    /// Connect using caller-built transport stacks
    pub async fn connect_with(
        config: DeviceConfig,
        client: Arc<dyn Transport>,
        stream_client: Arc<dyn Transport>,
    ) -> Result<Self> {
        let mut device = Self {
            url: config.base_url().to_string(),
            client,
            stream_client,
            config,
            info: DeviceInfo {
                serial_number: String::new(),
                device_type: String::new(),
                software_version: String::new(),
            },
        };

        device.info = DeviceInfo {
            serial_number: device.magic_box("getSerialNo").await?,
            device_type: device.magic_box("getDeviceType").await?,
            software_version: device.magic_box("getSoftwareVersion").await?,
        };

        if let Some(expected) = &device.config.expected_device_type {
            if &device.info.device_type != expected {
                return Err(ApiError::UnexpectedDevice {
                    expected: expected.clone(),
                    actual: device.info.device_type.clone(),
                });
            }
        }

        tracing::info!(
            "Connected to {} {} ({})",
            device.info.device_type,
            device.info.serial_number,
            device.info.software_version
        );

        Ok(device)
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn serial_number(&self) -> &str {
        &self.info.serial_number
    }

    pub fn device_type(&self) -> &str {
        &self.info.device_type
    }

    pub fn software_version(&self) -> &str {
        &self.info.software_version
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// GET `uri` (relative to the device URL) and return the body as text
    pub async fn request(&self, uri: &str) -> Result<String> {
        let request = Request::get(&format!("{}{}", self.url, uri))?;
        tracing::debug!("Request {} {}", request.method(), request.url());

        let response = self.client.send(request).await?;
        if !response.status().is_success() {
            return Err(ApiError::HttpStatus(response.status()));
        }

        Ok(response.text().await?)
    }

    async fn magic_box(&self, action: &str) -> Result<String> {
        let text = self
            .request(&format!("/cgi-bin/magicBox.cgi?action={action}"))
            .await?;
        let (_, value) = parse_one_kv(&text);
        Ok(value)
    }

    /// Raw storage details, one entry per `key=value` line
    pub async fn get_storage_info(&self) -> Result<HashMap<String, String>> {
        let info = self
            .request("/cgi-bin/storageDevice.cgi?action=getDeviceAllInfo")
            .await?;
        Ok(parse_many_kv(&info, '\n'))
    }

    /// Total and used bytes of the first storage device
    pub async fn storage_usage(&self) -> Result<StorageUsage> {
        let info = self.get_storage_info().await?;
        storage_usage_from(&info)
    }

    /// All configuration values, with the `table.All.` key prefix removed
    pub async fn get_config(&self) -> Result<HashMap<String, String>> {
        let info = self
            .request("/cgi-bin/configManager.cgi?action=getConfig&name=All")
            .await?;

        Ok(parse_many_kv(&info, '\n')
            .into_iter()
            .map(|(key, value)| match key.strip_prefix(CONFIG_KEY_PREFIX) {
                Some(stripped) => (stripped.to_string(), value),
                None => (key, value),
            })
            .collect())
    }

    /// Set one or more configuration values in a single request
    pub async fn set_config(&self, values: &[(&str, &str)]) -> Result<()> {
        if values.is_empty() {
            return Err(ApiError::Configuration(
                "set_config needs at least one value".to_string(),
            ));
        }

        let mut uri = "/cgi-bin/configManager.cgi?action=setConfig".to_string();
        for (key, value) in values {
            uri.push_str(&format!("&{key}={value}"));
        }

        self.request(&uri).await?;
        Ok(())
    }

    /// Force the light on, or return it to automatic mode
    pub async fn set_light(&self, on: bool) -> Result<()> {
        let (mode, state) = if on { ("ForceOn", "On") } else { ("Auto", "Flicker") };
        self.set_config(&[(LIGHT_MODE_KEY, mode), (LIGHT_STATE_KEY, state)])
            .await
    }

    /// Full URL of the device's event stream
    pub fn event_stream_url(&self) -> String {
        format!("{}{}", self.url, EVENT_STREAM_PATH)
    }

    /// Reader for the device's event stream
    pub fn event_reader(&self) -> EventStreamReader<Arc<dyn Transport>> {
        EventStreamReader::new(
            Arc::clone(&self.stream_client),
            self.event_stream_url(),
            self.config.stream.clone(),
        )
    }

    /// Open the event stream once. It ends when the device closes it.
    pub async fn open_event_stream(&self, cancel: &CancellationToken) -> Result<EventStream> {
        Ok(self.event_reader().open(cancel).await?)
    }

    /// Open an event stream that reconnects on its own.
    ///
    /// The returned stream closes after `max_consecutive_failures` failed
    /// connections in a row, or when `cancel` fires.
    pub fn open_reliable_event_stream(
        &self,
        max_consecutive_failures: u32,
        cancel: CancellationToken,
    ) -> Result<SupervisedStream> {
        let config = SupervisorConfig::default()
            .with_max_consecutive_failures(max_consecutive_failures)
            .with_buffer_size(self.config.stream.event_buffer_size);
        self.open_supervised_event_stream(config, cancel)
    }

    /// Like [`Self::open_reliable_event_stream`] with full control over the supervisor
    pub fn open_supervised_event_stream(
        &self,
        config: SupervisorConfig,
        cancel: CancellationToken,
    ) -> Result<SupervisedStream> {
        Ok(StreamSupervisor::spawn(self.event_reader(), config, cancel)?)
    }
}

impl std::fmt::Debug for AmcrestDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmcrestDevice")
            .field("url", &self.url)
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

fn storage_usage_from(info: &HashMap<String, String>) -> Result<StorageUsage> {
    let number = |key: &str| -> Result<f64> {
        let value = info
            .get(key)
            .ok_or_else(|| ApiError::ParseError(format!("Missing {key}")))?;
        value
            .trim()
            .parse::<f64>()
            .map_err(|e| ApiError::ParseError(format!("{key}={value}: {e}")))
    };

    Ok(StorageUsage {
        total_bytes: number(STORAGE_TOTAL_KEY)?,
        used_bytes: number(STORAGE_USED_KEY)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_usage_from_info() {
        let info = HashMap::from([
            (STORAGE_TOTAL_KEY.to_string(), "4294967296.000000".to_string()),
            (STORAGE_USED_KEY.to_string(), "1073741824.000000".to_string()),
        ]);

        let usage = storage_usage_from(&info).unwrap();
        assert_eq!(usage.used_percent(), 25.0);
        assert_eq!(usage.used_gib(), 1.0);
    }

    #[test]
    fn test_storage_usage_missing_or_invalid() {
        let info = HashMap::from([(STORAGE_TOTAL_KEY.to_string(), "100".to_string())]);
        assert!(matches!(storage_usage_from(&info), Err(ApiError::ParseError(_))));

        let info = HashMap::from([
            (STORAGE_TOTAL_KEY.to_string(), "100".to_string()),
            (STORAGE_USED_KEY.to_string(), "lots".to_string()),
        ]);
        assert!(matches!(storage_usage_from(&info), Err(ApiError::ParseError(_))));
    }

    #[test]
    fn test_used_percent_with_no_capacity() {
        let usage = StorageUsage {
            total_bytes: 0.0,
            used_bytes: 0.0,
        };
        assert_eq!(usage.used_percent(), 0.0);
    }
}
