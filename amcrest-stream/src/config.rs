//! Configuration types for the amcrest-stream crate
//!
//! [`StreamConfig`] controls a single open event stream, and
//! [`SupervisorConfig`] controls how the supervisor reconnects when the
//! stream drops.

use std::time::Duration;

use crate::error::StreamError;

/// Path of the device's "all events" stream, relative to the device URL
pub const EVENT_STREAM_PATH: &str = "/cgi-bin/eventManager.cgi?action=attach&codes=[All]";

/// Configuration for a single [`crate::EventStreamReader`]
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Request timeout for the stream request. The device holds the
    /// connection open, so this is effectively the maximum stream lifetime.
    /// Default: 1 hour
    pub stream_timeout: Duration,

    /// Capacity of the bounded event channel. A full channel blocks the
    /// reader, which in turn stops reading from the network.
    /// Default: 10
    pub event_buffer_size: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            stream_timeout: Duration::from_secs(3600),
            event_buffer_size: 10,
        }
    }
}

impl StreamConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> Result<(), StreamError> {
        if self.stream_timeout == Duration::ZERO {
            return Err(StreamError::Configuration(
                "Stream timeout must be greater than 0".to_string(),
            ));
        }

        if self.event_buffer_size == 0 {
            return Err(StreamError::Configuration(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn with_stream_timeout(mut self, timeout: Duration) -> Self {
        self.stream_timeout = timeout;
        self
    }

    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = size;
        self
    }
}

/// Configuration for the [`crate::StreamSupervisor`]
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Consecutive failed opens before giving up for good
    /// Default: 10
    pub max_consecutive_failures: u32,

    /// Pause after a failed open, or a stream that closed with no events
    /// Default: 5 seconds
    pub backoff_delay: Duration,

    /// Capacity of the outward event channel
    /// Default: 10
    pub event_buffer_size: usize,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_consecutive_failures: 10,
            backoff_delay: Duration::from_secs(5),
            event_buffer_size: 10,
        }
    }
}

impl SupervisorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconnect quickly, for tests and local development
    pub fn fast_reconnect() -> Self {
        Self {
            backoff_delay: Duration::from_millis(250),
            ..Default::default()
        }
    }

    /// Keep trying for a long time, suited to devices that reboot nightly
    pub fn persistent() -> Self {
        Self {
            max_consecutive_failures: 120,
            backoff_delay: Duration::from_secs(15),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), StreamError> {
        if self.max_consecutive_failures == 0 {
            return Err(StreamError::Configuration(
                "Max consecutive failures must be greater than 0".to_string(),
            ));
        }

        if self.event_buffer_size == 0 {
            return Err(StreamError::Configuration(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn with_max_consecutive_failures(mut self, max: u32) -> Self {
        self.max_consecutive_failures = max;
        self
    }

    pub fn with_backoff_delay(mut self, delay: Duration) -> Self {
        self.backoff_delay = delay;
        self
    }

    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = size;
        self
    }
}
