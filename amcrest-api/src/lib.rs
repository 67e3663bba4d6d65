//! High-level API for Amcrest doorbells
//!
//! This crate connects to a device over digest-authenticated HTTP, reads its
//! metadata and configuration, and opens its event stream. Transport layers
//! live in the private `http-transport` crate and the stream reader in
//! `amcrest-stream`.
//!
//! ```rust,no_run
//! use amcrest_api::{AmcrestDevice, CancellationToken, DeviceConfig};
//!
//! # async fn run() -> amcrest_api::Result<()> {
//! let device = AmcrestDevice::connect(DeviceConfig::from_env()?).await?;
//! println!("{} {}", device.device_type(), device.serial_number());
//!
//! let mut events = device.open_reliable_event_stream(10, CancellationToken::new())?;
//! while let Some(event) = events.recv().await {
//!     if event.code == "_DoTalkAction_" && event.data_field("Action").as_deref() == Some("Invite") {
//!         println!("Doorbell pressed");
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod device;
pub mod error;
pub mod logging;
pub mod parsers;

pub use config::{DeviceConfig, DEFAULT_DEVICE_TYPE};
pub use device::{AmcrestDevice, DeviceInfo, StorageUsage};
pub use error::{ApiError, Result};

pub use amcrest_stream::{
    CancellationToken, Event, EventStream, SupervisedStream, SupervisorConfig, SupervisorOutcome,
    SupervisorState,
};
