//! # amcrest-stream
//!
//! A micro-crate for reading the event stream of Amcrest devices.
//!
//! The device publishes events on a multipart HTTP response that is held open
//! indefinitely. [`EventStreamReader`] opens that response through any
//! [`http_transport::Transport`] stack and decodes each segment's
//! `key=value;...` payload into an [`Event`]. [`StreamSupervisor`] keeps a
//! reader alive across disconnects and gives up after a run of consecutive
//! failures.
//!
//! ```rust,no_run
//! use amcrest_stream::{
//!     CancellationToken, EventStreamReader, StreamConfig, StreamSupervisor, SupervisorConfig,
//! };
//! use http_transport::{DigestAuth, HttpTransport};
//!
//! # async fn run() -> amcrest_stream::Result<()> {
//! let transport = DigestAuth::new(HttpTransport::new(), "admin", "password");
//! let reader = EventStreamReader::new(
//!     transport,
//!     "http://192.168.1.108/cgi-bin/eventManager.cgi?action=attach&codes=[All]",
//!     StreamConfig::default(),
//! );
//!
//! let mut events = StreamSupervisor::spawn(reader, SupervisorConfig::default(), CancellationToken::new())?;
//! while let Some(event) = events.recv().await {
//!     println!("{} {} {}", event.code, event.action, event.index);
//! }
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod event;
pub mod multipart;
mod payload;
mod reader;
mod supervisor;

pub use config::{StreamConfig, SupervisorConfig, EVENT_STREAM_PATH};
pub use error::{FramingError, Result, StreamError};
pub use event::Event;
pub use payload::{parse_payload, payload_to_event};
pub use reader::{EventSource, EventStream, EventStreamReader};
pub use supervisor::{SupervisedStream, StreamSupervisor, SupervisorOutcome, SupervisorState};

pub use tokio_util::sync::CancellationToken;
