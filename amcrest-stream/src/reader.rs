//! Event stream reader.
//!
//! Opens the device's long-lived multipart response and spawns a task that
//! turns each segment into an [`Event`]. The task ends when the device closes
//! the stream, the body errors, the consumer drops the [`EventStream`], or
//! the cancellation token fires.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use http_transport::header::CONTENT_TYPE;
use http_transport::{Body, Request, Transport};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::StreamConfig;
use crate::error::{Result, StreamError};
use crate::event::Event;
use crate::multipart::{parse_boundary, MultipartDecoder};
use crate::payload::payload_to_event;

/// Receiving half of one open event stream.
///
/// `recv` returns `None` once the underlying connection has ended.
#[derive(Debug)]
pub struct EventStream {
    receiver: mpsc::Receiver<Event>,
}

impl EventStream {
    pub fn new(receiver: mpsc::Receiver<Event>) -> Self {
        Self { receiver }
    }

    pub async fn recv(&mut self) -> Option<Event> {
        self.receiver.recv().await
    }

    pub fn into_inner(self) -> mpsc::Receiver<Event> {
        self.receiver
    }
}

/// Something that can open a fresh event stream.
///
/// The supervisor only depends on this trait, so it can be driven by a real
/// [`EventStreamReader`] or by a scripted source in tests.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Open a new stream. The stream's reader task must stop when `cancel`
    /// fires.
    async fn open(&self, cancel: &CancellationToken) -> Result<EventStream>;
}

#[async_trait]
impl<S: EventSource + ?Sized> EventSource for Arc<S> {
    async fn open(&self, cancel: &CancellationToken) -> Result<EventStream> {
        (**self).open(cancel).await
    }
}

/// Reads events from the device's multipart event stream.
#[derive(Debug)]
pub struct EventStreamReader<T> {
    transport: T,
    url: String,
    config: StreamConfig,
}

impl<T: Transport> EventStreamReader<T> {
    pub fn new(transport: T, url: impl Into<String>, config: StreamConfig) -> Self {
        Self {
            transport,
            url: url.into(),
            config,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }
}

#[async_trait]
impl<T: Transport> EventSource for EventStreamReader<T> {
    async fn open(&self, cancel: &CancellationToken) -> Result<EventStream> {
        self.config.validate()?;

        tracing::info!("Opening event stream {}", self.url);

        let request = Request::get(&self.url)?.with_timeout(self.config.stream_timeout);
        let response = self.transport.send(request).await?;

        if !response.status().is_success() {
            return Err(StreamError::UnexpectedStatus(response.status()));
        }

        let content_type = response.header_str(CONTENT_TYPE.as_str()).unwrap_or_default();
        let boundary = parse_boundary(content_type)?;

        let (sender, receiver) = mpsc::channel(self.config.event_buffer_size);
        tokio::spawn(read_segments(
            response.into_body(),
            boundary,
            sender,
            cancel.child_token(),
        ));

        tracing::info!("Connection open, listening to stream...");
        Ok(EventStream::new(receiver))
    }
}

/// Reader task: decode segments from `body` and forward them as events
async fn read_segments(
    body: Body,
    boundary: String,
    sender: mpsc::Sender<Event>,
    cancel: CancellationToken,
) {
    let mut chunks = body.into_stream();
    let mut decoder = MultipartDecoder::new(&boundary);

    'read: loop {
        let chunk = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!("Event stream cancelled");
                break 'read;
            }
            chunk = chunks.next() => chunk,
        };

        match chunk {
            Some(Ok(bytes)) => decoder.feed(&bytes),
            Some(Err(e)) => {
                tracing::warn!("Error reading event stream: {}", e);
                break 'read;
            }
            None => {
                if let Some(e) = decoder.finish() {
                    tracing::warn!("Event stream ended mid-segment: {}", e);
                }
                break 'read;
            }
        }

        while let Some(segment) = decoder.next_segment() {
            let part = match segment {
                Ok(part) => part,
                Err(e) => {
                    tracing::warn!("Skipping stream segment: {}", e);
                    continue;
                }
            };

            let payload = part.into_body();
            tracing::debug!(
                "Received {} bytes: {}",
                payload.len(),
                String::from_utf8_lossy(&payload)
            );

            // Blocks while the channel is full
            let delivered = tokio::select! {
                _ = cancel.cancelled() => false,
                result = sender.send(payload_to_event(&payload)) => result.is_ok(),
            };
            if !delivered {
                break 'read;
            }
        }

        if decoder.is_done() {
            break 'read;
        }
    }

    tracing::info!("Closing event stream...");
}
