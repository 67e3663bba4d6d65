//! Reconnecting supervisor for event streams.
//!
//! The supervisor owns one outward event channel and keeps (re)opening an
//! [`EventSource`] behind it:
//!
//! ```text
//!              open ok                  stream closed
//! Connecting ─────────▶ Streaming ──────────────────────▶ Connecting
//!     │                     │ closed before any event
//!     │                     └──────────────▶ Backoff (not counted)
//!     │ open failed
//!     └──────────────▶ failure recorded ──▶ Backoff ──(delay)──▶ Connecting
//!                           │
//!                           └─ limit reached ──▶ Exhausted (terminal)
//! ```
//!
//! Only failed opens count towards the limit. Every event delivered to the
//! consumer resets the counter. Each open gets its own child cancellation
//! token, cancelled as soon as the supervisor stops reading from it.
//!
//! Consumers see a possibly gapped sequence of events and, once the
//! supervisor gives up, a closed channel.

use std::ops::ControlFlow;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::SupervisorConfig;
use crate::error::{Result, StreamError};
use crate::event::Event;
use crate::reader::{EventSource, EventStream};

/// Where the supervisor is in its reconnect cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SupervisorState {
    /// Opening a new stream
    Connecting,
    /// Forwarding events from an open stream
    Streaming,
    /// Waiting before the next connection attempt
    Backoff,
    /// Gave up after too many consecutive failures; needs an external restart
    Exhausted,
}

impl SupervisorState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SupervisorState::Exhausted)
    }
}

/// Why a supervisor stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorOutcome {
    /// The consecutive-failure limit was reached
    Exhausted { consecutive_failures: u32 },
    /// The cancellation token fired
    Cancelled,
    /// The consumer dropped its receiver
    ConsumerDropped,
}

/// Handle to a running supervisor: its events, its state and its task.
#[derive(Debug)]
pub struct SupervisedStream {
    receiver: mpsc::Receiver<Event>,
    state: watch::Receiver<SupervisorState>,
    cancel: CancellationToken,
    task: JoinHandle<SupervisorOutcome>,
}

impl SupervisedStream {
    /// Next event. `None` means the supervisor has stopped for good.
    pub async fn recv(&mut self) -> Option<Event> {
        self.receiver.recv().await
    }

    /// Current supervisor state
    pub fn state(&self) -> SupervisorState {
        *self.state.borrow()
    }

    /// Watch channel that is updated on every state transition
    pub fn state_watch(&self) -> watch::Receiver<SupervisorState> {
        self.state.clone()
    }

    /// Stop the supervisor and any stream it has open
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the supervisor task to finish.
    ///
    /// The event receiver is dropped first, so a supervisor that is still
    /// running stops with [`SupervisorOutcome::ConsumerDropped`].
    pub async fn join(self) -> Result<SupervisorOutcome> {
        let Self { receiver, task, .. } = self;
        drop(receiver);
        task.await
            .map_err(|e| StreamError::Shutdown(format!("Supervisor task failed: {e}")))
    }
}

/// Keeps an event stream alive across disconnects.
pub struct StreamSupervisor<S> {
    source: S,
    config: SupervisorConfig,
    cancel: CancellationToken,
    sender: mpsc::Sender<Event>,
    state: watch::Sender<SupervisorState>,
    consecutive_failures: u32,
}

impl<S: EventSource + 'static> StreamSupervisor<S> {
    /// Validate `config` and start supervising `source` on a new task
    pub fn spawn(
        source: S,
        config: SupervisorConfig,
        cancel: CancellationToken,
    ) -> Result<SupervisedStream> {
        config.validate()?;

        let (sender, receiver) = mpsc::channel(config.event_buffer_size);
        let (state_tx, state_rx) = watch::channel(SupervisorState::Connecting);

        let supervisor = Self {
            source,
            config,
            cancel: cancel.clone(),
            sender,
            state: state_tx,
            consecutive_failures: 0,
        };
        let task = tokio::spawn(supervisor.run());

        Ok(SupervisedStream {
            receiver,
            state: state_rx,
            cancel,
            task,
        })
    }

    async fn run(mut self) -> SupervisorOutcome {
        let mut state = SupervisorState::Connecting;

        loop {
            self.state.send_replace(state);

            let next = match state {
                SupervisorState::Connecting => self.connect().await,
                SupervisorState::Backoff => self.backoff().await,
                SupervisorState::Exhausted => {
                    tracing::error!(
                        "Event stream failed {} times in a row, giving up",
                        self.consecutive_failures
                    );
                    ControlFlow::Break(SupervisorOutcome::Exhausted {
                        consecutive_failures: self.consecutive_failures,
                    })
                }
                // Streaming is entered and left inside connect()
                SupervisorState::Streaming => ControlFlow::Continue(SupervisorState::Connecting),
            };

            match next {
                ControlFlow::Continue(next) => state = next,
                ControlFlow::Break(outcome) => {
                    if outcome == SupervisorOutcome::Cancelled {
                        tracing::info!("Event stream supervisor cancelled");
                    }
                    return outcome;
                }
            }
        }
    }

    /// Connecting: open the source and, on success, stream from it
    async fn connect(&mut self) -> ControlFlow<SupervisorOutcome, SupervisorState> {
        // Stops the reader behind this open whichever way we leave
        let stream_cancel = self.cancel.child_token();
        let _stream_guard = stream_cancel.clone().drop_guard();

        let opened = tokio::select! {
            _ = self.cancel.cancelled() => return ControlFlow::Break(SupervisorOutcome::Cancelled),
            opened = self.source.open(&stream_cancel) => opened,
        };

        match opened {
            Ok(stream) => {
                self.state.send_replace(SupervisorState::Streaming);
                self.stream(stream).await
            }
            Err(e) => {
                tracing::warn!("Error opening stream: {}", e);
                ControlFlow::Continue(self.record_failure())
            }
        }
    }

    /// Streaming: forward events until the inner stream closes
    async fn stream(&mut self, mut stream: EventStream) -> ControlFlow<SupervisorOutcome, SupervisorState> {
        let mut delivered = 0usize;

        loop {
            let event = tokio::select! {
                _ = self.cancel.cancelled() => return ControlFlow::Break(SupervisorOutcome::Cancelled),
                _ = self.sender.closed() => return self.consumer_dropped(),
                event = stream.recv() => event,
            };

            let Some(event) = event else {
                break;
            };

            let sent = tokio::select! {
                _ = self.cancel.cancelled() => return ControlFlow::Break(SupervisorOutcome::Cancelled),
                sent = self.sender.send(event) => sent,
            };
            if sent.is_err() {
                return self.consumer_dropped();
            }

            delivered += 1;
            self.consecutive_failures = 0;
        }

        if delivered == 0 {
            // A quiet device is not a failure, but pause before reopening
            tracing::info!("Event stream closed without events, reconnecting after backoff");
            ControlFlow::Continue(SupervisorState::Backoff)
        } else {
            tracing::info!("Event stream closed after {} events, reconnecting", delivered);
            ControlFlow::Continue(SupervisorState::Connecting)
        }
    }

    fn consumer_dropped(&self) -> ControlFlow<SupervisorOutcome, SupervisorState> {
        tracing::debug!("Event consumer went away, stopping supervisor");
        ControlFlow::Break(SupervisorOutcome::ConsumerDropped)
    }

    /// Backoff: wait before reconnecting
    async fn backoff(&mut self) -> ControlFlow<SupervisorOutcome, SupervisorState> {
        tokio::select! {
            _ = self.cancel.cancelled() => ControlFlow::Break(SupervisorOutcome::Cancelled),
            _ = self.sender.closed() => self.consumer_dropped(),
            _ = tokio::time::sleep(self.config.backoff_delay) => {
                ControlFlow::Continue(SupervisorState::Connecting)
            }
        }
    }

    fn record_failure(&mut self) -> SupervisorState {
        self.consecutive_failures += 1;
        if self.consecutive_failures >= self.config.max_consecutive_failures {
            SupervisorState::Exhausted
        } else {
            tracing::debug!(
                "Reconnecting in {:?} (failure {}/{})",
                self.config.backoff_delay,
                self.consecutive_failures,
                self.config.max_consecutive_failures
            );
            SupervisorState::Backoff
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use http_transport::TransportError;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::time::Instant;

    /// What the scripted source does on one `open` call
    enum Script {
        Fail,
        Events(Vec<&'static str>),
        Hang,
        /// Send the events, then hold the stream open until cancelled
        Linger(Vec<&'static str>),
    }

    /// Plays back a script of outcomes, failing once the script runs out
    struct ScriptedSource {
        script: Mutex<VecDeque<Script>>,
        opens: Arc<AtomicU32>,
        reader_alive: Arc<AtomicBool>,
    }

    impl ScriptedSource {
        fn new(script: Vec<Script>) -> (Self, Arc<AtomicU32>) {
            let opens = Arc::new(AtomicU32::new(0));
            let source = Self {
                script: Mutex::new(script.into()),
                opens: Arc::clone(&opens),
                reader_alive: Arc::new(AtomicBool::new(false)),
            };
            (source, opens)
        }

        /// Set while a lingering reader task is running
        fn reader_alive(&self) -> Arc<AtomicBool> {
            Arc::clone(&self.reader_alive)
        }
    }

    #[async_trait]
    impl EventSource for ScriptedSource {
        async fn open(&self, cancel: &CancellationToken) -> Result<EventStream> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop_front().unwrap_or(Script::Fail);

            match next {
                Script::Fail => Err(StreamError::Transport(TransportError::Network(
                    "connection refused".to_string(),
                ))),
                Script::Events(codes) => {
                    let (tx, rx) = mpsc::channel(codes.len().max(1));
                    for code in codes {
                        tx.try_send(Event {
                            code: code.to_string(),
                            action: "Pulse".to_string(),
                            ..Default::default()
                        })
                        .unwrap();
                    }
                    Ok(EventStream::new(rx))
                }
                Script::Hang => {
                    let (tx, rx) = mpsc::channel(1);
                    let cancel = cancel.child_token();
                    tokio::spawn(async move {
                        cancel.cancelled().await;
                        drop(tx);
                    });
                    Ok(EventStream::new(rx))
                }
                Script::Linger(codes) => {
                    let (tx, rx) = mpsc::channel(codes.len().max(1));
                    let cancel = cancel.clone();
                    let alive = Arc::clone(&self.reader_alive);
                    alive.store(true, Ordering::SeqCst);
                    tokio::spawn(async move {
                        for code in codes {
                            let event = Event {
                                code: code.to_string(),
                                ..Default::default()
                            };
                            if tx.send(event).await.is_err() {
                                break;
                            }
                        }
                        cancel.cancelled().await;
                        alive.store(false, Ordering::SeqCst);
                        drop(tx);
                    });
                    Ok(EventStream::new(rx))
                }
            }
        }
    }

    fn config(max: u32) -> SupervisorConfig {
        SupervisorConfig::default().with_max_consecutive_failures(max)
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_source_exhausts_after_max_opens() {
        let (source, opens) = ScriptedSource::new(Vec::new());
        let started = Instant::now();

        let mut stream = StreamSupervisor::spawn(source, config(10), CancellationToken::new()).unwrap();
        assert_eq!(stream.recv().await, None);

        assert_eq!(opens.load(Ordering::SeqCst), 10);
        // A backoff between each pair of attempts
        assert!(started.elapsed() >= Duration::from_secs(5 * 9));
        assert_eq!(stream.state(), SupervisorState::Exhausted);
        assert_eq!(
            stream.join().await.unwrap(),
            SupervisorOutcome::Exhausted {
                consecutive_failures: 10
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_forwarded_across_reconnects() {
        let (source, opens) = ScriptedSource::new(vec![
            Script::Events(vec!["A", "B"]),
            Script::Fail,
            Script::Events(vec!["C"]),
        ]);

        let mut stream = StreamSupervisor::spawn(source, config(2), CancellationToken::new()).unwrap();
        let mut codes = Vec::new();
        while let Some(event) = stream.recv().await {
            codes.push(event.code);
        }

        assert_eq!(codes, vec!["A", "B", "C"]);
        // A, B / fail / C / fail, fail -> exhausted
        assert_eq!(opens.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_event_resets_failure_counter() {
        let (source, opens) = ScriptedSource::new(vec![
            Script::Fail,
            Script::Fail,
            Script::Events(vec!["Recovered"]),
        ]);

        let mut stream = StreamSupervisor::spawn(source, config(3), CancellationToken::new()).unwrap();
        assert_eq!(stream.recv().await.unwrap().code, "Recovered");
        assert_eq!(stream.recv().await, None);

        // Without the reset the fourth open would have been the last
        assert_eq!(opens.load(Ordering::SeqCst), 6);
        assert_eq!(
            stream.join().await.unwrap(),
            SupervisorOutcome::Exhausted {
                consecutive_failures: 3
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_quiet_streams_never_exhaust() {
        // Twice the failure limit in streams that close with no events
        let mut script: Vec<Script> = (0..6).map(|_| Script::Events(vec![])).collect();
        script.push(Script::Events(vec!["Doorbell"]));
        let (source, opens) = ScriptedSource::new(script);
        let started = Instant::now();

        let mut stream = StreamSupervisor::spawn(source, config(3), CancellationToken::new()).unwrap();
        assert_eq!(stream.recv().await.unwrap().code, "Doorbell");
        assert!(opens.load(Ordering::SeqCst) >= 7);
        // Each quiet stream still waits out a backoff before reopening
        assert!(started.elapsed() >= Duration::from_secs(5 * 6));

        stream.cancel();
        assert_eq!(stream.join().await.unwrap(), SupervisorOutcome::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reader_stopped_when_consumer_drops() {
        let (source, _opens) = ScriptedSource::new(vec![Script::Linger(vec!["A", "B", "C"])]);
        let alive = source.reader_alive();

        let mut stream = StreamSupervisor::spawn(
            source,
            config(3).with_buffer_size(1),
            CancellationToken::new(),
        )
        .unwrap();
        assert_eq!(stream.recv().await.unwrap().code, "A");
        assert!(alive.load(Ordering::SeqCst));

        assert_eq!(
            stream.join().await.unwrap(),
            SupervisorOutcome::ConsumerDropped
        );
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!alive.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_supervisor_notices_dropped_consumer() {
        let (source, _opens) = ScriptedSource::new(vec![Script::Linger(Vec::new())]);
        let alive = source.reader_alive();

        let stream = StreamSupervisor::spawn(source, config(3), CancellationToken::new()).unwrap();
        let mut states = stream.state_watch();
        states
            .wait_for(|state| *state == SupervisorState::Streaming)
            .await
            .unwrap();

        // Nothing is ever sent, so only the closed consumer channel can end this
        assert_eq!(
            stream.join().await.unwrap(),
            SupervisorOutcome::ConsumerDropped
        );
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!alive.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reader_stopped_when_cancelled() {
        let (source, _opens) = ScriptedSource::new(vec![Script::Linger(Vec::new())]);
        let alive = source.reader_alive();
        let cancel = CancellationToken::new();

        let stream = StreamSupervisor::spawn(source, config(3), cancel.clone()).unwrap();
        let mut states = stream.state_watch();
        states
            .wait_for(|state| *state == SupervisorState::Streaming)
            .await
            .unwrap();
        assert!(alive.load(Ordering::SeqCst));

        cancel.cancel();
        assert_eq!(stream.join().await.unwrap(), SupervisorOutcome::Cancelled);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!alive.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_while_streaming() {
        let (source, opens) = ScriptedSource::new(vec![Script::Hang]);
        let cancel = CancellationToken::new();

        let stream = StreamSupervisor::spawn(source, config(3), cancel.clone()).unwrap();
        let mut states = stream.state_watch();
        states
            .wait_for(|state| *state == SupervisorState::Streaming)
            .await
            .unwrap();

        cancel.cancel();
        assert_eq!(stream.join().await.unwrap(), SupervisorOutcome::Cancelled);
        assert_eq!(opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff() {
        let (source, _opens) = ScriptedSource::new(Vec::new());

        let stream = StreamSupervisor::spawn(source, config(10), CancellationToken::new()).unwrap();
        let mut states = stream.state_watch();
        states
            .wait_for(|state| *state == SupervisorState::Backoff)
            .await
            .unwrap();

        stream.cancel();
        assert_eq!(stream.join().await.unwrap(), SupervisorOutcome::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_consumer_stops_supervisor() {
        let (source, _opens) = ScriptedSource::new(vec![Script::Events(vec!["A", "B", "C"])]);

        let stream = StreamSupervisor::spawn(
            source,
            config(3).with_buffer_size(1),
            CancellationToken::new(),
        )
        .unwrap();

        assert_eq!(
            stream.join().await.unwrap(),
            SupervisorOutcome::ConsumerDropped
        );
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        runtime.block_on(async {
            let (source, _) = ScriptedSource::new(Vec::new());
            let result = StreamSupervisor::spawn(source, config(0), CancellationToken::new());
            assert!(matches!(result, Err(StreamError::Configuration(_))));
        });
    }
}
