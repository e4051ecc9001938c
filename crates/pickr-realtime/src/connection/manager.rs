//! Connection manager: owns the transport and its reconnect policy.
//!
//! A single driver task opens the channel, performs the namespace handshake,
//! pumps frames in both directions and reconnects with a bounded, fixed-delay
//! policy. Consumers see the result as [`ConnectionSignal`]s and as a
//! [`ConnectionState`] watch.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use pickr_core::config::RealtimeConfig;
use pickr_core::error::AppError;
use pickr_core::result::AppResult;
use pickr_core::types::ConnectionState;

use crate::message::envelope::{EventFrame, Packet};
use crate::message::serializer::{decode_packet, encode_packet};
use crate::message::validator::validate_inbound;
use crate::metrics::SyncMetrics;

use super::transport::{Connector, TransportStream};

/// Signals emitted by the driver to the engine loop.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionSignal {
    /// The namespace handshake completed; the channel is usable.
    Connected,
    /// An established channel dropped; a reconnect is being attempted.
    Disconnected {
        /// Why the channel dropped.
        reason: String,
    },
    /// A named event arrived.
    Frame(EventFrame),
    /// Reconnect attempts are exhausted; the driver stopped.
    Failed {
        /// Connection tries made since the last successful connect.
        attempts: u32,
    },
}

/// Manages the single event-channel connection.
pub struct ConnectionManager {
    /// Transport factory.
    connector: Arc<dyn Connector>,
    /// Socket URL.
    url: Url,
    /// Reconnect policy and limits.
    config: RealtimeConfig,
    /// Current connectivity.
    state: Arc<watch::Sender<ConnectionState>>,
    /// Metrics.
    metrics: Arc<SyncMetrics>,
    /// Cancelled by `disconnect`.
    shutdown: CancellationToken,
    /// Set once `connect` was called.
    started: AtomicBool,
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("url", &self.url.as_str())
            .field("state", &*self.state.borrow())
            .field("shutdown", &self.shutdown.is_cancelled())
            .finish()
    }
}

impl ConnectionManager {
    /// Creates a new, idle connection manager.
    pub fn new(
        connector: Arc<dyn Connector>,
        url: Url,
        config: RealtimeConfig,
        metrics: Arc<SyncMetrics>,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);
        Self {
            connector,
            url,
            config,
            state: Arc::new(state),
            metrics,
            shutdown: CancellationToken::new(),
            started: AtomicBool::new(false),
        }
    }

    /// Current connectivity.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Subscribe to connectivity changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Starts the driver task.
    ///
    /// Signals are delivered on `signals`; encoded packets read from
    /// `outbound` are written while the channel is connected. A manager owns
    /// exactly one transport for its lifetime, so a second call fails.
    pub fn connect(
        &self,
        signals: mpsc::Sender<ConnectionSignal>,
        outbound: mpsc::Receiver<String>,
    ) -> AppResult<JoinHandle<()>> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(AppError::internal("Connection manager already started"));
        }
        if self.shutdown.is_cancelled() {
            return Err(AppError::internal("Connection manager was disconnected"));
        }

        let driver = Driver {
            connector: Arc::clone(&self.connector),
            url: self.url.clone(),
            config: self.config.clone(),
            state: Arc::clone(&self.state),
            metrics: Arc::clone(&self.metrics),
            shutdown: self.shutdown.clone(),
            signals,
            outbound,
        };
        info!(url = %self.url, "Starting event channel");
        Ok(tokio::spawn(driver.run()))
    }

    /// Tears the channel down. Safe to call any number of times.
    pub fn disconnect(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        info!(url = %self.url, "Disconnecting event channel");
        self.shutdown.cancel();
        if !self.started.load(Ordering::SeqCst) {
            self.state.send_replace(ConnectionState::Disconnected);
        }
    }

    /// Whether `disconnect` was called.
    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

/// How one connected session ended.
enum SessionEnd {
    /// Local shutdown or the engine went away.
    Shutdown,
    /// The channel dropped.
    Dropped {
        /// Why.
        reason: String,
        /// Whether the namespace handshake had completed.
        established: bool,
    },
}

struct Driver {
    connector: Arc<dyn Connector>,
    url: Url,
    config: RealtimeConfig,
    state: Arc<watch::Sender<ConnectionState>>,
    metrics: Arc<SyncMetrics>,
    shutdown: CancellationToken,
    signals: mpsc::Sender<ConnectionSignal>,
    outbound: mpsc::Receiver<String>,
}

impl Driver {
    async fn run(mut self) {
        // Tries made since the last established session.
        let mut failures: u32 = 0;
        let max_tries = self.config.reconnect_attempts.saturating_add(1);

        self.set_state(ConnectionState::Connecting);
        loop {
            let opened = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                opened = self.connector.connect(&self.url) => opened,
            };

            match opened {
                Ok(mut stream) => match self.session(stream.as_mut()).await {
                    SessionEnd::Shutdown => {
                        self.flush_outbound(stream.as_mut()).await;
                        stream.close().await;
                        break;
                    }
                    SessionEnd::Dropped {
                        reason,
                        established,
                    } => {
                        stream.close().await;
                        if established {
                            failures = 0;
                            self.metrics.record_disconnect();
                            warn!(reason = %reason, "Event channel dropped");
                            if self
                                .signals
                                .send(ConnectionSignal::Disconnected { reason })
                                .await
                                .is_err()
                            {
                                break;
                            }
                        } else {
                            warn!(reason = %reason, "Event channel handshake failed");
                        }
                    }
                },
                Err(e) => {
                    warn!(url = %self.url, error = %e, "Event channel connect failed");
                }
            }

            failures += 1;
            if failures >= max_tries {
                error!(attempts = failures, "Reconnect attempts exhausted, giving up");
                self.set_state(ConnectionState::Failed);
                let _ = self
                    .signals
                    .send(ConnectionSignal::Failed { attempts: failures })
                    .await;
                return;
            }

            self.set_state(ConnectionState::Reconnecting { attempt: failures });
            info!(
                attempt = failures,
                max = self.config.reconnect_attempts,
                delay_ms = self.config.reconnect_delay_ms,
                "Reconnecting event channel"
            );
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.config.reconnect_delay()) => {}
            }
        }

        self.set_state(ConnectionState::Disconnected);
        debug!("Event channel driver stopped");
    }

    async fn session(&mut self, stream: &mut dyn TransportStream) -> SessionEnd {
        let mut established = false;
        // Liveness window announced by the server handshake; zero disables it.
        let mut liveness = Duration::ZERO;
        let mut deadline: Option<Instant> = None;
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return SessionEnd::Shutdown,
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    warn!(timeout_ms = liveness.as_millis() as u64, "No ping from server");
                    return SessionEnd::Dropped {
                        reason: "ping timeout".to_string(),
                        established,
                    };
                }
                frame = stream.recv() => {
                    let text = match frame {
                        Ok(Some(text)) => text,
                        Ok(None) => {
                            return SessionEnd::Dropped {
                                reason: "closed by server".to_string(),
                                established,
                            };
                        }
                        Err(e) => {
                            return SessionEnd::Dropped {
                                reason: e.message,
                                established,
                            };
                        }
                    };
                    self.metrics.record_frame();
                    if !liveness.is_zero() {
                        deadline = Some(Instant::now() + liveness);
                    }

                    if let Err(e) = validate_inbound(&text, self.config.max_frame_bytes) {
                        warn!(error = %e, "Rejected inbound frame");
                        continue;
                    }
                    let packet = match decode_packet(&text) {
                        Ok(packet) => packet,
                        Err(e) => {
                            warn!(error = %e, "Undecodable inbound frame");
                            continue;
                        }
                    };

                    match packet {
                        Packet::Open(handshake) => {
                            debug!(sid = %handshake.sid, ping_interval = handshake.ping_interval, "Transport opened");
                            liveness = Duration::from_millis(
                                handshake.ping_interval.saturating_add(handshake.ping_timeout),
                            );
                            deadline = (!liveness.is_zero()).then(|| Instant::now() + liveness);
                            if let Err(reason) = Self::write(stream, &Packet::Connect(None)).await {
                                return SessionEnd::Dropped { reason, established };
                            }
                        }
                        Packet::Ping => {
                            if let Err(reason) = Self::write(stream, &Packet::Pong).await {
                                return SessionEnd::Dropped { reason, established };
                            }
                        }
                        Packet::Connect(_) if !established => {
                            established = true;
                            // Anything queued while disconnected belongs to the previous epoch.
                            let mut stale = 0usize;
                            while self.outbound.try_recv().is_ok() {
                                stale += 1;
                            }
                            if stale > 0 {
                                debug!(stale, "Discarded outbound packets queued while offline");
                            }
                            self.metrics.record_connect();
                            self.set_state(ConnectionState::Connected);
                            info!(url = %self.url, "Event channel connected");
                            if self.signals.send(ConnectionSignal::Connected).await.is_err() {
                                return SessionEnd::Shutdown;
                            }
                        }
                        Packet::ConnectError(data) => {
                            return SessionEnd::Dropped {
                                reason: format!("namespace connect refused: {data}"),
                                established,
                            };
                        }
                        Packet::Disconnect | Packet::Close => {
                            return SessionEnd::Dropped {
                                reason: "disconnected by server".to_string(),
                                established,
                            };
                        }
                        Packet::Event(frame) if established => {
                            if self.signals.send(ConnectionSignal::Frame(frame)).await.is_err() {
                                return SessionEnd::Shutdown;
                            }
                        }
                        other => debug!(packet = ?other, "Ignoring packet"),
                    }
                }
                Some(text) = self.outbound.recv(), if established => {
                    if let Err(e) = stream.send(text).await {
                        return SessionEnd::Dropped { reason: e.message, established };
                    }
                }
            }
        }
    }

    /// Writes packets queued right before shutdown, such as the room leave.
    async fn flush_outbound(&mut self, stream: &mut dyn TransportStream) {
        while let Ok(text) = self.outbound.try_recv() {
            if stream.send(text).await.is_err() {
                break;
            }
        }
    }

    async fn write(stream: &mut dyn TransportStream, packet: &Packet) -> Result<(), String> {
        let text = encode_packet(packet).map_err(|e| e.message)?;
        stream.send(text).await.map_err(|e| e.message)
    }

    fn set_state(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(from = previous.as_str(), to = next.as_str(), "Connection state changed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicU32;

    use async_trait::async_trait;

    use super::*;

    /// Scripted stream: yields the given frames, then reports a close.
    struct ScriptedStream {
        frames: VecDeque<String>,
        sent: Arc<Mutex<Vec<String>>>,
        hold_open: bool,
    }

    #[async_trait]
    impl TransportStream for ScriptedStream {
        async fn send(&mut self, text: String) -> AppResult<()> {
            self.sent.lock().unwrap().push(text);
            Ok(())
        }

        async fn recv(&mut self) -> AppResult<Option<String>> {
            match self.frames.pop_front() {
                Some(frame) => Ok(Some(frame)),
                None if self.hold_open => std::future::pending().await,
                None => Ok(None),
            }
        }

        async fn close(&mut self) {}
    }

    struct RefusingConnector {
        calls: AtomicU32,
    }

    #[async_trait]
    impl Connector for RefusingConnector {
        async fn connect(&self, _url: &Url) -> AppResult<Box<dyn TransportStream>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(AppError::transport("connection refused"))
        }
    }

    struct HandshakeConnector {
        sent: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Connector for HandshakeConnector {
        async fn connect(&self, _url: &Url) -> AppResult<Box<dyn TransportStream>> {
            Ok(Box::new(ScriptedStream {
                frames: VecDeque::from(vec![
                    r#"0{"sid":"s1","pingInterval":25000,"pingTimeout":20000}"#.to_string(),
                    r#"40{"sid":"n1"}"#.to_string(),
                    "2".to_string(),
                    r#"42["job:new",{"jobId":"j1","restaurantId":3}]"#.to_string(),
                ]),
                sent: Arc::clone(&self.sent),
                hold_open: true,
            }))
        }
    }

    /// Completes the handshake, then never sends another frame.
    struct SilentConnector {
        calls: AtomicU32,
    }

    #[async_trait]
    impl Connector for SilentConnector {
        async fn connect(&self, _url: &Url) -> AppResult<Box<dyn TransportStream>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(ScriptedStream {
                frames: VecDeque::from(vec![
                    r#"0{"sid":"s1","pingInterval":25000,"pingTimeout":20000}"#.to_string(),
                    r#"40{"sid":"n1"}"#.to_string(),
                ]),
                sent: Arc::new(Mutex::new(Vec::new())),
                hold_open: true,
            }))
        }
    }

    fn url() -> Url {
        Url::parse("ws://localhost:4000/socket.io/?EIO=4&transport=websocket").unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_bounded_attempts() {
        let connector = Arc::new(RefusingConnector {
            calls: AtomicU32::new(0),
        });
        let manager = ConnectionManager::new(
            connector.clone(),
            url(),
            RealtimeConfig::default(),
            Arc::new(SyncMetrics::new()),
        );
        let (tx, mut rx) = mpsc::channel(8);
        let (_out_tx, out_rx) = mpsc::channel(8);

        let task = manager.connect(tx, out_rx).unwrap();
        let signal = rx.recv().await.unwrap();
        task.await.unwrap();

        assert_eq!(signal, ConnectionSignal::Failed { attempts: 6 });
        assert_eq!(connector.calls.load(Ordering::SeqCst), 6);
        assert_eq!(manager.state(), ConnectionState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_handshake_then_frames() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let manager = ConnectionManager::new(
            Arc::new(HandshakeConnector {
                sent: Arc::clone(&sent),
            }),
            url(),
            RealtimeConfig::default(),
            Arc::new(SyncMetrics::new()),
        );
        let (tx, mut rx) = mpsc::channel(8);
        let (_out_tx, out_rx) = mpsc::channel(8);
        let task = manager.connect(tx, out_rx).unwrap();

        assert_eq!(rx.recv().await.unwrap(), ConnectionSignal::Connected);
        match rx.recv().await.unwrap() {
            ConnectionSignal::Frame(frame) => assert_eq!(frame.name, "job:new"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(manager.state(), ConnectionState::Connected);
        assert_eq!(*sent.lock().unwrap(), vec!["40".to_string(), "3".to_string()]);

        manager.disconnect();
        manager.disconnect();
        task.await.unwrap();
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_server_is_dropped_after_ping_timeout() {
        let connector = Arc::new(SilentConnector {
            calls: AtomicU32::new(0),
        });
        let manager = ConnectionManager::new(
            connector.clone(),
            url(),
            RealtimeConfig::default(),
            Arc::new(SyncMetrics::new()),
        );
        let (tx, mut rx) = mpsc::channel(8);
        let (_out_tx, out_rx) = mpsc::channel(8);
        let started = Instant::now();
        let task = manager.connect(tx, out_rx).unwrap();

        assert_eq!(rx.recv().await.unwrap(), ConnectionSignal::Connected);
        assert_eq!(
            rx.recv().await.unwrap(),
            ConnectionSignal::Disconnected {
                reason: "ping timeout".to_string()
            }
        );
        assert!(started.elapsed() >= Duration::from_millis(45_000));

        assert_eq!(rx.recv().await.unwrap(), ConnectionSignal::Connected);
        assert_eq!(connector.calls.load(Ordering::SeqCst), 2);

        manager.disconnect();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_after_disconnect_fails() {
        let manager = ConnectionManager::new(
            Arc::new(RefusingConnector {
                calls: AtomicU32::new(0),
            }),
            url(),
            RealtimeConfig::default(),
            Arc::new(SyncMetrics::new()),
        );
        manager.disconnect();
        let (tx, _rx) = mpsc::channel(1);
        let (_out_tx, out_rx) = mpsc::channel(1);
        assert!(manager.connect(tx, out_rx).is_err());
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }
}
