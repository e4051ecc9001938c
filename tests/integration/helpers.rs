//! Shared test helpers for integration tests: an in-memory event server.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use url::Url;

use pickr_core::config::AppConfig;
use pickr_core::error::AppError;
use pickr_core::events::SyncEvent;
use pickr_core::result::AppResult;
use pickr_realtime::connection::{Connector, TransportStream};
use pickr_realtime::message::Packet;
use pickr_realtime::message::serializer::decode_packet;
use pickr_realtime::{CrawlerApi, ObserverRegistry, SyncClient, SyncHandle, SyncView};

/// How long a test waits for any expected condition.
const WAIT: Duration = Duration::from_secs(30);

/// Client side of an in-memory session.
struct MemoryStream {
    incoming: mpsc::UnboundedReceiver<String>,
    outgoing: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl TransportStream for MemoryStream {
    async fn send(&mut self, text: String) -> AppResult<()> {
        self.outgoing
            .send(text)
            .map_err(|_| AppError::transport("server went away"))
    }

    async fn recv(&mut self) -> AppResult<Option<String>> {
        Ok(self.incoming.recv().await)
    }

    async fn close(&mut self) {}
}

/// Connector handing every accepted session to the test.
pub struct MemoryConnector {
    sessions: mpsc::UnboundedSender<ServerSession>,
    refusals: AtomicU32,
    attempts: AtomicU32,
}

impl MemoryConnector {
    /// Number of `connect` calls so far.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, _url: &Url) -> AppResult<Box<dyn TransportStream>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let refused = self
            .refusals
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(AppError::transport("connection refused"));
        }

        let (to_client, incoming) = mpsc::unbounded_channel();
        let (outgoing, from_client) = mpsc::unbounded_channel();
        self.sessions
            .send(ServerSession {
                to_client,
                from_client,
            })
            .map_err(|_| AppError::transport("test server stopped"))?;
        Ok(Box::new(MemoryStream { incoming, outgoing }))
    }
}

/// Server side of an in-memory session.
pub struct ServerSession {
    to_client: mpsc::UnboundedSender<String>,
    from_client: mpsc::UnboundedReceiver<String>,
}

impl ServerSession {
    /// Send one raw packet.
    pub fn push(&self, text: impl Into<String>) {
        self.to_client.send(text.into()).expect("client gone");
    }

    /// Transport open plus namespace connect.
    pub async fn handshake(&mut self) {
        self.push(r#"0{"sid":"s1","pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#);
        let reply = self.next_raw().await;
        assert_eq!(reply, "40", "client must request the default namespace");
        self.push(r#"40{"sid":"n1"}"#);
    }

    /// Send one named event.
    pub fn emit(&self, name: &str, data: Value) {
        self.push(format!("42{}", json!([name, data])));
    }

    /// Next raw packet from the client.
    pub async fn next_raw(&mut self) -> String {
        tokio::time::timeout(WAIT, self.from_client.recv())
            .await
            .expect("timed out waiting for client packet")
            .expect("client closed the session")
    }

    /// Next named event from the client, skipping pongs.
    pub async fn next_event(&mut self) -> (String, Value) {
        loop {
            let raw = self.next_raw().await;
            if let Packet::Event(frame) = decode_packet(&raw).expect("valid client packet") {
                return (frame.name, frame.data);
            }
        }
    }

    /// The next `n` event names, with restaurant ids appended.
    pub async fn next_events(&mut self, n: usize) -> Vec<String> {
        let mut names = Vec::with_capacity(n);
        for _ in 0..n {
            let (name, data) = self.next_event().await;
            names.push(match data {
                Value::Null => name,
                data => format!("{name}:{data}"),
            });
        }
        names
    }

    /// Whether the client closed its side.
    pub async fn closed(&mut self) -> bool {
        tokio::time::timeout(WAIT, async {
            while self.from_client.recv().await.is_some() {}
        })
        .await
        .is_ok()
    }
}

/// A running client wired to the in-memory server.
pub struct TestClient {
    pub handle: SyncHandle,
    pub connector: Arc<MemoryConnector>,
    pub events: Arc<Mutex<Vec<SyncEvent>>>,
    sessions: mpsc::UnboundedReceiver<ServerSession>,
}

impl TestClient {
    /// Start a client whose first `refusals` connects fail.
    pub fn start(refusals: u32) -> Self {
        let (sessions_tx, sessions) = mpsc::unbounded_channel();
        let connector = Arc::new(MemoryConnector {
            sessions: sessions_tx,
            refusals: AtomicU32::new(refusals),
            attempts: AtomicU32::new(0),
        });

        let events = Arc::new(Mutex::new(Vec::new()));
        let observers = Arc::new(ObserverRegistry::new());
        let sink = Arc::clone(&events);
        observers.register(Arc::new(move |event: &SyncEvent| {
            sink.lock().unwrap().push(event.clone());
        }));

        let config = AppConfig::default();
        let api = CrawlerApi::from_config(&config.server).expect("api client");
        let handle = SyncClient::start_with_observers(
            &config,
            Arc::clone(&connector) as Arc<dyn Connector>,
            api,
            observers,
        )
        .expect("client start");

        Self {
            handle,
            connector,
            events,
            sessions,
        }
    }

    /// Wait for the client's next transport connection.
    pub async fn accept(&mut self) -> ServerSession {
        tokio::time::timeout(WAIT, self.sessions.recv())
            .await
            .expect("timed out waiting for a connection")
            .expect("connector dropped")
    }

    /// Accept, handshake and consume the two global joins.
    pub async fn connect(&mut self) -> ServerSession {
        let mut session = self.accept().await;
        session.handshake().await;
        assert_eq!(
            session.next_events(2).await,
            vec!["subscribe:all_jobs", "subscribe:queue"]
        );
        session
    }

    /// Wait until the published view satisfies `pred`.
    pub async fn wait_view(&self, pred: impl Fn(&SyncView) -> bool) -> Arc<SyncView> {
        let mut views = self.handle.watch_view();
        tokio::time::timeout(WAIT, async {
            loop {
                let view = views.borrow_and_update().clone();
                if pred(&view) {
                    return view;
                }
                views.changed().await.expect("engine stopped");
            }
        })
        .await
        .expect("view condition not reached")
    }

    /// Notifications seen so far.
    pub fn events(&self) -> Vec<SyncEvent> {
        self.events.lock().unwrap().clone()
    }
}

/// A `jobs:current_state` payload.
pub fn jobs_snapshot(jobs: Value) -> Value {
    let total = jobs.as_array().map_or(0, Vec::len);
    json!({"total": total, "jobs": jobs, "timestamp": 1714557700000i64})
}

/// An empty `queue:current_state` payload.
pub fn empty_queue() -> Value {
    json!({"total": 0, "queue": [], "stats": {"total": 0, "waiting": 0, "processing": 0}})
}
