//! Sync client runtime.
//!
//! [`SyncClient::start`] spawns the connection driver and one engine task.
//! The engine task is the only place state changes: it selects over
//! consumer commands, connection signals, connectivity changes and the
//! earliest scheduler deadline. Consumers talk to it through a cloneable
//! [`SyncHandle`].

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, error, info};

use pickr_core::config::AppConfig;
use pickr_core::error::AppError;
use pickr_core::result::AppResult;
use pickr_core::types::{ConnectionState, QueueId, ResourceId};

use crate::api::CrawlerApi;
use crate::connection::handle::ChannelOutbox;
use crate::connection::manager::{ConnectionManager, ConnectionSignal};
use crate::connection::transport::Connector;
use crate::metrics::SyncMetrics;
use crate::observer::ObserverRegistry;

use super::engine::SyncEngine;
use super::view::SyncView;

/// Requests from handles to the engine task.
#[derive(Debug)]
enum Command {
    EnsureSubscribed(ResourceId),
    Refresh,
    CancelRequested(QueueId),
    Shutdown(oneshot::Sender<()>),
}

/// Entry point of the sync runtime.
#[derive(Debug)]
pub struct SyncClient;

impl SyncClient {
    /// Connects and starts syncing with a fresh observer registry.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(
        config: &AppConfig,
        connector: Arc<dyn Connector>,
        api: CrawlerApi,
    ) -> AppResult<SyncHandle> {
        Self::start_with_observers(config, connector, api, Arc::new(ObserverRegistry::new()))
    }

    /// Connects and starts syncing, notifying `observers` from the first event on.
    pub fn start_with_observers(
        config: &AppConfig,
        connector: Arc<dyn Connector>,
        api: CrawlerApi,
        observers: Arc<ObserverRegistry>,
    ) -> AppResult<SyncHandle> {
        let url = config.socket_url()?;
        let realtime = config.realtime.clone();
        let buffer = realtime.channel_buffer_size;
        let metrics = Arc::new(SyncMetrics::new());

        let (outbox, outbound_rx) = ChannelOutbox::new(buffer);
        let engine = SyncEngine::new(
            realtime.clone(),
            Box::new(outbox),
            Arc::clone(&observers),
            Arc::clone(&metrics),
        );
        let view = engine.watch_view();

        let manager = Arc::new(ConnectionManager::new(
            connector,
            url,
            realtime,
            Arc::clone(&metrics),
        ));
        let (signal_tx, signal_rx) = mpsc::channel(buffer);
        let state_rx = manager.watch_state();
        let driver = manager.connect(signal_tx, outbound_rx)?;

        let (command_tx, command_rx) = mpsc::channel(buffer);
        let engine = tokio::spawn(run_engine(engine, command_rx, signal_rx, state_rx));

        Ok(SyncHandle {
            commands: command_tx,
            manager,
            api,
            observers,
            metrics,
            view,
            tasks: Arc::new(Mutex::new(Some(Tasks { engine, driver }))),
        })
    }
}

struct Tasks {
    engine: JoinHandle<()>,
    driver: JoinHandle<()>,
}

/// Cloneable handle to a running sync client.
#[derive(Clone)]
pub struct SyncHandle {
    commands: mpsc::Sender<Command>,
    manager: Arc<ConnectionManager>,
    api: CrawlerApi,
    observers: Arc<ObserverRegistry>,
    metrics: Arc<SyncMetrics>,
    view: watch::Receiver<Arc<SyncView>>,
    tasks: Arc<Mutex<Option<Tasks>>>,
}

impl std::fmt::Debug for SyncHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncHandle")
            .field("manager", &self.manager)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl SyncHandle {
    /// Joins the room of a resource unless already joined.
    pub async fn ensure_subscribed(&self, resource_id: ResourceId) -> AppResult<()> {
        self.send(Command::EnsureSubscribed(resource_id)).await
    }

    /// Requests fresh snapshots of jobs and queue.
    pub async fn refresh(&self) -> AppResult<()> {
        self.send(Command::Refresh).await
    }

    /// Asks the backend to cancel a queue entry.
    ///
    /// The outcome arrives later as channel events; the returned task only
    /// reports whether the command was accepted and may be dropped.
    pub fn cancel_queue_item(&self, queue_id: QueueId) -> JoinHandle<AppResult<()>> {
        let api = self.api.clone();
        let commands = self.commands.clone();
        tokio::spawn(async move {
            let result = api.cancel_queue_item(&queue_id).await;
            match &result {
                Ok(()) => {
                    info!(queue_id = %queue_id, "Cancel request accepted");
                    let _ = commands.send(Command::CancelRequested(queue_id)).await;
                }
                Err(e) => error!(queue_id = %queue_id, error = %e, "Cancel request failed"),
            }
            result
        })
    }

    /// Latest published view.
    pub fn view(&self) -> Arc<SyncView> {
        self.view.borrow().clone()
    }

    /// Receiver notified after every mutation batch.
    pub fn watch_view(&self) -> watch::Receiver<Arc<SyncView>> {
        self.view.clone()
    }

    /// Channel connectivity as reported by the connection manager.
    pub fn connection(&self) -> ConnectionState {
        self.manager.state()
    }

    /// Registry to add or remove change observers.
    pub fn observers(&self) -> &Arc<ObserverRegistry> {
        &self.observers
    }

    /// Runtime counters.
    pub fn metrics(&self) -> &Arc<SyncMetrics> {
        &self.metrics
    }

    /// Disarms every timer, leaves all rooms and closes the channel.
    ///
    /// Safe to call any number of times from any clone.
    pub async fn shutdown(&self) {
        let Some(tasks) = self.tasks.lock().await.take() else {
            return;
        };

        let (done_tx, done_rx) = oneshot::channel();
        if self.commands.send(Command::Shutdown(done_tx)).await.is_ok() {
            let _ = done_rx.await;
        }
        self.manager.disconnect();

        if let Err(e) = tasks.engine.await {
            error!(error = %e, "Sync engine task failed");
        }
        if let Err(e) = tasks.driver.await {
            error!(error = %e, "Connection driver task failed");
        }
        info!("Sync client stopped");
    }

    async fn send(&self, command: Command) -> AppResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| AppError::service_unavailable("Sync client is not running"))
    }
}

async fn run_engine(
    mut engine: SyncEngine,
    mut commands: mpsc::Receiver<Command>,
    mut signals: mpsc::Receiver<ConnectionSignal>,
    mut state: watch::Receiver<ConnectionState>,
) {
    let mut state_open = true;
    loop {
        let deadline = engine.next_deadline();
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::EnsureSubscribed(resource_id)) => {
                    engine.ensure_subscribed(resource_id);
                }
                Some(Command::Refresh) => {
                    engine.refresh(Instant::now());
                }
                Some(Command::CancelRequested(queue_id)) => engine.note_cancel_requested(queue_id),
                Some(Command::Shutdown(done)) => {
                    engine.teardown();
                    let _ = done.send(());
                    break;
                }
                None => {
                    engine.teardown();
                    break;
                }
            },
            Some(signal) = signals.recv() => match signal {
                ConnectionSignal::Connected => engine.on_connected(Instant::now()),
                ConnectionSignal::Disconnected { reason } => engine.on_disconnected(&reason),
                ConnectionSignal::Frame(frame) => engine.handle_frame(frame, Instant::now()),
                ConnectionSignal::Failed { attempts } => engine.on_failed(attempts),
            },
            changed = state.changed(), if state_open => match changed {
                Ok(()) => {
                    let next = *state.borrow_and_update();
                    engine.update_connection(next);
                }
                Err(_) => state_open = false,
            },
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                engine.fire_due(Instant::now());
            }
        }
    }
    debug!("Sync engine loop stopped");
}
