//! Async driver for a [`SyncCoordinator`].
//!
//! The driver is a single task that owns the coordinator's timers. It waits
//! for a command from a [`SyncHandle`], the coordinator's next deadline
//! (debounce expiry or retry), or the end of the background write, and
//! publishes the active document's state on a watch channel.
//!
//! Background writes run on the blocking pool as a separate task, so edits
//! are recorded while a save is in flight. Commands are handled in the
//! order they arrive; those that upload (`open`, `flush`, `close`,
//! `resolve`) wait for the in-flight write first.

use crate::cache::LocalCache;
use crate::coordinator::SyncCoordinator;
use crate::error::{SyncError, SyncResult};
use crate::state::{DocumentView, Resolution, SyncState, WriteOutcome};
use crate::transport::RemoteStore;
use docsync_protocol::{DocumentContent, DocumentId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tracing::{debug, error, info};

type WriteTask = JoinHandle<Option<WriteOutcome>>;

const COMMAND_BUFFER: usize = 64;

enum Command {
    Open(DocumentId, oneshot::Sender<SyncResult<DocumentView>>),
    Edit {
        content: DocumentContent,
        title: Option<String>,
        reply: oneshot::Sender<SyncResult<SyncState>>,
    },
    Flush(DocumentId, oneshot::Sender<Option<WriteOutcome>>),
    Close(DocumentId, oneshot::Sender<Option<WriteOutcome>>),
    Resolve(
        DocumentId,
        Resolution,
        oneshot::Sender<SyncResult<DocumentView>>,
    ),
    Shutdown(oneshot::Sender<Vec<WriteOutcome>>),
}

/// Cloneable handle for sending commands to a running [`SyncDriver`].
#[derive(Clone)]
pub struct SyncHandle {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<SyncState>,
}

impl SyncHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> SyncResult<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|_| SyncError::DriverStopped)?;
        response.await.map_err(|_| SyncError::DriverStopped)
    }

    /// Opens a document. See [`SyncCoordinator::open_document`].
    ///
    /// # Errors
    ///
    /// Returns the open error, or [`SyncError::DriverStopped`].
    pub async fn open(&self, id: DocumentId) -> SyncResult<DocumentView> {
        self.request(|reply| Command::Open(id, reply)).await?
    }

    /// Records an edit of the active document.
    ///
    /// # Errors
    ///
    /// Returns the edit error, or [`SyncError::DriverStopped`].
    pub async fn edit(
        &self,
        content: DocumentContent,
        title: Option<String>,
    ) -> SyncResult<SyncState> {
        self.request(|reply| Command::Edit {
            content,
            title,
            reply,
        })
        .await?
    }

    /// Uploads pending edits of `id` immediately.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::DriverStopped`] if the driver is gone.
    pub async fn flush(&self, id: DocumentId) -> SyncResult<Option<WriteOutcome>> {
        self.request(|reply| Command::Flush(id, reply)).await
    }

    /// Closes `id`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::DriverStopped`] if the driver is gone.
    pub async fn close(&self, id: DocumentId) -> SyncResult<Option<WriteOutcome>> {
        self.request(|reply| Command::Close(id, reply)).await
    }

    /// Settles a conflict on `id`.
    ///
    /// # Errors
    ///
    /// Returns the resolution error, or [`SyncError::DriverStopped`].
    pub async fn resolve(&self, id: DocumentId, resolution: Resolution) -> SyncResult<DocumentView> {
        self.request(|reply| Command::Resolve(id, resolution, reply))
            .await?
    }

    /// Flushes pending edits and stops the driver.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::DriverStopped`] if the driver is already gone.
    pub async fn shutdown(&self) -> SyncResult<Vec<WriteOutcome>> {
        self.request(Command::Shutdown).await
    }

    /// Last published state of the active document.
    pub fn state(&self) -> SyncState {
        *self.state.borrow()
    }

    /// Returns a receiver that observes state changes.
    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.state.clone()
    }

    /// Waits until the published state equals `state`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::DriverStopped`] if the driver stops first.
    pub async fn wait_for(&self, state: SyncState) -> SyncResult<()> {
        let mut receiver = self.state.clone();
        receiver
            .wait_for(|current| *current == state)
            .await
            .map(|_| ())
            .map_err(|_| SyncError::DriverStopped)
    }
}

/// Event loop that runs a coordinator's timers and commands.
pub struct SyncDriver<R: RemoteStore, C: LocalCache> {
    coordinator: Arc<SyncCoordinator<R, C>>,
    commands: mpsc::Receiver<Command>,
    state: watch::Sender<SyncState>,
    in_flight: Option<WriteTask>,
}

impl<R, C> SyncDriver<R, C>
where
    R: RemoteStore + 'static,
    C: LocalCache + 'static,
{
    /// Creates a driver and its handle. Call [`Self::run`] to start it.
    pub fn new(coordinator: Arc<SyncCoordinator<R, C>>) -> (Self, SyncHandle) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (state_tx, state_rx) = watch::channel(coordinator.state());
        let driver = Self {
            coordinator,
            commands: command_rx,
            state: state_tx,
            in_flight: None,
        };
        let handle = SyncHandle {
            commands: command_tx,
            state: state_rx,
        };
        (driver, handle)
    }

    /// Spawns a driver on the current runtime.
    pub fn spawn(coordinator: Arc<SyncCoordinator<R, C>>) -> (SyncHandle, JoinHandle<()>) {
        let (driver, handle) = Self::new(coordinator);
        (handle, tokio::spawn(driver.run()))
    }

    /// Runs until shut down or until every handle is dropped.
    ///
    /// Dropping all handles flushes pending edits the same way an explicit
    /// shutdown does.
    pub async fn run(mut self) {
        info!("sync driver started");
        loop {
            self.publish();
            let deadline = match self.in_flight {
                Some(_) => None,
                None => self.next_deadline(),
            };

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown(reply)) => {
                        let outcomes = self.shutdown().await;
                        let _ = reply.send(outcomes);
                        break;
                    }
                    Some(command) => self.handle(command).await,
                    None => {
                        self.shutdown().await;
                        break;
                    }
                },
                finished = join_write(&mut self.in_flight) => {
                    self.in_flight = None;
                    write_finished(finished);
                }
                _ = wait_until(deadline) => self.start_write(),
            }
        }
        self.publish();
        info!("sync driver stopped");
    }

    fn next_deadline(&self) -> Option<Instant> {
        let wake_at = self.coordinator.next_wake_at()?;
        let now = self.coordinator.clock().now_millis();
        Some(Instant::now() + Duration::from_millis(wake_at.saturating_sub(now)))
    }

    fn publish(&self) {
        let current = self.coordinator.state();
        self.state.send_if_modified(|published| {
            if *published == current {
                false
            } else {
                debug!(from = %published, to = %current, "sync state changed");
                *published = current;
                true
            }
        });
    }

    async fn handle(&self, command: Command) {
        match command {
            Command::Open(id, reply) => {
                if let Some(result) = self.blocking(move |c| c.open_document(&id)).await {
                    let _ = reply.send(result);
                }
            }
            Command::Edit {
                content,
                title,
                reply,
            } => {
                if let Some(result) = self.blocking(move |c| c.record_edit(content, title)).await {
                    let _ = reply.send(result);
                }
            }
            Command::Flush(id, reply) => {
                if let Some(outcome) = self.blocking(move |c| c.flush_document(&id)).await {
                    let _ = reply.send(outcome);
                }
            }
            Command::Close(id, reply) => {
                if let Some(outcome) = self.blocking(move |c| c.close_document(&id)).await {
                    let _ = reply.send(outcome);
                }
            }
            Command::Resolve(id, resolution, reply) => {
                if let Some(result) = self
                    .blocking(move |c| c.resolve_conflict(&id, resolution))
                    .await
                {
                    let _ = reply.send(result);
                }
            }
            Command::Shutdown(_) => {}
        }
    }

    fn start_write(&mut self) {
        let coordinator = Arc::clone(&self.coordinator);
        self.in_flight = Some(tokio::task::spawn_blocking(move || coordinator.run_ready()));
    }

    async fn shutdown(&mut self) -> Vec<WriteOutcome> {
        let mut outcomes = Vec::new();
        if let Some(task) = self.in_flight.take() {
            match task.await {
                Ok(Some(outcome)) => outcomes.push(outcome),
                Ok(None) => {}
                Err(e) => error!(error = %e, "sync task failed"),
            }
        }
        outcomes.extend(self.blocking(|c| c.flush_all()).await.unwrap_or_default());
        outcomes
    }

    async fn blocking<T, F>(&self, f: F) -> Option<T>
    where
        F: FnOnce(&SyncCoordinator<R, C>) -> T + Send + 'static,
        T: Send + 'static,
    {
        let coordinator = Arc::clone(&self.coordinator);
        match tokio::task::spawn_blocking(move || f(&coordinator)).await {
            Ok(value) => Some(value),
            Err(e) => {
                error!(error = %e, "sync task failed");
                None
            }
        }
    }
}

async fn join_write(task: &mut Option<WriteTask>) -> Result<Option<WriteOutcome>, JoinError> {
    match task {
        Some(task) => task.await,
        None => std::future::pending().await,
    }
}

fn write_finished(finished: Result<Option<WriteOutcome>, JoinError>) {
    match finished {
        Ok(Some(outcome)) => debug!(?outcome, "write finished"),
        Ok(None) => {}
        Err(e) => error!(error = %e, "sync task failed"),
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
