//! Outbound worker client.
//!
//! Dials the coordinator, performs the HELLO/ACK handshake, then runs two
//! tasks over the single connection: a heartbeat ticker and the task loop.
//! Both write through one mutex-guarded write half so frames never
//! interleave.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, broadcast};

use cinemesh_core::message::{BlockResult, Heartbeat, Hello, Message, Task};
use cinemesh_core::wire::{self, WireError};

/// How often the worker reports liveness.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// How long to wait for the coordinator's ACK.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifecycle of the client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    Connecting,
    Handshaking,
    Ready,
    Working,
    ShuttingDown,
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error("handshake failed: {0}")]
    Handshake(String),
}

/// A connected, handshaken worker.
pub struct WorkerClient {
    id: String,
    state: ClientState,
    reader: OwnedReadHalf,
    writer: Arc<Mutex<OwnedWriteHalf>>,
    busy: Arc<AtomicBool>,
}

impl WorkerClient {
    /// Dial the coordinator and perform the handshake.
    ///
    /// Sends HELLO with an empty worker ID and this host's CPU count, then
    /// waits up to [`HANDSHAKE_TIMEOUT`] for an ACK carrying the assigned
    /// ID. Anything else is a handshake failure.
    pub async fn connect(addr: &str) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).await?;
        let (mut reader, mut writer) = stream.into_split();

        let concurrency = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let hello = Message::Hello(Hello {
            worker_id: String::new(),
            concurrency,
        });
        wire::write_message(&mut writer, &hello).await?;

        let reply = tokio::time::timeout(HANDSHAKE_TIMEOUT, wire::read_message(&mut reader))
            .await
            .map_err(|_| ClientError::Handshake("no ACK within deadline".to_string()))??;

        let id = match reply {
            Message::Ack(ack) if !ack.worker_id.is_empty() => ack.worker_id,
            Message::Ack(_) => {
                return Err(ClientError::Handshake("ACK without worker_id".to_string()));
            }
            other => {
                return Err(ClientError::Handshake(format!(
                    "expected ACK, got {}",
                    other.type_tag()
                )));
            }
        };

        Ok(Self {
            id,
            state: ClientState::Ready,
            reader,
            writer: Arc::new(Mutex::new(writer)),
            busy: Arc::new(AtomicBool::new(false)),
        })
    }

    /// The server-assigned worker ID.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    /// Run the heartbeat and task loops until shutdown or a fatal error.
    ///
    /// Malformed inbound frames are skipped; write failures and connection
    /// loss terminate the worker. A clean close by the coordinator returns
    /// `Ok`.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> Result<(), ClientError> {
        let heartbeat = tokio::spawn(heartbeat_loop(
            self.id.clone(),
            self.writer.clone(),
            self.busy.clone(),
            shutdown.resubscribe(),
        ));

        let outcome = loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    self.state = ClientState::ShuttingDown;
                    tracing::info!(worker_id = %self.id, "shutdown requested");
                    break Ok(());
                }
                frame = wire::read_message(&mut self.reader) => match frame {
                    Ok(Message::Task(task)) => {
                        if let Err(e) = self.execute(task).await {
                            break Err(e);
                        }
                    }
                    Ok(other) => {
                        tracing::trace!(frame = other.type_tag(), "ignoring frame");
                    }
                    Err(WireError::Malformed(e)) => {
                        tracing::warn!(error = %e, "skipping malformed frame");
                    }
                    Err(e) if e.is_clean_close() => {
                        tracing::info!(worker_id = %self.id, "coordinator closed the connection");
                        self.state = ClientState::Disconnected;
                        break Ok(());
                    }
                    Err(e) => {
                        self.state = ClientState::Disconnected;
                        break Err(e.into());
                    }
                }
            }
        };

        heartbeat.abort();
        outcome
    }

    async fn execute(&mut self, task: Task) -> Result<(), ClientError> {
        self.state = ClientState::Working;
        self.busy.store(true, Ordering::Relaxed);
        tracing::info!(
            job_id = %task.job_id,
            candidates = task.candidate_ratings.len(),
            k = task.k,
            "processing task"
        );

        let neighbors = crate::engine::rank_neighbors(&task);
        let result = Message::Result(BlockResult {
            job_id: task.job_id,
            block_id: task.block_id,
            neighbors,
        });

        {
            let mut writer = self.writer.lock().await;
            wire::write_message(&mut *writer, &result).await?;
        }

        self.busy.store(false, Ordering::Relaxed);
        self.state = ClientState::Ready;
        Ok(())
    }
}

/// Emit a HEARTBEAT every [`HEARTBEAT_INTERVAL`] until shutdown or a write
/// failure. Shares the connection's write mutex with task results.
async fn heartbeat_loop(
    worker_id: String,
    writer: Arc<Mutex<OwnedWriteHalf>>,
    busy: Arc<AtomicBool>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
    // The first tick completes immediately; the handshake already proved
    // liveness, so skip it.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.recv() => return,
            _ = ticker.tick() => {
                let frame = Message::Heartbeat(Heartbeat {
                    worker_id: worker_id.clone(),
                    busy: busy.load(Ordering::Relaxed),
                    cpu: 0.0,
                });
                let mut writer = writer.lock().await;
                if let Err(e) = wire::write_message(&mut *writer, &frame).await {
                    tracing::warn!(error = %e, "heartbeat write failed, stopping");
                    return;
                }
            }
        }
    }
}
