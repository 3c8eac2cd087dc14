//! TCP server for worker connections.
//!
//! Lifecycle per connection: handshake, then one read loop and one writer
//! task draining the worker's send queue. Every decoded frame is wrapped
//! in an [`Envelope`] and pushed onto a single bounded inbound channel;
//! the dispatcher's router is the sole consumer.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use cinemesh_core::message::{Ack, Message};
use cinemesh_core::wire::{self, WireError};

use crate::registry::{SEND_QUEUE_DEPTH, WorkerEntry, WorkerRegistry, WorkerState};

/// Capacity of the shared inbound envelope queue. When it is full the read
/// loops block, so the router must keep draining.
pub const INBOUND_QUEUE_DEPTH: usize = 100;

/// A decoded frame tagged with the worker it came from.
#[derive(Debug)]
pub struct Envelope {
    pub worker_id: String,
    pub message: Message,
}

pub struct TcpServer {
    registry: Arc<WorkerRegistry>,
    inbound_tx: mpsc::Sender<Envelope>,
    shutdown: broadcast::Sender<()>,
}

impl TcpServer {
    /// Build the server and hand back the inbound queue's receiving end
    /// for the dispatcher's router.
    pub fn new(
        registry: Arc<WorkerRegistry>,
        shutdown: broadcast::Sender<()>,
    ) -> (Self, mpsc::Receiver<Envelope>) {
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE_DEPTH);
        (
            Self {
                registry,
                inbound_tx,
                shutdown,
            },
            inbound_rx,
        )
    }

    /// Accept worker connections until shutdown.
    pub async fn run(self, listener: TcpListener) -> Result<()> {
        let mut shutdown = self.shutdown.subscribe();
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("tcp server shutting down");
                    return Ok(());
                }
                accepted = listener.accept() => {
                    let (stream, peer_addr) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            tracing::warn!(error = %e, "accept failed");
                            continue;
                        }
                    };
                    tracing::info!(peer = %peer_addr, "worker connection accepted");
                    tokio::spawn(handle_connection(
                        self.registry.clone(),
                        self.inbound_tx.clone(),
                        self.shutdown.subscribe(),
                        stream,
                        peer_addr,
                    ));
                }
            }
        }
    }
}

/// Run one worker connection to completion.
async fn handle_connection(
    registry: Arc<WorkerRegistry>,
    inbound_tx: mpsc::Sender<Envelope>,
    mut shutdown: broadcast::Receiver<()>,
    stream: TcpStream,
    peer_addr: SocketAddr,
) {
    let (mut reader, mut writer) = stream.into_split();

    // Handshake: the very first frame must be HELLO. Anything else gets
    // the connection closed without a registry entry.
    let hello = match wire::read_message(&mut reader).await {
        Ok(Message::Hello(hello)) => hello,
        Ok(other) => {
            tracing::warn!(peer = %peer_addr, frame = other.type_tag(), "frame before HELLO, closing");
            return;
        }
        Err(e) => {
            if !e.is_clean_close() {
                tracing::warn!(peer = %peer_addr, error = %e, "handshake read failed");
            }
            return;
        }
    };

    let worker_id = Uuid::new_v4().to_string();
    let ack = Message::Ack(Ack {
        worker_id: worker_id.clone(),
    });
    if let Err(e) = wire::write_message(&mut writer, &ack).await {
        tracing::warn!(peer = %peer_addr, error = %e, "failed to send ACK");
        return;
    }

    let (send_tx, send_rx) = mpsc::channel(SEND_QUEUE_DEPTH);
    registry.insert(WorkerEntry {
        id: worker_id.clone(),
        addr: peer_addr,
        concurrency: hello.concurrency,
        state: WorkerState::Idle,
        last_seen: Instant::now(),
        sender: send_tx,
    });
    tracing::info!(
        worker_id = %worker_id,
        peer = %peer_addr,
        concurrency = hello.concurrency,
        "worker registered"
    );

    let writer_task = tokio::spawn(write_loop(worker_id.clone(), writer, send_rx));

    let teardown = read_loop(
        &registry,
        &inbound_tx,
        &mut shutdown,
        &mut reader,
        &worker_id,
    )
    .await;

    registry.remove(&worker_id);
    writer_task.abort();
    tracing::info!(worker_id = %worker_id, reason = teardown, "worker connection closed");
}

/// Decode frames and demux them until the connection dies. Returns a short
/// teardown reason for the log.
async fn read_loop(
    registry: &WorkerRegistry,
    inbound_tx: &mpsc::Sender<Envelope>,
    shutdown: &mut broadcast::Receiver<()>,
    reader: &mut OwnedReadHalf,
    worker_id: &str,
) -> &'static str {
    loop {
        tokio::select! {
            _ = shutdown.recv() => return "shutdown",
            frame = wire::read_message(reader) => {
                let message = match frame {
                    Ok(message) => message,
                    Err(e) if e.is_clean_close() => return "disconnected",
                    Err(WireError::Malformed(e)) => {
                        tracing::warn!(worker_id, error = %e, "malformed frame");
                        return "protocol error";
                    }
                    Err(e) => {
                        tracing::warn!(worker_id, error = %e, "read failed");
                        return "read error";
                    }
                };

                registry.mark_seen(worker_id);
                let envelope = Envelope {
                    worker_id: worker_id.to_string(),
                    message,
                };
                if inbound_tx.send(envelope).await.is_err() {
                    return "inbound queue closed";
                }
            }
        }
    }
}

/// Drain the worker's send queue onto the wire. Exits when the queue
/// closes (deregistration) or a write fails.
async fn write_loop(
    worker_id: String,
    mut writer: tokio::net::tcp::OwnedWriteHalf,
    mut send_rx: mpsc::Receiver<Message>,
) {
    while let Some(message) = send_rx.recv().await {
        if let Err(e) = wire::write_message(&mut writer, &message).await {
            tracing::warn!(worker_id = %worker_id, error = %e, "write to worker failed");
            return;
        }
    }
}
