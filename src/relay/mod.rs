//! Data-Message Relay Module
//!
//! The portal's out-of-band data path. Inbound data messages addressed to a
//! peer are enqueued here instead of being forwarded inline, so RPC tasks
//! are never blocked behind a slow downstream send. A single worker drains
//! the queue with a timed pop and drops messages whose destination is not a
//! connected peer.

use crate::rpc::client::NodeClient;

use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// How long the worker waits on an empty queue before re-checking the stop
/// flag.
const POP_TIMEOUT: Duration = Duration::from_millis(100);

/// One relayed data message.
#[derive(Debug, Clone)]
pub struct RelayMessage {
    pub source: String,
    pub destination: String,
    pub data: Vec<u8>,
}

/// Bounded FIFO of data messages with a single dedicated worker.
pub struct ForwardingQueue {
    tx: mpsc::Sender<RelayMessage>,
    stop: Arc<AtomicBool>,
    worker: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl ForwardingQueue {
    /// Starts the queue and its worker. The worker resolves destinations
    /// against `peers` at send time, so peers that connect later are picked
    /// up without restarting the queue.
    pub fn start(peers: Arc<DashMap<String, Arc<NodeClient>>>, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<RelayMessage>(capacity);
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();

        let worker = tokio::spawn(async move {
            loop {
                if stop_flag.load(Ordering::SeqCst) {
                    break;
                }

                let message = match tokio::time::timeout(POP_TIMEOUT, rx.recv()).await {
                    Ok(Some(message)) => message,
                    // Sender dropped; nothing more will arrive.
                    Ok(None) => break,
                    // Timed pop: loop around and observe the stop flag.
                    Err(_) => continue,
                };

                let Some(peer) = peers.get(&message.destination).map(|p| p.value().clone())
                else {
                    tracing::warn!(
                        "Cannot forward message to {}: no such peer",
                        message.destination
                    );
                    continue;
                };

                if !peer.is_connected().await {
                    tracing::warn!(
                        "Cannot forward message to {}: client not connected",
                        message.destination
                    );
                    continue;
                }

                if let Err(e) = peer
                    .send(&message.source, &message.destination, &message.data)
                    .await
                {
                    tracing::warn!("Relay to {} failed: {}", message.destination, e);
                }
            }

            tracing::debug!("Forwarding queue worker exited");
        });

        Self {
            tx,
            stop,
            worker: std::sync::Mutex::new(Some(worker)),
        }
    }

    /// Enqueues a message. A full queue drops the message with a log line
    /// rather than blocking the caller.
    pub fn enqueue(&self, message: RelayMessage) {
        if let Err(e) = self.tx.try_send(message) {
            tracing::warn!("Forwarding queue full, dropping message: {}", e);
        }
    }

    /// Signals the worker to stop and waits for it to exit after its current
    /// pop.
    pub async fn shutdown(&self) {
        self.stop.store(true, Ordering::SeqCst);
        let worker = self.worker.lock().unwrap().take();
        if let Some(worker) = worker {
            let _ = worker.await;
        }
    }
}
