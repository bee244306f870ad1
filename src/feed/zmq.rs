/*!
 * ZeroMQ Hint Bridge
 *
 * Background task owning the SUB socket connected to the external priority
 * publisher. Frames are forwarded into a [`HintBroadcaster`]; the slot path
 * only ever touches the mailboxes, never the socket.
 */

use super::mailbox::HintBroadcaster;
use super::types::FeedConfig;
use crate::core::SchedResult;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use zeromq::prelude::*;
use zeromq::{SubSocket, ZmqMessage};

const RECV_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Running SUB-socket forwarder
pub struct ZmqHintBridge {
    endpoint: String,
    forwarded: Arc<AtomicU64>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ZmqHintBridge {
    /// Connect to the configured publisher, subscribe to everything and start
    /// forwarding. Must be called within a tokio runtime.
    #[instrument(skip_all, fields(endpoint = %config.endpoint))]
    pub async fn connect(config: &FeedConfig, broadcaster: HintBroadcaster) -> SchedResult<Self> {
        config.validate()?;

        let mut socket = SubSocket::new();
        socket.connect(&config.endpoint).await?;
        socket.subscribe("").await?;
        info!(endpoint = %config.endpoint, "priority feed SUB socket connected");

        let forwarded = Arc::new(AtomicU64::new(0));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(forward_hints(
            socket,
            broadcaster,
            Arc::clone(&forwarded),
            shutdown_rx,
        ));

        Ok(Self {
            endpoint: config.endpoint.clone(),
            forwarded,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Hints forwarded so far
    pub fn forwarded(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }

    /// Stop the forwarder and close the socket, returning the forwarded count
    pub async fn shutdown(mut self) -> u64 {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                warn!(error = %err, "priority feed forwarder panicked");
            }
        }
        let forwarded = self.forwarded();
        info!(endpoint = %self.endpoint, forwarded, "priority feed bridge stopped");
        forwarded
    }
}

impl Drop for ZmqHintBridge {
    fn drop(&mut self) {
        // Not shut down explicitly; stop the task without waiting for it
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn forward_hints(
    mut socket: SubSocket,
    broadcaster: HintBroadcaster,
    forwarded: Arc<AtomicU64>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = &mut shutdown_rx => break,
            received = socket.recv() => match received {
                Ok(message) => {
                    let Some(payload) = hint_frame(message) else {
                        continue;
                    };
                    let delivered = broadcaster.publish(payload);
                    forwarded.fetch_add(1, Ordering::Relaxed);
                    debug!(delivered, "priority hint forwarded");
                }
                Err(err) => {
                    warn!(error = %err, "priority feed receive failed");
                    tokio::time::sleep(RECV_ERROR_BACKOFF).await;
                }
            },
        }
    }

    let _ = socket.close().await;
}

/// Hint payload of a message: its last frame, so topic-prefixed multipart
/// messages work as well as bare single-frame ones
fn hint_frame(message: ZmqMessage) -> Option<bytes::Bytes> {
    message.into_vec().pop()
}
