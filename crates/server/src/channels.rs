//! Socket-owning channel tasks.
//!
//! Every channel is one spawned task that owns its socket outright; the
//! server keeps only a shutdown handle per task. REP channels alternate
//! recv/reply, the publisher drains the solution-update queue.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use zeromq::prelude::*;
use zeromq::{PubSocket, RepSocket, ZmqMessage};

use agglo_core::SolutionId;

use crate::codec;

/// A running channel task and the means to stop it.
pub(crate) struct ChannelTask {
    name: &'static str,
    shutdown: Arc<Notify>,
    handle: JoinHandle<()>,
}

impl ChannelTask {
    /// Spawn a REP loop: receive a request, ask the handler for the reply,
    /// send it. The handler owns whatever state it needs; returning `None`
    /// closes the channel without replying.
    pub(crate) fn spawn_rep<H, Fut>(
        name: &'static str,
        mut socket: RepSocket,
        mut handler: H,
    ) -> ChannelTask
    where
        H: FnMut(ZmqMessage) -> Fut + Send + 'static,
        Fut: Future<Output = Option<ZmqMessage>> + Send,
    {
        let shutdown = Arc::new(Notify::new());
        let task_shutdown = Arc::clone(&shutdown);
        let handle = tokio::spawn(async move {
            loop {
                let request = tokio::select! {
                    _ = task_shutdown.notified() => break,
                    request = socket.recv() => match request {
                        Ok(request) => request,
                        Err(err) => {
                            warn!(channel = name, error = %err, "recv failed, closing channel");
                            break;
                        }
                    },
                };
                debug!(channel = name, frames = request.len(), "received request");
                let Some(reply) = handler(request).await else {
                    warn!(channel = name, "no reply possible, closing channel");
                    break;
                };
                if let Err(err) = socket.send(reply).await {
                    warn!(channel = name, error = %err, "reply send failed, closing channel");
                    break;
                }
            }
            debug!(channel = name, "channel task exited");
        });
        ChannelTask {
            name,
            shutdown,
            handle,
        }
    }

    /// Spawn the new-solution publisher: every queued `(solution_id,
    /// exit_code)` pair goes out as two integer frames.
    pub(crate) fn spawn_publisher(
        mut socket: PubSocket,
        mut updates: mpsc::Receiver<(SolutionId, i64)>,
    ) -> ChannelTask {
        let shutdown = Arc::new(Notify::new());
        let task_shutdown = Arc::clone(&shutdown);
        let handle = tokio::spawn(async move {
            loop {
                let (solution_id, exit_code) = tokio::select! {
                    _ = task_shutdown.notified() => break,
                    update = updates.recv() => match update {
                        Some(update) => update,
                        None => break,
                    },
                };
                let mut message = ZmqMessage::from(codec::encode_i64(solution_id));
                message.push_back(codec::encode_i64(exit_code).into());
                if let Err(err) = socket.send(message).await {
                    warn!(solution_id, error = %err, "publish failed, closing channel");
                    break;
                }
                info!(solution_id, exit_code, "published solution update");
            }
            debug!(channel = "new-solution", "channel task exited");
        });
        ChannelTask {
            name: "new-solution",
            shutdown,
            handle,
        }
    }

    pub(crate) async fn stop(self) {
        self.shutdown.notify_one();
        if let Err(err) = self.handle.await {
            error!(channel = self.name, error = %err, "channel task failed during shutdown");
        }
    }
}
