//! The solver server: six channels over one workflow.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use zeromq::prelude::*;
use zeromq::{PubSocket, RepSocket, ZmqMessage};

use agglo_compute::RandomForestConfig;
use agglo_store::{validate_paintera_label_dataset, N5Container, PainteraEdgeStore};
use agglo_workflow::Workflow;

use crate::api::{self, ApiContext};
use crate::channels::ChannelTask;
use crate::codec;
use crate::error::ServerError;

/// Capacity of the queue between the workflow listener and the new-solution
/// publisher. The listener drops notifications instead of blocking the
/// workflow when the publisher falls this far behind.
const SOLUTION_UPDATE_QUEUE: usize = 256;

/// The six channel addresses derived from one base address.
///
/// Suffixes are concatenated onto the base, so the base must be an endpoint
/// where that is well-formed (`ipc://...`, or `tcp://` with per-channel bases).
#[derive(Debug, Clone)]
pub struct ChannelAddresses {
    base: String,
}

impl ChannelAddresses {
    pub fn new(base: impl Into<String>) -> Self {
        Self { base: base.into() }
    }

    /// The API channel listens on the bare base address.
    pub fn api(&self) -> String {
        self.base.clone()
    }

    pub fn ping(&self) -> String {
        format!("{}-ping", self.base)
    }

    pub fn current_solution(&self) -> String {
        format!("{}-current-solution", self.base)
    }

    pub fn set_edge_labels(&self) -> String {
        format!("{}-set-edge-labels", self.base)
    }

    pub fn update_solution(&self) -> String {
        format!("{}-update-solution", self.base)
    }

    pub fn new_solution(&self) -> String {
        format!("{}-new-solution", self.base)
    }
}

/// A running solver server. All sockets are bound before `serve` returns.
pub struct SolverServer {
    workflow: Workflow,
    addresses: ChannelAddresses,
    channels: Vec<ChannelTask>,
}

impl SolverServer {
    /// Validate the dataset, load the initial edge data, bind every channel,
    /// and start serving. Any failure here is construction-fatal.
    pub async fn serve(
        container: N5Container,
        paintera_dataset: &str,
        address_base: &str,
        config: RandomForestConfig,
    ) -> Result<SolverServer, ServerError> {
        validate_paintera_label_dataset(&container, paintera_dataset)?;

        let container_path = container.root().display().to_string();
        let source = Arc::new(PainteraEdgeStore::new(container, paintera_dataset));
        let workflow = Workflow::new(source, config)?;

        let addresses = ChannelAddresses::new(address_base);
        let api_socket = bind_rep(&addresses.api()).await?;
        let ping_socket = bind_rep(&addresses.ping()).await?;
        let current_socket = bind_rep(&addresses.current_solution()).await?;
        let labels_socket = bind_rep(&addresses.set_edge_labels()).await?;
        let update_socket = bind_rep(&addresses.update_solution()).await?;
        let pub_socket = bind_pub(&addresses.new_solution()).await?;

        let (updates_tx, updates_rx) = mpsc::channel(SOLUTION_UPDATE_QUEUE);
        workflow
            .add_solution_update_listener(move |solution_id, state, _| {
                if updates_tx.try_send((solution_id, state.exit_code())).is_err() {
                    warn!(solution_id, "solution update queue full, dropping notification");
                }
            })
            .await?;

        let ctx = Arc::new(ApiContext {
            container: container_path,
            dataset: paintera_dataset.to_string(),
            addresses: addresses.clone(),
        });

        let channels = vec![
            ChannelTask::spawn_rep("api", api_socket, move |request| {
                let ctx = Arc::clone(&ctx);
                async move { Some(api::respond(&request, &ctx)) }
            }),
            ChannelTask::spawn_rep("ping", ping_socket, |_request| async {
                Some(ZmqMessage::from(Vec::<u8>::new()))
            }),
            {
                let workflow = workflow.clone();
                ChannelTask::spawn_rep("current-solution", current_socket, move |_request| {
                    let workflow = workflow.clone();
                    async move { Some(current_solution_reply(&workflow).await) }
                })
            },
            {
                let workflow = workflow.clone();
                ChannelTask::spawn_rep("set-edge-labels", labels_socket, move |request| {
                    let workflow = workflow.clone();
                    async move { Some(set_edge_labels_reply(&workflow, &request).await) }
                })
            },
            {
                let workflow = workflow.clone();
                ChannelTask::spawn_rep("update-solution", update_socket, move |_request| {
                    let workflow = workflow.clone();
                    async move { update_solution_reply(&workflow).await }
                })
            },
            ChannelTask::spawn_publisher(pub_socket, updates_rx),
        ];

        info!(api = %addresses.api(), "serving API channel");
        info!(ping = %addresses.ping(), "serving ping channel");
        info!(current_solution = %addresses.current_solution(), "serving current-solution channel");
        info!(set_edge_labels = %addresses.set_edge_labels(), "serving set-edge-labels channel");
        info!(update_solution = %addresses.update_solution(), "serving update-solution channel");
        info!(new_solution = %addresses.new_solution(), "serving new-solution channel");

        Ok(SolverServer {
            workflow,
            addresses,
            channels,
        })
    }

    pub fn addresses(&self) -> &ChannelAddresses {
        &self.addresses
    }

    /// Stop the channel tasks first so no request can reach a stopped
    /// workflow, then stop the workflow.
    pub async fn shutdown(self) {
        for channel in self.channels {
            channel.stop().await;
        }
        self.workflow.stop().await;
        info!("solver server stopped");
    }
}

async fn current_solution_reply(workflow: &Workflow) -> ZmqMessage {
    let state = match workflow.latest_solution().await {
        Ok(state) => state,
        Err(err) => {
            warn!(error = %err, "current-solution lookup failed");
            None
        }
    };
    match state {
        Some(state) => {
            let solution = state.solution.as_deref().unwrap_or(&[]);
            let mut message = ZmqMessage::from(codec::encode_i64(codec::CURRENT_SOLUTION_SUCCESS));
            message.push_back(codec::encode_solution(solution).into());
            message
        }
        None => {
            let mut message =
                ZmqMessage::from(codec::encode_i64(codec::CURRENT_SOLUTION_NO_SOLUTION));
            message.push_back(Vec::<u8>::new().into());
            message
        }
    }
}

async fn set_edge_labels_reply(workflow: &Workflow, request: &ZmqMessage) -> ZmqMessage {
    let method = match codec::frame_i64(request, 0) {
        Ok(method) => method,
        Err(err) => return exception_reply(&err.to_string()),
    };

    if method != codec::METHOD_EDGE_LIST {
        debug!(method, "unknown set-edge-labels method");
        let mut message =
            ZmqMessage::from(codec::encode_i64(codec::SET_EDGE_LABELS_DO_NOT_UNDERSTAND));
        // Echo the method frame back unchanged.
        message.push_back(request.get(0).cloned().unwrap_or_default());
        return message;
    }

    let payload = request.get(1).map(|f| f.as_ref()).unwrap_or(&[]);
    let pairs = match codec::decode_edge_labels(payload) {
        Ok(pairs) => pairs,
        Err(err) => return exception_reply(&err.to_string()),
    };

    let submitted = pairs.len();
    match workflow.set_edge_labels(pairs).await {
        Ok(recorded) => {
            debug!(submitted, recorded, "edge labels accepted");
            let mut message = ZmqMessage::from(codec::encode_i64(codec::SET_EDGE_LABELS_SUCCESS));
            message.push_back(codec::encode_i64(submitted as i64).into());
            message
        }
        Err(err) => exception_reply(&err.to_string()),
    }
}

fn exception_reply(message_text: &str) -> ZmqMessage {
    let mut message = ZmqMessage::from(codec::encode_i64(codec::SET_EDGE_LABELS_EXCEPTION));
    message.push_back(message_text.as_bytes().to_vec().into());
    message
}

/// `None` when no id can be assigned (the workflow has shut down): RECEIVED
/// must never carry an id the workflow did not issue, so the channel closes
/// instead of replying.
async fn update_solution_reply(workflow: &Workflow) -> Option<ZmqMessage> {
    let solution_id = match workflow.request_update_state().await {
        Ok(solution_id) => solution_id,
        Err(err) => {
            warn!(error = %err, "update-solution request failed");
            return None;
        }
    };
    let mut message = ZmqMessage::from(codec::encode_i64(codec::UPDATE_RECEIVED));
    message.push_back(codec::encode_i64(solution_id).into());
    Some(message)
}

async fn bind_rep(endpoint: &str) -> Result<RepSocket, ServerError> {
    prepare_endpoint(endpoint)?;
    let mut socket = RepSocket::new();
    socket.bind(endpoint).await?;
    Ok(socket)
}

async fn bind_pub(endpoint: &str) -> Result<PubSocket, ServerError> {
    prepare_endpoint(endpoint)?;
    let mut socket = PubSocket::new();
    socket.bind(endpoint).await?;
    Ok(socket)
}

/// For `ipc://` endpoints, create the socket directory and clear any stale
/// socket file left by an unclean exit.
fn prepare_endpoint(endpoint: &str) -> std::io::Result<()> {
    let Some(path) = endpoint.strip_prefix("ipc://") else {
        return Ok(());
    };
    let path = Path::new(path);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    if path.exists() {
        fs::remove_file(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use agglo_core::{Edge, FeatureMatrix};
    use agglo_store::{EdgeData, EdgeSource, StoreError};

    struct StaticSource(EdgeData);

    impl EdgeSource for StaticSource {
        fn load_edges(&self) -> Result<EdgeData, StoreError> {
            Ok(self.0.clone())
        }
    }

    fn workflow() -> Workflow {
        let data = EdgeData {
            edges: vec![Edge::new(0, 1)],
            features: FeatureMatrix::new(vec![0.5], 1, 1),
        };
        Workflow::new(Arc::new(StaticSource(data)), RandomForestConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn update_solution_never_invents_an_id() {
        let workflow = workflow();

        let reply = update_solution_reply(&workflow).await.unwrap();
        assert_eq!(codec::frame_i64(&reply, 0).unwrap(), codec::UPDATE_RECEIVED);
        assert_eq!(codec::frame_i64(&reply, 1).unwrap(), 0);

        // After shutdown no id exists to report, so there is no reply at all.
        workflow.stop().await;
        assert!(update_solution_reply(&workflow).await.is_none());
    }

    #[test]
    fn addresses_derive_from_the_base() {
        let addresses = ChannelAddresses::new("ipc:///tmp/agglo/solver");
        assert_eq!(addresses.api(), "ipc:///tmp/agglo/solver");
        assert_eq!(addresses.ping(), "ipc:///tmp/agglo/solver-ping");
        assert_eq!(
            addresses.current_solution(),
            "ipc:///tmp/agglo/solver-current-solution"
        );
        assert_eq!(
            addresses.set_edge_labels(),
            "ipc:///tmp/agglo/solver-set-edge-labels"
        );
        assert_eq!(
            addresses.update_solution(),
            "ipc:///tmp/agglo/solver-update-solution"
        );
        assert_eq!(
            addresses.new_solution(),
            "ipc:///tmp/agglo/solver-new-solution"
        );
    }

    #[test]
    fn prepare_endpoint_clears_stale_ipc_sockets() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("nested").join("solver");
        let endpoint = format!("ipc://{}", socket_path.display());

        prepare_endpoint(&endpoint).unwrap();
        assert!(socket_path.parent().unwrap().is_dir());

        fs::write(&socket_path, b"stale").unwrap();
        prepare_endpoint(&endpoint).unwrap();
        assert!(!socket_path.exists());

        // Non-ipc endpoints are left alone.
        prepare_endpoint("tcp://127.0.0.1:5555").unwrap();
    }
}
