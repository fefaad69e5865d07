use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use agglo_compute::RandomForestConfig;
use agglo_core::{Edge, SolutionId};
use agglo_store::{EdgeSource, StoreError};

use crate::error::WorkflowError;
use crate::feature_cache::EdgeFeatureCache;
use crate::label_cache::EdgeLabelCache;
use crate::state::{ComputeInputs, ComputeState, SolutionState};

/// Callback invoked after every completed recompute, success or failure,
/// synchronously inside the actor and in registration order.
pub type SolutionListener = Box<dyn Fn(SolutionId, SolutionState, &Arc<ComputeState>) + Send>;

enum Command {
    UpdateEdges {
        reply: oneshot::Sender<Result<(), StoreError>>,
    },
    SetEdgeLabels {
        pairs: Vec<(Edge, u64)>,
        reply: oneshot::Sender<usize>,
    },
    RequestUpdateState {
        reply: oneshot::Sender<SolutionId>,
    },
    LatestSolution {
        reply: oneshot::Sender<Option<Arc<ComputeState>>>,
    },
    AddListener {
        listener: SolutionListener,
    },
    Snapshot {
        reply: oneshot::Sender<ComputeInputs>,
    },
    Install {
        solution_id: SolutionId,
        state: Arc<ComputeState>,
        reply: oneshot::Sender<()>,
    },
    Stop,
}

/// Handle to the workflow actor. Cheap to clone; all clones talk to the same
/// actor and worker pair.
#[derive(Clone)]
pub struct Workflow {
    commands: mpsc::UnboundedSender<Command>,
    shutdown: Arc<Notify>,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl Workflow {
    /// Load the initial cache generation from the source and start the actor
    /// and worker tasks. A failing initial load is construction-fatal.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        source: Arc<dyn EdgeSource>,
        config: RandomForestConfig,
    ) -> Result<Self, WorkflowError> {
        let feature_cache = EdgeFeatureCache::new(source)?;
        let mut label_cache = EdgeLabelCache::new();
        label_cache.update_edge_index_mapping(feature_cache.index_mapping());

        let (commands, command_rx) = mpsc::unbounded_channel();
        let (jobs, job_rx) = mpsc::unbounded_channel();
        let shutdown = Arc::new(Notify::new());

        let actor = ActorState {
            feature_cache,
            label_cache,
            latest_state: None,
            latest_successful_state: None,
            listeners: Vec::new(),
            next_solution_id: 0,
            jobs,
        };
        let actor_task = tokio::spawn(actor_loop(actor, command_rx));
        let worker_task = tokio::spawn(worker_loop(
            job_rx,
            commands.clone(),
            Arc::clone(&shutdown),
            config,
        ));

        info!("workflow started");
        Ok(Self {
            commands,
            shutdown,
            tasks: Arc::new(Mutex::new(vec![actor_task, worker_task])),
        })
    }

    /// Refresh the feature cache from storage and hand the freshly derived
    /// index mapping to the label cache.
    pub async fn update_edges(&self) -> Result<(), WorkflowError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::UpdateEdges { reply })?;
        rx.await.map_err(|_| WorkflowError::ShutDown)?.map_err(Into::into)
    }

    /// Record user labels. Unknown edges are silently skipped; returns the
    /// number of labels recorded.
    pub async fn set_edge_labels(
        &self,
        pairs: Vec<(Edge, u64)>,
    ) -> Result<usize, WorkflowError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::SetEdgeLabels { pairs, reply })?;
        rx.await.map_err(|_| WorkflowError::ShutDown)
    }

    /// Enqueue a recompute and return the solution id it was assigned.
    /// Never blocks on the computation itself.
    pub async fn request_update_state(&self) -> Result<SolutionId, WorkflowError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::RequestUpdateState { reply })?;
        rx.await.map_err(|_| WorkflowError::ShutDown)
    }

    /// The most recent successful state, if any recompute has ever succeeded.
    pub async fn latest_solution(&self) -> Result<Option<Arc<ComputeState>>, WorkflowError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::LatestSolution { reply })?;
        rx.await.map_err(|_| WorkflowError::ShutDown)
    }

    /// Register a listener for completed recomputes. Listeners run
    /// synchronously inside the actor: a slow listener delays installation of
    /// subsequent results, so keep them fast (hand off to a channel).
    pub async fn add_solution_update_listener<F>(&self, listener: F) -> Result<(), WorkflowError>
    where
        F: Fn(SolutionId, SolutionState, &Arc<ComputeState>) + Send + 'static,
    {
        self.send(Command::AddListener {
            listener: Box::new(listener),
        })
    }

    /// Stop the worker after its in-flight job (queued jobs are abandoned),
    /// then stop the actor, and join both tasks.
    pub async fn stop(&self) {
        self.shutdown.notify_one();
        let mut tasks = self.tasks.lock().await;
        if tasks.is_empty() {
            return;
        }
        // Worker first so its in-flight Install can still reach the actor.
        let worker = tasks.pop();
        if let Some(worker) = worker {
            if let Err(err) = worker.await {
                error!(error = %err, "worker task failed during shutdown");
            }
        }
        let _ = self.commands.send(Command::Stop);
        if let Some(actor) = tasks.pop() {
            if let Err(err) = actor.await {
                error!(error = %err, "actor task failed during shutdown");
            }
        }
        info!("workflow stopped");
    }

    fn send(&self, command: Command) -> Result<(), WorkflowError> {
        self.commands
            .send(command)
            .map_err(|_| WorkflowError::ShutDown)
    }
}

struct ActorState {
    feature_cache: EdgeFeatureCache,
    label_cache: EdgeLabelCache,
    latest_state: Option<Arc<ComputeState>>,
    latest_successful_state: Option<Arc<ComputeState>>,
    listeners: Vec<SolutionListener>,
    next_solution_id: SolutionId,
    jobs: mpsc::UnboundedSender<SolutionId>,
}

impl ActorState {
    fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::UpdateEdges { reply } => {
                let result = self.feature_cache.refresh().map(|()| {
                    self.label_cache
                        .update_edge_index_mapping(self.feature_cache.index_mapping());
                });
                let _ = reply.send(result);
            }
            Command::SetEdgeLabels { pairs, reply } => {
                let recorded = self.label_cache.update_labels(&pairs);
                let _ = reply.send(recorded);
            }
            Command::RequestUpdateState { reply } => {
                let solution_id = self.next_solution_id;
                self.next_solution_id += 1;
                // A send failure means the worker is gone; the id is still
                // assigned, the job is simply abandoned.
                let _ = self.jobs.send(solution_id);
                debug!(solution_id, "recompute enqueued");
                let _ = reply.send(solution_id);
            }
            Command::LatestSolution { reply } => {
                let _ = reply.send(self.latest_successful_state.clone());
            }
            Command::AddListener { listener } => {
                self.listeners.push(listener);
            }
            Command::Snapshot { reply } => {
                let features = self.feature_cache.features();
                let (samples, labels) = self.label_cache.sample_and_label_arrays(&features);
                let _ = reply.send(ComputeInputs {
                    edges: self.feature_cache.edges(),
                    edge_features: features,
                    graph: self.feature_cache.graph(),
                    edge_index_mapping: self.feature_cache.index_mapping(),
                    samples,
                    labels,
                });
            }
            Command::Install {
                solution_id,
                state,
                reply,
            } => {
                let solution_state = state.solution_state;
                self.latest_state = Some(Arc::clone(&state));
                if solution_state.is_success() {
                    self.latest_successful_state = Some(Arc::clone(&state));
                }
                info!(
                    solution_id,
                    exit_code = solution_state.exit_code(),
                    "recompute finished"
                );
                for listener in &self.listeners {
                    listener(solution_id, solution_state, &state);
                }
                let _ = reply.send(());
            }
            Command::Stop => return false,
        }
        true
    }
}

async fn actor_loop(mut state: ActorState, mut commands: mpsc::UnboundedReceiver<Command>) {
    while let Some(command) = commands.recv().await {
        if !state.handle(command) {
            break;
        }
    }
    debug!("workflow actor exited");
}

/// Single consumer of the recompute queue: strict FIFO, at most one recompute
/// in flight, completion published in submission order.
async fn worker_loop(
    mut jobs: mpsc::UnboundedReceiver<SolutionId>,
    commands: mpsc::UnboundedSender<Command>,
    shutdown: Arc<Notify>,
    config: RandomForestConfig,
) {
    loop {
        let solution_id = tokio::select! {
            biased;
            _ = shutdown.notified() => break,
            job = jobs.recv() => match job {
                Some(id) => id,
                None => break,
            },
        };

        let (reply, rx) = oneshot::channel();
        if commands.send(Command::Snapshot { reply }).is_err() {
            break;
        }
        let Ok(inputs) = rx.await else { break };

        debug!(solution_id, "recompute started");
        let task_config = config.clone();
        let state = match tokio::task::spawn_blocking(move || {
            ComputeState::compute(inputs, &task_config)
        })
        .await
        {
            Ok(state) => Arc::new(state),
            Err(err) => {
                error!(solution_id, error = %err, "recompute task panicked");
                continue;
            }
        };

        let (reply, rx) = oneshot::channel();
        if commands
            .send(Command::Install {
                solution_id,
                state,
                reply,
            })
            .is_err()
        {
            break;
        }
        // Wait for installation before dequeuing the next job so completions
        // are published in submission order.
        let _ = rx.await;
    }
    debug!("workflow worker exited");
}
