//! Workflow orchestrator: serialized recompute over shared edge caches.
//!
//! A single actor task owns the feature cache, the label cache, the versioned
//! solution state, and the listener list; a single worker task drains the
//! FIFO recompute queue. The CPU-bound classifier/optimizer invocation runs
//! on the blocking pool so label submissions keep flowing during a long
//! recompute.

pub mod error;
pub mod feature_cache;
pub mod label_cache;
pub mod state;
pub mod workflow;

pub use error::WorkflowError;
pub use feature_cache::EdgeFeatureCache;
pub use label_cache::EdgeLabelCache;
pub use state::{ComputeInputs, ComputeState, SolutionState};
pub use workflow::{SolutionListener, Workflow};
