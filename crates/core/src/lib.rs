//! Shared types for the agglomeration solver: edges, the region adjacency
//! graph, feature matrices, and solution ids.

pub mod types;

pub use types::{Edge, FeatureMatrix, Graph, SolutionId};
