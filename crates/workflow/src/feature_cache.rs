use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use agglo_core::{Edge, FeatureMatrix, Graph};
use agglo_store::{EdgeSource, StoreError};

/// Cache of the edge list, feature matrix, derived graph, and the edge → index
/// mapping, loaded from an [`EdgeSource`].
///
/// Every field is an `Arc` snapshot: a refresh replaces all of them wholesale,
/// so holders of a previous snapshot keep a consistent generation.
pub struct EdgeFeatureCache {
    source: Arc<dyn EdgeSource>,
    edges: Arc<Vec<Edge>>,
    features: Arc<FeatureMatrix>,
    graph: Arc<Graph>,
    mapping: Arc<HashMap<Edge, usize>>,
}

impl EdgeFeatureCache {
    /// Load the initial generation from the source.
    pub fn new(source: Arc<dyn EdgeSource>) -> Result<Self, StoreError> {
        let mut cache = Self {
            source,
            edges: Arc::new(Vec::new()),
            features: Arc::new(FeatureMatrix::empty(0)),
            graph: Arc::new(Graph::from_edges(Vec::new())),
            mapping: Arc::new(HashMap::new()),
        };
        cache.refresh()?;
        Ok(cache)
    }

    /// Reload everything from the source, replacing the current generation.
    pub fn refresh(&mut self) -> Result<(), StoreError> {
        let data = self.source.load_edges()?;

        let mapping: HashMap<Edge, usize> = data
            .edges
            .iter()
            .enumerate()
            .map(|(index, &edge)| (edge, index))
            .collect();

        self.graph = Arc::new(Graph::from_edges(data.edges.clone()));
        self.edges = Arc::new(data.edges);
        self.features = Arc::new(data.features);
        self.mapping = Arc::new(mapping);

        info!(
            edges = self.edges.len(),
            nodes = self.graph.num_nodes(),
            feature_dims = self.features.cols(),
            "refreshed edge feature cache"
        );
        Ok(())
    }

    pub fn edges(&self) -> Arc<Vec<Edge>> {
        Arc::clone(&self.edges)
    }

    pub fn features(&self) -> Arc<FeatureMatrix> {
        Arc::clone(&self.features)
    }

    pub fn graph(&self) -> Arc<Graph> {
        Arc::clone(&self.graph)
    }

    pub fn index_mapping(&self) -> Arc<HashMap<Edge, usize>> {
        Arc::clone(&self.mapping)
    }
}
