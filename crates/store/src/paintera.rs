use agglo_core::{Edge, FeatureMatrix};
use serde_json::Value;
use tracing::debug;

use crate::container::N5Container;
use crate::error::StoreError;

/// Dataset (relative to the paintera dataset) holding the edge list, `[n, 2]` uint64.
pub const EDGE_DATASET: &str = "edges";
/// Dataset holding the edge feature matrix, `[n, k]` float64.
pub const EDGE_FEATURE_DATASET: &str = "edge-features";
/// Attribute marking a dataset as paintera data.
pub const PAINTERA_DATA_KEY: &str = "painteraData";

/// Whether the dataset carries the paintera marker attribute.
pub fn is_paintera_data(container: &N5Container, dataset: &str) -> Result<bool, StoreError> {
    let attrs = container.read_attributes(dataset)?;
    Ok(attrs.get(PAINTERA_DATA_KEY).is_some())
}

/// Whether the dataset's paintera type is `"label"`.
pub fn is_paintera_label_data(container: &N5Container, dataset: &str) -> Result<bool, StoreError> {
    let attrs = container.read_attributes(dataset)?;
    Ok(attrs
        .get(PAINTERA_DATA_KEY)
        .and_then(|p| p.get("type"))
        .and_then(Value::as_str)
        == Some("label"))
}

/// Server-startup eligibility check. Both failures are construction-fatal.
pub fn validate_paintera_label_dataset(
    container: &N5Container,
    dataset: &str,
) -> Result<(), StoreError> {
    if !is_paintera_data(container, dataset)? {
        return Err(StoreError::NotPainteraData {
            container: container.root().display().to_string(),
            dataset: dataset.to_string(),
        });
    }
    if !is_paintera_label_data(container, dataset)? {
        return Err(StoreError::NotLabelData {
            container: container.root().display().to_string(),
            dataset: dataset.to_string(),
        });
    }
    Ok(())
}

/// One consistent load of the edge list and its feature matrix.
#[derive(Debug, Clone)]
pub struct EdgeData {
    pub edges: Vec<Edge>,
    pub features: FeatureMatrix,
}

/// Source of edge lists and feature matrices, the seam between the persistent
/// store and the workflow's feature cache.
pub trait EdgeSource: Send + Sync {
    fn load_edges(&self) -> Result<EdgeData, StoreError>;
}

/// [`EdgeSource`] reading the `edges` and `edge-features` datasets nested
/// under a paintera dataset.
#[derive(Debug, Clone)]
pub struct PainteraEdgeStore {
    container: N5Container,
    edge_dataset: String,
    edge_feature_dataset: String,
}

impl PainteraEdgeStore {
    pub fn new(container: N5Container, paintera_dataset: &str) -> Self {
        let base = paintera_dataset.trim_matches('/');
        Self {
            container,
            edge_dataset: join_dataset(base, EDGE_DATASET),
            edge_feature_dataset: join_dataset(base, EDGE_FEATURE_DATASET),
        }
    }

    pub fn edge_dataset(&self) -> &str {
        &self.edge_dataset
    }

    pub fn edge_feature_dataset(&self) -> &str {
        &self.edge_feature_dataset
    }
}

fn join_dataset(base: &str, child: &str) -> String {
    if base.is_empty() {
        child.to_string()
    } else {
        format!("{}/{}", base, child)
    }
}

impl EdgeSource for PainteraEdgeStore {
    fn load_edges(&self) -> Result<EdgeData, StoreError> {
        let (edge_values, edge_dims) = self.container.read_uint64(&self.edge_dataset)?;
        if edge_dims.len() != 2 || edge_dims[1] != 2 {
            return Err(StoreError::ShapeMismatch {
                dataset: self.edge_dataset.clone(),
                detail: format!("expected [n, 2], got {:?}", edge_dims),
            });
        }
        let edges: Vec<Edge> = edge_values
            .chunks_exact(2)
            .map(|pair| Edge::new(pair[0], pair[1]))
            .collect();

        let (feature_values, feature_dims) =
            self.container.read_float64(&self.edge_feature_dataset)?;
        if feature_dims.len() != 2 || feature_dims[0] != edges.len() {
            return Err(StoreError::ShapeMismatch {
                dataset: self.edge_feature_dataset.clone(),
                detail: format!(
                    "expected [{}, k] to match the edge list, got {:?}",
                    edges.len(),
                    feature_dims
                ),
            });
        }
        let features = FeatureMatrix::new(feature_values, feature_dims[0], feature_dims[1]);

        debug!(
            edges = edges.len(),
            features = features.cols(),
            "loaded edge data"
        );
        Ok(EdgeData { edges, features })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn label_container(dir: &std::path::Path) -> N5Container {
        let c = N5Container::create(dir).unwrap();
        c.create_group("seg").unwrap();
        c.set_attribute("seg", PAINTERA_DATA_KEY, json!({ "type": "label" }))
            .unwrap();
        c
    }

    #[test]
    fn validation_accepts_label_data() {
        let dir = tempfile::tempdir().unwrap();
        let c = label_container(dir.path());
        assert!(is_paintera_data(&c, "seg").unwrap());
        assert!(is_paintera_label_data(&c, "seg").unwrap());
        validate_paintera_label_dataset(&c, "seg").unwrap();
    }

    #[test]
    fn validation_rejects_missing_marker() {
        let dir = tempfile::tempdir().unwrap();
        let c = N5Container::create(dir.path()).unwrap();
        c.create_group("raw").unwrap();

        assert!(matches!(
            validate_paintera_label_dataset(&c, "raw"),
            Err(StoreError::NotPainteraData { .. })
        ));
    }

    #[test]
    fn validation_rejects_non_label_type() {
        let dir = tempfile::tempdir().unwrap();
        let c = N5Container::create(dir.path()).unwrap();
        c.create_group("raw").unwrap();
        c.set_attribute("raw", PAINTERA_DATA_KEY, json!({ "type": "raw" }))
            .unwrap();

        assert!(matches!(
            validate_paintera_label_dataset(&c, "raw"),
            Err(StoreError::NotLabelData { .. })
        ));
    }

    #[test]
    fn edge_store_loads_edges_and_features() {
        let dir = tempfile::tempdir().unwrap();
        let c = label_container(dir.path());
        c.write_uint64("seg/edges", &[0, 1, 1, 2, 0, 2], &[3, 2])
            .unwrap();
        c.write_float64(
            "seg/edge-features",
            &[0.5, 1.0, 0.7, 0.9, 0.3, 0.9],
            &[3, 2],
        )
        .unwrap();

        let store = PainteraEdgeStore::new(c, "seg");
        let data = store.load_edges().unwrap();
        assert_eq!(data.edges, vec![Edge::new(0, 1), Edge::new(1, 2), Edge::new(0, 2)]);
        assert_eq!(data.features.rows(), 3);
        assert_eq!(data.features.cols(), 2);
        assert_eq!(data.features.row(1), &[0.7, 0.9]);
    }

    #[test]
    fn edge_store_rejects_feature_row_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let c = label_container(dir.path());
        c.write_uint64("seg/edges", &[0, 1, 1, 2], &[2, 2]).unwrap();
        c.write_float64("seg/edge-features", &[0.5], &[1, 1]).unwrap();

        let store = PainteraEdgeStore::new(c, "seg");
        assert!(matches!(
            store.load_edges(),
            Err(StoreError::ShapeMismatch { .. })
        ));
    }
}
