use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::debug;

use agglo_core::{Edge, FeatureMatrix};

/// User-supplied edge labels, keyed by edge identity.
///
/// Labels survive index-mapping replacements: they are resolved to index
/// positions only when the sample/label arrays are materialized, and entries
/// whose edge is absent from the current mapping are skipped there. The
/// insertion-ordered map keeps the positional pairing between the two arrays
/// stable.
#[derive(Default)]
pub struct EdgeLabelCache {
    labels: IndexMap<Edge, u64>,
    mapping: Option<Arc<HashMap<Edge, usize>>>,
}

impl EdgeLabelCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record labels for the given edges. Edges unknown to the current index
    /// mapping are silently skipped; before the first mapping is set this is a
    /// no-op. Returns the number of labels recorded.
    pub fn update_labels(&mut self, pairs: &[(Edge, u64)]) -> usize {
        let Some(mapping) = &self.mapping else {
            debug!("ignoring {} labels, no index mapping yet", pairs.len());
            return 0;
        };

        let mut recorded = 0;
        for &(edge, label) in pairs {
            if !mapping.contains_key(&edge) {
                continue;
            }
            self.labels.insert(edge, label);
            recorded += 1;
        }
        debug!(submitted = pairs.len(), recorded, "updated edge labels");
        recorded
    }

    /// Replace the index mapping. Recorded labels are left untouched.
    pub fn update_edge_index_mapping(&mut self, mapping: Arc<HashMap<Edge, usize>>) {
        self.mapping = Some(mapping);
    }

    /// Materialize the training arrays: the labeled rows of `features` and the
    /// label values, positionally paired in the cache's insertion order.
    /// Labels whose edge is missing from the current mapping are skipped.
    pub fn sample_and_label_arrays(&self, features: &FeatureMatrix) -> (FeatureMatrix, Vec<u64>) {
        let Some(mapping) = &self.mapping else {
            return (FeatureMatrix::empty(features.cols()), Vec::new());
        };

        let mut indices = Vec::with_capacity(self.labels.len());
        let mut labels = Vec::with_capacity(self.labels.len());
        for (edge, &label) in &self.labels {
            if let Some(&index) = mapping.get(edge) {
                indices.push(index);
                labels.push(label);
            }
        }
        (features.select_rows(&indices), labels)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(edges: &[(u64, u64)]) -> Arc<HashMap<Edge, usize>> {
        Arc::new(
            edges
                .iter()
                .enumerate()
                .map(|(i, &(a, b))| (Edge::new(a, b), i))
                .collect(),
        )
    }

    #[test]
    fn no_op_before_first_mapping() {
        let mut cache = EdgeLabelCache::new();
        assert_eq!(cache.update_labels(&[(Edge::new(0, 1), 1)]), 0);
        assert!(cache.is_empty());
    }

    #[test]
    fn unknown_edges_are_silently_skipped() {
        let mut cache = EdgeLabelCache::new();
        cache.update_edge_index_mapping(mapping(&[(0, 1), (1, 2)]));

        let recorded = cache.update_labels(&[
            (Edge::new(0, 1), 0),
            (Edge::new(7, 8), 1),
            (Edge::new(1, 2), 1),
        ]);
        assert_eq!(recorded, 2);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn arrays_pair_positionally_in_insertion_order() {
        let mut cache = EdgeLabelCache::new();
        cache.update_edge_index_mapping(mapping(&[(0, 1), (1, 2), (0, 2)]));
        cache.update_labels(&[(Edge::new(0, 2), 1), (Edge::new(0, 1), 0)]);

        let features = FeatureMatrix::new(vec![0.1, 0.2, 0.3], 3, 1);
        let (samples, labels) = cache.sample_and_label_arrays(&features);

        // Insertion order: (0,2) first, then (0,1).
        assert_eq!(samples.row(0), &[0.3]);
        assert_eq!(samples.row(1), &[0.1]);
        assert_eq!(labels, vec![1, 0]);
    }

    #[test]
    fn overwriting_a_label_keeps_one_entry() {
        let mut cache = EdgeLabelCache::new();
        cache.update_edge_index_mapping(mapping(&[(0, 1)]));
        cache.update_labels(&[(Edge::new(0, 1), 0)]);
        cache.update_labels(&[(Edge::new(1, 0), 1)]);

        assert_eq!(cache.len(), 1);
        let features = FeatureMatrix::new(vec![0.5], 1, 1);
        let (_, labels) = cache.sample_and_label_arrays(&features);
        assert_eq!(labels, vec![1]);
    }

    #[test]
    fn labels_for_edges_dropped_by_a_refresh_are_skipped() {
        let mut cache = EdgeLabelCache::new();
        cache.update_edge_index_mapping(mapping(&[(0, 1), (1, 2)]));
        cache.update_labels(&[(Edge::new(0, 1), 0), (Edge::new(1, 2), 1)]);

        // New generation keeps only (1,2), at a different slot.
        cache.update_edge_index_mapping(mapping(&[(1, 2)]));

        let features = FeatureMatrix::new(vec![0.9], 1, 1);
        let (samples, labels) = cache.sample_and_label_arrays(&features);
        assert_eq!(samples.rows(), 1);
        assert_eq!(samples.row(0), &[0.9]);
        assert_eq!(labels, vec![1]);
    }
}
