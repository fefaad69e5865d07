use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use agglo_compute::{optimize, RandomForest, RandomForestConfig, TrainError};
use agglo_core::{Edge, FeatureMatrix, Graph};

/// Terminal outcome of one recompute attempt. The discriminants are the exit
/// codes published on the new-solution channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolutionState {
    Success = 0,
    NoLabelForSomeClasses = 1,
    RandomForestTrainingFailed = 2,
    McOptimizationFailed = 3,
}

impl SolutionState {
    pub fn exit_code(self) -> i64 {
        self as i64
    }

    pub fn is_success(self) -> bool {
        self == SolutionState::Success
    }
}

/// One consistent snapshot of the caches, taken by the actor when a recompute
/// job starts executing.
pub struct ComputeInputs {
    pub edges: Arc<Vec<Edge>>,
    pub edge_features: Arc<FeatureMatrix>,
    pub graph: Arc<Graph>,
    pub edge_index_mapping: Arc<HashMap<Edge, usize>>,
    pub samples: FeatureMatrix,
    pub labels: Vec<u64>,
}

/// One immutable recompute attempt: its inputs, its outcome, and, on
/// success, the per-node block labels.
pub struct ComputeState {
    pub edges: Arc<Vec<Edge>>,
    pub edge_features: Arc<FeatureMatrix>,
    pub graph: Arc<Graph>,
    pub labeled_samples: (FeatureMatrix, Vec<u64>),
    pub solution_state: SolutionState,
    pub solution: Option<Vec<u64>>,
}

impl ComputeState {
    /// Train the classifier on the labeled samples, predict weights for every
    /// edge, and run the multicut optimizer. Never panics or propagates: every
    /// failure becomes a [`SolutionState`].
    pub fn compute(inputs: ComputeInputs, config: &RandomForestConfig) -> ComputeState {
        let ComputeInputs {
            edges,
            edge_features,
            graph,
            edge_index_mapping: _,
            samples,
            labels,
        } = inputs;

        let forest = match RandomForest::fit(&samples, &labels, config) {
            Ok(forest) => forest,
            Err(err) => {
                warn!(error = %err, "classifier training failed");
                let solution_state = match err {
                    TrainError::MissingClasses { .. } | TrainError::NoSamples => {
                        SolutionState::NoLabelForSomeClasses
                    }
                    _ => SolutionState::RandomForestTrainingFailed,
                };
                return ComputeState {
                    edges,
                    edge_features,
                    graph,
                    labeled_samples: (samples, labels),
                    solution_state,
                    solution: None,
                };
            }
        };

        let weights = forest.predict_proba(&edge_features);
        let (solution_state, solution) = match optimize(&graph, &weights) {
            Ok(solution) => {
                debug!(nodes = solution.len(), "multicut optimization succeeded");
                (SolutionState::Success, Some(solution))
            }
            Err(err) => {
                warn!(error = %err, "multicut optimization failed");
                (SolutionState::McOptimizationFailed, None)
            }
        };

        ComputeState {
            edges,
            edge_features,
            graph,
            labeled_samples: (samples, labels),
            solution_state,
            solution,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(samples: FeatureMatrix, labels: Vec<u64>) -> ComputeInputs {
        let edges = vec![
            Edge::new(0, 1),
            Edge::new(1, 2),
            Edge::new(0, 2),
            Edge::new(1, 3),
            Edge::new(2, 3),
        ];
        let features = FeatureMatrix::new(
            vec![
                0.5, 1.0, 0.5, //
                0.7, 0.9, 0.8, //
                0.3, 0.9, 0.2, //
                0.5, 0.2, 0.6, //
                0.4, 0.1, 0.3,
            ],
            5,
            3,
        );
        let mapping: HashMap<Edge, usize> =
            edges.iter().enumerate().map(|(i, &e)| (e, i)).collect();
        ComputeInputs {
            graph: Arc::new(Graph::from_edges(edges.clone())),
            edges: Arc::new(edges),
            edge_features: Arc::new(features),
            edge_index_mapping: Arc::new(mapping),
            samples,
            labels,
        }
    }

    #[test]
    fn full_labeling_partitions_the_graph() {
        let samples = FeatureMatrix::new(
            vec![
                0.5, 1.0, 0.5, //
                0.7, 0.9, 0.8, //
                0.3, 0.9, 0.2, //
                0.5, 0.2, 0.6, //
                0.4, 0.1, 0.3,
            ],
            5,
            3,
        );
        let state = ComputeState::compute(
            inputs(samples, vec![0, 0, 0, 1, 1]),
            &RandomForestConfig::default(),
        );

        assert!(state.solution_state.is_success());
        let solution = state.solution.as_ref().unwrap();
        assert_eq!(solution.len(), 4);
        assert_eq!(solution[0], solution[1]);
        assert_eq!(solution[1], solution[2]);
        assert_ne!(solution[2], solution[3]);
    }

    #[test]
    fn no_labels_reports_missing_classes() {
        let state = ComputeState::compute(
            inputs(FeatureMatrix::empty(3), vec![]),
            &RandomForestConfig::default(),
        );
        assert_eq!(state.solution_state, SolutionState::NoLabelForSomeClasses);
        assert!(state.solution.is_none());
    }

    #[test]
    fn one_sided_labels_report_missing_classes() {
        let samples = FeatureMatrix::new(vec![0.5, 1.0, 0.5], 1, 3);
        let state = ComputeState::compute(
            inputs(samples, vec![0]),
            &RandomForestConfig::default(),
        );
        assert_eq!(state.solution_state, SolutionState::NoLabelForSomeClasses);
    }

    #[test]
    fn bad_labels_report_training_failure() {
        let samples = FeatureMatrix::new(vec![0.5, 1.0, 0.5], 1, 3);
        let state = ComputeState::compute(
            inputs(samples, vec![0, 1]),
            &RandomForestConfig::default(),
        );
        assert_eq!(
            state.solution_state,
            SolutionState::RandomForestTrainingFailed
        );
    }

    #[test]
    fn exit_codes_match_the_wire_protocol() {
        assert_eq!(SolutionState::Success.exit_code(), 0);
        assert_eq!(SolutionState::NoLabelForSomeClasses.exit_code(), 1);
        assert_eq!(SolutionState::RandomForestTrainingFailed.exit_code(), 2);
        assert_eq!(SolutionState::McOptimizationFailed.exit_code(), 3);
    }
}
