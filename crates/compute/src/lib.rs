//! Collaborator algorithms for the interactive solver: a binary random-forest
//! edge classifier and a greedy agglomerative multicut optimizer.
//!
//! Both live behind small typed seams (`fit`/`predict_proba`, `optimize`) so
//! the workflow treats them as black boxes with explicit error contracts.

pub mod multicut;
pub mod random_forest;

pub use multicut::{optimize, MulticutError};
pub use random_forest::{RandomForest, RandomForestConfig, TrainError};
