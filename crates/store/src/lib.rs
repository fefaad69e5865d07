//! N5-flavored filesystem container for edge lists and edge feature matrices.
//!
//! Datasets are stored flat (one little-endian `data.bin` per dataset, no
//! chunking) next to an N5-style `attributes.json` carrying `dimensions` and
//! `dataType`. The [`EdgeSource`] trait is the seam the workflow consumes, so
//! a chunked store can be swapped in without touching the orchestrator.

pub mod container;
pub mod error;
pub mod paintera;

pub use container::N5Container;
pub use error::StoreError;
pub use paintera::{
    is_paintera_data, is_paintera_label_data, validate_paintera_label_dataset, EdgeData,
    EdgeSource, PainteraEdgeStore, EDGE_DATASET, EDGE_FEATURE_DATASET, PAINTERA_DATA_KEY,
};
