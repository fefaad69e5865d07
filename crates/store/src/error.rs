use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("attribute parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("not an N5 container: {0}")]
    NotAContainer(String),

    #[error("dataset not found: {0}")]
    DatasetNotFound(String),

    #[error("dataset `{dataset}' has dataType `{actual}', expected `{expected}'")]
    DataTypeMismatch {
        dataset: String,
        expected: &'static str,
        actual: String,
    },

    #[error("dataset `{dataset}' has invalid shape: {detail}")]
    ShapeMismatch { dataset: String, detail: String },

    #[error("dataset `{dataset}' is not paintera data in container `{container}'")]
    NotPainteraData { container: String, dataset: String },

    #[error("dataset `{dataset}' exists in container `{container}' but is not label data")]
    NotLabelData { container: String, dataset: String },
}
