use thiserror::Error;

use agglo_store::StoreError;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("workflow has shut down")]
    ShutDown,
}
