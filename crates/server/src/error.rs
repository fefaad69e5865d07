use thiserror::Error;

use agglo_store::StoreError;
use agglo_workflow::WorkflowError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("socket error: {0}")]
    Socket(#[from] zeromq::ZmqError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
