//! ZeroMQ front end for the interactive agglomeration workflow.
//!
//! One base address fans out into six channels: an API channel for
//! introspection, four REQ/REP channels (ping, current-solution,
//! set-edge-labels, update-solution) and the new-solution PUB channel that
//! announces every completed recompute as `(solution_id, exit_code)`.

pub mod api;
mod channels;
pub mod codec;
pub mod error;
pub mod server;

pub use error::ServerError;
pub use server::{ChannelAddresses, SolverServer};
