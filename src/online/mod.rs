//! Online request dispatch.
//!
//! [`OnlineExecutor`] is the process-wide dispatcher: raw client requests pass
//! through a [`FilterChain`], are routed by [`RequestKind`] to one of the
//! [`Collaborators`], and run as a job on whichever
//! [`ProcessingStrategy`](crate::execution::ProcessingStrategy) the caller
//! supplies. Internal long-running [`Task`]s skip the filters.

mod collaborator;
mod executor;
mod filter;
mod request;
mod task;

pub use collaborator::{ClientConnection, ClientHandle, Collaborators, RequestHandler, UnavailableHandler};
pub use executor::{DispatchOutcome, DispatchStats, ExecuteError, OnlineExecutor};
pub use filter::{
    FilterChain, FilterOutcome, Rejection, RequestFilter, SanityConfig, SanityFilter,
    ServiceParamFilter,
};
pub use request::{RawRequest, Request, RequestKind};
pub use task::{Task, TaskRecord, TaskStatus};
