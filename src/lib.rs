#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

//! ## Module Structure
//!
//! - **[client]** - `Client`, `RequestBuilder`, configuration and URL helpers
//! - **[transport]** - the `Transport` seam, the reqwest terminal and a mock
//! - **[interceptor]** - auth, logging and retry layers over a transport
//! - **[dispatch]** - ordered batches and a fixed-size worker pool
//! - **[body]** - request and response bodies
//! - **[response]** - successful responses
//! - **[context]** - cancellation tokens with deadlines
//! - **[error]** - error types and result handling
//! - **[protocol]** - protocol constants and header helpers

pub mod body;
pub mod client;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod interceptor;
pub mod protocol;
pub mod response;
pub mod transport;

pub use body::{Body, RequestBody};
pub use client::{Client, Config, RequestBuilder};
pub use context::{CancelReason, Context};
pub use dispatch::{Batch, JobId, PoolResult, Submission, WorkerPool};
pub use error::{Error, RequestError, Result, TransportError};
pub use response::Response;
pub use transport::Transport;
