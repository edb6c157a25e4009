//! Concurrent execution of request builders.
//!
//! | Executor | Order | Results |
//! |----------|-------|---------|
//! | [`Batch`] | aligned with submission index | returned together once all finish |
//! | [`WorkerPool`] | completion order | shared channel tagged by [`JobId`], or one [`Submission`] per job |
//!
//! Both run each builder through the same execution path as
//! [`RequestBuilder::result`](crate::RequestBuilder::result).

mod batch;
mod pool;

pub use batch::Batch;
pub use pool::{JobId, PoolResult, Submission, WorkerPool, DEFAULT_WORKERS};
