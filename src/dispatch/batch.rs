//! Ordered batch execution.

use crate::client::RequestBuilder;
use crate::context::Context;
use crate::error::Error;
use crate::response::Response;
use tokio::task::JoinSet;

/// Builders executed concurrently, with results aligned to submission order.
///
/// # Examples
///
/// ```ignore
/// let (responses, errors) = client
///     .batch()
///     .add(client.get(&ctx, "/todos/1"))
///     .add(client.get(&ctx, "/todos/2"))
///     .execute(&ctx)
///     .await;
///
/// for (i, error) in errors.iter().enumerate() {
///     match error {
///         Some(err) => eprintln!("#{i} failed: {err}"),
///         None => println!("#{i}: {}", responses[i].as_ref().unwrap().status),
///     }
/// }
/// ```
#[derive(Debug, Default)]
pub struct Batch {
    builders: Vec<RequestBuilder>,
}

impl Batch {
    /// An empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a builder.
    pub fn add(mut self, builder: RequestBuilder) -> Self {
        self.push(builder);
        self
    }

    /// Append a builder in place.
    pub fn push(&mut self, builder: RequestBuilder) {
        self.builders.push(builder);
    }

    /// Number of builders.
    pub fn len(&self) -> usize {
        self.builders.len()
    }

    /// True if nothing was added.
    pub fn is_empty(&self) -> bool {
        self.builders.is_empty()
    }

    /// Run every builder concurrently and wait for all of them.
    ///
    /// Slot `i` of exactly one of the two vectors is filled for builder `i`.
    /// A failure does not stop the others. `ctx` is an extra cancellation
    /// scope on top of each builder's own context.
    pub async fn execute(self, ctx: &Context) -> (Vec<Option<Response>>, Vec<Option<Error>>) {
        let len = self.builders.len();
        let mut responses = vec![None; len];
        let mut errors = vec![None; len];

        let mut tasks = JoinSet::new();
        for (index, mut builder) in self.builders.into_iter().enumerate() {
            let scope = ctx.clone();
            tasks.spawn(async move { (index, builder.result_within(&scope).await) });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, Ok(response))) => responses[index] = Some(response),
                Ok((index, Err(err))) => errors[index] = Some(err),
                Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
                Err(err) => tracing::debug!(error = %err, "batch task ended without result"),
            }
        }

        tracing::debug!(
            size = len,
            failed = errors.iter().filter(|e| e.is_some()).count(),
            "batch finished"
        );
        (responses, errors)
    }
}
