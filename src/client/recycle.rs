//! Reuse pool for builder state.
//!
//! Dropping a [`RequestBuilder`](crate::RequestBuilder) hands its state back
//! here. The state is cleared before it is parked, so whatever a later
//! acquisition gets carries nothing from the request that used it before.
//! The lock only guards the push and the pop; a state is never reachable
//! from the pool while a builder owns it.

use super::builder::RequestState;
use parking_lot::Mutex;

pub(crate) struct BuilderPool {
    idle: Mutex<Vec<RequestState>>,
    max_idle: usize,
}

impl BuilderPool {
    pub(crate) fn new(max_idle: usize) -> Self {
        Self {
            idle: Mutex::new(Vec::with_capacity(max_idle.min(16))),
            max_idle,
        }
    }

    /// Take a cleared state, allocating when none is idle.
    pub(crate) fn acquire(&self) -> RequestState {
        self.idle.lock().pop().unwrap_or_default()
    }

    /// Clear `state` and park it, unless the pool is full.
    pub(crate) fn release(&self, mut state: RequestState) {
        state.reset();
        let mut idle = self.idle.lock();
        if idle.len() < self.max_idle {
            idle.push(state);
        }
    }

    pub(crate) fn idle(&self) -> usize {
        self.idle.lock().len()
    }
}
