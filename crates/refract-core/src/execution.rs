//! Execution context shared by a recipe run: cancellation and the queue of
//! deferred follow-up visitors.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use refract_util::errors::RefractError;

use crate::visitor::TreeVisitor;

/// Context threaded through every visit and every producer call.
///
/// Carries the cancellation flag that downloaders check before issuing new
/// I/O, and the queue of visitors scheduled via
/// [`ExecutionContext::do_after_visit`]. Follow-ups run after the current
/// traversal completes, in insertion order.
pub struct ExecutionContext {
    cancelled: Arc<AtomicBool>,
    after_visit: Vec<TreeVisitor>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::with_cancellation(Arc::new(AtomicBool::new(false)))
    }

    /// Build a context observing an externally owned cancellation flag.
    pub fn with_cancellation(cancelled: Arc<AtomicBool>) -> Self {
        Self {
            cancelled,
            after_visit: Vec::new(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Fail promptly if the run was cancelled.
    pub fn check_cancelled(&self) -> miette::Result<()> {
        if self.is_cancelled() {
            Err(RefractError::Cancelled.into())
        } else {
            Ok(())
        }
    }

    /// Schedule a visitor to run after the current traversal returns.
    pub fn do_after_visit(&mut self, visitor: TreeVisitor) {
        self.after_visit.push(visitor);
    }

    /// Drain the follow-up queue, leaving it empty.
    pub fn take_after_visit(&mut self) -> Vec<TreeVisitor> {
        std::mem::take(&mut self.after_visit)
    }

    pub fn has_after_visit(&self) -> bool {
        !self.after_visit.is_empty()
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}
