#![forbid(unsafe_code)]

//! Deferred handler invocation.
//!
//! A [`DeferredQueue`] collects the invocations produced by connections made
//! with [`Signal::connect_deferred`](crate::Signal::connect_deferred). Nothing
//! runs until the owner calls
//! [`evaluate_deferred_connections`](DeferredQueue::evaluate_deferred_connections),
//! typically once per frame or tick.
//!
//! # Invariants
//!
//! 1. Queued invocations run in emission order.
//! 2. An invocation whose connection is inactive at evaluation time is
//!    discarded without running.
//! 3. Invocations queued while the queue is being evaluated are kept for the
//!    next evaluation.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::connection::ConnectionHandle;

pub(crate) struct Pending {
    connection: ConnectionHandle,
    invoke: Box<dyn FnOnce()>,
}

/// Queue of handler invocations awaiting explicit evaluation.
///
/// Cloning produces another handle to the same queue. Signals only hold a
/// weak reference; once every clone is dropped, deferred connections stop
/// queueing.
#[derive(Clone, Default)]
pub struct DeferredQueue {
    pending: Rc<RefCell<VecDeque<Pending>>>,
}

impl DeferredQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every queued invocation whose connection is still active.
    ///
    /// Returns how many invocations ran.
    ///
    /// # Panics
    ///
    /// Propagates handler panics. Invocations behind the panicking one are
    /// discarded.
    pub fn evaluate_deferred_connections(&self) -> usize {
        let batch = std::mem::take(&mut *self.pending.borrow_mut());
        let queued = batch.len();
        let mut ran = 0;
        for pending in batch {
            if pending.connection.is_active() {
                (pending.invoke)();
                ran += 1;
            }
        }
        tracing::trace!(
            message = "deferred.evaluate",
            queued,
            ran,
            discarded = queued - ran
        );
        ran
    }

    /// Number of invocations waiting to run.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Drop every queued invocation without running it.
    pub fn clear(&self) {
        let dropped = std::mem::take(&mut *self.pending.borrow_mut());
        drop(dropped);
    }

    pub(crate) fn downgrade(&self) -> Weak<RefCell<VecDeque<Pending>>> {
        Rc::downgrade(&self.pending)
    }

    pub(crate) fn upgrade(weak: &Weak<RefCell<VecDeque<Pending>>>) -> Option<Self> {
        weak.upgrade().map(|pending| Self { pending })
    }

    pub(crate) fn enqueue(&self, connection: ConnectionHandle, invoke: Box<dyn FnOnce()>) {
        self.pending
            .borrow_mut()
            .push_back(Pending { connection, invoke });
    }
}

impl fmt::Debug for DeferredQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredQueue")
            .field("pending", &self.pending_count())
            .finish()
    }
}
