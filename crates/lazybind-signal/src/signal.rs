#![forbid(unsafe_code)]

//! The multicast [`Signal`] type.
//!
//! # Design
//!
//! Handlers live in a `Vec` sorted by [`SlotId`]. Ids come from a per-signal
//! counter, so the vector is also in connection order and lookups by id are a
//! binary search. Handlers are stored as `Rc<dyn Fn(&A)>` so that `emit` can
//! take a snapshot of the list and release the table borrow before calling
//! any user code. Handlers may therefore connect, disconnect, block, or emit
//! recursively.
//!
//! # Invariants
//!
//! 1. Handlers run in connection order.
//! 2. A handler connected during `emit` is not invoked by that `emit`.
//! 3. A handler disconnected or blocked during `emit` is not invoked after
//!    the change, within that same `emit`.
//! 4. No `RefCell` borrow of the table is held while user code runs, which
//!    includes the `Drop` of removed handlers.
//!
//! # Failure Modes
//!
//! - **Handler panics**: the panic unwinds out of `emit`; handlers after it
//!   in that pass are skipped. The signal holds no in-flight state, so it is
//!   fully usable afterwards.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::connection::{ConnectionHandle, SlotId, SlotTable};
use crate::deferred::DeferredQueue;

type Handler<A> = Rc<dyn Fn(&A)>;

struct Slot<A> {
    id: SlotId,
    handler: Handler<A>,
    blocked: bool,
}

struct SignalShared<A> {
    slots: RefCell<Vec<Slot<A>>>,
    next_id: Cell<u64>,
}

impl<A> SignalShared<A> {
    fn allocate_id(&self) -> SlotId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        SlotId(id)
    }

    fn position(slots: &[Slot<A>], id: SlotId) -> Option<usize> {
        slots.binary_search_by_key(&id, |slot| slot.id).ok()
    }

    /// Whether `id` is still connected and not blocked.
    fn is_live(&self, id: SlotId) -> bool {
        let slots = self.slots.borrow();
        Self::position(&slots, id).is_some_and(|idx| !slots[idx].blocked)
    }
}

impl<A> SlotTable for SignalShared<A> {
    fn disconnect_slot(&self, id: SlotId) -> bool {
        let removed = {
            let mut slots = self.slots.borrow_mut();
            Self::position(&slots, id).map(|idx| slots.remove(idx))
        };
        // `removed` (and its handler) is dropped here, after the borrow ends.
        let found = removed.is_some();
        if found {
            tracing::trace!(message = "signal.disconnect", slot = id.0);
        }
        found
    }

    fn is_slot_connected(&self, id: SlotId) -> bool {
        Self::position(&self.slots.borrow(), id).is_some()
    }

    fn set_slot_blocked(&self, id: SlotId, blocked: bool) -> Option<bool> {
        let mut slots = self.slots.borrow_mut();
        let idx = Self::position(&slots, id)?;
        Some(std::mem::replace(&mut slots[idx].blocked, blocked))
    }

    fn is_slot_blocked(&self, id: SlotId) -> Option<bool> {
        let slots = self.slots.borrow();
        Self::position(&slots, id).map(|idx| slots[idx].blocked)
    }
}

/// A multicast event source.
///
/// `A` is the argument type handed to every handler by reference. Use a tuple
/// for signals with several arguments and `()` for none.
///
/// Dropping the signal invalidates every [`ConnectionHandle`] it issued.
pub struct Signal<A> {
    shared: Rc<SignalShared<A>>,
}

impl<A: 'static> Signal<A> {
    /// Create a signal with no connections.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Rc::new(SignalShared {
                slots: RefCell::new(Vec::new()),
                next_id: Cell::new(0),
            }),
        }
    }

    /// Connect `handler`. It is invoked on every subsequent `emit` until the
    /// returned handle is disconnected or the signal is dropped.
    #[must_use = "the handle is the only way to disconnect this handler"]
    pub fn connect(&self, handler: impl Fn(&A) + 'static) -> ConnectionHandle {
        let id = self.shared.allocate_id();
        self.push_slot(id, Rc::new(handler))
    }

    /// Connect `handler` so that emissions are queued on `queue` instead of
    /// invoking it directly. The argument is cloned into the queue.
    ///
    /// Queued invocations whose connection is no longer active when
    /// [`DeferredQueue::evaluate_deferred_connections`] runs are dropped.
    #[must_use = "the handle is the only way to disconnect this handler"]
    pub fn connect_deferred(
        &self,
        queue: &DeferredQueue,
        handler: impl Fn(&A) + 'static,
    ) -> ConnectionHandle
    where
        A: Clone,
    {
        let id = self.shared.allocate_id();
        let handle = self.handle_for(id);
        let handler: Handler<A> = Rc::new(handler);
        let queue = queue.downgrade();
        let forward = move |args: &A| {
            let Some(queue) = DeferredQueue::upgrade(&queue) else {
                return;
            };
            let handler = Rc::clone(&handler);
            let args = args.clone();
            queue.enqueue(handle.clone(), Box::new(move || handler(&args)));
        };
        self.push_slot(id, Rc::new(forward))
    }

    /// Remove the registration referred to by `handle`.
    ///
    /// No-op for handles that are stale or were issued by another signal.
    pub fn disconnect(&self, handle: &ConnectionHandle) {
        if handle.belongs_to(self) {
            self.shared.disconnect_slot(handle.id());
        }
    }

    /// Remove every registration. All issued handles become inactive.
    pub fn disconnect_all(&self) {
        let removed = std::mem::take(&mut *self.shared.slots.borrow_mut());
        tracing::trace!(message = "signal.disconnect_all", removed = removed.len());
        drop(removed);
    }

    /// Block or unblock the handler behind `handle`, returning the previous
    /// state. Fails for stale or foreign handles.
    pub fn block_connection(
        &self,
        handle: &ConnectionHandle,
        blocked: bool,
    ) -> crate::Result<bool> {
        if !handle.belongs_to(self) {
            return Err(crate::SignalError::InactiveConnection);
        }
        handle.block(blocked)
    }

    /// Whether the handler behind `handle` is blocked.
    pub fn is_connection_blocked(&self, handle: &ConnectionHandle) -> crate::Result<bool> {
        if !handle.belongs_to(self) {
            return Err(crate::SignalError::InactiveConnection);
        }
        handle.is_blocked()
    }

    /// Invoke every connected, unblocked handler in connection order.
    ///
    /// # Panics
    ///
    /// Propagates any panic raised by a handler; later handlers are not run.
    pub fn emit(&self, args: &A) {
        let snapshot: Vec<(SlotId, Handler<A>)> = self
            .shared
            .slots
            .borrow()
            .iter()
            .map(|slot| (slot.id, Rc::clone(&slot.handler)))
            .collect();

        for (id, handler) in snapshot {
            if self.shared.is_live(id) {
                handler(args);
            }
        }
    }

    /// Number of connected handlers (blocked ones included).
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.slots.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn table_ptr(&self) -> *const () {
        Rc::as_ptr(&self.shared).cast()
    }

    fn handle_for(&self, id: SlotId) -> ConnectionHandle {
        let shared: Rc<dyn SlotTable> = self.shared.clone();
        let table: Weak<dyn SlotTable> = Rc::downgrade(&shared);
        ConnectionHandle::new(table, id)
    }

    fn push_slot(&self, id: SlotId, handler: Handler<A>) -> ConnectionHandle {
        let connections = {
            let mut slots = self.shared.slots.borrow_mut();
            slots.push(Slot {
                id,
                handler,
                blocked: false,
            });
            slots.len()
        };
        tracing::trace!(message = "signal.connect", slot = id.0, connections);
        self.handle_for(id)
    }
}

impl<A: 'static> Default for Signal<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> fmt::Debug for Signal<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots = self.shared.slots.borrow();
        f.debug_struct("Signal")
            .field("connections", &slots.len())
            .field("blocked", &slots.iter().filter(|slot| slot.blocked).count())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
