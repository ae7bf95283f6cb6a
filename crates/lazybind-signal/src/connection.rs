#![forbid(unsafe_code)]

//! Connection handles and RAII helpers.
//!
//! # Design
//!
//! A [`ConnectionHandle`] is a `(Weak<slot table>, SlotId)` pair. The weak
//! pointer never keeps the signal alive and cannot dangle: once the signal is
//! dropped the upgrade fails and every operation on the handle degrades to a
//! no-op (or [`SignalError::InactiveConnection`] for queries that need a live
//! registration).
//!
//! # Invariants
//!
//! 1. Slot ids are assigned monotonically per signal and never reused, so a
//!    stale handle can never address a newer registration.
//! 2. `disconnect()` is idempotent and never fails.
//! 3. `is_active()` is false forever once it has been observed false.

use std::fmt;
use std::rc::Weak;

use crate::error::{Result, SignalError};
use crate::signal::Signal;

/// Identifier of one registration inside a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SlotId(pub(crate) u64);

impl SlotId {
    /// Get the raw id value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// Type-erased view of a signal's handler table, resolved through handles.
pub(crate) trait SlotTable {
    /// Remove the slot. Returns whether it was present.
    fn disconnect_slot(&self, id: SlotId) -> bool;
    fn is_slot_connected(&self, id: SlotId) -> bool;
    /// Set the blocked flag, returning the previous one if the slot exists.
    fn set_slot_blocked(&self, id: SlotId, blocked: bool) -> Option<bool>;
    fn is_slot_blocked(&self, id: SlotId) -> Option<bool>;
}

// ---------------------------------------------------------------------------
// ConnectionHandle
// ---------------------------------------------------------------------------

/// Token referring to one handler registration.
///
/// Cloning a handle yields another token for the **same** registration.
/// A default-constructed handle refers to nothing and is never active.
#[derive(Clone, Default)]
pub struct ConnectionHandle {
    table: Option<Weak<dyn SlotTable>>,
    id: SlotId,
}

impl ConnectionHandle {
    pub(crate) fn new(table: Weak<dyn SlotTable>, id: SlotId) -> Self {
        Self {
            table: Some(table),
            id,
        }
    }

    /// The slot id this handle refers to.
    #[must_use]
    pub fn id(&self) -> SlotId {
        self.id
    }

    /// Whether the referenced registration is still connected.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.with_table(|table| table.is_slot_connected(self.id))
            .unwrap_or(false)
    }

    /// Remove the registration from its signal.
    ///
    /// Safe to call any number of times, including after the signal is gone.
    pub fn disconnect(&self) {
        let _ = self.with_table(|table| table.disconnect_slot(self.id));
    }

    /// Whether this handle was issued by `signal`.
    ///
    /// Also true for handles whose registration has since been removed.
    #[must_use]
    pub fn belongs_to<A: 'static>(&self, signal: &Signal<A>) -> bool {
        self.table
            .as_ref()
            .is_some_and(|table| std::ptr::addr_eq(table.as_ptr(), signal.table_ptr()))
    }

    /// Block or unblock the handler. A blocked handler is skipped by `emit`.
    ///
    /// Returns the previous blocked state.
    pub fn block(&self, blocked: bool) -> Result<bool> {
        self.with_table(|table| table.set_slot_blocked(self.id, blocked))
            .flatten()
            .ok_or(SignalError::InactiveConnection)
    }

    /// Whether the handler is currently blocked.
    pub fn is_blocked(&self) -> Result<bool> {
        self.with_table(|table| table.is_slot_blocked(self.id))
            .flatten()
            .ok_or(SignalError::InactiveConnection)
    }

    fn with_table<R>(&self, f: impl FnOnce(&dyn SlotTable) -> R) -> Option<R> {
        let table = self.table.as_ref()?.upgrade()?;
        Some(f(&*table))
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id.0)
            .field("active", &self.is_active())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// ScopedConnection
// ---------------------------------------------------------------------------

/// Owns a connection and disconnects it when dropped.
#[derive(Debug, Default)]
#[must_use = "dropping a ScopedConnection disconnects it immediately"]
pub struct ScopedConnection {
    handle: ConnectionHandle,
}

impl ScopedConnection {
    pub fn new(handle: ConnectionHandle) -> Self {
        Self { handle }
    }

    /// The managed handle.
    #[must_use]
    pub fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.handle.is_active()
    }

    /// Stop managing the connection and hand back the plain handle.
    /// The registration stays connected.
    pub fn release(mut self) -> ConnectionHandle {
        std::mem::take(&mut self.handle)
    }
}

impl From<ConnectionHandle> for ScopedConnection {
    fn from(handle: ConnectionHandle) -> Self {
        Self::new(handle)
    }
}

impl Drop for ScopedConnection {
    fn drop(&mut self) {
        self.handle.disconnect();
    }
}

// ---------------------------------------------------------------------------
// ConnectionBlocker
// ---------------------------------------------------------------------------

/// Blocks a connection for as long as the guard lives.
///
/// On drop the blocked state that was in place before the guard was created
/// is restored, so blockers nest.
#[derive(Debug)]
#[must_use = "the connection is unblocked as soon as the blocker is dropped"]
pub struct ConnectionBlocker {
    handle: ConnectionHandle,
    was_blocked: bool,
}

impl ConnectionBlocker {
    /// Block `handle`. Fails if the connection is not active.
    pub fn new(handle: &ConnectionHandle) -> Result<Self> {
        let was_blocked = handle.block(true)?;
        Ok(Self {
            handle: handle.clone(),
            was_blocked,
        })
    }
}

impl Drop for ConnectionBlocker {
    fn drop(&mut self) {
        // The connection may be gone by now; nothing to restore then.
        let _ = self.handle.block(self.was_blocked);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    fn counting_signal() -> (Signal<i32>, Rc<Cell<u32>>, ConnectionHandle) {
        let signal = Signal::new();
        let calls = Rc::new(Cell::new(0));
        let calls_clone = Rc::clone(&calls);
        let handle = signal.connect(move |_| calls_clone.set(calls_clone.get() + 1));
        (signal, calls, handle)
    }

    #[test]
    fn default_handle_is_inert() {
        let handle = ConnectionHandle::default();
        assert!(!handle.is_active());
        handle.disconnect();
        assert_eq!(handle.block(true), Err(SignalError::InactiveConnection));
        assert_eq!(handle.is_blocked(), Err(SignalError::InactiveConnection));
    }

    #[test]
    fn handle_disconnect_is_idempotent() {
        let (signal, calls, handle) = counting_signal();
        assert!(handle.is_active());
        handle.disconnect();
        handle.disconnect();
        assert!(!handle.is_active());
        signal.emit(&1);
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn clones_refer_to_same_registration() {
        let (_signal, _calls, handle) = counting_signal();
        let copy = handle.clone();
        copy.disconnect();
        assert!(!handle.is_active());
    }

    #[test]
    fn handle_survives_signal_drop() {
        let (signal, _calls, handle) = counting_signal();
        drop(signal);
        assert!(!handle.is_active());
        handle.disconnect();
        assert!(handle.block(true).is_err());
    }

    #[test]
    fn belongs_to_identifies_issuer() {
        let (signal, _calls, handle) = counting_signal();
        let other: Signal<i32> = Signal::new();
        assert!(handle.belongs_to(&signal));
        assert!(!handle.belongs_to(&other));
        handle.disconnect();
        assert!(handle.belongs_to(&signal));
    }

    #[test]
    fn block_returns_previous_state() {
        let (signal, calls, handle) = counting_signal();
        assert_eq!(handle.block(true), Ok(false));
        assert_eq!(handle.is_blocked(), Ok(true));
        signal.emit(&1);
        assert_eq!(calls.get(), 0);
        assert_eq!(handle.block(false), Ok(true));
        signal.emit(&1);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn scoped_connection_disconnects_on_drop() {
        let (signal, calls, handle) = counting_signal();
        {
            let _scoped = ScopedConnection::from(handle.clone());
            signal.emit(&1);
        }
        assert!(!handle.is_active());
        signal.emit(&1);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn scoped_connection_release_keeps_connection() {
        let (signal, calls, handle) = counting_signal();
        let scoped = ScopedConnection::new(handle);
        let released = scoped.release();
        assert!(released.is_active());
        signal.emit(&1);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn blockers_nest_and_restore() {
        let (signal, calls, handle) = counting_signal();
        {
            let _outer = ConnectionBlocker::new(&handle).expect("active");
            {
                let _inner = ConnectionBlocker::new(&handle).expect("active");
                signal.emit(&1);
            }
            assert_eq!(handle.is_blocked(), Ok(true));
            signal.emit(&1);
        }
        assert_eq!(handle.is_blocked(), Ok(false));
        signal.emit(&1);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn blocker_on_inactive_connection_fails() {
        let (_signal, _calls, handle) = counting_signal();
        handle.disconnect();
        assert!(matches!(
            ConnectionBlocker::new(&handle),
            Err(SignalError::InactiveConnection)
        ));
    }

    #[test]
    fn blocker_outliving_signal_is_harmless() {
        let (signal, _calls, handle) = counting_signal();
        let blocker = ConnectionBlocker::new(&handle).expect("active");
        drop(signal);
        drop(blocker);
        assert!(!handle.is_active());
    }
}
