#![forbid(unsafe_code)]

//! Type-safe multicast signals.
//!
//! A [`Signal<A>`] owns an ordered list of handlers. Every call to
//! [`Signal::emit`] invokes the handlers connected at that moment, in
//! connection order, passing a shared reference to the argument value.
//! Signals that carry several values use a tuple for `A`.
//!
//! [`Signal::connect`] returns a [`ConnectionHandle`]: a non-owning token that
//! stays safe to use after the connection is removed and after the signal
//! itself is dropped. [`ScopedConnection`] and [`ConnectionBlocker`] are RAII
//! wrappers around a handle. [`DeferredQueue`] turns emissions into queued
//! invocations that run when the caller asks for them.
//!
//! # Threading
//!
//! Everything here is single-threaded (`Rc`/`RefCell` based) and therefore
//! `!Send` and `!Sync`.

pub mod connection;
pub mod deferred;
pub mod error;
pub mod signal;

pub use connection::{ConnectionBlocker, ConnectionHandle, ScopedConnection, SlotId};
pub use deferred::DeferredQueue;
pub use error::{Result, SignalError};
pub use signal::Signal;
