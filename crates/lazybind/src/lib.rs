#![forbid(unsafe_code)]

//! Observable properties with lazily evaluated bindings.
//!
//! A [`Property<T>`] holds a value and announces changes through
//! [`Signal`]s. Applying operators to properties builds an [`Expr<T>`]
//! without computing anything; [`make_bound_property`] turns an expression
//! into a property whose value the [`BindingEvaluator`] keeps up to date.
//!
//! ```ignore
//! use lazybind::{BindingEvaluator, Property, make_bound_property};
//!
//! let evaluator = BindingEvaluator::new();
//! let shares = Property::new(100.0);
//! let price = Property::new(20.0);
//! let value = make_bound_property(&evaluator, &shares * &price);
//! assert_eq!(value.get(), 2000.0);
//!
//! price.set(25.0)?;
//! assert_eq!(value.get(), 2000.0); // dirty, not yet recomputed
//! evaluator.evaluate_all()?;
//! assert_eq!(value.get(), 2500.0);
//! ```
//!
//! Writes to sources are cheap: they only flag the bindings that read them.
//! The embedding application decides when to pay for recomputation, for
//! example once per frame.
//!
//! Everything is single-threaded; no type in this crate is `Send` or `Sync`.

pub mod binding;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod expr;
pub mod property;

pub use binding::make_bound_property;
pub use config::{EvaluationMode, EvaluatorConfig};
pub use error::{BindingError, Result};
pub use evaluator::{BindingEvaluator, BindingId, EvaluationReport};
pub use expr::Expr;
pub use property::Property;

pub use lazybind_signal::{
    ConnectionBlocker, ConnectionHandle, DeferredQueue, ScopedConnection, Signal, SignalError,
    SlotId,
};
