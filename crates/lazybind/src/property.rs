#![forbid(unsafe_code)]

//! Observable properties.
//!
//! # Design
//!
//! A [`Property<T>`] is the single owner of an `Rc<PropertyCore<T>>`. The
//! core holds the value, the three notification signals, and the optional
//! binding record. Expressions and evaluator entries only ever hold `Weak`
//! references to a core, so dropping the `Property` really ends its life:
//! signals are torn down (invalidating outstanding handles) and the binding,
//! if any, is deregistered from its evaluator.
//!
//! # Invariants
//!
//! 1. `get()` never recomputes; it returns the last stored value.
//! 2. Storing a value equal to the current one is a no-op: no signals fire.
//! 3. `value_about_to_change` fires before the stored value changes and
//!    `value_changed` after, for direct sets and binding updates alike.
//! 4. A bound property rejects `set` with [`BindingError::ReadOnlyProperty`].
//! 5. No `RefCell` borrow of the value is held while signals run.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use lazybind_signal::{ConnectionHandle, Signal};

use crate::binding::BindingRecord;
use crate::error::{BindingError, Result};
use crate::evaluator::{BindingId, EvaluatorShared};
use crate::expr::Expr;

/// Identity of a live property core, used for dependency bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct PropertyKey(usize);

impl PropertyKey {
    pub(crate) fn addr(self) -> usize {
        self.0
    }
}

/// Type-erased view of a property as a dependency of some binding.
pub(crate) trait Upstream {
    fn key(&self) -> PropertyKey;
    /// Run `hook` whenever the value changes.
    fn on_change(&self, hook: Rc<dyn Fn()>) -> ConnectionHandle;
    /// The binding id of this property, if it is bound in `evaluator`.
    fn binding_in(&self, evaluator: &EvaluatorShared) -> Option<BindingId>;
    /// The properties this one is currently bound to.
    fn sources(&self) -> Vec<Weak<dyn Upstream>>;
}

pub(crate) struct PropertyCore<T> {
    value: RefCell<T>,
    value_changed: Signal<T>,
    value_about_to_change: Signal<(T, T)>,
    destroyed: Signal<()>,
    pub(crate) binding: RefCell<Option<BindingRecord>>,
}

impl<T: Clone + PartialEq + 'static> PropertyCore<T> {
    pub(crate) fn get(&self) -> T {
        self.value.borrow().clone()
    }

    /// Store `new`, firing the change signals if it differs from the current
    /// value. Returns whether the value changed.
    pub(crate) fn store(&self, new: T) -> bool {
        if *self.value.borrow() == new {
            return false;
        }
        if !self.value_about_to_change.is_empty() {
            let old = self.get();
            self.value_about_to_change.emit(&(old, new.clone()));
        }
        *self.value.borrow_mut() = new;
        let current = self.get();
        self.value_changed.emit(&current);
        true
    }

    pub(crate) fn is_bound(&self) -> bool {
        self.binding.borrow().is_some()
    }
}

impl<T: Clone + PartialEq + 'static> Upstream for PropertyCore<T> {
    fn key(&self) -> PropertyKey {
        PropertyKey(std::ptr::from_ref(self).addr())
    }

    fn on_change(&self, hook: Rc<dyn Fn()>) -> ConnectionHandle {
        self.value_changed.connect(move |_| hook())
    }

    fn binding_in(&self, evaluator: &EvaluatorShared) -> Option<BindingId> {
        self.binding
            .borrow()
            .as_ref()
            .filter(|record| record.is_registered_in(evaluator))
            .map(BindingRecord::id)
    }

    fn sources(&self) -> Vec<Weak<dyn Upstream>> {
        self.binding
            .borrow()
            .as_ref()
            .map(|record| record.sources().to_vec())
            .unwrap_or_default()
    }
}

/// A value holder that announces its changes.
///
/// A property is either *independent* (written with [`set`](Property::set))
/// or *bound* (its value comes from an [`Expr`] recomputed by a
/// [`BindingEvaluator`](crate::BindingEvaluator)). Properties are not
/// `Clone`: whoever declares one owns it, and it dies with its owner.
pub struct Property<T: Clone + PartialEq + 'static> {
    pub(crate) core: Rc<PropertyCore<T>>,
}

impl<T: Clone + PartialEq + 'static> Property<T> {
    /// Create an independent property.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            core: Rc::new(PropertyCore {
                value: RefCell::new(value),
                value_changed: Signal::new(),
                value_about_to_change: Signal::new(),
                destroyed: Signal::new(),
                binding: RefCell::new(None),
            }),
        }
    }

    /// The last stored value. Never triggers recomputation.
    #[must_use]
    pub fn get(&self) -> T {
        self.core.get()
    }

    /// Access the stored value by reference.
    ///
    /// # Panics
    ///
    /// Panics if `f` writes to this same property.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let value = self.core.value.borrow();
        f(&value)
    }

    /// Assign a new value.
    ///
    /// Fires `value_about_to_change` and `value_changed` synchronously if the
    /// value differs. Fails with [`BindingError::ReadOnlyProperty`] on a
    /// bound property, leaving it untouched.
    pub fn set(&self, value: T) -> Result<()> {
        if self.core.is_bound() {
            tracing::warn!(message = "property.set_rejected", reason = "bound");
            return Err(BindingError::ReadOnlyProperty);
        }
        self.core.store(value);
        Ok(())
    }

    /// Fires with the new value after every change.
    #[must_use]
    pub fn value_changed(&self) -> &Signal<T> {
        &self.core.value_changed
    }

    /// Fires with `(old, new)` right before every change.
    #[must_use]
    pub fn value_about_to_change(&self) -> &Signal<(T, T)> {
        &self.core.value_about_to_change
    }

    /// Fires once when the property is dropped.
    #[must_use]
    pub fn destroyed(&self) -> &Signal<()> {
        &self.core.destroyed
    }

    /// Whether the value is owned by a binding.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.core.is_bound()
    }

    /// The evaluator registration of the current binding, if any.
    #[must_use]
    pub fn binding_id(&self) -> Option<BindingId> {
        self.core.binding.borrow().as_ref().map(BindingRecord::id)
    }

    /// A leaf expression reading this property.
    ///
    /// The expression does not keep the property alive.
    #[must_use]
    pub fn expr(&self) -> Expr<T> {
        Expr::source(&self.core)
    }
}

impl<T: Clone + PartialEq + Default + 'static> Default for Property<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Clone + PartialEq + fmt::Debug + 'static> fmt::Debug for Property<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("value", &*self.core.value.borrow())
            .field("bound", &self.is_bound())
            .field("listeners", &self.core.value_changed.len())
            .finish()
    }
}

impl<T: Clone + PartialEq + 'static> Drop for Property<T> {
    fn drop(&mut self) {
        self.core.destroyed.emit(&());
        let binding = self.core.binding.borrow_mut().take();
        drop(binding);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
