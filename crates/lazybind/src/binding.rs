#![forbid(unsafe_code)]

//! Attaching expressions to properties.
//!
//! A binding is the pairing of a property with an [`Expr`] and a
//! [`BindingEvaluator`]. The property stores a [`BindingRecord`] that keeps
//! the evaluator registration and the dirty hooks alive; dropping the record
//! (through [`Property::unbind`], re-binding, or dropping the property)
//! deregisters the entry and disconnects every hook.
//!
//! Bind-time cycle check: before a property is bound, the transitive sources
//! of the new expression are walked across every evaluator. If the property
//! itself is reachable, `bind` fails with [`BindingError::CyclicBinding`] and
//! leaves the property untouched.

use std::collections::HashSet;
use std::rc::{Rc, Weak};

use lazybind_signal::ScopedConnection;

use crate::error::{BindingError, Result};
use crate::evaluator::{self, BindingEvaluator, BindingId, EvaluatorShared, Recompute, Recomputed};
use crate::expr::Expr;
use crate::property::{Property, PropertyCore, PropertyKey, Upstream};

/// Registration and hooks of one bound property.
pub(crate) struct BindingRecord {
    evaluator: Weak<EvaluatorShared>,
    id: BindingId,
    sources: Vec<Weak<dyn Upstream>>,
    _hooks: Vec<ScopedConnection>,
}

impl BindingRecord {
    pub(crate) fn id(&self) -> BindingId {
        self.id
    }

    pub(crate) fn sources(&self) -> &[Weak<dyn Upstream>] {
        &self.sources
    }

    pub(crate) fn is_registered_in(&self, evaluator: &EvaluatorShared) -> bool {
        evaluator::is_same(&self.evaluator, evaluator)
    }
}

impl Drop for BindingRecord {
    fn drop(&mut self) {
        evaluator::deregister(&self.evaluator, self.id);
    }
}

/// Create a property whose value is computed from `expr`.
///
/// The expression is evaluated once, right away, to produce the initial
/// value. Afterwards a change to any property the expression reads only
/// marks the binding dirty; the value is recomputed by
/// [`BindingEvaluator::evaluate_all`] (or at once, for an immediate
/// evaluator). Direct [`set`](Property::set) calls on the result fail.
///
/// ```ignore
/// let evaluator = BindingEvaluator::new();
/// let a = Property::new(2);
/// let b = Property::new(3);
/// let product = make_bound_property(&evaluator, &a * &b);
/// assert_eq!(product.get(), 6);
/// ```
#[must_use]
pub fn make_bound_property<T>(evaluator: &BindingEvaluator, expr: impl Into<Expr<T>>) -> Property<T>
where
    T: Clone + PartialEq + 'static,
{
    let expr = expr.into();
    let property = Property::new(expr.evaluate());
    attach(&property.core, evaluator, expr);
    property
}

impl<T: Clone + PartialEq + 'static> Property<T> {
    /// Bind this property to `expr`, replacing any previous binding.
    ///
    /// The expression is evaluated immediately; if the result differs from
    /// the current value the change signals fire. Fails with
    /// [`BindingError::CyclicBinding`] if `expr` reads this property,
    /// directly or through other bound properties.
    pub fn bind(&self, evaluator: &BindingEvaluator, expr: impl Into<Expr<T>>) -> Result<()> {
        let expr = expr.into();
        let sources = expr.dependencies().into_sources();
        if reaches(&sources, self.core.key()) {
            tracing::warn!(message = "binding.cycle_rejected", expr = %expr.describe());
            return Err(BindingError::CyclicBinding);
        }

        self.unbind();
        self.core.store(expr.evaluate());
        attach(&self.core, evaluator, expr);
        Ok(())
    }

    /// Turn a bound property back into an independent one.
    ///
    /// The current value is kept. No-op on an independent property.
    pub fn unbind(&self) {
        let previous = self.core.binding.borrow_mut().take();
        if let Some(record) = previous {
            tracing::debug!(message = "binding.unbind", binding = record.id().raw());
            drop(record);
        }
    }
}

/// Register `expr` as the binding of `core` without any cycle check.
pub(crate) fn attach<T>(core: &Rc<PropertyCore<T>>, evaluator: &BindingEvaluator, expr: Expr<T>)
where
    T: Clone + PartialEq + 'static,
{
    let sources = expr.dependencies().into_sources();
    let label = expr.describe();
    let target = Rc::downgrade(core);
    let recompute: Recompute = Rc::new(move || {
        let Some(core) = target.upgrade() else {
            return Recomputed::Detached;
        };
        if core.store(expr.evaluate()) {
            Recomputed::Changed
        } else {
            Recomputed::Unchanged
        }
    });

    let id = evaluator.register(recompute, sources.clone(), label);
    let shared = evaluator.downgrade();
    let hooks = sources
        .iter()
        .filter_map(Weak::upgrade)
        .map(|source| {
            let shared = shared.clone();
            let hook: Rc<dyn Fn()> = Rc::new(move || evaluator::source_changed(&shared, id));
            ScopedConnection::new(source.on_change(hook))
        })
        .collect();

    let record = BindingRecord {
        evaluator: shared,
        id,
        sources,
        _hooks: hooks,
    };
    let previous = core.binding.borrow_mut().replace(record);
    drop(previous);
}

/// Whether `target` is among `sources` or their transitive binding sources.
fn reaches(sources: &[Weak<dyn Upstream>], target: PropertyKey) -> bool {
    let mut seen = HashSet::new();
    let mut stack = sources.to_vec();
    while let Some(source) = stack.pop() {
        let Some(source) = source.upgrade() else {
            continue;
        };
        let key = source.key();
        if key == target {
            return true;
        }
        if seen.insert(key) {
            stack.extend(source.sources());
        }
    }
    false
}
