use lazybind_signal::SignalError;
use thiserror::Error;

use crate::evaluator::BindingId;

pub type Result<T> = std::result::Result<T, BindingError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindingError {
    /// Direct assignment to a property whose value is owned by a binding.
    #[error("property is bound; its value can only change through its binding")]
    ReadOnlyProperty,

    /// `bind` was asked to make a property depend on itself.
    #[error("binding would make the property depend on itself")]
    CyclicBinding,

    /// Evaluation reached a binding that was already being recomputed, or a
    /// set of bindings that depend on each other.
    #[error("dependency cycle detected at binding {binding}")]
    DependencyCycle { binding: BindingId },

    #[error("evaluation did not settle after {passes} passes")]
    EvaluationDidNotSettle { passes: usize },

    #[error(transparent)]
    Signal(#[from] SignalError),
}
