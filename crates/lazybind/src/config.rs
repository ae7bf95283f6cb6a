#![forbid(unsafe_code)]

//! Evaluator configuration.

/// When bound properties are recomputed after one of their sources changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvaluationMode {
    /// Mark the binding dirty; recompute on
    /// [`evaluate_all`](crate::BindingEvaluator::evaluate_all).
    #[default]
    Deferred,
    /// Recompute from inside the source's change notification.
    Immediate,
}

/// Configuration for a [`BindingEvaluator`](crate::BindingEvaluator).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluatorConfig {
    /// Recompute policy.
    pub mode: EvaluationMode,
    /// Upper bound on passes in one `evaluate_all` call. A pass is needed
    /// each time change handlers write to sources during evaluation.
    pub max_passes: usize,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            mode: EvaluationMode::Deferred,
            max_passes: 64,
        }
    }
}

impl EvaluatorConfig {
    /// Default configuration with [`EvaluationMode::Immediate`].
    #[must_use]
    pub fn immediate() -> Self {
        Self::default().with_mode(EvaluationMode::Immediate)
    }

    #[must_use]
    pub fn with_mode(mut self, mode: EvaluationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the pass limit. Values below 1 are raised to 1.
    #[must_use]
    pub fn with_max_passes(mut self, max_passes: usize) -> Self {
        self.max_passes = max_passes.max(1);
        self
    }
}
