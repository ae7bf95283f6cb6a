#![forbid(unsafe_code)]

//! Batched recomputation of bound properties.
//!
//! # Design
//!
//! [`BindingEvaluator`] is a cheap `Clone` handle over shared state holding
//! one entry per bound property: the recompute closure, the dirty flag, and
//! weak references to the properties the binding reads. Bindings hold only a
//! `Weak` reference back to the evaluator.
//!
//! Source changes reach the evaluator through lightweight hooks connected to
//! each source's `value_changed` signal. In [`EvaluationMode::Deferred`] a
//! hook only flags its entry; [`evaluate_all`](BindingEvaluator::evaluate_all)
//! later walks every entry in topological order (registration order breaks
//! ties) and recomputes the dirty ones. A recompute that changes its value
//! fires `value_changed`, which dirties downstream entries; those come later
//! in the order and are recomputed in the same pass.
//!
//! # Invariants
//!
//! 1. Hooks never recompute in deferred mode.
//! 2. Within a pass, a binding is recomputed after every binding it reads.
//! 3. A recompute clears the dirty flag whether or not the value changed;
//!    notifications fire only on change.
//! 4. No `RefCell` borrow of evaluator state is held while user code runs.
//! 5. Entries exist exactly as long as their bound property's binding.
//!
//! # Failure Modes
//!
//! - **Cycle**: bindings that (transitively) read each other are skipped and
//!   reported as [`BindingError::DependencyCycle`] once every other entry has
//!   been evaluated. Re-entering a recompute that is already running fails
//!   the same way.
//! - **Re-entry from a change handler**: an `evaluate_all` started from
//!   inside a recompute's notifications (directly, or through an immediate
//!   hook) that reaches the still-running binding while it is dirty again
//!   returns [`BindingError::DependencyCycle`] and abandons the rest of its
//!   pass, even when the graph itself is acyclic. The outer evaluation picks
//!   the binding up on its next pass.
//! - **Compute function panics**: the entry stays dirty and keeps its last
//!   value, so the next `evaluate_all` retries.
//! - **Handlers keep writing sources**: evaluation stops after
//!   `max_passes` with [`BindingError::EvaluationDidNotSettle`].

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::config::{EvaluationMode, EvaluatorConfig};
use crate::error::{BindingError, Result};
use crate::property::Upstream;

/// Registration id of one binding inside its evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BindingId(u64);

impl BindingId {
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for BindingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Outcome of running one recompute closure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Recomputed {
    Changed,
    Unchanged,
    /// The bound property no longer exists.
    Detached,
}

pub(crate) type Recompute = Rc<dyn Fn() -> Recomputed>;

struct Entry {
    dirty: bool,
    in_progress: bool,
    recompute: Recompute,
    sources: Vec<Weak<dyn Upstream>>,
    label: String,
}

/// Cached evaluation order.
struct Schedule {
    order: Vec<BindingId>,
    cyclic: Vec<BindingId>,
}

pub(crate) struct EvaluatorShared {
    config: EvaluatorConfig,
    entries: RefCell<BTreeMap<BindingId, Entry>>,
    schedule: RefCell<Option<Rc<Schedule>>>,
    next_id: Cell<u64>,
}

impl EvaluatorShared {
    fn mark_dirty(&self, id: BindingId) -> bool {
        let mut entries = self.entries.borrow_mut();
        let Some(entry) = entries.get_mut(&id) else {
            return false;
        };
        if !entry.dirty {
            entry.dirty = true;
            tracing::trace!(message = "evaluator.mark_dirty", binding = id.0);
        }
        true
    }

    fn dirty_outside(&self, cyclic: &[BindingId]) -> bool {
        self.entries
            .borrow()
            .iter()
            .any(|(id, entry)| entry.dirty && !cyclic.contains(id))
    }

    /// Topological order over all entries, edges running from a binding to
    /// the bindings that read it.
    fn schedule(&self) -> Rc<Schedule> {
        if let Some(schedule) = self.schedule.borrow().as_ref() {
            return Rc::clone(schedule);
        }

        let graph: BTreeMap<BindingId, Vec<BindingId>> = self
            .entries
            .borrow()
            .iter()
            .map(|(&id, entry)| {
                let upstream = entry
                    .sources
                    .iter()
                    .filter_map(Weak::upgrade)
                    .filter_map(|source| source.binding_in(self))
                    .filter(|&up| up != id)
                    .collect::<Vec<_>>();
                (id, upstream)
            })
            .collect();

        let mut pending: BTreeMap<BindingId, usize> = BTreeMap::new();
        let mut readers: BTreeMap<BindingId, Vec<BindingId>> = BTreeMap::new();
        for (&id, upstream) in &graph {
            pending.insert(id, upstream.len());
            for up in upstream {
                readers.entry(*up).or_default().push(id);
            }
        }

        let mut ready: BTreeSet<BindingId> = pending
            .iter()
            .filter(|&(_, &count)| count == 0)
            .map(|(&id, _)| id)
            .collect();
        let mut order = Vec::with_capacity(graph.len());
        while let Some(id) = ready.pop_first() {
            order.push(id);
            for reader in readers.get(&id).into_iter().flatten() {
                if let Some(count) = pending.get_mut(reader) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert(*reader);
                    }
                }
            }
        }

        let cyclic: Vec<BindingId> = pending
            .iter()
            .filter(|&(_, &count)| count > 0)
            .map(|(&id, _)| id)
            .collect();
        if !cyclic.is_empty() {
            tracing::warn!(message = "evaluator.cycle", bindings = ?cyclic);
        }

        let schedule = Rc::new(Schedule { order, cyclic });
        *self.schedule.borrow_mut() = Some(Rc::clone(&schedule));
        schedule
    }

    /// Recompute `id` if it is dirty. `Ok(None)` when there was nothing to do.
    fn recompute(&self, id: BindingId) -> Result<Option<Recomputed>> {
        let recompute = {
            let mut entries = self.entries.borrow_mut();
            let Some(entry) = entries.get_mut(&id) else {
                return Ok(None);
            };
            if !entry.dirty {
                return Ok(None);
            }
            if entry.in_progress {
                tracing::warn!(message = "evaluator.reentrant_recompute", binding = id.0);
                return Err(BindingError::DependencyCycle { binding: id });
            }
            entry.in_progress = true;
            entry.dirty = false;
            Rc::clone(&entry.recompute)
        };

        let mut guard = InProgress {
            shared: self,
            id,
            completed: false,
        };
        let outcome = recompute();
        guard.completed = true;
        drop(guard);

        tracing::trace!(message = "evaluator.recompute", binding = id.0, outcome = ?outcome);
        Ok(Some(outcome))
    }
}

/// Clears the in-progress flag, restoring the dirty flag if the recompute
/// unwound.
struct InProgress<'a> {
    shared: &'a EvaluatorShared,
    id: BindingId,
    completed: bool,
}

impl Drop for InProgress<'_> {
    fn drop(&mut self) {
        let Ok(mut entries) = self.shared.entries.try_borrow_mut() else {
            return;
        };
        if let Some(entry) = entries.get_mut(&self.id) {
            entry.in_progress = false;
            if !self.completed {
                entry.dirty = true;
            }
        }
    }
}

/// Counters from one [`BindingEvaluator::evaluate_all`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EvaluationReport {
    /// Passes over the schedule. Zero when nothing was dirty.
    pub passes: usize,
    /// Recompute closures run.
    pub recomputed: usize,
    /// Recomputes that produced a different value.
    pub changed: usize,
}

/// Registry that recomputes bound properties on request.
///
/// Clones share the same registry. There is no global instance: create one
/// and pass it to every [`make_bound_property`](crate::make_bound_property)
/// call that should be evaluated together.
#[derive(Clone)]
pub struct BindingEvaluator {
    shared: Rc<EvaluatorShared>,
}

impl BindingEvaluator {
    /// A deferred evaluator with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(EvaluatorConfig::default())
    }

    #[must_use]
    pub fn with_config(config: EvaluatorConfig) -> Self {
        Self {
            shared: Rc::new(EvaluatorShared {
                config,
                entries: RefCell::new(BTreeMap::new()),
                schedule: RefCell::new(None),
                next_id: Cell::new(0),
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> EvaluatorConfig {
        self.shared.config
    }

    /// Recompute every dirty binding, upstream before downstream.
    ///
    /// Bound properties whose recomputed value differs from the stored one
    /// fire their change signals. Entries caught in a dependency cycle keep
    /// their last values and are reported after all other entries have been
    /// evaluated.
    pub fn evaluate_all(&self) -> Result<EvaluationReport> {
        let span = tracing::debug_span!(
            "evaluator.evaluate_all",
            bindings = self.len(),
            passes = tracing::field::Empty,
            recomputed = tracing::field::Empty,
            changed = tracing::field::Empty,
        );
        let _enter = span.enter();

        let mut report = EvaluationReport::default();
        let mut cycle = None;
        loop {
            let schedule = self.shared.schedule();
            if let Some(&first) = schedule.cyclic.first() {
                cycle.get_or_insert(first);
            }
            if !self.shared.dirty_outside(&schedule.cyclic) {
                break;
            }
            if report.passes == self.shared.config.max_passes {
                tracing::warn!(message = "evaluator.unsettled", passes = report.passes);
                return Err(BindingError::EvaluationDidNotSettle {
                    passes: report.passes,
                });
            }
            report.passes += 1;

            for &id in &schedule.order {
                match self.shared.recompute(id)? {
                    Some(Recomputed::Changed) => {
                        report.recomputed += 1;
                        report.changed += 1;
                    }
                    Some(Recomputed::Unchanged) => report.recomputed += 1,
                    Some(Recomputed::Detached) | None => {}
                }
            }
        }

        span.record("passes", report.passes);
        span.record("recomputed", report.recomputed);
        span.record("changed", report.changed);

        match cycle {
            Some(binding) => Err(BindingError::DependencyCycle { binding }),
            None => Ok(report),
        }
    }

    /// Flag a binding for recomputation. Idempotent; unknown ids are ignored.
    pub fn mark_dirty(&self, id: BindingId) {
        self.shared.mark_dirty(id);
    }

    /// Whether the binding is waiting for recomputation.
    #[must_use]
    pub fn is_dirty(&self, id: BindingId) -> bool {
        self.shared
            .entries
            .borrow()
            .get(&id)
            .is_some_and(|entry| entry.dirty)
    }

    /// Number of dirty bindings.
    #[must_use]
    pub fn dirty_count(&self) -> usize {
        self.shared
            .entries
            .borrow()
            .values()
            .filter(|entry| entry.dirty)
            .count()
    }

    /// Number of registered bindings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.entries.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether both handles share one registry.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.shared, &other.shared)
    }

    pub(crate) fn downgrade(&self) -> Weak<EvaluatorShared> {
        Rc::downgrade(&self.shared)
    }

    pub(crate) fn register(
        &self,
        recompute: Recompute,
        sources: Vec<Weak<dyn Upstream>>,
        label: String,
    ) -> BindingId {
        let id = BindingId(self.shared.next_id.get());
        self.shared.next_id.set(id.0 + 1);
        tracing::debug!(
            message = "evaluator.register",
            binding = id.0,
            sources = sources.len(),
            expr = %label
        );
        self.shared.entries.borrow_mut().insert(
            id,
            Entry {
                dirty: false,
                in_progress: false,
                recompute,
                sources,
                label,
            },
        );
        self.shared.schedule.borrow_mut().take();
        id
    }
}

/// Remove a registration. Called when a binding is dropped.
pub(crate) fn deregister(shared: &Weak<EvaluatorShared>, id: BindingId) {
    let Some(shared) = shared.upgrade() else {
        return;
    };
    let removed = shared.entries.borrow_mut().remove(&id);
    shared.schedule.borrow_mut().take();
    if let Some(entry) = removed {
        tracing::debug!(message = "evaluator.deregister", binding = id.0, expr = %entry.label);
    }
}

/// Dirty hook body: flag the entry, and in immediate mode evaluate at once.
pub(crate) fn source_changed(shared: &Weak<EvaluatorShared>, id: BindingId) {
    let Some(shared) = shared.upgrade() else {
        return;
    };
    if !shared.mark_dirty(id) {
        return;
    }
    if shared.config.mode == EvaluationMode::Immediate {
        let evaluator = BindingEvaluator { shared };
        if let Err(error) = evaluator.evaluate_all() {
            tracing::warn!(message = "evaluator.immediate_failed", binding = id.0, %error);
        }
    }
}

pub(crate) fn is_same(shared: &Weak<EvaluatorShared>, evaluator: &EvaluatorShared) -> bool {
    std::ptr::eq(shared.as_ptr(), evaluator)
}

impl Default for BindingEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BindingEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingEvaluator")
            .field("mode", &self.shared.config.mode)
            .field("bindings", &self.len())
            .field("dirty", &self.dirty_count())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
