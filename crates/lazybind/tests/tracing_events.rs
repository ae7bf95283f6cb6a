//! The evaluator reports its work through `tracing`.

use std::cell::Cell;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use lazybind::{BindingError, BindingEvaluator, EvaluatorConfig, Property, make_bound_property};
use tracing::Subscriber;
use tracing_subscriber::Layer;
use tracing_subscriber::layer::{Context, SubscriberExt};

#[derive(Default)]
struct EvaluatorTraceState {
    saw_evaluate_span: bool,
    recorded_passes: Option<u64>,
    events: Vec<String>,
    /// `error` fields of `evaluator.immediate_failed` events.
    immediate_errors: Vec<String>,
}

struct EvaluatorTraceCapture {
    state: Arc<Mutex<EvaluatorTraceState>>,
}

impl<S> Layer<S> for EvaluatorTraceCapture
where
    S: Subscriber + for<'lookup> tracing_subscriber::registry::LookupSpan<'lookup>,
{
    fn on_new_span(
        &self,
        attrs: &tracing::span::Attributes<'_>,
        _id: &tracing::Id,
        _ctx: Context<'_, S>,
    ) {
        if attrs.metadata().name() == "evaluator.evaluate_all" {
            self.state.lock().expect("trace lock").saw_evaluate_span = true;
        }
    }

    fn on_record(&self, id: &tracing::Id, values: &tracing::span::Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        if span.metadata().name() != "evaluator.evaluate_all" {
            return;
        }
        struct V {
            passes: Option<u64>,
        }
        impl tracing::field::Visit for V {
            fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
                if field.name() == "passes" {
                    self.passes = Some(value);
                }
            }

            fn record_debug(&mut self, _field: &tracing::field::Field, _value: &dyn std::fmt::Debug) {
            }
        }
        let mut v = V { passes: None };
        values.record(&mut v);
        if let Some(passes) = v.passes {
            self.state.lock().expect("trace lock").recorded_passes = Some(passes);
        }
    }

    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        struct Msg {
            message: Option<String>,
            error: Option<String>,
        }
        impl tracing::field::Visit for Msg {
            fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
                if field.name() == "message" {
                    self.message = Some(value.to_string());
                }
            }

            fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
                match field.name() {
                    "message" => {
                        self.message = Some(format!("{value:?}").trim_matches('"').to_string());
                    }
                    "error" => self.error = Some(format!("{value:?}")),
                    _ => {}
                }
            }
        }
        let mut msg = Msg {
            message: None,
            error: None,
        };
        event.record(&mut msg);
        let Some(message) = msg.message else {
            return;
        };
        let mut state = self.state.lock().expect("trace lock");
        if message == "evaluator.immediate_failed"
            && let Some(error) = msg.error
        {
            state.immediate_errors.push(error);
        }
        state.events.push(message);
    }
}

fn capture() -> (Arc<Mutex<EvaluatorTraceState>>, tracing::subscriber::DefaultGuard) {
    let state = Arc::new(Mutex::new(EvaluatorTraceState::default()));
    let subscriber = tracing_subscriber::registry().with(EvaluatorTraceCapture {
        state: Arc::clone(&state),
    });
    let guard = tracing::subscriber::set_default(subscriber);
    (state, guard)
}

#[test]
fn evaluate_all_span_records_passes() {
    let (state, _guard) = capture();

    let ev = BindingEvaluator::new();
    let a = Property::new(1_i32);
    let d = make_bound_property(&ev, &a * 2);
    a.set(2).expect("independent");
    ev.evaluate_all().expect("acyclic");
    assert_eq!(d.get(), 4);

    let snapshot = state.lock().expect("trace lock");
    assert!(snapshot.saw_evaluate_span, "expected evaluator.evaluate_all span");
    assert_eq!(snapshot.recorded_passes, Some(1));
    for expected in ["evaluator.register", "evaluator.mark_dirty", "evaluator.recompute"] {
        assert!(
            snapshot.events.iter().any(|e| e == expected),
            "missing {expected} in {:?}",
            snapshot.events
        );
    }
}

#[test]
fn rejected_writes_and_cycles_warn() {
    let (state, _guard) = capture();

    let ev = BindingEvaluator::new();
    let x = Property::new(1_i32);
    let y = make_bound_property(&ev, &x + 1);
    assert_eq!(y.set(5), Err(BindingError::ReadOnlyProperty));
    assert_eq!(x.bind(&ev, &y + 1), Err(BindingError::CyclicBinding));
    drop(y);

    let snapshot = state.lock().expect("trace lock");
    for expected in [
        "property.set_rejected",
        "binding.cycle_rejected",
        "evaluator.deregister",
    ] {
        assert!(
            snapshot.events.iter().any(|e| e == expected),
            "missing {expected} in {:?}",
            snapshot.events
        );
    }
}

#[test]
fn immediate_hook_failures_are_logged() {
    let (state, _guard) = capture();

    let ev = BindingEvaluator::with_config(EvaluatorConfig::immediate().with_max_passes(1));
    let a = Rc::new(Property::new(1_i32));
    let d = make_bound_property(&ev, &*a * 2);

    // Write the source once from inside the recompute's own notification.
    let nudged = Rc::new(Cell::new(false));
    let (weak_a, nudged_clone) = (Rc::downgrade(&a), Rc::clone(&nudged));
    let _h = d.value_changed().connect(move |_| {
        if nudged_clone.replace(true) {
            return;
        }
        if let Some(a) = weak_a.upgrade() {
            a.set(3).expect("independent");
        }
    });

    // Neither failure propagates to the writer.
    a.set(2).expect("independent");
    assert_eq!(d.get(), 4);
    assert_eq!(ev.dirty_count(), 1);

    let snapshot = state.lock().expect("trace lock");
    assert_eq!(snapshot.immediate_errors.len(), 2, "{:?}", snapshot.immediate_errors);
    assert!(snapshot.immediate_errors[0].contains("dependency cycle"));
    assert!(snapshot.immediate_errors[1].contains("did not settle after 1 passes"));
}
