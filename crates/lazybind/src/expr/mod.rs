#![forbid(unsafe_code)]

//! Lazily composed expressions over properties.
//!
//! An [`Expr<T>`] is an explicit, runtime-visible expression tree. Leaves are
//! constants or non-owning references to [`Property`] values; interior nodes
//! are operators and user functions closed over their children. Building an
//! expression never evaluates it.
//!
//! ```ignore
//! let total = &shares * &price;          // Expr<f64>, nothing computed yet
//! let label = total.map(|t| format!("{t:.2}"));
//! let bound = make_bound_property(&evaluator, label);
//! ```
//!
//! Operators from `std::ops` work on any mix of `Expr<_>` and `&Property<_>`
//! operands, and with primitive numeric constants on either side.

mod node;
mod ops;

use std::fmt;
use std::rc::{Rc, Weak};

use crate::property::{Property, PropertyCore, Upstream};

pub(crate) use node::Node;
use node::{BinaryNode, ConstantNode, Notation, SourceNode, UnaryNode};

/// Distinct set of properties an expression reads, in first-seen order.
#[derive(Default)]
pub(crate) struct Dependencies {
    sources: Vec<Weak<dyn Upstream>>,
}

impl Dependencies {
    pub(crate) fn insert(&mut self, source: Weak<dyn Upstream>) {
        let seen = self
            .sources
            .iter()
            .any(|known| std::ptr::addr_eq(known.as_ptr(), source.as_ptr()));
        if !seen {
            self.sources.push(source);
        }
    }

    pub(crate) fn into_sources(self) -> Vec<Weak<dyn Upstream>> {
        self.sources
    }

    pub(crate) fn len(&self) -> usize {
        self.sources.len()
    }
}

/// An unevaluated computation producing a `T`.
pub struct Expr<T> {
    pub(crate) node: Box<dyn Node<T>>,
}

impl<T: 'static> Expr<T> {
    pub(crate) fn from_node(node: impl Node<T> + 'static) -> Self {
        Self {
            node: Box::new(node),
        }
    }

    /// A leaf that always evaluates to `value`.
    #[must_use]
    pub fn constant(value: T) -> Self
    where
        T: Clone,
    {
        Self::from_node(ConstantNode { value })
    }

    pub(crate) fn source(core: &Rc<PropertyCore<T>>) -> Self
    where
        T: Clone + PartialEq,
    {
        Self::from_node(SourceNode::new(core))
    }

    /// Apply `f` to the result of this expression.
    #[must_use]
    pub fn map<U: 'static>(self, f: impl Fn(T) -> U + 'static) -> Expr<U> {
        Expr::from_node(UnaryNode {
            notation: Notation::Call("map"),
            operand: self,
            apply: Box::new(f),
        })
    }

    /// Combine this expression with `other` through `f`.
    #[must_use]
    pub fn zip_with<U: 'static, V: 'static>(
        self,
        other: impl Into<Expr<U>>,
        f: impl Fn(T, U) -> V + 'static,
    ) -> Expr<V> {
        Expr::from_node(BinaryNode {
            notation: Notation::Call("zip"),
            lhs: self,
            rhs: other.into(),
            apply: Box::new(f),
        })
    }

    pub(crate) fn prefix<A: 'static>(
        symbol: &'static str,
        operand: Expr<A>,
        apply: impl Fn(A) -> T + 'static,
    ) -> Self {
        Self::from_node(UnaryNode {
            notation: Notation::Prefix(symbol),
            operand,
            apply: Box::new(apply),
        })
    }

    pub(crate) fn infix<A: 'static, B: 'static>(
        symbol: &'static str,
        lhs: Expr<A>,
        rhs: Expr<B>,
        apply: impl Fn(A, B) -> T + 'static,
    ) -> Self {
        Self::from_node(BinaryNode {
            notation: Notation::Infix(symbol),
            lhs,
            rhs,
            apply: Box::new(apply),
        })
    }

    /// Evaluate against the current values of the referenced properties.
    #[must_use]
    pub fn evaluate(&self) -> T {
        self.node.evaluate()
    }

    /// Human-readable rendering of the tree, e.g. `(property@.. * const)`.
    #[must_use]
    pub fn describe(&self) -> String {
        let mut out = String::new();
        self.node.describe(&mut out);
        out
    }

    /// Number of distinct live properties the expression reads.
    #[must_use]
    pub fn dependency_count(&self) -> usize {
        self.dependencies().len()
    }

    pub(crate) fn dependencies(&self) -> Dependencies {
        let mut deps = Dependencies::default();
        self.node.collect_dependencies(&mut deps);
        deps
    }
}

impl<T: Clone + PartialEq + 'static> From<&Property<T>> for Expr<T> {
    fn from(property: &Property<T>) -> Self {
        property.expr()
    }
}

impl<T> fmt::Debug for Expr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        self.node.describe(&mut out);
        f.debug_tuple("Expr").field(&out).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn building_does_not_evaluate() {
        use std::cell::Cell;

        let calls = Rc::new(Cell::new(0u32));
        let calls_clone = Rc::clone(&calls);
        let a = Property::new(2_i32);
        let expr = (&a * 3).map(move |v| {
            calls_clone.set(calls_clone.get() + 1);
            v + 1
        });
        assert_eq!(calls.get(), 0);
        assert_eq!(expr.evaluate(), 7);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn evaluate_reads_current_values() {
        let a = Property::new(2_i32);
        let b = Property::new(3_i32);
        let expr = &a * &b;
        assert_eq!(expr.evaluate(), 6);
        a.set(5).expect("independent");
        assert_eq!(expr.evaluate(), 15);
    }

    #[test]
    fn dependencies_are_distinct() {
        let a = Property::new(1_i32);
        let b = Property::new(2_i32);
        let expr = (&a + &b) * &a - 4;
        assert_eq!(expr.dependency_count(), 2);
        assert_eq!(Expr::constant(1_i32).dependency_count(), 0);
    }

    #[test]
    fn dropped_source_freezes_last_read() {
        let expr;
        {
            let a = Property::new(10_i32);
            expr = &a + 1;
            a.set(20).expect("independent");
            assert_eq!(expr.evaluate(), 21);
            assert_eq!(expr.dependency_count(), 1);
        }
        assert_eq!(expr.evaluate(), 21);
        assert_eq!(expr.dependency_count(), 0);
        assert!(expr.describe().contains("dropped"));
    }

    #[test]
    fn nested_composition() {
        let a = Property::new(1.5_f64);
        let b = Property::new(2.0_f64);
        let inner = &a * &b;
        let outer = -(inner + 1.0) / Expr::constant(2.0);
        assert!((outer.evaluate() - -2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn zip_with_mixed_types() {
        let count = Property::new(3u32);
        let word = Property::new("ab".to_string());
        let expr = word.expr().zip_with(&count, |w: String, n: u32| w.repeat(n as usize));
        assert_eq!(expr.evaluate(), "ababab");
        assert!(expr.describe().starts_with("zip("));
    }

    #[test]
    fn describe_renders_structure() {
        let a = Property::new(1_i32);
        let expr = -(&a + 2);
        let text = expr.describe();
        assert!(text.starts_with("-(property@"));
        assert!(text.ends_with(" + const)"));
        assert!(format!("{expr:?}").starts_with("Expr("));
    }

    #[test]
    fn logical_not() {
        let flag = Property::new(false);
        let expr = !&flag;
        assert!(expr.evaluate());
    }
}
