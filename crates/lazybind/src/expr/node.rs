#![forbid(unsafe_code)]

//! Expression tree nodes.
//!
//! Each node evaluates itself on demand and reports the properties it reads.
//! Nothing here evaluates eagerly: building a tree only moves children into
//! their parent.

use std::cell::RefCell;
use std::fmt::Write as _;
use std::rc::{Rc, Weak};

use super::{Dependencies, Expr};
use crate::property::{PropertyCore, Upstream};

pub(crate) trait Node<T> {
    fn evaluate(&self) -> T;
    fn collect_dependencies(&self, deps: &mut Dependencies);
    fn describe(&self, out: &mut String);
}

// ---------------------------------------------------------------------------
// Leaves
// ---------------------------------------------------------------------------

pub(crate) struct ConstantNode<T> {
    pub(crate) value: T,
}

impl<T: Clone> Node<T> for ConstantNode<T> {
    fn evaluate(&self) -> T {
        self.value.clone()
    }

    fn collect_dependencies(&self, _deps: &mut Dependencies) {}

    fn describe(&self, out: &mut String) {
        out.push_str("const");
    }
}

/// Non-owning reference to a property.
///
/// Remembers the last value it read so that an expression whose source has
/// been dropped keeps evaluating to that value.
pub(crate) struct SourceNode<T> {
    source: Weak<PropertyCore<T>>,
    last: RefCell<T>,
}

impl<T: Clone + PartialEq + 'static> SourceNode<T> {
    pub(crate) fn new(core: &Rc<PropertyCore<T>>) -> Self {
        Self {
            source: Rc::downgrade(core),
            last: RefCell::new(core.get()),
        }
    }
}

impl<T: Clone + PartialEq + 'static> Node<T> for SourceNode<T> {
    fn evaluate(&self) -> T {
        match self.source.upgrade() {
            Some(core) => {
                let value = core.get();
                *self.last.borrow_mut() = value.clone();
                value
            }
            None => self.last.borrow().clone(),
        }
    }

    fn collect_dependencies(&self, deps: &mut Dependencies) {
        if let Some(core) = self.source.upgrade() {
            let upstream: Rc<dyn Upstream> = core;
            deps.insert(Rc::downgrade(&upstream));
        }
    }

    fn describe(&self, out: &mut String) {
        match self.source.upgrade() {
            Some(core) => {
                let _ = write!(out, "property@{:x}", core.key().addr());
            }
            None => out.push_str("dropped"),
        }
    }
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

pub(crate) enum Notation {
    /// `-x`, `!x`
    Prefix(&'static str),
    /// `(a + b)`
    Infix(&'static str),
    /// `map(x)`, `zip(a, b)`
    Call(&'static str),
}

pub(crate) struct UnaryNode<A, T> {
    pub(crate) notation: Notation,
    pub(crate) operand: Expr<A>,
    pub(crate) apply: Box<dyn Fn(A) -> T>,
}

impl<A: 'static, T: 'static> Node<T> for UnaryNode<A, T> {
    fn evaluate(&self) -> T {
        (self.apply)(self.operand.evaluate())
    }

    fn collect_dependencies(&self, deps: &mut Dependencies) {
        self.operand.node.collect_dependencies(deps);
    }

    fn describe(&self, out: &mut String) {
        match self.notation {
            Notation::Prefix(symbol) => {
                out.push_str(symbol);
                self.operand.node.describe(out);
            }
            Notation::Infix(name) | Notation::Call(name) => {
                out.push_str(name);
                out.push('(');
                self.operand.node.describe(out);
                out.push(')');
            }
        }
    }
}

pub(crate) struct BinaryNode<A, B, T> {
    pub(crate) notation: Notation,
    pub(crate) lhs: Expr<A>,
    pub(crate) rhs: Expr<B>,
    pub(crate) apply: Box<dyn Fn(A, B) -> T>,
}

impl<A: 'static, B: 'static, T: 'static> Node<T> for BinaryNode<A, B, T> {
    fn evaluate(&self) -> T {
        (self.apply)(self.lhs.evaluate(), self.rhs.evaluate())
    }

    fn collect_dependencies(&self, deps: &mut Dependencies) {
        self.lhs.node.collect_dependencies(deps);
        self.rhs.node.collect_dependencies(deps);
    }

    fn describe(&self, out: &mut String) {
        match self.notation {
            Notation::Infix(symbol) => {
                out.push('(');
                self.lhs.node.describe(out);
                let _ = write!(out, " {symbol} ");
                self.rhs.node.describe(out);
                out.push(')');
            }
            Notation::Prefix(name) | Notation::Call(name) => {
                out.push_str(name);
                out.push('(');
                self.lhs.node.describe(out);
                out.push_str(", ");
                self.rhs.node.describe(out);
                out.push(')');
            }
        }
    }
}
