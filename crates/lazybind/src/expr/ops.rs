#![forbid(unsafe_code)]

//! `std::ops` implementations that build expression nodes.

use std::ops::{Add, Div, Mul, Neg, Not, Rem, Sub};

use super::Expr;
use crate::property::Property;

// ---------------------------------------------------------------------------
// Expression / property operands
// ---------------------------------------------------------------------------

macro_rules! binary_operator {
    ($op:ident, $method:ident, $symbol:literal) => {
        impl<A, B> $op<Expr<B>> for Expr<A>
        where
            A: $op<B> + 'static,
            B: 'static,
            <A as $op<B>>::Output: 'static,
        {
            type Output = Expr<<A as $op<B>>::Output>;

            fn $method(self, rhs: Expr<B>) -> Self::Output {
                Expr::infix($symbol, self, rhs, |a: A, b: B| $op::$method(a, b))
            }
        }

        impl<A, B> $op<&Property<B>> for Expr<A>
        where
            A: $op<B> + 'static,
            B: Clone + PartialEq + 'static,
            <A as $op<B>>::Output: 'static,
        {
            type Output = Expr<<A as $op<B>>::Output>;

            fn $method(self, rhs: &Property<B>) -> Self::Output {
                $op::$method(self, rhs.expr())
            }
        }

        impl<A, B> $op<Expr<B>> for &Property<A>
        where
            A: $op<B> + Clone + PartialEq + 'static,
            B: 'static,
            <A as $op<B>>::Output: 'static,
        {
            type Output = Expr<<A as $op<B>>::Output>;

            fn $method(self, rhs: Expr<B>) -> Self::Output {
                $op::$method(self.expr(), rhs)
            }
        }

        impl<A, B> $op<&Property<B>> for &Property<A>
        where
            A: $op<B> + Clone + PartialEq + 'static,
            B: Clone + PartialEq + 'static,
            <A as $op<B>>::Output: 'static,
        {
            type Output = Expr<<A as $op<B>>::Output>;

            fn $method(self, rhs: &Property<B>) -> Self::Output {
                $op::$method(self.expr(), rhs.expr())
            }
        }
    };
}

binary_operator!(Add, add, "+");
binary_operator!(Sub, sub, "-");
binary_operator!(Mul, mul, "*");
binary_operator!(Div, div, "/");
binary_operator!(Rem, rem, "%");

macro_rules! unary_operator {
    ($op:ident, $method:ident, $symbol:literal) => {
        impl<A> $op for Expr<A>
        where
            A: $op + 'static,
            <A as $op>::Output: 'static,
        {
            type Output = Expr<<A as $op>::Output>;

            fn $method(self) -> Self::Output {
                Expr::prefix($symbol, self, |a: A| $op::$method(a))
            }
        }

        impl<A> $op for &Property<A>
        where
            A: $op + Clone + PartialEq + 'static,
            <A as $op>::Output: 'static,
        {
            type Output = Expr<<A as $op>::Output>;

            fn $method(self) -> Self::Output {
                $op::$method(self.expr())
            }
        }
    };
}

unary_operator!(Neg, neg, "-");
unary_operator!(Not, not, "!");

// ---------------------------------------------------------------------------
// Primitive constants
// ---------------------------------------------------------------------------

macro_rules! constant_operator {
    ($op:ident, $method:ident, $t:ty) => {
        impl $op<$t> for Expr<$t> {
            type Output = Expr<<$t as $op>::Output>;

            fn $method(self, rhs: $t) -> Self::Output {
                $op::$method(self, Expr::constant(rhs))
            }
        }

        impl $op<Expr<$t>> for $t {
            type Output = Expr<<$t as $op>::Output>;

            fn $method(self, rhs: Expr<$t>) -> Self::Output {
                $op::$method(Expr::constant(self), rhs)
            }
        }

        impl $op<$t> for &Property<$t> {
            type Output = Expr<<$t as $op>::Output>;

            fn $method(self, rhs: $t) -> Self::Output {
                $op::$method(self.expr(), Expr::constant(rhs))
            }
        }

        impl $op<&Property<$t>> for $t {
            type Output = Expr<<$t as $op>::Output>;

            fn $method(self, rhs: &Property<$t>) -> Self::Output {
                $op::$method(Expr::constant(self), rhs.expr())
            }
        }
    };
}

macro_rules! constant_operators {
    ($($t:ty),* $(,)?) => {
        $(
            constant_operator!(Add, add, $t);
            constant_operator!(Sub, sub, $t);
            constant_operator!(Mul, mul, $t);
            constant_operator!(Div, div, $t);
            constant_operator!(Rem, rem, $t);
        )*
    };
}

constant_operators!(
    i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64,
);
