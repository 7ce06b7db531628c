//! Falcon-style IL formulas.
//!
//! The symbolic memory model stores, and reasons about, `Expression`s. The
//! terminals are `Constant` and `Scalar`. A `Constant` is a value, and a
//! `Scalar` is an unknown, symbolic, variable.
//!
//! Expressions implement arithmetic, comparison, extension/truncation, and an
//! if-then-else over the terminals. Comparison expressions evaluate to a 1-bit
//! expression with the value `1` representing `True`, and the value `0`
//! representing `False`. Constraints are simply 1-bit expressions which must
//! evaluate to `1`.
//!
//! It is an error to create an expression which operates over expressions of
//! differing bitness. This is checked dynamically at runtime, and a `Sort`
//! error will be emitted.
//!
//! There is no explicit extract or concatenation operation. Extracting a byte
//! is `trun(8, shr(value, offset))`, and concatenation is an `or` of shifted,
//! zero-extended values.

mod constant;
mod expression;
mod scalar;

pub use self::constant::*;
pub use self::expression::*;
pub use self::scalar::*;

/// A convenience function to create a new constant.
///
/// This is the preferred way to create a `Constant`.
pub fn const_(value: u64, bits: usize) -> Constant {
    Constant::new(value, bits)
}

/// A convenience function to create a new constant expression.
///
/// This is the preferred way to create an `Expression::Constant`.
pub fn expr_const(value: u64, bits: usize) -> Expression {
    Expression::constant(Constant::new(value, bits))
}

/// A convenience function to create a new scalar.
///
/// This is the preferred way to create a `Scalar`.
pub fn scalar<S>(name: S, bits: usize) -> Scalar
where
    S: Into<String>,
{
    Scalar::new(name, bits)
}

/// A convenience function to create a new scalar expression.
///
/// This is the preferred way to create an `Expression::Scalar`.
pub fn expr_scalar<S>(name: S, bits: usize) -> Expression
where
    S: Into<String>,
{
    Expression::scalar(Scalar::new(name, bits))
}
