//! Concrete evaluation of Falcon IL expressions.
//!
//! The symbolic layers use this to fold constant formulas, and to check
//! candidate models against constraints.

mod eval;

pub use self::eval::{eval, symbolize_expression};
