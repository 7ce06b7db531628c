//! Symbolic memory for Falcon IL

pub mod context;
pub mod memory;
pub mod solver;
pub mod util;
pub mod value;

pub use self::context::*;
pub use self::memory::*;
pub use self::solver::*;
pub use self::util::*;
pub use self::value::*;
