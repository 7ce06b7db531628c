//! Exploration of the path space of a program.
//!
//! An `Explorer` owns a set of paths and moves them forward one step at a time
//! with a `Driver`. After every step, each path is sorted into one of several
//! buckets:
//!
//! * `found` paths touched an address we were searching for.
//! * `avoided` paths touched an address we were told to stay away from.
//! * `deviating` paths left the addresses exploration is restricted to.
//! * `looping` paths revisited one address too many times.
//! * `trimmed` paths were dropped to keep the number of live paths bounded.
//! * `errored` paths failed to step.
//! * `deadended` paths had no successors.
//!
//! Everything else stays `active`.
//!
//! The `Explorer` knows nothing about how a path executes. A path only reports
//! the `Run` it executed last and the addresses of every run so far, through
//! the `Path` trait.

mod driver;
mod explorer;
mod options;
mod path;

pub use self::driver::Driver;
pub use self::explorer::Explorer;
pub use self::options::ExplorerOptions;
pub use self::path::{Path, Run, Trace};
