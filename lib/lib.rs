//! Symbolic memory and path exploration over Falcon-style IL.
//!
//! This crate is the core of a symbolic execution engine. It provides two
//! pieces which the rest of an engine is built around:
//!
//! * [`symbolic::SymbolicMemory`], a byte-addressable memory model whose
//! addresses and contents are `il::Expression`s. Reads and writes through
//! symbolic addresses are resolved with the help of a [`symbolic::Solver`],
//! which keeps logically distinct values from aliasing one another.
//! * [`explorer::Explorer`], which classifies and prunes a frontier of
//! execution paths one step at a time, stopping when a path reaches an
//! address of interest.
//!
//! Lifting and executing instructions is left to the user. The explorer
//! drives paths through a user-supplied [`explorer::Driver`], and the driver
//! is expected to call into `SymbolicMemory` for every load and store it
//! executes.
//!
//! # Shared ownership
//!
//! Memory pages are reference counted, and copied on write. By default we use
//! `std::rc::Rc`. Enable the `thread_safe` feature to use `std::sync::Arc`
//! instead.

pub mod error;
pub mod executor;
pub mod explorer;
pub mod il;
pub mod symbolic;
#[cfg(test)]
mod tests;

pub use error::Error;

#[cfg(not(feature = "thread_safe"))]
use std::rc::Rc;
/// A reference-counted pointer, `Rc` unless the `thread_safe` feature is set.
#[cfg(not(feature = "thread_safe"))]
pub type RC<T> = Rc<T>;

#[cfg(feature = "thread_safe")]
use std::sync::Arc;
/// A reference-counted pointer, `Arc` because the `thread_safe` feature is set.
#[cfg(feature = "thread_safe")]
pub type RC<T> = Arc<T>;
