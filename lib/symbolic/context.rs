//! State which lives for exactly one analysis run.
//!
//! Fresh symbolic names and random choices made by the memory model come from
//! here, so two runs with the same seed make the same choices, and two
//! contexts never share naming state.

use crate::il;
use crate::symbolic::Solver;
use crate::RC;
use rand::rngs::StdRng;
use rand::SeedableRng;

/// The seed used by `Context::new`.
pub const DEFAULT_SEED: u64 = 0;

/// Per-run state handed to `SymbolicMemory`.
#[derive(Debug)]
pub struct Context {
    solver: RC<dyn Solver>,
    rng: StdRng,
    cell_counter: u64,
    load_counter: u64,
}

impl Context {
    /// Create a new `Context` which answers queries with the given solver.
    pub fn new(solver: RC<dyn Solver>) -> Context {
        Context::with_seed(solver, DEFAULT_SEED)
    }

    /// Create a new `Context` with an explicit seed for its random choices.
    pub fn with_seed(solver: RC<dyn Solver>, seed: u64) -> Context {
        Context {
            solver,
            rng: StdRng::seed_from_u64(seed),
            cell_counter: 0,
            load_counter: 0,
        }
    }

    pub fn solver(&self) -> &dyn Solver {
        self.solver.as_ref()
    }

    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// A fresh 8-bit scalar standing in for a never-written byte.
    pub fn fresh_cell(&mut self, prefix: &str) -> il::Scalar {
        self.fresh_scalar(prefix, 8)
    }

    /// A fresh scalar of the given width, named `<prefix>_<n>`.
    pub fn fresh_scalar(&mut self, prefix: &str, bits: usize) -> il::Scalar {
        let name = format!("{}_{}", prefix, self.cell_counter);
        self.cell_counter += 1;
        il::scalar(name, bits)
    }

    /// A fresh scalar to hold the result of a load through a symbolic address.
    pub fn fresh_load_result(&mut self, prefix: &str, bits: usize) -> il::Scalar {
        let name = format!("{}_addr_{}", prefix, self.load_counter);
        self.load_counter += 1;
        il::scalar(name, bits)
    }
}
