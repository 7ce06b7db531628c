use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Debug;

/// One unit of execution of a path.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Run {
    /// A basic block, and the address of every instruction it executed.
    Block { address: u64, instructions: Vec<u64> },
    /// A single instruction, or any other run with one address.
    Instruction { address: u64 },
}

impl Run {
    pub fn block(address: u64, instructions: Vec<u64>) -> Run {
        Run::Block {
            address,
            instructions,
        }
    }

    pub fn instruction(address: u64) -> Run {
        Run::Instruction { address }
    }

    /// The address this run started at.
    pub fn address(&self) -> u64 {
        match *self {
            Run::Block { address, .. } | Run::Instruction { address } => address,
        }
    }

    /// Every instruction address this run touched.
    pub fn addresses(&self) -> Vec<u64> {
        match *self {
            Run::Block {
                ref instructions, ..
            } => instructions.clone(),
            Run::Instruction { address } => vec![address],
        }
    }
}

impl fmt::Display for Run {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Run::Block {
                address,
                ref instructions,
            } => write!(f, "block 0x{:x} ({} instructions)", address, instructions.len()),
            Run::Instruction { address } => write!(f, "instruction 0x{:x}", address),
        }
    }
}

/// A path an `Explorer` can classify.
pub trait Path: Debug {
    /// The run this path executed last, if it has executed any.
    fn last_run(&self) -> Option<&Run>;

    /// The starting address of every run this path has executed, in order.
    fn backtrace(&self) -> &[u64];
}

/// A `Path` which records nothing but its runs.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Trace {
    runs: Vec<Run>,
    backtrace: Vec<u64>,
}

impl Trace {
    pub fn new() -> Trace {
        Trace::default()
    }

    /// A trace which has executed a single instruction at `address`.
    pub fn start(address: u64) -> Trace {
        Trace::new().with(Run::instruction(address))
    }

    pub fn push(&mut self, run: Run) {
        self.backtrace.push(run.address());
        self.runs.push(run);
    }

    /// This trace extended by one more run.
    pub fn with(mut self, run: Run) -> Trace {
        self.push(run);
        self
    }

    pub fn runs(&self) -> &[Run] {
        &self.runs
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

impl Path for Trace {
    fn last_run(&self) -> Option<&Run> {
        self.runs.last()
    }

    fn backtrace(&self) -> &[u64] {
        &self.backtrace
    }
}

impl fmt::Display for Trace {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let addresses = self
            .backtrace
            .iter()
            .map(|address| format!("0x{:x}", address))
            .collect::<Vec<String>>();
        write!(f, "[{}]", addresses.join(" -> "))
    }
}
