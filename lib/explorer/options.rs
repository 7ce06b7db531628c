use crate::Error;
use serde::{Deserialize, Serialize};

/// Options for an `Explorer`.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct ExplorerOptions {
    /// Addresses to search for.
    pub find: Vec<u64>,
    /// Addresses to stay away from.
    pub avoid: Vec<u64>,
    /// If non-empty, every run must touch one of these addresses.
    pub restrict: Vec<u64>,
    /// Paths are not classified until this many ticks have passed.
    pub min_depth: usize,
    /// `Explorer::run` stops after this many ticks.
    pub max_depth: usize,
    /// A path is looping once one address appears in its backtrace more than
    /// this many times.
    pub max_repeats: usize,
    /// The most paths `trim` leaves active. `None` is unbounded.
    pub max_concurrency: Option<usize>,
}

impl Default for ExplorerOptions {
    fn default() -> ExplorerOptions {
        ExplorerOptions {
            find: Vec::new(),
            avoid: Vec::new(),
            restrict: Vec::new(),
            min_depth: 0,
            max_depth: 100,
            max_repeats: 10,
            max_concurrency: None,
        }
    }
}

impl ExplorerOptions {
    /// Read `ExplorerOptions` from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<ExplorerOptions, Error> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn find(mut self, find: Vec<u64>) -> ExplorerOptions {
        self.find = find;
        self
    }

    pub fn avoid(mut self, avoid: Vec<u64>) -> ExplorerOptions {
        self.avoid = avoid;
        self
    }

    pub fn restrict(mut self, restrict: Vec<u64>) -> ExplorerOptions {
        self.restrict = restrict;
        self
    }

    pub fn min_depth(mut self, min_depth: usize) -> ExplorerOptions {
        self.min_depth = min_depth;
        self
    }

    pub fn max_depth(mut self, max_depth: usize) -> ExplorerOptions {
        self.max_depth = max_depth;
        self
    }

    pub fn max_repeats(mut self, max_repeats: usize) -> ExplorerOptions {
        self.max_repeats = max_repeats;
        self
    }

    pub fn max_concurrency(mut self, max_concurrency: usize) -> ExplorerOptions {
        self.max_concurrency = Some(max_concurrency);
        self
    }
}
