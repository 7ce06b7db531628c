use crate::explorer::{Driver, ExplorerOptions, Path};
use crate::Error;
use log::debug;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeSet;
use std::fmt;

fn hex(addresses: &BTreeSet<u64>) -> String {
    addresses
        .iter()
        .map(|address| format!("0x{:x}", address))
        .collect::<Vec<String>>()
        .join(", ")
}

/// Steps paths forward and sorts them by where they went.
#[derive(Debug)]
pub struct Explorer<P: Path> {
    options: ExplorerOptions,
    find: FxHashSet<u64>,
    avoid: FxHashSet<u64>,
    restrict: FxHashSet<u64>,
    current_depth: usize,
    instruction_counter: FxHashMap<u64, u64>,

    active: Vec<P>,
    found: Vec<P>,
    avoided: Vec<P>,
    deviating: Vec<P>,
    looping: Vec<P>,
    trimmed: Vec<P>,
    errored: Vec<(P, Error)>,
    deadended: Vec<P>,
}

impl<P: Path> Explorer<P> {
    /// Create a new `Explorer` with the given paths active.
    pub fn new(options: ExplorerOptions, starts: Vec<P>) -> Explorer<P> {
        Explorer {
            find: options.find.iter().copied().collect(),
            avoid: options.avoid.iter().copied().collect(),
            restrict: options.restrict.iter().copied().collect(),
            options,
            current_depth: 0,
            instruction_counter: FxHashMap::default(),
            active: starts,
            found: Vec::new(),
            avoided: Vec::new(),
            deviating: Vec::new(),
            looping: Vec::new(),
            trimmed: Vec::new(),
            errored: Vec::new(),
            deadended: Vec::new(),
        }
    }

    pub fn options(&self) -> &ExplorerOptions {
        &self.options
    }

    /// The number of ticks taken so far.
    pub fn current_depth(&self) -> usize {
        self.current_depth
    }

    /// The number of times any path's run touched this address.
    pub fn instruction_count(&self, address: u64) -> u64 {
        self.instruction_counter.get(&address).copied().unwrap_or(0)
    }

    pub fn active(&self) -> &[P] {
        &self.active
    }

    pub fn found(&self) -> &[P] {
        &self.found
    }

    pub fn avoided(&self) -> &[P] {
        &self.avoided
    }

    pub fn deviating(&self) -> &[P] {
        &self.deviating
    }

    pub fn looping(&self) -> &[P] {
        &self.looping
    }

    pub fn trimmed(&self) -> &[P] {
        &self.trimmed
    }

    /// Paths which failed to step, with the error they failed with.
    pub fn errored(&self) -> &[(P, Error)] {
        &self.errored
    }

    pub fn deadended(&self) -> &[P] {
        &self.deadended
    }

    /// Returns true when exploration should stop.
    pub fn done(&self) -> bool {
        if self.current_depth < self.options.min_depth {
            return false;
        }

        if self.active.is_empty() {
            debug!("Done because we have no active paths left!");
            return true;
        }

        if !self.found.is_empty() {
            debug!(
                "Done because we found the targets on {} path(s)!",
                self.found.len()
            );
            return true;
        }

        false
    }

    /// Step every active path forward once, and classify the results.
    pub fn tick<D: Driver<P>>(&mut self, driver: &mut D) {
        debug!(
            "At depth {} out of {}, with {} paths.",
            self.current_depth,
            self.options.max_depth,
            self.active.len()
        );

        let mut successors = Vec::new();
        for path in std::mem::take(&mut self.active) {
            match driver.step(&path) {
                Ok(next) => {
                    if next.is_empty() {
                        debug!("Path {:?} has no successors", path);
                        self.deadended.push(path);
                    } else {
                        successors.extend(next);
                    }
                }
                Err(e) => {
                    debug!("Path {:?} errored: {}", path, e);
                    self.errored.push((path, e));
                }
            }
        }
        self.current_depth += 1;

        if self.current_depth < self.options.min_depth {
            self.active = successors;
            return;
        }

        for path in successors {
            self.classify(path);
        }
    }

    fn classify(&mut self, path: P) {
        let touched: BTreeSet<u64> = path
            .last_run()
            .map(|run| run.addresses().into_iter().collect())
            .unwrap_or_default();

        for address in &touched {
            *self.instruction_counter.entry(*address).or_insert(0) += 1;
        }

        let avoided: BTreeSet<u64> = touched
            .iter()
            .filter(|address| self.avoid.contains(*address))
            .copied()
            .collect();
        let found: BTreeSet<u64> = touched
            .iter()
            .filter(|address| self.find.contains(*address))
            .copied()
            .collect();

        if !avoided.is_empty() {
            debug!(
                "Avoiding path {:?} due to matched avoid addresses: {}",
                path,
                hex(&avoided)
            );
            self.avoided.push(path);
        } else if !found.is_empty() {
            debug!(
                "Marking path {:?} as found due to matched target addresses: {}",
                path,
                hex(&found)
            );
            self.found.push(path);
        } else if !self.restrict.is_empty()
            && !touched.iter().any(|address| self.restrict.contains(address))
        {
            debug!("Path {:?} is not on the restricted addresses!", path);
            self.deviating.push(path);
        } else if most_repeats(path.backtrace()) > self.options.max_repeats {
            debug!("Path {:?} appears to be looping!", path);
            self.looping.push(path);
        } else {
            self.active.push(path);
        }
    }

    /// Drop active paths past `max_concurrency`, keeping the paths whose last
    /// run started at the least visited addresses.
    pub fn trim(&mut self) {
        let max_concurrency = match self.options.max_concurrency {
            Some(max_concurrency) => max_concurrency,
            None => return,
        };
        if self.active.len() <= max_concurrency {
            return;
        }

        debug!(
            "Trimming {} paths to avoid a state explosion.",
            self.active.len() - max_concurrency
        );

        let instruction_counter = &self.instruction_counter;
        self.active.sort_by_key(|path| {
            path.last_run()
                .and_then(|run| instruction_counter.get(&run.address()))
                .copied()
                .unwrap_or(0)
        });
        let trimmed = self.active.split_off(max_concurrency);
        self.trimmed.extend(trimmed);
    }

    /// Tick and trim until `done`, or until `max_depth` ticks have been taken.
    pub fn run<D: Driver<P>>(&mut self, driver: &mut D) {
        while !self.done() && self.current_depth < self.options.max_depth {
            self.tick(driver);
            self.trim();
        }
    }

    /// A one line summary of the terminal buckets.
    pub fn report(&self) -> String {
        format!(
            "{} found, {} avoided, {} deviating, {} looping",
            self.found.len(),
            self.avoided.len(),
            self.deviating.len(),
            self.looping.len()
        )
    }
}

impl<P: Path> fmt::Display for Explorer<P> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} ({} active, {} trimmed, {} errored, {} deadended)",
            self.report(),
            self.active.len(),
            self.trimmed.len(),
            self.errored.len(),
            self.deadended.len()
        )
    }
}

/// The number of times the most frequent address appears in `backtrace`.
fn most_repeats(backtrace: &[u64]) -> usize {
    let mut counts: FxHashMap<u64, usize> = FxHashMap::default();
    for address in backtrace {
        *counts.entry(*address).or_insert(0) += 1;
    }
    counts.values().copied().max().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::explorer::{Run, Trace};
    use std::collections::BTreeMap;

    /// A driver which follows a fixed graph of instruction addresses.
    fn graph(edges: Vec<(u64, Vec<u64>)>) -> impl FnMut(&Trace) -> Result<Vec<Trace>, Error> {
        let edges: BTreeMap<u64, Vec<u64>> = edges.into_iter().collect();
        move |path: &Trace| -> Result<Vec<Trace>, Error> {
            let address = path.last_run().map(|run| run.address()).ok_or("Empty trace")?;
            Ok(edges
                .get(&address)
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .map(|next| path.clone().with(Run::instruction(next)))
                .collect())
        }
    }

    fn last_address(path: &Trace) -> u64 {
        path.last_run().unwrap().address()
    }

    #[test]
    fn avoid_wins_over_find() {
        let options = ExplorerOptions::default().find(vec![1]).avoid(vec![1]);
        let mut explorer = Explorer::new(options, vec![Trace::start(0)]);
        explorer.tick(&mut graph(vec![(0, vec![1])]));

        assert_eq!(explorer.avoided().len(), 1);
        assert!(explorer.found().is_empty());
        assert!(explorer.active().is_empty());
    }

    #[test]
    fn avoid_inside_a_block() {
        let options = ExplorerOptions::default().find(vec![0x14]).avoid(vec![0x18]);
        let mut explorer = Explorer::new(options, vec![Trace::start(0)]);
        let mut driver = |path: &Trace| -> Result<Vec<Trace>, Error> {
            Ok(vec![path
                .clone()
                .with(Run::block(0x10, vec![0x10, 0x14, 0x18]))])
        };
        explorer.tick(&mut driver);

        assert_eq!(explorer.avoided().len(), 1);
        assert!(explorer.found().is_empty());
        assert_eq!(explorer.instruction_count(0x10), 1);
        assert_eq!(explorer.instruction_count(0x14), 1);
        assert_eq!(explorer.instruction_count(0x18), 1);
    }

    #[test]
    fn found_stops_early() {
        let options = ExplorerOptions::default().find(vec![1]);
        let mut explorer = Explorer::new(options, vec![Trace::start(0)]);
        let mut driver = graph(vec![(0, vec![1, 2]), (1, vec![3]), (2, vec![4])]);

        assert!(!explorer.done());
        explorer.run(&mut driver);

        assert!(explorer.done());
        assert_eq!(explorer.current_depth(), 1);
        assert_eq!(explorer.found().len(), 1);
        assert_eq!(last_address(&explorer.found()[0]), 1);
        assert_eq!(explorer.active().len(), 1);
        assert_eq!(last_address(&explorer.active()[0]), 2);
    }

    #[test]
    fn restrict_deviation() {
        let options = ExplorerOptions::default().restrict(vec![0, 1]);
        let mut explorer = Explorer::new(options, vec![Trace::start(0)]);
        explorer.tick(&mut graph(vec![(0, vec![1, 5])]));

        assert_eq!(explorer.deviating().len(), 1);
        assert_eq!(last_address(&explorer.deviating()[0]), 5);
        assert_eq!(explorer.active().len(), 1);
        assert_eq!(last_address(&explorer.active()[0]), 1);
    }

    #[test]
    fn loop_detection() {
        let options = ExplorerOptions::default().max_repeats(3);
        let mut explorer = Explorer::new(options, vec![Trace::start(0)]);
        let mut driver = graph(vec![(0, vec![0])]);

        // The backtrace holds 0 two, then three times
        explorer.tick(&mut driver);
        explorer.tick(&mut driver);
        assert!(explorer.looping().is_empty());
        assert_eq!(explorer.active().len(), 1);

        // and now four times, one more than max_repeats
        explorer.tick(&mut driver);
        assert_eq!(explorer.looping().len(), 1);
        assert_eq!(explorer.looping()[0].backtrace(), &[0, 0, 0, 0]);
        assert!(explorer.done());
    }

    #[test]
    fn min_depth_defers_classification() {
        let options = ExplorerOptions::default().find(vec![1]).min_depth(2);
        let mut explorer = Explorer::new(options, vec![Trace::start(0)]);
        let mut driver = graph(vec![(0, vec![1]), (1, vec![2]), (2, vec![3])]);

        explorer.tick(&mut driver);
        assert!(!explorer.done());
        assert!(explorer.found().is_empty());
        assert_eq!(explorer.active().len(), 1);
        assert_eq!(explorer.instruction_count(1), 0);

        explorer.tick(&mut driver);
        assert!(explorer.found().is_empty());
        assert_eq!(explorer.instruction_count(2), 1);
        assert_eq!(explorer.active().len(), 1);
        assert!(!explorer.done());
    }

    #[test]
    fn trim_keeps_rarely_seen_paths() {
        // Paths from 0xd through 0x10 run a block through 0xc0, raising its count
        // to 5, and are avoided. This leaves three active paths whose last
        // addresses were seen 1, 1 and 5 times.
        let options = ExplorerOptions::default()
            .avoid(vec![0xd0])
            .max_concurrency(2);
        let starts = vec![0xc, 0xa, 0xd, 0xb, 0xe, 0xf, 0x10]
            .into_iter()
            .map(Trace::start)
            .collect();
        let mut explorer = Explorer::new(options, starts);
        let mut driver = |path: &Trace| -> Result<Vec<Trace>, Error> {
            let run = match last_address(path) {
                0xa => Run::instruction(0xa0),
                0xb => Run::instruction(0xb0),
                0xc => Run::instruction(0xc0),
                _ => Run::block(0xd0, vec![0xd0, 0xc0]),
            };
            Ok(vec![path.clone().with(run)])
        };
        explorer.tick(&mut driver);

        assert_eq!(explorer.avoided().len(), 4);
        assert_eq!(explorer.active().len(), 3);
        assert_eq!(explorer.instruction_count(0xa0), 1);
        assert_eq!(explorer.instruction_count(0xb0), 1);
        assert_eq!(explorer.instruction_count(0xc0), 5);

        explorer.trim();

        let active: Vec<u64> = explorer.active().iter().map(last_address).collect();
        assert_eq!(active, vec![0xa0, 0xb0]);
        assert_eq!(explorer.trimmed().len(), 1);
        assert_eq!(last_address(&explorer.trimmed()[0]), 0xc0);

        // Within budget, trim does nothing
        explorer.trim();
        assert_eq!(explorer.active().len(), 2);
        assert_eq!(explorer.trimmed().len(), 1);
    }

    #[test]
    fn errored_and_deadended() {
        let mut explorer = Explorer::new(ExplorerOptions::default(), vec![Trace::start(0)]);
        let mut edges = graph(vec![(0, vec![1, 2])]);
        let mut driver = |path: &Trace| -> Result<Vec<Trace>, Error> {
            if last_address(path) == 1 {
                return Err(Error::Custom("Invalid instruction".to_string()));
            }
            edges(path)
        };

        explorer.tick(&mut driver);
        assert_eq!(explorer.active().len(), 2);

        explorer.tick(&mut driver);
        assert_eq!(explorer.errored().len(), 1);
        assert_eq!(last_address(&explorer.errored()[0].0), 1);
        assert_eq!(explorer.deadended().len(), 1);
        assert_eq!(last_address(&explorer.deadended()[0]), 2);
        assert!(explorer.active().is_empty());
        assert!(explorer.done());
    }

    #[test]
    fn run_stops_at_max_depth() {
        let options = ExplorerOptions::default().max_depth(5).max_repeats(1000);
        let mut explorer = Explorer::new(options, vec![Trace::start(0)]);
        explorer.run(&mut graph(vec![(0, vec![0])]));

        assert_eq!(explorer.current_depth(), 5);
        assert_eq!(explorer.active().len(), 1);
        assert_eq!(explorer.active()[0].len(), 6);
        assert_eq!(explorer.instruction_count(0), 5);
    }

    #[test]
    fn report() {
        let options = ExplorerOptions::default().find(vec![1]).avoid(vec![2]);
        let mut explorer = Explorer::new(options, vec![Trace::start(0)]);
        explorer.tick(&mut graph(vec![(0, vec![1, 2, 3])]));

        assert_eq!(explorer.report(), "1 found, 1 avoided, 0 deviating, 0 looping");
        assert_eq!(
            explorer.to_string(),
            "1 found, 1 avoided, 0 deviating, 0 looping \
             (1 active, 0 trimmed, 0 errored, 0 deadended)"
        );
    }
}
