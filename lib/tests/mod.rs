//! Tests which span the symbolic memory model, its solver and the explorer.
//!
//! Everything here runs against `EnumeratingSolver`, which tries every
//! assignment to the scalars of a query. This keeps tests independent of an
//! external SMT solver, as long as queries stay small.

use crate::executor::{eval, symbolize_expression};
use crate::explorer::{Explorer, ExplorerOptions, Path, Run, Trace};
use crate::il;
use crate::symbolic::*;
use crate::Error;
use crate::RC;
use std::collections::BTreeMap;

/// The most scalar bits `EnumeratingSolver` will enumerate.
const MAX_ENUMERATED_BITS: usize = 16;

/// A `Solver` which tries every assignment to the scalars of a query.
#[derive(Clone, Debug, Default)]
pub struct EnumeratingSolver;

impl Solver for EnumeratingSolver {
    fn solve(
        &self,
        expr: &il::Expression,
        constraints: &[il::Expression],
    ) -> Result<Option<il::Constant>, Error> {
        let mut scalars: BTreeMap<String, usize> = BTreeMap::new();
        for e in constraints.iter().chain(std::iter::once(expr)) {
            for scalar in e.scalars() {
                scalars.insert(scalar.name().to_string(), scalar.bits());
            }
        }

        let total: usize = scalars.values().sum();
        if total > MAX_ENUMERATED_BITS {
            return Err(Error::Solver(format!(
                "{} scalar bits is too many to enumerate",
                total
            )));
        }

        'assignments: for assignment in 0..(1u64 << total) {
            let mut values = BTreeMap::new();
            let mut offset = 0;
            for (name, bits) in &scalars {
                let value = (assignment >> offset) & ((1u64 << bits) - 1);
                values.insert(name.clone(), il::const_(value, *bits));
                offset += bits;
            }

            for constraint in constraints {
                if !eval(&symbolize_expression(constraint, &values)?)?.is_one() {
                    continue 'assignments;
                }
            }
            return Ok(Some(eval(&symbolize_expression(expr, &values)?)?));
        }

        Ok(None)
    }
}

pub(crate) fn context() -> Context {
    let solver: RC<dyn Solver> = RC::new(EnumeratingSolver);
    Context::new(solver)
}

/// A memory with an 8-bit address space, so every address can be enumerated.
fn small_memory(cells: &[(u64, u64)]) -> SymbolicMemory {
    let options = MemoryOptions {
        bits: 8,
        ..MemoryOptions::default()
    };
    let cells = cells
        .iter()
        .map(|&(address, value)| (address, il::expr_const(value, 8)));
    SymbolicMemory::with_cells(options, cells).unwrap()
}

fn leu(lhs: il::Expression, rhs: il::Expression) -> il::Expression {
    il::Expression::cmpleu(lhs, rhs).unwrap()
}

fn eq(lhs: il::Expression, rhs: il::Expression) -> il::Expression {
    il::Expression::cmpeq(lhs, rhs).unwrap()
}

/// The constant an equality constraint pins its left side to.
fn pinned(constraint: &il::Expression) -> u64 {
    match *constraint {
        il::Expression::Cmpeq(_, ref rhs) => rhs.get_constant().unwrap().value_u64().unwrap(),
        _ => panic!("{} is not an equality", constraint),
    }
}

#[test]
fn enumerating_solver() {
    let solver = EnumeratingSolver;
    let x = il::expr_scalar("x", 8);
    let constraints = vec![eq(x.clone(), il::expr_const(7, 8))];
    let double = il::Expression::add(x.clone(), x.clone()).unwrap();
    assert_eq!(
        solver.solve(&double, &constraints).unwrap(),
        Some(il::const_(14, 8))
    );

    let constraints = vec![
        eq(x.clone(), il::expr_const(7, 8)),
        eq(x.clone(), il::expr_const(8, 8)),
    ];
    assert!(!solver.sat(&constraints).unwrap());

    let wide = il::expr_scalar("wide", 32);
    assert!(solver.solve(&wide, &[]).is_err());
}

#[test]
fn value_oracle() {
    let solver = EnumeratingSolver;
    let x = il::expr_scalar("x", 8);

    let constraints = vec![
        il::Expression::cmpltu(x.clone(), il::expr_const(10, 8)).unwrap(),
        il::Expression::cmpltu(il::expr_const(3, 8), x.clone()).unwrap(),
    ];
    let value = Value::new(&x, &constraints, &solver).unwrap();
    assert!(!value.is_unique().unwrap());
    assert_eq!(value.min().unwrap(), il::const_(4, 8));
    assert_eq!(value.max().unwrap(), il::const_(9, 8));

    let constraints = vec![eq(x.clone(), il::expr_const(7, 8))];
    let value = Value::new(&x, &constraints, &solver).unwrap();
    assert!(value.is_unique().unwrap());
    assert_eq!(value.any().unwrap(), il::const_(7, 8));

    let sum = il::Expression::add(il::expr_const(1, 8), il::expr_const(2, 8)).unwrap();
    let value = Value::new(&sum, &[], &solver).unwrap();
    assert!(value.is_unique().unwrap());
    assert_eq!(value.any().unwrap(), il::const_(3, 8));

    // Folding leaves this division in place, but it can still only be one value
    let quotient = il::Expression::divu(il::expr_const(4, 8), il::expr_const(0, 8)).unwrap();
    let value = Value::new(&quotient, &[], &solver).unwrap();
    assert!(!value.expression().is_constant());
    assert!(value.is_unique().unwrap());

    let constraints = vec![
        eq(x.clone(), il::expr_const(1, 8)),
        eq(x.clone(), il::expr_const(2, 8)),
    ];
    let value = Value::new(&x, &constraints, &solver).unwrap();
    assert!(matches!(value.any(), Err(Error::Unsat)));
}

#[test]
fn unconstrained_store_picks_any_address() {
    let mut ctx = context();
    let mut memory = small_memory(&[]);
    let address = il::expr_scalar("a", 8);

    let derived = memory
        .store(&mut ctx, &address, &il::expr_const(0x4142, 16), &[])
        .unwrap();
    assert_eq!(derived.len(), 1);

    let chosen = pinned(&derived[0]);
    assert!(chosen <= 0xfe);
    assert_eq!(memory.get(chosen), Some(&il::expr_const(0x41, 8)));
    assert_eq!(memory.get(chosen + 1), Some(&il::expr_const(0x42, 8)));
    assert_eq!(memory.len(), 2);

    // The same seed makes the same choice
    let mut again = small_memory(&[]);
    let derived_again = again
        .store(&mut context(), &address, &il::expr_const(0x4142, 16), &[])
        .unwrap();
    assert_eq!(derived, derived_again);
}

#[test]
fn constrained_store_avoids_live_cells() {
    let mut ctx = context();
    let mut memory = small_memory(&[(0, 1), (1, 2), (3, 4)]);
    let address = il::expr_scalar("a", 8);
    let constraints = vec![leu(address.clone(), il::expr_const(3, 8))];

    let derived = memory
        .store(&mut ctx, &address, &il::expr_const(0x99, 8), &constraints)
        .unwrap();

    assert_eq!(derived, vec![eq(address, il::expr_const(2, 8))]);
    assert_eq!(memory.get(2), Some(&il::expr_const(0x99, 8)));
    assert_eq!(memory.get(0), Some(&il::expr_const(1, 8)));
    assert_eq!(memory.get(3), Some(&il::expr_const(4, 8)));
    assert_eq!(memory.free_ranges(), &[FreeRange::new(4, 0xff)]);
}

#[test]
fn unplaceable_store() {
    let mut ctx = context();
    let mut memory = small_memory(&[(0, 1), (1, 2), (2, 3), (3, 4)]);
    let address = il::expr_scalar("a", 8);
    let constraints = vec![leu(address.clone(), il::expr_const(3, 8))];

    let result = memory.store(&mut ctx, &address, &il::expr_const(0x99, 8), &constraints);
    assert!(matches!(result, Err(Error::UnplaceableValue(_))));
    assert_eq!(memory.len(), 4);
    assert_eq!(memory.get(0), Some(&il::expr_const(1, 8)));
}

#[test]
fn store_must_fit_in_address_space() {
    let mut ctx = context();
    let mut memory = small_memory(&[(0xfe, 0)]);
    let address = il::expr_scalar("a", 8);
    let constraints =
        vec![il::Expression::cmpltu(il::expr_const(0xfd, 8), address.clone()).unwrap()];

    // The only free address is 0xff, which has no room for two bytes
    let result = memory.store(&mut ctx, &address, &il::expr_const(0x1234, 16), &constraints);
    assert!(matches!(result, Err(Error::UnplaceableValue(_))));
    assert_eq!(memory.len(), 1);

    let result = memory.store(&mut ctx, &il::expr_const(0xff, 8), &il::expr_const(0x1234, 16), &[]);
    assert!(matches!(result, Err(Error::AddressOutOfRange(0xff))));
    assert_eq!(memory.len(), 1);
}

#[test]
fn load_through_unique_symbolic_address() {
    let mut ctx = context();
    let mut memory = small_memory(&[(0x10, 0xaa)]);
    let address = il::expr_scalar("a", 8);
    let constraints = vec![eq(address.clone(), il::expr_const(0x10, 8))];

    let load = memory.load(&mut ctx, &address, 8, &constraints).unwrap();
    assert_eq!(load.resolution(), &Resolution::Exact(0x10));
    assert_eq!(load.value(), &il::expr_const(0xaa, 8));
}

#[test]
fn bounded_load() {
    let mut ctx = context();
    let mut memory = small_memory(&[(0x10, 0xaa), (0x11, 0xbb), (0x40, 0xcc)]);
    let address = il::expr_scalar("a", 8);
    let constraints = vec![
        leu(il::expr_const(0x10, 8), address.clone()),
        leu(address.clone(), il::expr_const(0x11, 8)),
    ];

    let load = memory.load(&mut ctx, &address, 8, &constraints).unwrap();
    let (value, derived, resolution) = load.into_parts();
    let (candidates, disjunction) = match resolution {
        Resolution::Bounded {
            candidates,
            disjunction,
        } => (candidates, disjunction),
        resolution => panic!("Expected a bounded load, found {:?}", resolution),
    };
    assert_eq!(candidates, vec![0x10, 0x11]);
    assert_eq!(derived, vec![disjunction.clone()]);
    assert!(!value.is_constant());

    let solver = EnumeratingSolver;
    for (reading, feasible) in [(0xaa, true), (0xbb, true), (0xcc, false)] {
        let query = vec![disjunction.clone(), eq(value.clone(), il::expr_const(reading, 8))];
        assert_eq!(solver.sat(&query).unwrap(), feasible);
    }
}

#[test]
fn bounded_load_value_is_tied_by_its_constraints() {
    let mut ctx = context();
    let mut memory = small_memory(&[(0x10, 0xaa), (0x11, 0xbb)]);
    let address = il::expr_scalar("a", 8);
    let constraints = vec![
        leu(il::expr_const(0x10, 8), address.clone()),
        leu(address.clone(), il::expr_const(0x11, 8)),
    ];

    let load = memory.load(&mut ctx, &address, 8, &constraints).unwrap();
    let solver = EnumeratingSolver;
    for (reading, feasible) in [(0xaa, true), (0xbb, true), (0xcc, false)] {
        let mut query = load.constraints().to_vec();
        query.push(eq(load.value().clone(), il::expr_const(reading, 8)));
        assert_eq!(solver.sat(&query).unwrap(), feasible);
    }
}

#[test]
fn narrow_address_in_wide_memory() {
    let address = il::expr_scalar("a", 8);
    for seed in 0..8 {
        let mut ctx = Context::with_seed(RC::new(EnumeratingSolver), seed);
        let mut memory = SymbolicMemory::new(MemoryOptions::default()).unwrap();

        let derived = memory
            .store(&mut ctx, &address, &il::expr_const(0x77, 8), &[])
            .unwrap();
        let chosen = pinned(&derived[0]);
        assert!(chosen <= 0xff);
        assert_eq!(memory.get(chosen), Some(&il::expr_const(0x77, 8)));

        let load = memory.load(&mut ctx, &address, 8, &derived).unwrap();
        assert_eq!(load.resolution(), &Resolution::Exact(chosen));
        assert_eq!(load.value(), &il::expr_const(0x77, 8));
    }
}

#[test]
fn oversized_load_stays_within_address_width() {
    let options = MemoryOptions {
        byte_window_limit: 4,
        ..MemoryOptions::default()
    };
    let cells = vec![
        (0x10, il::expr_const(0xaa, 8)),
        (0x1000, il::expr_const(0xbb, 8)),
    ];
    let address = il::expr_scalar("a", 8);
    for seed in 0..8 {
        let mut ctx = Context::with_seed(RC::new(EnumeratingSolver), seed);
        let mut memory = SymbolicMemory::with_cells(options.clone(), cells.clone()).unwrap();

        let load = memory.load(&mut ctx, &address, 8, &[]).unwrap();
        assert_eq!(load.resolution(), &Resolution::Oversized(0x10));
        assert_eq!(load.value(), &il::expr_const(0xaa, 8));
        assert_eq!(
            load.constraints(),
            &[eq(address.clone(), il::expr_const(0x10, 8))]
        );
    }
}

#[test]
fn boundary_load() {
    let mut ctx = context();
    let mut memory = small_memory(&[(0x10, 0xaa)]);
    let address = il::expr_scalar("a", 8);
    let constraints = vec![
        leu(il::expr_const(0x40, 8), address.clone()),
        leu(address.clone(), il::expr_const(0x50, 8)),
    ];

    let first = memory.load(&mut ctx, &address, 8, &constraints).unwrap();
    let second = memory.load(&mut ctx, &address, 8, &constraints).unwrap();
    assert_eq!(first.resolution(), &Resolution::Boundary);
    assert!(first.constraints().is_empty());
    assert_eq!(first.value(), second.value());
    assert!(!first.value().is_constant());
    assert_eq!(memory.len(), 1);
}

#[test]
fn oversized_load() {
    let mut ctx = context();
    let options = MemoryOptions {
        bits: 8,
        byte_window_limit: 4,
        ..MemoryOptions::default()
    };
    let cells = vec![
        (0x10, il::expr_const(0xaa, 8)),
        (0x80, il::expr_const(0xbb, 8)),
    ];
    let mut memory = SymbolicMemory::with_cells(options, cells).unwrap();
    let address = il::expr_scalar("a", 8);

    let load = memory.load(&mut ctx, &address, 8, &[]).unwrap();
    let chosen = match *load.resolution() {
        Resolution::Oversized(chosen) => chosen,
        ref resolution => panic!("Expected an oversized load, found {:?}", resolution),
    };
    assert!(chosen == 0x10 || chosen == 0x80);
    assert_eq!(load.constraints(), &[eq(address, il::expr_const(chosen, 8))]);
    assert_eq!(Some(load.value()), memory.get(chosen));
}

/// A path through a tiny program which stores a symbolic byte and branches on
/// it.
#[derive(Clone, Debug)]
struct State {
    trace: Trace,
    memory: SymbolicMemory,
    constraints: Vec<il::Expression>,
}

impl Path for State {
    fn last_run(&self) -> Option<&Run> {
        self.trace.last_run()
    }

    fn backtrace(&self) -> &[u64] {
        self.trace.backtrace()
    }
}

impl State {
    fn next(&self, address: u64) -> State {
        let mut next = self.clone();
        next.trace.push(Run::instruction(address));
        next
    }
}

#[test]
fn explore_over_symbolic_memory() {
    let x = il::expr_scalar("x", 8);
    let slot = il::expr_const(0x20, 8);
    let mut ctx = context();

    // 0: store x at 0x20, then branch on x == 0x41 to 1, or else to 2
    // 1: load 0x20, jump to 3 if the byte must be 0x41
    let mut driver = |state: &State| -> Result<Vec<State>, Error> {
        let address = state.last_run().map(|run| run.address()).ok_or("Empty trace")?;
        match address {
            0 => {
                let mut state = state.clone();
                let derived = state.memory.store(&mut ctx, &slot, &x, &state.constraints)?;
                state.constraints.extend(derived);

                let mut taken = state.next(1);
                taken
                    .constraints
                    .push(il::Expression::cmpeq(x.clone(), il::expr_const(0x41, 8))?);
                let mut not_taken = state.next(2);
                not_taken
                    .constraints
                    .push(il::Expression::cmpneq(x.clone(), il::expr_const(0x41, 8))?);
                Ok(vec![taken, not_taken])
            }
            1 => {
                let mut state = state.clone();
                let load = state.memory.load(&mut ctx, &slot, 8, &state.constraints)?;
                let value = Value::new(load.value(), &state.constraints, ctx.solver())?;
                if value.is_unique()? && value.any()? == il::const_(0x41, 8) {
                    Ok(vec![state.next(3)])
                } else {
                    Ok(Vec::new())
                }
            }
            _ => Ok(Vec::new()),
        }
    };

    let start = State {
        trace: Trace::start(0),
        memory: small_memory(&[]),
        constraints: Vec::new(),
    };
    let options = ExplorerOptions::default().find(vec![3]).avoid(vec![2]);
    let mut explorer = Explorer::new(options, vec![start]);
    explorer.run(&mut driver);

    assert!(explorer.done());
    assert_eq!(explorer.report(), "1 found, 1 avoided, 0 deviating, 0 looping");
    let found = &explorer.found()[0];
    assert_eq!(found.backtrace(), &[0, 1, 3]);
    assert_eq!(found.memory.get(0x20), Some(&x));
}
