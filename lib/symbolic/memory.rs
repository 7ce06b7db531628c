//! A symbolic memory model.
//!
//! Each cell of `SymbolicMemory` is one byte, held as an 8-bit `il::Expression`.
//! Concrete bytes are stored as `il::Constant`, and symbolic bytes as slices of
//! the symbolic values written.
//!
//! Addresses given to `store` and `load` are themselves expressions. When an
//! address can take more than one value, the memory model uses the `Solver`
//! held in the `Context` to decide where the value lives:
//!
//! * A symbolic store is placed in memory which has never been written, so two
//! logically distinct values never alias. The caller receives an equality
//! constraint pinning the address to the chosen location, and must add it to
//! its path's constraints.
//! * A symbolic load over a narrow range of addresses reads every tracked cell
//! in that range. A load over a wide range picks one tracked cell at random and
//! pins the address to it. This is an over-approximation which trades
//! precision for termination, and may steer a path down an infeasible branch.
//!
//! `SymbolicMemory` is paged under-the-hood with reference-counted pages. When
//! these pages are written to, we use the copy-on-write functionality of
//! rust's reference-counted types, so `copy` only copies page pointers.

use crate::il;
use crate::symbolic::util::*;
use crate::symbolic::{Context, Value};
use crate::Error;
use crate::RC;
use log::{debug, trace, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The size of the copy-on-write pages.
pub const PAGE_SIZE: usize = 1024;
pub const PAGE_MASK: u64 = !(PAGE_SIZE as u64 - 1);

/// The order bytes of a multi-byte value are laid out in memory.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub enum Endian {
    /// Most-significant byte at the lowest address.
    #[default]
    Big,
    /// Least-significant byte at the lowest address.
    Little,
}

/// Options for a `SymbolicMemory`.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct MemoryOptions {
    /// Width of the address space in bits. The address space holds
    /// `2^bits` bytes.
    pub bits: usize,
    /// The widest range of addresses a symbolic load will read exhaustively.
    pub byte_window_limit: u64,
    pub endian: Endian,
    /// Prefix for the names of fresh default cells.
    pub name: String,
}

impl Default for MemoryOptions {
    fn default() -> MemoryOptions {
        MemoryOptions {
            bits: 64,
            byte_window_limit: 1024,
            endian: Endian::Big,
            name: "mem".to_string(),
        }
    }
}

impl MemoryOptions {
    /// Read `MemoryOptions` from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<MemoryOptions, Error> {
        Ok(serde_json::from_str(json)?)
    }
}

/// A closed range of addresses, `[low, high]`, which have never been written.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct FreeRange {
    pub low: u64,
    pub high: u64,
}

impl FreeRange {
    pub fn new(low: u64, high: u64) -> FreeRange {
        FreeRange { low, high }
    }

    /// The number of addresses in this range.
    pub fn len(&self) -> u128 {
        self.high as u128 - self.low as u128 + 1
    }
}

/// A memory page.
///
/// These pages do not line up with pages of the target architecture. They
/// are used for performance reasons in the copy-on-write memory model.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
struct Page {
    cells: Vec<Option<il::Expression>>,
}

impl Page {
    fn new(size: usize) -> Page {
        Page {
            cells: vec![None; size],
        }
    }

    /// Store a cell, returning true if the cell was previously empty.
    fn store(&mut self, offset: usize, cell: il::Expression) -> bool {
        self.cells[offset].replace(cell).is_none()
    }

    fn load(&self, offset: usize) -> Option<&il::Expression> {
        self.cells[offset].as_ref()
    }
}

/// How a `load` arrived at its value.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Resolution {
    /// Memory was empty, the value is the shared default for unknown reads.
    Uninitialized,
    /// The address was unique, and the value was read from this address.
    Exact(u64),
    /// The address ranged over a narrow window. The value is a fresh scalar
    /// which must equal the reading at one of `candidates`, as expressed by
    /// `disjunction`. The disjunction is also the load's only constraint.
    Bounded {
        candidates: Vec<u64>,
        disjunction: il::Expression,
    },
    /// The address ranged over a narrow window containing no tracked cells. The
    /// value is the shared default for unknown reads.
    Boundary,
    /// The address ranged too widely to enumerate. The value was read from this
    /// randomly chosen tracked address, and the returned constraints pin the
    /// address to it.
    Oversized(u64),
}

/// The result of a `load` from `SymbolicMemory`.
#[derive(Clone, Debug)]
pub struct Load {
    value: il::Expression,
    constraints: Vec<il::Expression>,
    resolution: Resolution,
}

impl Load {
    /// The value loaded.
    pub fn value(&self) -> &il::Expression {
        &self.value
    }

    /// Equality constraints the caller must add to its path.
    pub fn constraints(&self) -> &[il::Expression] {
        &self.constraints
    }

    pub fn resolution(&self) -> &Resolution {
        &self.resolution
    }

    pub fn into_parts(self) -> (il::Expression, Vec<il::Expression>, Resolution) {
        (self.value, self.constraints, self.resolution)
    }
}

/// A byte-addressable memory model over Falcon IL expressions.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SymbolicMemory {
    options: MemoryOptions,
    pages: BTreeMap<u64, RC<Page>>,
    size: u64,
    free_ranges: Vec<FreeRange>,
    unknown: BTreeMap<usize, il::Expression>,
}

impl SymbolicMemory {
    /// Create a new, empty, `SymbolicMemory`.
    pub fn new(options: MemoryOptions) -> Result<SymbolicMemory, Error> {
        if options.bits == 0 || options.bits > 64 {
            return Err(Error::TooManyAddressBits);
        }
        let mut memory = SymbolicMemory {
            options,
            pages: BTreeMap::new(),
            size: 0,
            free_ranges: Vec::new(),
            unknown: BTreeMap::new(),
        };
        memory.update_free_ranges();
        Ok(memory)
    }

    /// Create a new `SymbolicMemory` holding the given 8-bit cells.
    pub fn with_cells<I>(options: MemoryOptions, cells: I) -> Result<SymbolicMemory, Error>
    where
        I: IntoIterator<Item = (u64, il::Expression)>,
    {
        let mut memory = SymbolicMemory::new(options)?;
        for (address, cell) in cells {
            if cell.bits() != 8 {
                return Err(Error::InvalidWidth(cell.bits()));
            }
            if !memory.fits(address, 1) {
                return Err(Error::AddressOutOfRange(address));
            }
            memory.store_cell(address, cell);
        }
        memory.update_free_ranges();
        Ok(memory)
    }

    pub fn options(&self) -> &MemoryOptions {
        &self.options
    }

    /// Width of the address space in bits.
    pub fn bits(&self) -> usize {
        self.options.bits
    }

    /// The number of bytes in the address space, `2^bits`.
    pub fn max_address(&self) -> u128 {
        1u128 << self.options.bits
    }

    pub fn byte_window_limit(&self) -> u64 {
        self.options.byte_window_limit
    }

    pub fn endian(&self) -> Endian {
        self.options.endian
    }

    /// The number of occupied cells.
    pub fn len(&self) -> u64 {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Sorted, non-overlapping ranges of addresses which hold no cell.
    pub fn free_ranges(&self) -> &[FreeRange] {
        &self.free_ranges
    }

    /// Get the cell at this address without creating a default.
    pub fn get(&self, address: u64) -> Option<&il::Expression> {
        self.pages
            .get(&(address & PAGE_MASK))
            .and_then(|page| page.load((address & !PAGE_MASK) as usize))
    }

    /// All occupied addresses, in ascending order.
    pub fn addresses(&self) -> impl Iterator<Item = u64> + '_ {
        self.pages.iter().flat_map(|(page_address, page)| {
            page.cells
                .iter()
                .enumerate()
                .filter(|(_, cell)| cell.is_some())
                .map(move |(offset, _)| page_address + offset as u64)
        })
    }

    /// Occupied addresses in `[low, high]`, in ascending order.
    pub fn addresses_in(&self, low: u64, high: u64) -> impl Iterator<Item = u64> + '_ {
        self.pages
            .range((low & PAGE_MASK)..=(high & PAGE_MASK))
            .flat_map(|(page_address, page)| {
                page.cells
                    .iter()
                    .enumerate()
                    .filter(|(_, cell)| cell.is_some())
                    .map(move |(offset, _)| page_address + offset as u64)
            })
            .filter(move |address| *address >= low && *address <= high)
    }

    /// Produce an independent copy of this memory.
    ///
    /// Pages are shared until one side writes to them.
    pub fn copy(&self) -> SymbolicMemory {
        self.clone()
    }

    fn fits(&self, address: u64, bytes: u64) -> bool {
        address as u128 + bytes as u128 <= self.max_address()
    }

    fn shift(&self, offset: u64, bytes: u64) -> usize {
        match self.options.endian {
            Endian::Big => ((bytes - 1 - offset) * 8) as usize,
            Endian::Little => (offset * 8) as usize,
        }
    }

    /// Store a cell, returning true if the cell was previously empty.
    fn store_cell(&mut self, address: u64, cell: il::Expression) -> bool {
        let page_address = address & PAGE_MASK;
        let offset = (address & !PAGE_MASK) as usize;

        let page = self
            .pages
            .entry(page_address)
            .or_insert_with(|| RC::new(Page::new(PAGE_SIZE)));
        let inserted = RC::make_mut(page).store(offset, cell);
        if inserted {
            self.size += 1;
        }
        inserted
    }

    /// Recompute `free_ranges` from the occupied addresses.
    fn update_free_ranges(&mut self) {
        let max_address = self.max_address();
        let mut free_ranges = Vec::new();
        let mut next_free: u128 = 0;
        for address in self.addresses() {
            let address = address as u128;
            if address > next_free {
                free_ranges.push(FreeRange::new(next_free as u64, (address - 1) as u64));
            }
            next_free = address + 1;
        }
        if next_free < max_address {
            free_ranges.push(FreeRange::new(next_free as u64, (max_address - 1) as u64));
        }
        self.free_ranges = free_ranges;
    }

    /// Return the cell at this address, materializing and caching a fresh
    /// default cell if the address has never been written.
    pub fn materialize(
        &mut self,
        ctx: &mut Context,
        address: u64,
    ) -> Result<il::Expression, Error> {
        let size = self.size;
        let cell = self.materialize_cell(ctx, address)?;
        if self.size != size {
            self.update_free_ranges();
        }
        Ok(cell)
    }

    fn materialize_cell(
        &mut self,
        ctx: &mut Context,
        address: u64,
    ) -> Result<il::Expression, Error> {
        if let Some(cell) = self.get(address) {
            return Ok(cell.clone());
        }
        if !self.fits(address, 1) {
            return Err(Error::AddressOutOfRange(address));
        }
        let cell: il::Expression = ctx.fresh_cell(&self.options.name).into();
        trace!("materialized {} at 0x{:x}", cell, address);
        self.store_cell(address, cell.clone());
        Ok(cell)
    }

    /// The shared default for reads whose address is unknown.
    fn unknown(&mut self, ctx: &mut Context, bits: usize) -> il::Expression {
        let name = &self.options.name;
        self.unknown
            .entry(bits)
            .or_insert_with(|| ctx.fresh_scalar(name, bits).into())
            .clone()
    }

    /// Read `bytes` bytes starting at `address`, materializing defaults.
    fn read(
        &mut self,
        ctx: &mut Context,
        address: u64,
        bytes: u64,
    ) -> Result<il::Expression, Error> {
        if !self.fits(address, bytes) {
            return Err(Error::AddressOutOfRange(address));
        }
        let mut cells = Vec::with_capacity(bytes as usize);
        for offset in 0..bytes {
            let cell = self.materialize_cell(ctx, address + offset)?;
            cells.push((cell, self.shift(offset, bytes)));
        }
        concat_bytes(&cells, (bytes * 8) as usize)
    }

    /// A disjunction over every free range, "address lies in some free range".
    fn free_disjunction(&self, address: &il::Expression) -> Result<il::Expression, Error> {
        let bits = address.bits();
        let width_max = il::Constant::all_ones(bits).value_u128().unwrap_or(u128::MAX);

        let mut disjunction: Option<il::Expression> = None;
        for range in &self.free_ranges {
            if range.low as u128 > width_max {
                continue;
            }
            let high = std::cmp::min(range.high as u128, width_max) as u64;
            let term = il::Expression::and(
                il::Expression::cmpleu(il::expr_const(range.low, bits), address.clone())?,
                il::Expression::cmpleu(address.clone(), il::expr_const(high, bits))?,
            )?;
            disjunction = Some(match disjunction {
                Some(disjunction) => il::Expression::or(disjunction, term)?,
                None => term,
            });
        }
        Ok(disjunction.unwrap_or_else(|| il::expr_const(0, 1)))
    }

    /// The number of bytes `address` can reach, bounded by its width and by
    /// the address space.
    fn reachable(&self, address: &il::Expression) -> u128 {
        if address.bits() >= 128 {
            self.max_address()
        } else {
            std::cmp::min(self.max_address(), 1u128 << address.bits())
        }
    }

    fn pin(address: &il::Expression, concrete: u64) -> Result<il::Expression, Error> {
        il::Expression::cmpeq(address.clone(), il::expr_const(concrete, address.bits()))
    }

    /// Store a value in memory.
    ///
    /// The value must have a bit-width >= 8, and the bit-width must be evenly
    /// divisible by 8.
    ///
    /// Returns the equality constraints produced while placing a symbolic
    /// address. The caller must add these to its constraints.
    pub fn store(
        &mut self,
        ctx: &mut Context,
        address: &il::Expression,
        value: &il::Expression,
        constraints: &[il::Expression],
    ) -> Result<Vec<il::Expression>, Error> {
        if value.bits() % 8 != 0 || value.bits() == 0 {
            return Err(Error::InvalidWidth(value.bits()));
        }
        let bytes = (value.bits() / 8) as u64;

        if self.size as u128 + bytes as u128 >= self.max_address() {
            return Err(Error::CapacityExceeded {
                size: self.size as u128,
                bytes: bytes as u128,
                max: self.max_address(),
            });
        }

        let unique = {
            let value = Value::new(address, constraints, ctx.solver())?;
            if value.is_unique()? {
                Some(value.any()?)
            } else {
                None
            }
        };

        let (concrete, derived) = match &unique {
            Some(concrete) => {
                let concrete = concrete.value_u64().ok_or(Error::TooManyAddressBits)?;
                (concrete, Vec::new())
            }
            None => {
                let disjunction = self.free_disjunction(address)?;
                let concrete = if is_tautology(&disjunction)? {
                    let reachable = self.reachable(address);
                    if reachable < bytes as u128 {
                        return Err(Error::UnplaceableValue(address.to_string()));
                    }
                    let highest = (reachable - bytes as u128) as u64;
                    let concrete = ctx.rng().gen_range(0..=highest);
                    trace!("{} is free everywhere, chose 0x{:x}", address, concrete);
                    concrete
                } else {
                    let mut placement = constraints.to_vec();
                    placement.push(disjunction);
                    let concrete = ctx
                        .solver()
                        .solve(address, &placement)?
                        .ok_or_else(|| Error::UnplaceableValue(address.to_string()))?;
                    let concrete = concrete.value_u64().ok_or(Error::TooManyAddressBits)?;
                    trace!("placed {} at 0x{:x}", address, concrete);
                    concrete
                };
                (concrete, vec![SymbolicMemory::pin(address, concrete)?])
            }
        };

        if !self.fits(concrete, bytes) {
            return match unique {
                Some(_) => Err(Error::AddressOutOfRange(concrete)),
                None => Err(Error::UnplaceableValue(address.to_string())),
            };
        }

        for offset in 0..bytes {
            let byte = extract_byte(value, self.shift(offset, bytes))?;
            self.store_cell(concrete + offset, byte);
        }
        self.update_free_ranges();

        Ok(derived)
    }

    /// Load a `bits`-wide value from memory.
    ///
    /// `bits` must be >= 8, and evenly divisible by 8.
    pub fn load(
        &mut self,
        ctx: &mut Context,
        address: &il::Expression,
        bits: usize,
        constraints: &[il::Expression],
    ) -> Result<Load, Error> {
        if bits % 8 != 0 || bits == 0 {
            return Err(Error::InvalidWidth(bits));
        }

        if self.is_empty() {
            return Ok(Load {
                value: self.unknown(ctx, bits),
                constraints: Vec::new(),
                resolution: Resolution::Uninitialized,
            });
        }

        let bytes = (bits / 8) as u64;
        let size = self.size;

        // Either the unique address, or the bounds of the address.
        let (unique, bounds) = {
            let value = Value::new(address, constraints, ctx.solver())?;
            if value.is_unique()? {
                (Some(value.any()?), None)
            } else {
                (None, Some((value.min()?, value.max()?)))
            }
        };

        let load = match (unique, bounds) {
            (Some(concrete), _) => {
                let concrete = concrete.value_u64().ok_or(Error::TooManyAddressBits)?;
                Load {
                    value: self.read(ctx, concrete, bytes)?,
                    constraints: Vec::new(),
                    resolution: Resolution::Exact(concrete),
                }
            }
            (None, Some((min, max))) => {
                let min = min.value_u64().ok_or(Error::TooManyAddressBits)?;
                let max = max.value_u64().ok_or(Error::TooManyAddressBits)?;
                if max - min <= self.options.byte_window_limit {
                    self.load_bounded(ctx, address, bits, min, max)?
                } else {
                    self.load_oversized(ctx, address, bits)?
                }
            }
            (None, None) => return Err(Error::Unsat),
        };

        if self.size != size {
            self.update_free_ranges();
        }

        Ok(load)
    }

    fn load_bounded(
        &mut self,
        ctx: &mut Context,
        address: &il::Expression,
        bits: usize,
        min: u64,
        max: u64,
    ) -> Result<Load, Error> {
        let bytes = (bits / 8) as u64;
        let candidates: Vec<u64> = self
            .addresses_in(min, max)
            .filter(|candidate| self.fits(*candidate, bytes))
            .collect();

        if candidates.is_empty() {
            debug!(
                "Loading {} outside of tracked memory [0x{:x}, 0x{:x}], using a symbolic value",
                address, min, max
            );
            return Ok(Load {
                value: self.unknown(ctx, bits),
                constraints: Vec::new(),
                resolution: Resolution::Boundary,
            });
        }

        let result: il::Expression = ctx.fresh_load_result(&self.options.name, bits).into();
        let mut disjunction: Option<il::Expression> = None;
        for candidate in &candidates {
            let reading = self.read(ctx, *candidate, bytes)?;
            let term = il::Expression::cmpeq(result.clone(), reading)?;
            disjunction = Some(match disjunction {
                Some(disjunction) => il::Expression::or(disjunction, term)?,
                None => term,
            });
        }
        let disjunction = simplify_expression(&disjunction.ok_or("No candidate readings")?)?;

        Ok(Load {
            value: result,
            constraints: vec![disjunction.clone()],
            resolution: Resolution::Bounded {
                candidates,
                disjunction,
            },
        })
    }

    fn load_oversized(
        &mut self,
        ctx: &mut Context,
        address: &il::Expression,
        bits: usize,
    ) -> Result<Load, Error> {
        let bytes = (bits / 8) as u64;
        let reachable = self.reachable(address);
        let candidates: Vec<u64> = self
            .addresses()
            .filter(|candidate| (*candidate as u128) < reachable && self.fits(*candidate, bytes))
            .collect();

        if candidates.is_empty() {
            debug!("No tracked cell can hold a {}-bit load of {}", bits, address);
            return Ok(Load {
                value: self.unknown(ctx, bits),
                constraints: Vec::new(),
                resolution: Resolution::Boundary,
            });
        }

        let concrete = candidates[ctx.rng().gen_range(0..candidates.len())];
        warn!(
            "Address {} ranges past the window of {} bytes, pinning it to 0x{:x}",
            address, self.options.byte_window_limit, concrete
        );

        Ok(Load {
            value: self.read(ctx, concrete, bytes)?,
            constraints: vec![SymbolicMemory::pin(address, concrete)?],
            resolution: Resolution::Oversized(concrete),
        })
    }
}
