//! A `Constant` holds a single value.

use crate::il::*;
use crate::Error;
use num_bigint::{BigInt, BigUint};
use num_traits::{One, ToPrimitive, Zero};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A constant value for Falcon IL
///
/// The value is always masked to `bits`.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Constant {
    value: BigUint,
    bits: usize,
}

fn mask(bits: usize) -> BigUint {
    (BigUint::one() << bits) - BigUint::one()
}

impl Constant {
    /// Create a new `Constant` with the given value and bitness.
    pub fn new(value: u64, bits: usize) -> Constant {
        Constant::new_big(BigUint::from(value), bits)
    }

    /// Create a new `Constant` from a `num_bigint::BigUint`.
    pub fn new_big(value: BigUint, bits: usize) -> Constant {
        Constant {
            value: value & mask(bits),
            bits,
        }
    }

    /// A constant of the given width with every bit set.
    pub fn all_ones(bits: usize) -> Constant {
        Constant {
            value: mask(bits),
            bits,
        }
    }

    /// Get the value of this `Constant`.
    pub fn value(&self) -> &BigUint {
        &self.value
    }

    /// Get the value of this `Constant` if it fits in a `u64`.
    pub fn value_u64(&self) -> Option<u64> {
        self.value.to_u64()
    }

    /// Get the value of this `Constant` if it fits in a `u128`.
    pub fn value_u128(&self) -> Option<u128> {
        self.value.to_u128()
    }

    /// Get the number of bits for this `Constant`.
    pub fn bits(&self) -> usize {
        self.bits
    }

    pub fn is_zero(&self) -> bool {
        self.value.is_zero()
    }

    pub fn is_one(&self) -> bool {
        self.value.is_one()
    }

    pub fn is_all_ones(&self) -> bool {
        self.value == mask(self.bits)
    }

    fn signed(&self) -> BigInt {
        if self.bits > 0 && self.value.bit((self.bits - 1) as u64) {
            BigInt::from(self.value.clone()) - (BigInt::one() << self.bits)
        } else {
            BigInt::from(self.value.clone())
        }
    }

    fn ensure_sort(&self, rhs: &Constant) -> Result<(), Error> {
        if self.bits != rhs.bits || self.bits == 0 {
            Err(Error::Sort)
        } else {
            Ok(())
        }
    }

    fn boolean(b: bool) -> Constant {
        Constant::new(if b { 1 } else { 0 }, 1)
    }

    pub fn add(&self, rhs: &Constant) -> Result<Constant, Error> {
        self.ensure_sort(rhs)?;
        Ok(Constant::new_big(&self.value + &rhs.value, self.bits))
    }

    pub fn sub(&self, rhs: &Constant) -> Result<Constant, Error> {
        self.ensure_sort(rhs)?;
        let value = (&self.value + (BigUint::one() << self.bits)) - &rhs.value;
        Ok(Constant::new_big(value, self.bits))
    }

    pub fn mul(&self, rhs: &Constant) -> Result<Constant, Error> {
        self.ensure_sort(rhs)?;
        Ok(Constant::new_big(&self.value * &rhs.value, self.bits))
    }

    pub fn divu(&self, rhs: &Constant) -> Result<Constant, Error> {
        self.ensure_sort(rhs)?;
        if rhs.is_zero() {
            return Err(Error::DivideByZero);
        }
        Ok(Constant::new_big(&self.value / &rhs.value, self.bits))
    }

    pub fn modu(&self, rhs: &Constant) -> Result<Constant, Error> {
        self.ensure_sort(rhs)?;
        if rhs.is_zero() {
            return Err(Error::DivideByZero);
        }
        Ok(Constant::new_big(&self.value % &rhs.value, self.bits))
    }

    pub fn and(&self, rhs: &Constant) -> Result<Constant, Error> {
        self.ensure_sort(rhs)?;
        Ok(Constant::new_big(&self.value & &rhs.value, self.bits))
    }

    pub fn or(&self, rhs: &Constant) -> Result<Constant, Error> {
        self.ensure_sort(rhs)?;
        Ok(Constant::new_big(&self.value | &rhs.value, self.bits))
    }

    pub fn xor(&self, rhs: &Constant) -> Result<Constant, Error> {
        self.ensure_sort(rhs)?;
        Ok(Constant::new_big(&self.value ^ &rhs.value, self.bits))
    }

    pub fn shl(&self, rhs: &Constant) -> Result<Constant, Error> {
        self.ensure_sort(rhs)?;
        match rhs.value.to_usize() {
            Some(shift) if shift < self.bits => {
                Ok(Constant::new_big(&self.value << shift, self.bits))
            }
            _ => Ok(Constant::new(0, self.bits)),
        }
    }

    pub fn shr(&self, rhs: &Constant) -> Result<Constant, Error> {
        self.ensure_sort(rhs)?;
        match rhs.value.to_usize() {
            Some(shift) if shift < self.bits => {
                Ok(Constant::new_big(&self.value >> shift, self.bits))
            }
            _ => Ok(Constant::new(0, self.bits)),
        }
    }

    pub fn cmpeq(&self, rhs: &Constant) -> Result<Constant, Error> {
        self.ensure_sort(rhs)?;
        Ok(Constant::boolean(self.value == rhs.value))
    }

    pub fn cmpneq(&self, rhs: &Constant) -> Result<Constant, Error> {
        self.ensure_sort(rhs)?;
        Ok(Constant::boolean(self.value != rhs.value))
    }

    pub fn cmpltu(&self, rhs: &Constant) -> Result<Constant, Error> {
        self.ensure_sort(rhs)?;
        Ok(Constant::boolean(self.value < rhs.value))
    }

    pub fn cmplts(&self, rhs: &Constant) -> Result<Constant, Error> {
        self.ensure_sort(rhs)?;
        Ok(Constant::boolean(self.signed() < rhs.signed()))
    }

    pub fn zext(&self, bits: usize) -> Result<Constant, Error> {
        if bits < self.bits {
            return Err(Error::Sort);
        }
        Ok(Constant::new_big(self.value.clone(), bits))
    }

    pub fn sext(&self, bits: usize) -> Result<Constant, Error> {
        if bits < self.bits || self.bits == 0 {
            return Err(Error::Sort);
        }
        if self.value.bit((self.bits - 1) as u64) {
            let extension = mask(bits) ^ mask(self.bits);
            Ok(Constant::new_big(&self.value | extension, bits))
        } else {
            Ok(Constant::new_big(self.value.clone(), bits))
        }
    }

    pub fn trun(&self, bits: usize) -> Result<Constant, Error> {
        if bits > self.bits || bits == 0 {
            return Err(Error::Sort);
        }
        Ok(Constant::new_big(self.value.clone(), bits))
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "0x{:X}:{}", self.value, self.bits)
    }
}

impl From<Constant> for Expression {
    fn from(constant: Constant) -> Expression {
        Expression::Constant(constant)
    }
}
