//! Questions about the values a formula may take.
//!
//! A `Value` pairs an `il::Expression` with the constraints it lives under,
//! and answers whether it is unique, what its bounds are, and gives a witness.
//! Answers are always sound. Expressions which simplify to constants never
//! reach the solver.

use crate::il;
use crate::symbolic::util::{all_constants, simplify_expression};
use crate::symbolic::Solver;
use crate::Error;
use num_bigint::BigUint;
use num_traits::One;

/// An expression under a set of constraints.
#[derive(Debug)]
pub struct Value<'v> {
    expression: il::Expression,
    constraints: &'v [il::Expression],
    solver: &'v dyn Solver,
}

impl<'v> Value<'v> {
    pub fn new(
        expression: &il::Expression,
        constraints: &'v [il::Expression],
        solver: &'v dyn Solver,
    ) -> Result<Value<'v>, Error> {
        Ok(Value {
            expression: simplify_expression(expression)?,
            constraints,
            solver,
        })
    }

    /// The simplified expression this `Value` answers for.
    pub fn expression(&self) -> &il::Expression {
        &self.expression
    }

    fn with(&self, constraint: il::Expression) -> Vec<il::Expression> {
        let mut constraints = self.constraints.to_vec();
        constraints.push(constraint);
        constraints
    }

    /// Any value the expression may take, `Error::Unsat` if there is none.
    pub fn any(&self) -> Result<il::Constant, Error> {
        if let il::Expression::Constant(ref constant) = self.expression {
            return Ok(constant.clone());
        }
        self.solver
            .solve(&self.expression, self.constraints)?
            .ok_or(Error::Unsat)
    }

    /// Returns true if the expression can take exactly one value.
    pub fn is_unique(&self) -> Result<bool, Error> {
        // Scalar-free expressions which do not fold, such as a division by
        // zero, still have only one value.
        if all_constants(&self.expression) {
            return Ok(true);
        }
        let witness = match self.solver.solve(&self.expression, self.constraints)? {
            Some(witness) => witness,
            None => return Ok(false),
        };
        let other = self.with(il::Expression::cmpneq(
            self.expression.clone(),
            witness.into(),
        )?);
        Ok(self.solver.solve(&self.expression, &other)?.is_none())
    }

    /// The smallest unsigned value the expression may take.
    pub fn min(&self) -> Result<il::Constant, Error> {
        let witness = self.any()?;
        if self.expression.is_constant() {
            return Ok(witness);
        }
        // Search [low, high], where high is always a feasible value.
        let bits = self.expression.bits();
        let mut low = BigUint::from(0u32);
        let mut high = witness.value().clone();
        while low < high {
            let middle: BigUint = (&low + &high) >> 1;
            let constraint = il::Expression::cmpleu(
                self.expression.clone(),
                il::Constant::new_big(middle.clone(), bits).into(),
            )?;
            match self.solver.solve(&self.expression, &self.with(constraint))? {
                Some(value) => high = value.value().clone(),
                None => low = middle + BigUint::one(),
            }
        }
        Ok(il::Constant::new_big(high, bits))
    }

    /// The largest unsigned value the expression may take.
    pub fn max(&self) -> Result<il::Constant, Error> {
        let witness = self.any()?;
        if self.expression.is_constant() {
            return Ok(witness);
        }
        // Search [low, high], where low is always a feasible value.
        let bits = self.expression.bits();
        let mut low = witness.value().clone();
        let mut high = il::Constant::all_ones(bits).value().clone();
        while low < high {
            let middle: BigUint = (&low + &high + BigUint::one()) >> 1;
            let constraint = il::Expression::cmpleu(
                il::Constant::new_big(middle.clone(), bits).into(),
                self.expression.clone(),
            )?;
            match self.solver.solve(&self.expression, &self.with(constraint))? {
                Some(value) => low = value.value().clone(),
                None => high = middle - BigUint::one(),
            }
        }
        Ok(il::Constant::new_big(low, bits))
    }
}
