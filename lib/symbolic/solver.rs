//! A layer of abstraction over a SMT solver

use crate::il;
use crate::symbolic::util::*;
use crate::Error;
use log::trace;
use num_bigint::BigUint;
use std::collections::BTreeSet;
use std::fmt::Debug;
use std::io::Write;
use std::process;

/// Answers satisfiability queries over Falcon IL.
///
/// Constraints are 1-bit expressions which must all equal `1`.
pub trait Solver: Debug {
    /// Find a value for `expr` under `constraints`.
    ///
    /// Returns `Ok(None)` when the constraints are unsatisfiable.
    fn solve(
        &self,
        expr: &il::Expression,
        constraints: &[il::Expression],
    ) -> Result<Option<il::Constant>, Error>;

    /// Returns true if `constraints` are satisfiable.
    fn sat(&self, constraints: &[il::Expression]) -> Result<bool, Error> {
        Ok(self.solve(&il::expr_const(1, 1), constraints)?.is_some())
    }
}

/// The name of the variable a query's answer is bound to.
const EVAL_RESULT: &str = "EVAL_RESULT";

/// A `Solver` which runs queries through an external `z3` process.
#[derive(Clone, Debug)]
pub struct Z3 {
    path: String,
}

impl Z3 {
    /// Use the `z3` found in `PATH`.
    pub fn new() -> Z3 {
        Z3 {
            path: "z3".to_string(),
        }
    }

    /// Use the `z3` binary at the given path.
    pub fn with_path<S: Into<String>>(path: S) -> Z3 {
        Z3 { path: path.into() }
    }

    /// Build the SMT-LIB2 query for a call to `solve`.
    pub fn query(expr: &il::Expression, constraints: &[il::Expression]) -> String {
        // We need to collect all of the scalars so we can declare them
        let mut scalars: BTreeSet<(String, usize)> = BTreeSet::new();
        for constraint in constraints {
            for scalar in constraint.scalars() {
                scalars.insert((scalar.name().to_string(), scalar.bits()));
            }
        }
        for scalar in expr.scalars() {
            scalars.insert((scalar.name().to_string(), scalar.bits()));
        }

        let mut lines = vec![
            "(set-option :produce-models true)".to_string(),
            "(set-logic QF_BV)".to_string(),
        ];

        for (name, bits) in scalars {
            lines.push(format!("(declare-fun {} () (_ BitVec {}))", name, bits));
        }
        lines.push(format!(
            "(declare-fun {} () (_ BitVec {}))",
            EVAL_RESULT,
            expr.bits()
        ));

        for constraint in constraints {
            lines.push(format!("(assert (= #b1 {}))", expr_to_smtlib2(constraint)));
        }
        lines.push(format!(
            "(assert (= {} {}))",
            EVAL_RESULT,
            expr_to_smtlib2(expr)
        ));

        lines.push("(check-sat)".to_string());
        lines.push(format!("(get-value ({}))", EVAL_RESULT));
        lines.push("(exit)\n".to_string());

        lines.join("\n")
    }

    /// Parse the output of the query built by `query`.
    pub fn parse_output(output: &str, bits: usize) -> Result<Option<il::Constant>, Error> {
        let mut lines = output.lines().map(|line| line.trim());
        match lines.next() {
            Some("unsat") => return Ok(None),
            Some("sat") => {}
            Some(line) => return Err(Error::Solver(format!("Unexpected solver output: {}", line))),
            None => return Err(Error::Solver("Empty solver output".to_string())),
        }

        let rest: String = lines.collect::<Vec<&str>>().join(" ");
        let position = rest
            .find(EVAL_RESULT)
            .ok_or_else(|| Error::Solver(format!("No model value in solver output: {}", rest)))?;
        let value = rest[position + EVAL_RESULT.len()..]
            .trim_start()
            .trim_end_matches(|c: char| c == ')' || c.is_whitespace());

        let parsed = if let Some(hex) = value.strip_prefix("#x") {
            BigUint::parse_bytes(hex.as_bytes(), 16)
        } else if let Some(binary) = value.strip_prefix("#b") {
            BigUint::parse_bytes(binary.as_bytes(), 2)
        } else {
            None
        };

        match parsed {
            Some(value) => Ok(Some(il::Constant::new_big(value, bits))),
            None => Err(Error::Solver(format!("Could not parse model value {}", value))),
        }
    }
}

impl Default for Z3 {
    fn default() -> Z3 {
        Z3::new()
    }
}

impl Solver for Z3 {
    fn solve(
        &self,
        expr: &il::Expression,
        constraints: &[il::Expression],
    ) -> Result<Option<il::Constant>, Error> {
        let query = Z3::query(expr, constraints);
        trace!("solver query:\n{}", query);

        let mut child = process::Command::new(&self.path)
            .arg("-in")
            .stdin(process::Stdio::piped())
            .stdout(process::Stdio::piped())
            .stderr(process::Stdio::piped())
            .spawn()
            .map_err(|e| {
                Error::from(e).chain(Error::Solver(format!("Failed to run {}", self.path)))
            })?;

        match child.stdin.take() {
            Some(mut stdin) => {
                stdin.write_all(query.as_bytes())?;
                stdin.flush()?;
            }
            None => {
                child.kill()?;
                return Err(Error::Solver("Failed to get stdin from solver process".to_string()));
            }
        }

        let output = child.wait_with_output()?;
        let stdout = String::from_utf8(output.stdout)?;
        trace!("solver output: {}", stdout);

        Z3::parse_output(&stdout, expr.bits())
    }
}
