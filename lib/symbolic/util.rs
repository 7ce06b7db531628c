//! Simplification, byte slicing and SMT-LIB2 rendering of expressions.

use crate::executor;
use crate::il;
use crate::Error;

/// Returns true if there are no scalars in this expression.
pub fn all_constants(expr: &il::Expression) -> bool {
    expr.scalars().is_empty()
}

fn is_zero(expr: &il::Expression) -> bool {
    expr.get_constant().map(|c| c.is_zero()).unwrap_or(false)
}

fn is_true(expr: &il::Expression) -> bool {
    expr.bits() == 1 && expr.get_constant().map(|c| c.is_one()).unwrap_or(false)
}

fn is_all_ones(expr: &il::Expression) -> bool {
    expr.get_constant().map(|c| c.is_all_ones()).unwrap_or(false)
}

/// Rebuild a binary expression of the same kind as `expr` over new operands.
fn rebuild_binary(
    expr: &il::Expression,
    lhs: il::Expression,
    rhs: il::Expression,
) -> Result<il::Expression, Error> {
    match *expr {
        il::Expression::Add(_, _) => il::Expression::add(lhs, rhs),
        il::Expression::Sub(_, _) => il::Expression::sub(lhs, rhs),
        il::Expression::Mul(_, _) => il::Expression::mul(lhs, rhs),
        il::Expression::Divu(_, _) => il::Expression::divu(lhs, rhs),
        il::Expression::Modu(_, _) => il::Expression::modu(lhs, rhs),
        il::Expression::And(_, _) => il::Expression::and(lhs, rhs),
        il::Expression::Or(_, _) => il::Expression::or(lhs, rhs),
        il::Expression::Xor(_, _) => il::Expression::xor(lhs, rhs),
        il::Expression::Shl(_, _) => il::Expression::shl(lhs, rhs),
        il::Expression::Shr(_, _) => il::Expression::shr(lhs, rhs),
        il::Expression::Cmpeq(_, _) => il::Expression::cmpeq(lhs, rhs),
        il::Expression::Cmpneq(_, _) => il::Expression::cmpneq(lhs, rhs),
        il::Expression::Cmplts(_, _) => il::Expression::cmplts(lhs, rhs),
        il::Expression::Cmpltu(_, _) => il::Expression::cmpltu(lhs, rhs),
        _ => Err("Non-binary expression passed to rebuild_binary".into()),
    }
}

/// Apply the algebraic identities we rely on to a binary expression whose
/// operands are already simplified. Returns `None` if nothing applies.
fn binary_identity(
    expr: &il::Expression,
    lhs: &il::Expression,
    rhs: &il::Expression,
) -> Option<il::Expression> {
    match *expr {
        il::Expression::Or(_, _) => {
            if is_zero(lhs) || is_all_ones(rhs) {
                Some(rhs.clone())
            } else if is_zero(rhs) || is_all_ones(lhs) || lhs == rhs {
                Some(lhs.clone())
            } else {
                None
            }
        }
        il::Expression::And(_, _) => {
            if is_zero(lhs) || is_all_ones(rhs) {
                Some(lhs.clone())
            } else if is_zero(rhs) || is_all_ones(lhs) {
                Some(rhs.clone())
            } else if lhs == rhs {
                Some(lhs.clone())
            } else {
                None
            }
        }
        il::Expression::Add(_, _) | il::Expression::Xor(_, _) => {
            if is_zero(lhs) {
                Some(rhs.clone())
            } else if is_zero(rhs) {
                Some(lhs.clone())
            } else {
                None
            }
        }
        il::Expression::Sub(_, _) | il::Expression::Shl(_, _) | il::Expression::Shr(_, _) => {
            if is_zero(rhs) {
                Some(lhs.clone())
            } else {
                None
            }
        }
        il::Expression::Cmpeq(_, _) if lhs == rhs => Some(il::expr_const(1, 1)),
        il::Expression::Cmpneq(_, _) if lhs == rhs => Some(il::expr_const(0, 1)),
        il::Expression::Cmpltu(_, _) => {
            // Nothing is unsigned-less-than zero, and all-ones is less than nothing.
            if is_zero(rhs) || is_all_ones(lhs) || lhs == rhs {
                Some(il::expr_const(0, 1))
            } else {
                None
            }
        }
        il::Expression::Cmplts(_, _) if lhs == rhs => Some(il::expr_const(0, 1)),
        _ => None,
    }
}

/// Fold all constant expressions, and apply a small set of identities,
/// leaving the bare minimum expression needed to evaluate over scalars.
pub fn simplify_expression(expr: &il::Expression) -> Result<il::Expression, Error> {
    Ok(match *expr {
        il::Expression::Constant(_) | il::Expression::Scalar(_) => expr.clone(),
        il::Expression::Add(ref lhs, ref rhs)
        | il::Expression::Sub(ref lhs, ref rhs)
        | il::Expression::Mul(ref lhs, ref rhs)
        | il::Expression::Divu(ref lhs, ref rhs)
        | il::Expression::Modu(ref lhs, ref rhs)
        | il::Expression::And(ref lhs, ref rhs)
        | il::Expression::Or(ref lhs, ref rhs)
        | il::Expression::Xor(ref lhs, ref rhs)
        | il::Expression::Shl(ref lhs, ref rhs)
        | il::Expression::Shr(ref lhs, ref rhs)
        | il::Expression::Cmpeq(ref lhs, ref rhs)
        | il::Expression::Cmpneq(ref lhs, ref rhs)
        | il::Expression::Cmplts(ref lhs, ref rhs)
        | il::Expression::Cmpltu(ref lhs, ref rhs) => {
            let lhs = simplify_expression(lhs)?;
            let rhs = simplify_expression(rhs)?;
            if lhs.is_constant() && rhs.is_constant() {
                let folded = rebuild_binary(expr, lhs, rhs)?;
                match executor::eval(&folded) {
                    Ok(constant) => constant.into(),
                    // Division by zero stays symbolic, the solver decides what it means.
                    Err(Error::DivideByZero) => folded,
                    Err(e) => return Err(e),
                }
            } else if let Some(simplified) = binary_identity(expr, &lhs, &rhs) {
                simplified
            } else {
                rebuild_binary(expr, lhs, rhs)?
            }
        }
        il::Expression::Zext(bits, ref src) => {
            let src = simplify_expression(src)?;
            match src {
                il::Expression::Constant(ref c) => c.zext(bits)?.into(),
                src => il::Expression::zext(bits, src)?,
            }
        }
        il::Expression::Sext(bits, ref src) => {
            let src = simplify_expression(src)?;
            match src {
                il::Expression::Constant(ref c) => c.sext(bits)?.into(),
                src => il::Expression::sext(bits, src)?,
            }
        }
        il::Expression::Trun(bits, ref src) => {
            let src = simplify_expression(src)?;
            match src {
                il::Expression::Constant(ref c) => c.trun(bits)?.into(),
                // trun(zext(x)) back to the width of x is x
                il::Expression::Zext(_, ref inner) if inner.bits() == bits => {
                    inner.as_ref().clone()
                }
                src => il::Expression::trun(bits, src)?,
            }
        }
        il::Expression::Ite(ref cond, ref then, ref else_) => {
            let cond = simplify_expression(cond)?;
            let then = simplify_expression(then)?;
            let else_ = simplify_expression(else_)?;
            match cond.get_constant() {
                Some(c) if c.is_one() => then,
                Some(_) => else_,
                None => {
                    if then == else_ {
                        then
                    } else {
                        il::Expression::ite(cond, then, else_)?
                    }
                }
            }
        }
    })
}

/// Returns true if `expr` simplifies to the constant `1:1`.
pub fn is_tautology(expr: &il::Expression) -> Result<bool, Error> {
    Ok(is_true(&simplify_expression(expr)?))
}

/// Extract the byte `shift` bits up from the bottom of `value`.
pub fn extract_byte(value: &il::Expression, shift: usize) -> Result<il::Expression, Error> {
    if value.bits() == 8 && shift == 0 {
        return Ok(value.clone());
    }
    let shifted = if shift == 0 {
        value.clone()
    } else {
        il::Expression::shr(value.clone(), il::expr_const(shift as u64, value.bits()))?
    };
    simplify_expression(&il::Expression::trun(8, shifted)?)
}

/// Concatenate bytes into one `bits`-wide value. Each byte is paired with the
/// number of bits it is shifted up by in the result.
pub fn concat_bytes(
    bytes: &[(il::Expression, usize)],
    bits: usize,
) -> Result<il::Expression, Error> {
    if let Some(value) = coalesce_bytes(bytes, bits) {
        return Ok(value);
    }

    let mut result: Option<il::Expression> = None;
    for (byte, shift) in bytes {
        let byte = if bits == 8 {
            byte.clone()
        } else {
            il::Expression::zext(bits, byte.clone())?
        };
        let byte = if *shift == 0 {
            byte
        } else {
            il::Expression::shl(byte, il::expr_const(*shift as u64, bits))?
        };
        result = Some(match result {
            Some(result) => il::Expression::or(result, byte)?,
            None => byte,
        });
    }

    let result = result.ok_or("Concatenating zero bytes")?;
    simplify_expression(&result)
}

/// If every byte is the slice `extract_byte` would produce of one common
/// `bits`-wide source, at the shift it is paired with, return that source.
///
/// This lets a symbolic value split into bytes by a store come back whole.
pub fn coalesce_bytes(bytes: &[(il::Expression, usize)], bits: usize) -> Option<il::Expression> {
    fn slice_of(byte: &il::Expression) -> Option<(&il::Expression, usize)> {
        match *byte {
            il::Expression::Trun(8, ref src) => match **src {
                il::Expression::Shr(ref value, ref shift) => shift
                    .get_constant()
                    .and_then(|c| c.value_u64())
                    .map(|shift| (value.as_ref(), shift as usize)),
                ref value => Some((value, 0)),
            },
            _ => None,
        }
    }

    if bytes.len() < 2 || bytes.len() * 8 != bits {
        return None;
    }

    let mut source: Option<&il::Expression> = None;
    for (byte, shift) in bytes {
        let (value, value_shift) = slice_of(byte)?;
        if value_shift != *shift || value.bits() != bits || value.is_constant() {
            return None;
        }
        match source {
            Some(source) if source != value => return None,
            _ => source = Some(value),
        }
    }
    source.cloned()
}

fn constant_to_smtlib2(c: &il::Constant) -> String {
    if c.bits() == 1 {
        format!("#b{}", c.value())
    } else if c.bits() % 4 == 0 {
        format!("#x{:01$x}", c.value(), c.bits() / 4)
    } else {
        format!("(_ bv{} {})", c.value(), c.bits())
    }
}

/// Convert a falcon expression to its `smtlib2` equivalent.
pub fn expr_to_smtlib2(expr: &il::Expression) -> String {
    let binary = |op: &str, lhs: &il::Expression, rhs: &il::Expression| {
        format!("({} {} {})", op, expr_to_smtlib2(lhs), expr_to_smtlib2(rhs))
    };
    let boolean = |op: &str, lhs: &il::Expression, rhs: &il::Expression| {
        format!(
            "(ite ({} {} {}) #b1 #b0)",
            op,
            expr_to_smtlib2(lhs),
            expr_to_smtlib2(rhs)
        )
    };
    match *expr {
        il::Expression::Constant(ref c) => constant_to_smtlib2(c),
        il::Expression::Scalar(ref s) => s.name().to_string(),
        il::Expression::Add(ref lhs, ref rhs) => binary("bvadd", lhs, rhs),
        il::Expression::Sub(ref lhs, ref rhs) => binary("bvsub", lhs, rhs),
        il::Expression::Mul(ref lhs, ref rhs) => binary("bvmul", lhs, rhs),
        il::Expression::Divu(ref lhs, ref rhs) => binary("bvudiv", lhs, rhs),
        il::Expression::Modu(ref lhs, ref rhs) => binary("bvurem", lhs, rhs),
        il::Expression::And(ref lhs, ref rhs) => binary("bvand", lhs, rhs),
        il::Expression::Or(ref lhs, ref rhs) => binary("bvor", lhs, rhs),
        il::Expression::Xor(ref lhs, ref rhs) => binary("bvxor", lhs, rhs),
        il::Expression::Shl(ref lhs, ref rhs) => binary("bvshl", lhs, rhs),
        il::Expression::Shr(ref lhs, ref rhs) => binary("bvlshr", lhs, rhs),
        il::Expression::Cmpeq(ref lhs, ref rhs) => boolean("=", lhs, rhs),
        il::Expression::Cmpneq(ref lhs, ref rhs) => boolean("distinct", lhs, rhs),
        il::Expression::Cmplts(ref lhs, ref rhs) => boolean("bvslt", lhs, rhs),
        il::Expression::Cmpltu(ref lhs, ref rhs) => boolean("bvult", lhs, rhs),
        il::Expression::Zext(bits, ref src) => format!(
            "((_ zero_extend {}) {})",
            bits - src.bits(),
            expr_to_smtlib2(src)
        ),
        il::Expression::Sext(bits, ref src) => format!(
            "((_ sign_extend {}) {})",
            bits - src.bits(),
            expr_to_smtlib2(src)
        ),
        il::Expression::Trun(bits, ref src) => {
            format!("((_ extract {} 0) {})", bits - 1, expr_to_smtlib2(src))
        }
        il::Expression::Ite(ref cond, ref then, ref else_) => format!(
            "(ite (= #b1 {}) {} {})",
            expr_to_smtlib2(cond),
            expr_to_smtlib2(then),
            expr_to_smtlib2(else_)
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::il::*;

    #[test]
    fn fold_constants() {
        let expr = Expression::add(
            Expression::add(expr_const(100, 32), expr_const(50, 32)).unwrap(),
            expr_scalar("test", 32),
        )
        .unwrap();

        let expr = simplify_expression(&expr).unwrap();

        assert_eq!(
            expr,
            Expression::add(expr_const(150, 32), expr_scalar("test", 32)).unwrap()
        );
    }

    #[test]
    fn unsigned_range_identities() {
        let x = expr_scalar("x", 64);
        let above_zero = Expression::cmpleu(expr_const(0, 64), x.clone()).unwrap();
        let below_max = Expression::cmpleu(x.clone(), Constant::all_ones(64).into()).unwrap();
        let in_range = Expression::and(above_zero, below_max).unwrap();
        assert!(is_tautology(&in_range).unwrap());

        let below_ten = Expression::cmpleu(x, expr_const(10, 64)).unwrap();
        assert!(!is_tautology(&below_ten).unwrap());
    }

    #[test]
    fn ite_with_constant_condition() {
        let expr =
            Expression::ite(expr_const(0, 1), expr_scalar("a", 8), expr_const(7, 8)).unwrap();
        assert_eq!(simplify_expression(&expr).unwrap(), expr_const(7, 8));
    }

    #[test]
    fn concat_constant_bytes() {
        let bytes = vec![
            (expr_const(0xaa, 8), 8),
            (expr_const(0xbb, 8), 0),
        ];
        assert_eq!(concat_bytes(&bytes, 16).unwrap(), expr_const(0xaabb, 16));
    }

    #[test]
    fn symbolic_bytes_coalesce() {
        let x = expr_scalar("x", 32);
        let bytes: Vec<(Expression, usize)> = [24, 16, 8, 0]
            .iter()
            .map(|shift| (extract_byte(&x, *shift).unwrap(), *shift))
            .collect();
        assert_eq!(concat_bytes(&bytes, 32).unwrap(), x);

        // Out of order slices are not the original value.
        let swapped = vec![bytes[1].0.clone(), bytes[0].0.clone()];
        let swapped = vec![(swapped[0].clone(), 8), (swapped[1].clone(), 0)];
        assert_ne!(concat_bytes(&swapped, 16).unwrap(), x);
    }

    #[test]
    fn smtlib2() {
        let expr = Expression::cmpeq(
            Expression::add(expr_scalar("a", 32), expr_const(1, 32)).unwrap(),
            expr_const(0x10, 32),
        )
        .unwrap();
        assert_eq!(
            expr_to_smtlib2(&expr),
            "(ite (= (bvadd a #x00000001) #x00000010) #b1 #b0)"
        );
        assert_eq!(expr_to_smtlib2(&expr_const(5, 3)), "(_ bv5 3)");
    }
}
