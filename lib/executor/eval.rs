use crate::il;
use crate::Error;
use std::collections::BTreeMap;

/// Evaluate an `il::Expression` to a single `il::Constant`.
///
/// The expression must not contain any `Scalar`.
pub fn eval(expr: &il::Expression) -> Result<il::Constant, Error> {
    Ok(match *expr {
        il::Expression::Scalar(ref scalar) => {
            return Err(Error::ExecutorScalar(scalar.name().to_string()));
        }
        il::Expression::Constant(ref constant) => constant.clone(),
        il::Expression::Add(ref lhs, ref rhs) => eval(lhs)?.add(&eval(rhs)?)?,
        il::Expression::Sub(ref lhs, ref rhs) => eval(lhs)?.sub(&eval(rhs)?)?,
        il::Expression::Mul(ref lhs, ref rhs) => eval(lhs)?.mul(&eval(rhs)?)?,
        il::Expression::Divu(ref lhs, ref rhs) => eval(lhs)?.divu(&eval(rhs)?)?,
        il::Expression::Modu(ref lhs, ref rhs) => eval(lhs)?.modu(&eval(rhs)?)?,
        il::Expression::And(ref lhs, ref rhs) => eval(lhs)?.and(&eval(rhs)?)?,
        il::Expression::Or(ref lhs, ref rhs) => eval(lhs)?.or(&eval(rhs)?)?,
        il::Expression::Xor(ref lhs, ref rhs) => eval(lhs)?.xor(&eval(rhs)?)?,
        il::Expression::Shl(ref lhs, ref rhs) => eval(lhs)?.shl(&eval(rhs)?)?,
        il::Expression::Shr(ref lhs, ref rhs) => eval(lhs)?.shr(&eval(rhs)?)?,
        il::Expression::Cmpeq(ref lhs, ref rhs) => eval(lhs)?.cmpeq(&eval(rhs)?)?,
        il::Expression::Cmpneq(ref lhs, ref rhs) => eval(lhs)?.cmpneq(&eval(rhs)?)?,
        il::Expression::Cmplts(ref lhs, ref rhs) => eval(lhs)?.cmplts(&eval(rhs)?)?,
        il::Expression::Cmpltu(ref lhs, ref rhs) => eval(lhs)?.cmpltu(&eval(rhs)?)?,
        il::Expression::Zext(bits, ref rhs) => eval(rhs)?.zext(bits)?,
        il::Expression::Sext(bits, ref rhs) => eval(rhs)?.sext(bits)?,
        il::Expression::Trun(bits, ref rhs) => eval(rhs)?.trun(bits)?,
        il::Expression::Ite(ref cond, ref then, ref else_) => {
            if eval(cond)?.is_one() {
                eval(then)?
            } else {
                eval(else_)?
            }
        }
    })
}

/// Replace every `Scalar` in `expr` which has a value in `assignment` with
/// that value. Scalars without a value are left in place.
pub fn symbolize_expression(
    expr: &il::Expression,
    assignment: &BTreeMap<String, il::Constant>,
) -> Result<il::Expression, Error> {
    let sym = |e: &il::Expression| symbolize_expression(e, assignment);
    Ok(match *expr {
        il::Expression::Scalar(ref scalar) => match assignment.get(scalar.name()) {
            Some(constant) => {
                if constant.bits() != scalar.bits() {
                    return Err(Error::Sort);
                }
                constant.clone().into()
            }
            None => expr.clone(),
        },
        il::Expression::Constant(_) => expr.clone(),
        il::Expression::Add(ref lhs, ref rhs) => il::Expression::add(sym(lhs)?, sym(rhs)?)?,
        il::Expression::Sub(ref lhs, ref rhs) => il::Expression::sub(sym(lhs)?, sym(rhs)?)?,
        il::Expression::Mul(ref lhs, ref rhs) => il::Expression::mul(sym(lhs)?, sym(rhs)?)?,
        il::Expression::Divu(ref lhs, ref rhs) => il::Expression::divu(sym(lhs)?, sym(rhs)?)?,
        il::Expression::Modu(ref lhs, ref rhs) => il::Expression::modu(sym(lhs)?, sym(rhs)?)?,
        il::Expression::And(ref lhs, ref rhs) => il::Expression::and(sym(lhs)?, sym(rhs)?)?,
        il::Expression::Or(ref lhs, ref rhs) => il::Expression::or(sym(lhs)?, sym(rhs)?)?,
        il::Expression::Xor(ref lhs, ref rhs) => il::Expression::xor(sym(lhs)?, sym(rhs)?)?,
        il::Expression::Shl(ref lhs, ref rhs) => il::Expression::shl(sym(lhs)?, sym(rhs)?)?,
        il::Expression::Shr(ref lhs, ref rhs) => il::Expression::shr(sym(lhs)?, sym(rhs)?)?,
        il::Expression::Cmpeq(ref lhs, ref rhs) => il::Expression::cmpeq(sym(lhs)?, sym(rhs)?)?,
        il::Expression::Cmpneq(ref lhs, ref rhs) => {
            il::Expression::cmpneq(sym(lhs)?, sym(rhs)?)?
        }
        il::Expression::Cmplts(ref lhs, ref rhs) => {
            il::Expression::cmplts(sym(lhs)?, sym(rhs)?)?
        }
        il::Expression::Cmpltu(ref lhs, ref rhs) => {
            il::Expression::cmpltu(sym(lhs)?, sym(rhs)?)?
        }
        il::Expression::Zext(bits, ref src) => il::Expression::zext(bits, sym(src)?)?,
        il::Expression::Sext(bits, ref src) => il::Expression::sext(bits, sym(src)?)?,
        il::Expression::Trun(bits, ref src) => il::Expression::trun(bits, sym(src)?)?,
        il::Expression::Ite(ref cond, ref then, ref else_) => {
            il::Expression::ite(sym(cond)?, sym(then)?, sym(else_)?)?
        }
    })
}

#[test]
fn add() {
    let lhs = il::expr_const(0x570000, 32);
    let rhs = il::expr_const(0x703c, 32);
    let expr = il::Expression::add(lhs, rhs).unwrap();
    assert_eq!(eval(&expr).unwrap(), il::const_(0x57703c, 32));

    let lhs = il::expr_const(0xffffffff, 32);
    let rhs = il::expr_const(0x1, 32);
    let expr = il::Expression::add(lhs, rhs).unwrap();
    assert_eq!(eval(&expr).unwrap(), il::const_(0, 32));
}

#[test]
fn byte_slices() {
    let value = il::expr_const(0xaabbccdd, 32);
    let byte = il::Expression::trun(
        8,
        il::Expression::shr(value, il::expr_const(16, 32)).unwrap(),
    )
    .unwrap();
    assert_eq!(eval(&byte).unwrap(), il::const_(0xbb, 8));
}

#[test]
fn scalar_is_an_error() {
    let expr = il::Expression::add(il::expr_scalar("x", 8), il::expr_const(1, 8)).unwrap();
    assert!(matches!(eval(&expr), Err(Error::ExecutorScalar(_))));

    let mut assignment = BTreeMap::new();
    assignment.insert("x".to_string(), il::const_(0xff, 8));
    let expr = symbolize_expression(&expr, &assignment).unwrap();
    assert_eq!(eval(&expr).unwrap(), il::const_(0, 8));
}
