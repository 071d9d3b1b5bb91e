//! Fixed-point arithmetic
//!
//! All operands are read as decimals; the interpreter converts the result to
//! the declared type of the field it is written to.

use bigdecimal::{BigDecimal, RoundingMode};
use ruleflow_core::{CoreError, FieldType, FieldValue, FunctionOutcome, FunctionRegistry, FunctionSignature, ParamRole};

use super::{count_arg, decimal_arg};

/// Largest exponent accepted by `power`
const MAX_EXPONENT: u32 = 1024;

/// Largest number of decimal places accepted by `round`
const MAX_PLACES: u32 = 38;

pub(crate) fn register(registry: &mut FunctionRegistry) {
    let binary = |name: &str, description: &str| {
        FunctionSignature::new(name, vec![ParamRole::Input, ParamRole::Input, ParamRole::InputOutput])
            .returning(FieldType::Decimal)
            .describe(description)
    };

    registry.register_pure(binary("add", "a + b"), add);
    registry.register_pure(binary("subtract", "a - b"), subtract);
    registry.register_pure(binary("multiply", "a * b"), multiply);
    registry.register_pure(binary("divide", "a / b; division by zero fails"), divide);
    registry.register_pure(binary("modulo", "remainder of a / b"), modulo);
    registry.register_pure(binary("power", "a raised to a non-negative integer b"), power);
    registry.register_pure(binary("round", "a rounded half-up to b decimal places"), round);
}

fn operands(function: &str, args: &[FieldValue]) -> Result<(BigDecimal, BigDecimal), CoreError> {
    Ok((decimal_arg(function, args, 0)?, decimal_arg(function, args, 1)?))
}

fn add(args: &[FieldValue]) -> Result<FunctionOutcome, CoreError> {
    let (a, b) = operands("add", args)?;
    Ok(FunctionOutcome::assign(2, a + b))
}

fn subtract(args: &[FieldValue]) -> Result<FunctionOutcome, CoreError> {
    let (a, b) = operands("subtract", args)?;
    Ok(FunctionOutcome::assign(2, a - b))
}

fn multiply(args: &[FieldValue]) -> Result<FunctionOutcome, CoreError> {
    let (a, b) = operands("multiply", args)?;
    Ok(FunctionOutcome::assign(2, a * b))
}

fn divide(args: &[FieldValue]) -> Result<FunctionOutcome, CoreError> {
    let (a, b) = operands("divide", args)?;
    if b == BigDecimal::from(0) {
        return Err(CoreError::ExecutionError(format!("divide: division of {} by zero", a)));
    }
    Ok(FunctionOutcome::assign(2, a / b))
}

fn modulo(args: &[FieldValue]) -> Result<FunctionOutcome, CoreError> {
    let (a, b) = operands("modulo", args)?;
    if b == BigDecimal::from(0) {
        return Err(CoreError::ExecutionError(format!("modulo: {} modulo zero", a)));
    }
    Ok(FunctionOutcome::assign(2, a % b))
}

fn power(args: &[FieldValue]) -> Result<FunctionOutcome, CoreError> {
    let base = decimal_arg("power", args, 0)?;
    let exponent = count_arg("power", args, 1)?;
    if exponent > MAX_EXPONENT {
        return Err(CoreError::ValidationError(format!(
            "power: exponent {} exceeds {}",
            exponent, MAX_EXPONENT
        )));
    }

    let mut result = BigDecimal::from(1);
    for _ in 0..exponent {
        result = result * &base;
    }
    Ok(FunctionOutcome::assign(2, result))
}

fn round(args: &[FieldValue]) -> Result<FunctionOutcome, CoreError> {
    let value = decimal_arg("round", args, 0)?;
    let places = count_arg("round", args, 1)?;
    if places > MAX_PLACES {
        return Err(CoreError::ValidationError(format!(
            "round: {} decimal places exceeds {}",
            places, MAX_PLACES
        )));
    }
    Ok(FunctionOutcome::assign(
        2,
        value.with_scale_round(i64::from(places), RoundingMode::HalfUp),
    ))
}
