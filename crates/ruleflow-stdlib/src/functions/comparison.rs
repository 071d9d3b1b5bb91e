//! Comparison predicates
//!
//! Numbers compare numerically across integer and decimal values. A null
//! operand is only equal to another null and never ordered against anything.

use ruleflow_core::{CoreError, FieldType, FieldValue, FunctionOutcome, FunctionRegistry, FunctionSignature, ParamRole};
use std::cmp::Ordering;

use super::arg;

pub(crate) fn register(registry: &mut FunctionRegistry) {
    let predicate = |name: &str, description: &str| {
        FunctionSignature::new(name, vec![ParamRole::Input, ParamRole::Input])
            .returning(FieldType::Boolean)
            .describe(description)
    };

    registry.register_pure(predicate("equals", "a == b"), equals);
    registry.register_pure(predicate("not_equals", "a != b"), not_equals);
    registry.register_pure(predicate("less_than", "a < b"), less_than);
    registry.register_pure(predicate("greater_than", "a > b"), greater_than);
    registry.register_pure(predicate("less_than_or_equal", "a <= b"), less_than_or_equal);
    registry.register_pure(predicate("greater_than_or_equal", "a >= b"), greater_than_or_equal);
}

fn ordering(function: &str, args: &[FieldValue]) -> Result<Option<Ordering>, CoreError> {
    Ok(arg(function, args, 0)?.compare(arg(function, args, 1)?))
}

fn equals(args: &[FieldValue]) -> Result<FunctionOutcome, CoreError> {
    Ok(FunctionOutcome::value(ordering("equals", args)? == Some(Ordering::Equal)))
}

fn not_equals(args: &[FieldValue]) -> Result<FunctionOutcome, CoreError> {
    Ok(FunctionOutcome::value(ordering("not_equals", args)? != Some(Ordering::Equal)))
}

fn less_than(args: &[FieldValue]) -> Result<FunctionOutcome, CoreError> {
    Ok(FunctionOutcome::value(ordering("less_than", args)? == Some(Ordering::Less)))
}

fn greater_than(args: &[FieldValue]) -> Result<FunctionOutcome, CoreError> {
    Ok(FunctionOutcome::value(ordering("greater_than", args)? == Some(Ordering::Greater)))
}

fn less_than_or_equal(args: &[FieldValue]) -> Result<FunctionOutcome, CoreError> {
    let ord = ordering("less_than_or_equal", args)?;
    Ok(FunctionOutcome::value(matches!(ord, Some(Ordering::Less | Ordering::Equal))))
}

fn greater_than_or_equal(args: &[FieldValue]) -> Result<FunctionOutcome, CoreError> {
    let ord = ordering("greater_than_or_equal", args)?;
    Ok(FunctionOutcome::value(matches!(ord, Some(Ordering::Greater | Ordering::Equal))))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn truth(outcome: FunctionOutcome) -> bool {
        outcome.value.is_truthy()
    }

    #[test]
    fn test_numeric_comparisons_widen() {
        let args = [FieldValue::Integer(100), FieldValue::from("100.00")];
        assert!(truth(equals(&args).unwrap()));
        assert!(truth(less_than_or_equal(&args).unwrap()));
        assert!(!truth(greater_than(&args).unwrap()));
    }

    #[test]
    fn test_null_is_not_ordered() {
        let args = [FieldValue::Null, FieldValue::Integer(1)];
        assert!(!truth(less_than(&args).unwrap()));
        assert!(!truth(greater_than_or_equal(&args).unwrap()));
        assert!(truth(not_equals(&args).unwrap()));
        assert!(truth(equals(&[FieldValue::Null, FieldValue::Null]).unwrap()));
    }

    #[test]
    fn test_strings_compare_lexically() {
        let args = [FieldValue::from("apple"), FieldValue::from("banana")];
        assert!(truth(less_than(&args).unwrap()));
        assert!(!truth(equals(&args).unwrap()));
    }
}
