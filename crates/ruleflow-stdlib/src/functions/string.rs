//! Text predicates and concatenation

use ruleflow_core::{CoreError, FieldType, FieldValue, FunctionOutcome, FunctionRegistry, FunctionSignature, ParamRole};

use super::{arg, text_arg};

pub(crate) fn register(registry: &mut FunctionRegistry) {
    use ParamRole::{Input, InputOutput};

    let predicate = |name: &str, description: &str| {
        FunctionSignature::new(name, vec![Input, Input])
            .returning(FieldType::Boolean)
            .describe(description)
    };
    registry.register_pure(predicate("contains", "text contains a substring"), contains);
    registry.register_pure(predicate("starts_with", "text starts with a prefix"), starts_with);
    registry.register_pure(predicate("ends_with", "text ends with a suffix"), ends_with);
    registry.register_pure(
        predicate("exists_in", "value is one of a comma-separated list"),
        exists_in,
    );
    registry.register_pure(
        FunctionSignature::new("is_empty", vec![Input])
            .returning(FieldType::Boolean)
            .describe("value is null or blank text"),
        is_empty,
    );
    registry.register_pure(
        FunctionSignature::new("concat", vec![Input, Input, InputOutput])
            .returning(FieldType::String)
            .describe("a followed by b"),
        concat,
    );
}

fn contains(args: &[FieldValue]) -> Result<FunctionOutcome, CoreError> {
    let haystack = text_arg("contains", args, 0)?;
    let needle = text_arg("contains", args, 1)?;
    Ok(FunctionOutcome::value(haystack.contains(&needle)))
}

fn starts_with(args: &[FieldValue]) -> Result<FunctionOutcome, CoreError> {
    let text = text_arg("starts_with", args, 0)?;
    let prefix = text_arg("starts_with", args, 1)?;
    Ok(FunctionOutcome::value(text.starts_with(&prefix)))
}

fn ends_with(args: &[FieldValue]) -> Result<FunctionOutcome, CoreError> {
    let text = text_arg("ends_with", args, 0)?;
    let suffix = text_arg("ends_with", args, 1)?;
    Ok(FunctionOutcome::value(text.ends_with(&suffix)))
}

fn exists_in(args: &[FieldValue]) -> Result<FunctionOutcome, CoreError> {
    let value = text_arg("exists_in", args, 0)?;
    let list = text_arg("exists_in", args, 1)?;
    let value = value.trim();
    let found = !value.is_empty() && list.split(',').any(|item| item.trim() == value);
    Ok(FunctionOutcome::value(found))
}

fn is_empty(args: &[FieldValue]) -> Result<FunctionOutcome, CoreError> {
    let empty = match arg("is_empty", args, 0)? {
        FieldValue::Null => true,
        FieldValue::String(s) => s.trim().is_empty(),
        _ => false,
    };
    Ok(FunctionOutcome::value(empty))
}

fn concat(args: &[FieldValue]) -> Result<FunctionOutcome, CoreError> {
    let joined = text_arg("concat", args, 0)? + &text_arg("concat", args, 1)?;
    Ok(FunctionOutcome::assign(2, joined))
}
