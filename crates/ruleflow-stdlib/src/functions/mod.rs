//! Built-in function catalogue

pub mod arithmetic;
pub mod comparison;
pub mod string;
pub mod table;
pub mod tax;
pub mod variables;

use bigdecimal::BigDecimal;
use ruleflow_core::{CoreError, FieldValue, FunctionRegistry};

/// Register every built-in function
pub fn register_builtins(registry: &mut FunctionRegistry) {
    comparison::register(registry);
    string::register(registry);
    arithmetic::register(registry);
    variables::register(registry);
    table::register(registry);
    tax::register(registry);
    tracing::debug!(functions = registry.len(), "Built-in functions registered");
}

/// Numeric argument at `index`; non-numeric values are a `ValidationError`
pub(crate) fn decimal_arg(function: &str, args: &[FieldValue], index: usize) -> Result<BigDecimal, CoreError> {
    let arg = arg(function, args, index)?;
    arg.as_decimal().ok_or_else(|| {
        CoreError::ValidationError(format!(
            "{}: parameter {} is not numeric: {}",
            function, index, arg
        ))
    })
}

/// Non-negative integer argument at `index`
pub(crate) fn count_arg(function: &str, args: &[FieldValue], index: usize) -> Result<u32, CoreError> {
    let value = decimal_arg(function, args, index)?;
    if !value.is_integer() {
        return Err(CoreError::ValidationError(format!(
            "{}: parameter {} must be a whole number, got {}",
            function, index, value
        )));
    }
    value.with_scale(0).to_string().parse::<u32>().map_err(|_| {
        CoreError::ValidationError(format!(
            "{}: parameter {} must be a non-negative integer, got {}",
            function, index, value
        ))
    })
}

/// Text of the argument at `index`
pub(crate) fn text_arg(function: &str, args: &[FieldValue], index: usize) -> Result<String, CoreError> {
    Ok(arg(function, args, index)?.as_text())
}

pub(crate) fn arg<'a>(function: &str, args: &'a [FieldValue], index: usize) -> Result<&'a FieldValue, CoreError> {
    args.get(index).ok_or_else(|| {
        CoreError::ValidationError(format!("{}: missing parameter {}", function, index))
    })
}
