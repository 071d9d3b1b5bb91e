use ruleflow_core::{CoreError, FieldValue, FunctionOutcome, FunctionRegistry, FunctionSignature, ParamRole};

use super::arg;

pub(crate) fn register(registry: &mut FunctionRegistry) {
    registry.register_pure(
        FunctionSignature::new("set_variable", vec![ParamRole::Input, ParamRole::InputOutput])
            .describe("copy a value into a field"),
        set_variable,
    );
}

fn set_variable(args: &[FieldValue]) -> Result<FunctionOutcome, CoreError> {
    let value = arg("set_variable", args, 0)?.clone();
    Ok(FunctionOutcome::assign(1, value))
}
