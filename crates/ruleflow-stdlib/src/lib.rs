//!
//! Standard library of functions for the Ruleflow engine
//!
//! Every function here is registered by name into a
//! [`FunctionRegistry`](ruleflow_core::FunctionRegistry) and called by rule
//! lines with already-resolved arguments. Producers write their result
//! through a trailing `InputOutput` parameter and also return it, so the same
//! function can serve as a condition or as an action.

pub mod functions;
pub mod reference_data;

pub use functions::register_builtins;
pub use reference_data::{seed_reference_tables, POSTAL_PROVINCES_TABLE, TAX_RATES_TABLE};

use ruleflow_core::FunctionRegistry;

/// A registry holding every built-in function
pub fn builtin_registry() -> FunctionRegistry {
    let mut registry = FunctionRegistry::new();
    register_builtins(&mut registry);
    registry
}
