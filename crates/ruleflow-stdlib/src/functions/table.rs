//! Reference table functions
//!
//! A key without a row is not an error: `table_lookup` returns null and
//! leaves its output field untouched, `table_exists_in` returns `false`.
//! An unknown table is a `LookupError` raised by the repository.

use async_trait::async_trait;
use ruleflow_core::{
    CoreError, FieldType, FieldValue, Function, FunctionEnv, FunctionOutcome, FunctionRegistry, FunctionSignature,
    LookupResult, ParamRole,
};
use std::sync::Arc;

use super::text_arg;

pub(crate) fn register(registry: &mut FunctionRegistry) {
    registry.register(Arc::new(TableLookup::new()));
    registry.register(Arc::new(TableExistsIn::new()));
}

/// `table_lookup(table, key, column, out)`
pub struct TableLookup {
    signature: FunctionSignature,
}

impl TableLookup {
    pub fn new() -> Self {
        use ParamRole::{Input, InputOutput};
        Self {
            signature: FunctionSignature::new("table_lookup", vec![Input, Input, Input, InputOutput])
                .describe("column of the row stored under a key"),
        }
    }
}

impl Default for TableLookup {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Function for TableLookup {
    fn signature(&self) -> &FunctionSignature {
        &self.signature
    }

    async fn call(&self, args: &[FieldValue], env: &FunctionEnv) -> Result<FunctionOutcome, CoreError> {
        let table = text_arg("table_lookup", args, 0)?;
        let key = text_arg("table_lookup", args, 1)?;
        let column = text_arg("table_lookup", args, 2)?;

        match env.lookups.value(&table, key.trim(), &column).await? {
            Some(raw) => Ok(FunctionOutcome::assign(3, FieldValue::from_json(&raw))),
            None => {
                tracing::debug!(table = %table, key = %key, column = %column, "No value in reference table");
                Ok(FunctionOutcome::value(FieldValue::Null))
            }
        }
    }
}

/// `table_exists_in(table, key, out)`
pub struct TableExistsIn {
    signature: FunctionSignature,
}

impl TableExistsIn {
    pub fn new() -> Self {
        use ParamRole::{Input, InputOutput};
        Self {
            signature: FunctionSignature::new("table_exists_in", vec![Input, Input, InputOutput])
                .returning(FieldType::Boolean)
                .describe("whether a table has a row under a key"),
        }
    }
}

impl Default for TableExistsIn {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Function for TableExistsIn {
    fn signature(&self) -> &FunctionSignature {
        &self.signature
    }

    async fn call(&self, args: &[FieldValue], env: &FunctionEnv) -> Result<FunctionOutcome, CoreError> {
        let table = text_arg("table_exists_in", args, 0)?;
        let key = text_arg("table_exists_in", args, 1)?;
        let found = matches!(env.lookups.lookup(&table, key.trim()).await?, LookupResult::Found(_));
        Ok(FunctionOutcome::assign(2, found))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ruleflow_core::domain::repository::memory::MemoryReferenceTableRepository;
    use ruleflow_core::{LookupConfig, LookupService};
    use serde_json::json;

    fn env() -> FunctionEnv {
        let repo = MemoryReferenceTableRepository::new();
        repo.put_row("rates", "ON", json!({"hst": 0.13}).as_object().cloned().unwrap());
        FunctionEnv::new(Arc::new(LookupService::new(Arc::new(repo), LookupConfig::default())))
    }

    fn args(values: &[&str]) -> Vec<FieldValue> {
        let mut args: Vec<FieldValue> = values.iter().map(|v| FieldValue::from(*v)).collect();
        args.push(FieldValue::Null);
        args
    }

    #[tokio::test]
    async fn test_lookup_found_and_missing() {
        let env = env();
        let lookup = TableLookup::new();

        let hit = lookup.call(&args(&["rates", "ON", "hst"]), &env).await.unwrap();
        assert_eq!(hit.value.as_text(), "0.13");
        assert_eq!(hit.assignments.len(), 1);

        let miss = lookup.call(&args(&["rates", "QC", "hst"]), &env).await.unwrap();
        assert!(miss.value.is_null());
        assert!(miss.assignments.is_empty());

        let err = lookup.call(&args(&["nope", "ON", "hst"]), &env).await.unwrap_err();
        assert!(matches!(err, CoreError::LookupError(_)));
    }

    #[tokio::test]
    async fn test_exists_in() {
        let env = env();
        let exists = TableExistsIn::new();
        let outcome = exists.call(&args(&["rates", " ON "]), &env).await.unwrap();
        assert_eq!(outcome.value, FieldValue::Boolean(true));
        let outcome = exists.call(&args(&["rates", "BC"]), &env).await.unwrap();
        assert_eq!(outcome.assignments, vec![(2, FieldValue::Boolean(false))]);
    }
}
