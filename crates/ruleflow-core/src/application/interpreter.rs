//! Rule interpreter
//!
//! Evaluates the condition lines of a rule in sequence order, stopping at
//! the first one that is not satisfied, and then runs every action line.
//! Each line resolves its parameters against the execution context, calls
//! its function through the registry and writes function assignments back
//! into the fields referenced by `InputOutput` parameters.

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::application::lookup::LookupService;
use crate::domain::context::{ErrorDescriptor, ExecutionContext, Severity};
use crate::domain::function::{FunctionEnv, FunctionRegistry, FunctionSignature, ParamRole};
use crate::domain::rule::{Combination, ParameterKind, Rule, RuleGroup, RuleLine};
use crate::domain::schema::{Field, SchemaRegistry};
use crate::error::ErrorKind;
use crate::types::FieldValue;
use crate::CoreError;

/// Result of a single condition or action line
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineResult {
    /// Line id
    pub line_id: String,
    /// Function called
    pub function: String,
    /// Returned value, null when the call raised
    pub value: Value,
    /// Error raised by the line
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of one rule
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleOutcome {
    /// Rule id
    pub rule_id: String,
    /// Conditions held and no action failed
    pub passed: bool,
    /// Evaluated conditions, in order
    pub conditions: Vec<LineResult>,
    /// Executed actions, in order
    pub actions: Vec<LineResult>,
}

/// Result of a rule group
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupOutcome {
    /// Group id
    pub group_id: String,
    /// Combined result
    pub passed: bool,
    /// Outcomes of the rules that were evaluated
    pub rules: Vec<RuleOutcome>,
}

/// Where the interpreter is running, for error descriptors
#[derive(Debug, Clone, Copy)]
struct Site<'a> {
    node_id: Option<&'a str>,
    rule_id: &'a str,
}

impl Site<'_> {
    fn tag(&self, descriptor: ErrorDescriptor) -> ErrorDescriptor {
        let descriptor = descriptor.in_rule(self.rule_id);
        match self.node_id {
            Some(node_id) => descriptor.at_node(node_id),
            None => descriptor,
        }
    }
}

/// Interprets rules and rule groups against an execution context
#[derive(Clone, Debug)]
pub struct RuleInterpreter {
    functions: Arc<FunctionRegistry>,
    env: FunctionEnv,
}

impl RuleInterpreter {
    /// Create an interpreter over a function registry
    pub fn new(functions: Arc<FunctionRegistry>, lookups: Arc<LookupService>) -> Self {
        Self {
            functions,
            env: FunctionEnv::new(lookups),
        }
    }

    /// The function registry used by this interpreter
    pub fn functions(&self) -> &Arc<FunctionRegistry> {
        &self.functions
    }

    /// Evaluate a rule
    ///
    /// Only graph, transition and cancellation errors are returned as `Err`.
    /// Everything else is recorded in the context and reflected in
    /// [`RuleOutcome::passed`].
    pub async fn execute_rule(
        &self,
        rule: &Rule,
        schema: &SchemaRegistry,
        ctx: &mut ExecutionContext,
        node_id: Option<&str>,
    ) -> Result<RuleOutcome, CoreError> {
        let site = Site {
            node_id,
            rule_id: &rule.id,
        };
        let mut outcome = RuleOutcome {
            rule_id: rule.id.clone(),
            passed: true,
            conditions: Vec::new(),
            actions: Vec::new(),
        };

        for line in rule.ordered_conditions() {
            match self.run_line(line, site, schema, ctx).await {
                Ok(value) => {
                    let satisfied = value.is_truthy();
                    debug!(
                        rule_id = %rule.id,
                        line_id = %line.id,
                        function = %line.function,
                        result = satisfied,
                        "Condition evaluated"
                    );
                    outcome.conditions.push(line_result(line, Some(&value), None));
                    if !satisfied {
                        ctx.record(site.tag(ErrorDescriptor::warning(
                            ErrorKind::Validation,
                            format!("rule {} condition {} not satisfied", rule.name, line.function),
                        )));
                        outcome.passed = false;
                        break;
                    }
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(rule_id = %rule.id, line_id = %line.id, error = %e, "Condition raised");
                    outcome.conditions.push(line_result(line, None, Some(&e)));
                    ctx.record(site.tag(ErrorDescriptor::from_error(&e, Severity::Error)));
                    outcome.passed = false;
                    break;
                }
            }
        }

        if !outcome.passed {
            debug!(rule_id = %rule.id, "Conditions not met, skipping actions");
            return Ok(outcome);
        }

        for line in rule.ordered_actions() {
            match self.run_line(line, site, schema, ctx).await {
                Ok(value) => {
                    debug!(rule_id = %rule.id, line_id = %line.id, function = %line.function, "Action executed");
                    outcome.actions.push(line_result(line, Some(&value), None));
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    outcome.actions.push(line_result(line, None, Some(&e)));
                    if matches!(e, CoreError::ValidationError(_)) {
                        warn!(rule_id = %rule.id, line_id = %line.id, error = %e, "Action rejected its parameters");
                        ctx.record(site.tag(ErrorDescriptor::from_error(&e, Severity::Warning)));
                    } else {
                        warn!(rule_id = %rule.id, line_id = %line.id, error = %e, "Action failed");
                        ctx.record(site.tag(ErrorDescriptor::from_error(&e, Severity::Error)));
                        outcome.passed = false;
                    }
                }
            }
        }

        debug!(rule_id = %rule.id, passed = outcome.passed, "Rule evaluated");
        Ok(outcome)
    }

    /// Evaluate a rule group; AND stops at the first failing member, OR at
    /// the first passing one. An empty group passes.
    pub async fn execute_group(
        &self,
        group: &RuleGroup,
        rules: &[Arc<Rule>],
        schema: &SchemaRegistry,
        ctx: &mut ExecutionContext,
        node_id: Option<&str>,
    ) -> Result<GroupOutcome, CoreError> {
        let mut outcome = GroupOutcome {
            group_id: group.id.clone(),
            passed: rules.is_empty() || group.combination == Combination::And,
            rules: Vec::new(),
        };

        for rule in rules {
            let result = self.execute_rule(rule, schema, ctx, node_id).await?;
            let passed = result.passed;
            outcome.rules.push(result);

            match (group.combination, passed) {
                (Combination::And, false) => {
                    outcome.passed = false;
                    break;
                }
                (Combination::Or, true) => {
                    outcome.passed = true;
                    break;
                }
                _ => {}
            }
        }

        debug!(group_id = %group.id, combination = ?group.combination, passed = outcome.passed, "Rule group evaluated");
        Ok(outcome)
    }

    async fn run_line(
        &self,
        line: &RuleLine,
        site: Site<'_>,
        schema: &SchemaRegistry,
        ctx: &mut ExecutionContext,
    ) -> Result<FieldValue, CoreError> {
        let function = self.functions.get(&line.function)?;
        let signature = function.signature();
        let params = line.ordered_parameters();
        signature.check_arity(params.len())?;

        let mut args = Vec::with_capacity(params.len());
        let mut targets: Vec<Option<&Field>> = Vec::with_capacity(params.len());
        for (position, param) in params.iter().enumerate() {
            let (value, target) = resolve_parameter(&param.kind, position, signature, site, schema, ctx)?;
            args.push(value);
            targets.push(target);
        }

        let outcome = function.call(&args, &self.env).await?;

        for (slot, value) in outcome.assignments {
            if signature.params.get(slot) != Some(&ParamRole::InputOutput) {
                return Err(CoreError::ExecutionError(format!(
                    "Function '{}' assigned to non-output position {}",
                    signature.name, slot
                )));
            }
            let field = targets.get(slot).copied().flatten().ok_or_else(|| {
                CoreError::ValidationError(format!(
                    "Output parameter {} of '{}' in line '{}' is not a field reference",
                    slot, signature.name, line.id
                ))
            })?;
            let typed = if value.is_null() {
                value
            } else {
                field.field_type.coerce_value(&value)?
            };
            ctx.write_field(schema, field, typed.to_json());
        }

        Ok(outcome.value)
    }
}

fn resolve_parameter<'s>(
    kind: &ParameterKind,
    position: usize,
    signature: &FunctionSignature,
    site: Site<'_>,
    schema: &'s SchemaRegistry,
    ctx: &mut ExecutionContext,
) -> Result<(FieldValue, Option<&'s Field>), CoreError> {
    match kind {
        ParameterKind::Literal { value, field_type } => Ok((field_type.coerce(value)?, None)),
        ParameterKind::FieldRef { field } => {
            let field = schema.resolve(field)?;
            let raw = ctx.read_field(schema, field).cloned();
            match schema.coerce(field, raw.as_ref())? {
                Some(value) => Ok((value, Some(field))),
                None => {
                    let is_output_slot = signature.params.get(position) == Some(&ParamRole::InputOutput);
                    if !is_output_slot {
                        ctx.record(site.tag(ErrorDescriptor::warning(
                            ErrorKind::Validation,
                            format!("missing value for {}", schema.qualified_name(field)),
                        )));
                    }
                    Ok((field.field_type.zero_value(), Some(field)))
                }
            }
        }
    }
}

fn line_result(line: &RuleLine, value: Option<&FieldValue>, error: Option<&CoreError>) -> LineResult {
    LineResult {
        line_id: line.id.clone(),
        function: line.function.clone(),
        value: value.map(FieldValue::to_json).unwrap_or(Value::Null),
        error: error.map(ToString::to_string),
    }
}
