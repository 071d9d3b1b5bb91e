#![allow(dead_code)]

use ruleflow_core::domain::repository::memory::{
    MemoryFlowDefinitionRepository, MemoryJobRepository, MemoryReferenceTableRepository,
};
use ruleflow_core::*;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;

pub fn class(id: &str, class_type: ClassType, parent: Option<&str>) -> FieldClass {
    FieldClass {
        id: id.to_string(),
        name: id.to_string(),
        class_type,
        parent_id: parent.map(str::to_string),
        description: None,
    }
}

pub fn field(class_id: &str, name: &str, field_type: FieldType) -> Field {
    Field {
        id: format!("{}.{}", class_id, name),
        class_id: class_id.to_string(),
        name: name.to_string(),
        field_type,
        size: None,
        default: None,
    }
}

/// `order` input class with a `calc` variable child and a `result` output child
pub fn schema() -> SchemaRegistry {
    SchemaRegistry::new(
        vec![
            class("order", ClassType::Input, None),
            class("calc", ClassType::Variable, Some("order")),
            class("result", ClassType::Output, Some("order")),
        ],
        vec![
            field("order", "amount", FieldType::Decimal),
            field("order", "code", FieldType::String),
            field("calc", "doubled", FieldType::Decimal),
            field("calc", "trace", FieldType::String),
            field("calc", "flag", FieldType::Boolean),
            field("result", "total", FieldType::Decimal),
        ],
    )
    .unwrap()
}

fn is_positive(args: &[FieldValue]) -> Result<FunctionOutcome, CoreError> {
    let positive = args[0]
        .as_decimal()
        .map_or(false, |d| d > bigdecimal::BigDecimal::from(0));
    Ok(FunctionOutcome::value(positive))
}

fn double(args: &[FieldValue]) -> Result<FunctionOutcome, CoreError> {
    let value = args[0]
        .as_decimal()
        .ok_or_else(|| CoreError::ValidationError("not a number".into()))?;
    Ok(FunctionOutcome::assign(1, value * bigdecimal::BigDecimal::from(2)))
}

fn append(args: &[FieldValue]) -> Result<FunctionOutcome, CoreError> {
    Ok(FunctionOutcome::assign(1, format!("{}{}", args[1].as_text(), args[0].as_text())))
}

fn explode(_args: &[FieldValue]) -> Result<FunctionOutcome, CoreError> {
    Err(CoreError::ExecutionError("exploded".into()))
}

fn reject(_args: &[FieldValue]) -> Result<FunctionOutcome, CoreError> {
    Err(CoreError::ValidationError("rejected".into()))
}

fn truthy(args: &[FieldValue]) -> Result<FunctionOutcome, CoreError> {
    Ok(FunctionOutcome::value(args[0].is_truthy()))
}

pub fn functions() -> FunctionRegistry {
    use ParamRole::{Input, InputOutput};
    let mut registry = FunctionRegistry::new();
    registry.register_pure(FunctionSignature::new("is_positive", vec![Input]), is_positive);
    registry.register_pure(FunctionSignature::new("double", vec![Input, InputOutput]), double);
    registry.register_pure(FunctionSignature::new("append", vec![Input, InputOutput]), append);
    registry.register_pure(FunctionSignature::new("explode", vec![Input]), explode);
    registry.register_pure(FunctionSignature::new("reject", vec![Input]), reject);
    registry.register_pure(FunctionSignature::new("truthy", vec![Input]), truthy);
    registry
}

pub fn line(id: &str, sequence: u32, function: &str, parameters: Vec<Parameter>) -> RuleLine {
    RuleLine {
        id: id.to_string(),
        sequence,
        function: function.to_string(),
        parameters,
    }
}

pub fn rule(id: &str, conditions: Vec<RuleLine>, actions: Vec<RuleLine>) -> Rule {
    Rule {
        id: id.to_string(),
        name: id.to_string(),
        rule_type: None,
        class_id: "order".to_string(),
        conditions,
        actions,
    }
}

pub fn text(index: usize, value: &str) -> Parameter {
    Parameter::literal(index, json!(value), FieldType::String)
}

/// Rules used by the flow tests
pub fn rules() -> Vec<Rule> {
    vec![
        // Doubles the amount into Variables and copies it to Output
        rule(
            "double_amount",
            vec![line("c1", 1, "is_positive", vec![Parameter::field(0, "order.amount")])],
            vec![
                line("a1", 1, "double", vec![Parameter::field(0, "order.amount"), Parameter::field(1, "calc.doubled")]),
                line("a2", 2, "double", vec![Parameter::field(0, "order.amount"), Parameter::field(1, "result.total")]),
            ],
        ),
        rule(
            "mark_left",
            vec![],
            vec![line("a1", 1, "append", vec![text(0, "L"), Parameter::field(1, "calc.trace")])],
        ),
        rule(
            "mark_right",
            vec![],
            vec![line("a1", 1, "append", vec![text(0, "R"), Parameter::field(1, "calc.trace")])],
        ),
        rule(
            "always_fails",
            vec![],
            vec![line("a1", 1, "explode", vec![text(0, "x")])],
        ),
    ]
}

pub fn stations() -> Vec<Station> {
    ["start", "done", "recovered", "left_done", "right_done"]
        .iter()
        .map(|id| Station {
            id: id.to_string(),
            name: id.to_string(),
            description: None,
        })
        .collect()
}

pub fn catalog() -> Catalog {
    let groups = vec![RuleGroup {
        id: "both_marks".into(),
        name: "both marks".into(),
        combination: Combination::And,
        members: vec![
            RuleGroupMember { rule_id: "mark_left".into(), sequence: 1 },
            RuleGroupMember { rule_id: "mark_right".into(), sequence: 2 },
        ],
    }];
    Catalog::new(schema(), rules(), groups, stations()).unwrap()
}

pub fn node(id: &str, kind: NodeKind, reference: &str) -> Node {
    Node {
        id: id.to_string(),
        kind,
        reference_id: reference.to_string(),
        label: None,
        settings: Value::Null,
        parent_id: None,
    }
}

pub fn edge(from: &str, to: &str, connection_type: ConnectionType) -> Connection {
    Connection {
        source_id: from.to_string(),
        target_id: to.to_string(),
        connection_type,
        condition: None,
        label: None,
    }
}

pub fn flow(id: &str, nodes: Vec<Node>, connections: Vec<Connection>) -> FlowDefinition {
    FlowDefinition {
        id: FlowId(id.to_string()),
        name: id.to_string(),
        version: "1".to_string(),
        description: None,
        start_nodes: vec![],
        nodes,
        connections,
    }
}

pub fn input(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

pub fn lookups() -> Arc<LookupService> {
    Arc::new(LookupService::new(
        Arc::new(MemoryReferenceTableRepository::new()),
        LookupConfig::default(),
    ))
}

pub fn interpreter() -> Arc<RuleInterpreter> {
    Arc::new(RuleInterpreter::new(Arc::new(functions()), lookups()))
}

pub struct Harness {
    pub flows: Arc<FlowDefinitionService>,
    pub jobs: Arc<JobService>,
}

pub fn harness(config: JobServiceConfig) -> Harness {
    let flows = Arc::new(FlowDefinitionService::new(
        Arc::new(MemoryFlowDefinitionRepository::new()),
        catalog(),
    ));
    let executor = Arc::new(FlowExecutionService::new(interpreter()));
    let jobs = Arc::new(JobService::new(
        Arc::new(MemoryJobRepository::new()),
        flows.clone(),
        executor,
        config,
    ));
    Harness { flows, jobs }
}

pub fn fast_config() -> JobServiceConfig {
    JobServiceConfig {
        queue_capacity: 16,
        max_retries: 2,
        job_query_timeout: Duration::from_millis(500),
    }
}

/// start -> double_amount --SUCCESS--> done, --FAILURE--> recovered
pub fn doubling_flow() -> FlowDefinition {
    flow(
        "doubling",
        vec![
            node("start", NodeKind::Station, "start"),
            node("double", NodeKind::Rule, "double_amount"),
            node("done", NodeKind::Station, "done"),
            node("recovered", NodeKind::Station, "recovered"),
        ],
        vec![
            edge("start", "double", ConnectionType::Success),
            edge("double", "done", ConnectionType::Success),
            edge("double", "recovered", ConnectionType::Failure),
        ],
    )
}

/// A single rule that always fails, with no recovery edge
pub fn failing_flow() -> FlowDefinition {
    flow("failing", vec![node("boom", NodeKind::Rule, "always_fails")], vec![])
}
