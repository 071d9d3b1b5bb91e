use ruleflow_core::domain::repository::memory::{
    MemoryFlowDefinitionRepository, MemoryJobRepository, MemoryReferenceTableRepository,
};
use ruleflow_core::*;
use ruleflow_stdlib::{builtin_registry, seed_reference_tables};
use serde_json::{json, Value};
use std::sync::Arc;

fn class(id: &str, class_type: ClassType, parent: Option<&str>) -> FieldClass {
    FieldClass {
        id: id.into(),
        name: id.into(),
        class_type,
        parent_id: parent.map(Into::into),
        description: None,
    }
}

fn field(class_id: &str, name: &str, field_type: FieldType) -> Field {
    Field {
        id: format!("{}.{}", class_id, name),
        class_id: class_id.into(),
        name: name.into(),
        field_type,
        size: None,
        default: None,
    }
}

fn line(id: &str, sequence: u32, function: &str, parameters: Vec<Parameter>) -> RuleLine {
    RuleLine {
        id: id.into(),
        sequence,
        function: function.into(),
        parameters,
    }
}

fn catalog() -> Catalog {
    let schema = SchemaRegistry::new(
        vec![
            class("tax_request", ClassType::Input, None),
            class("tax_work", ClassType::Variable, Some("tax_request")),
            class("tax_response", ClassType::Output, Some("tax_request")),
        ],
        vec![
            field("tax_request", "postal_code", FieldType::String),
            field("tax_request", "base_amount", FieldType::Decimal),
            field("tax_work", "postal_code_exists", FieldType::Boolean),
            field("tax_work", "province", FieldType::String),
            field("tax_work", "tax_rate", FieldType::Decimal),
            field("tax_response", "total_tax", FieldType::Decimal),
        ],
    )
    .unwrap();

    let rule = Rule {
        id: "canadian_sales_tax".into(),
        name: "Canadian sales tax".into(),
        rule_type: Some("rating".into()),
        class_id: "tax_request".into(),
        conditions: vec![line(
            "c1",
            1,
            "exists_in_postal_code",
            vec![
                Parameter::field(0, "tax_request.postal_code"),
                Parameter::field(1, "tax_work.postal_code_exists"),
            ],
        )],
        actions: vec![
            line(
                "a1",
                1,
                "get_province_from_postal_code",
                vec![
                    Parameter::field(0, "tax_request.postal_code"),
                    Parameter::field(1, "tax_work.province"),
                ],
            ),
            line(
                "a2",
                2,
                "get_tax_rate",
                vec![
                    Parameter::field(0, "tax_work.province"),
                    Parameter::literal(1, json!("total"), FieldType::String),
                    Parameter::field(2, "tax_work.tax_rate"),
                ],
            ),
            line(
                "a3",
                3,
                "calculate_tax_amount",
                vec![
                    Parameter::field(0, "tax_request.base_amount"),
                    Parameter::field(1, "tax_work.tax_rate"),
                    Parameter::field(2, "tax_response.total_tax"),
                ],
            ),
        ],
    };

    let stations = ["validation", "priced", "rejected"]
        .iter()
        .map(|id| Station {
            id: id.to_string(),
            name: id.to_string(),
            description: None,
        })
        .collect();

    Catalog::new(schema, vec![rule], vec![], stations).unwrap()
}

fn node(id: &str, kind: NodeKind, reference: &str) -> Node {
    Node {
        id: id.into(),
        kind,
        reference_id: reference.into(),
        label: None,
        settings: Value::Null,
        parent_id: None,
    }
}

fn edge(from: &str, to: &str, connection_type: ConnectionType) -> Connection {
    Connection {
        source_id: from.into(),
        target_id: to.into(),
        connection_type,
        condition: None,
        label: None,
    }
}

fn tax_flow() -> FlowDefinition {
    FlowDefinition {
        id: FlowId("sales_tax".into()),
        name: "Sales tax".into(),
        version: "1".into(),
        description: None,
        start_nodes: vec!["validation".into()],
        nodes: vec![
            node("validation", NodeKind::Station, "validation"),
            node("tax", NodeKind::Rule, "canadian_sales_tax"),
            node("priced", NodeKind::Station, "priced"),
            node("rejected", NodeKind::Station, "rejected"),
        ],
        connections: vec![
            edge("validation", "tax", ConnectionType::Success),
            edge("tax", "priced", ConnectionType::Success),
            edge("tax", "rejected", ConnectionType::Failure),
        ],
    }
}

async fn jobs() -> Arc<JobService> {
    let tables = MemoryReferenceTableRepository::new();
    seed_reference_tables(&tables);
    let lookups = Arc::new(LookupService::new(Arc::new(tables), LookupConfig::default()));
    let interpreter = Arc::new(RuleInterpreter::new(Arc::new(builtin_registry()), lookups));

    let flows = Arc::new(FlowDefinitionService::new(
        Arc::new(MemoryFlowDefinitionRepository::new()),
        catalog(),
    ));
    flows.deploy_definition(tax_flow()).await.unwrap();

    Arc::new(JobService::new(
        Arc::new(MemoryJobRepository::new()),
        flows,
        Arc::new(FlowExecutionService::new(interpreter)),
        JobServiceConfig::default(),
    ))
}

fn input(value: Value) -> serde_json::Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

fn visited(result: &JobResult) -> Vec<&str> {
    result.visited.iter().map(|v| v.node_id.as_str()).collect()
}

#[tokio::test]
async fn test_registered_postal_code_is_taxed() {
    let jobs = jobs().await;

    let job = jobs
        .execute_sync(
            FlowId("sales_tax".into()),
            input(json!({"postal_code": "M5V", "base_amount": 100})),
        )
        .await
        .unwrap();

    assert_eq!(job.status, JobStatus::Completed);
    let result = job.result.unwrap();
    assert_eq!(result.output["total_tax"], json!(13.0));
    assert_eq!(result.variables["postal_code_exists"], json!(true));
    assert_eq!(result.variables["province"], json!("ON"));
    assert!(result.errors.is_empty());
    assert_eq!(visited(&result), vec!["validation", "tax", "priced"]);
}

#[tokio::test]
async fn test_unregistered_postal_code_takes_failure_edge() {
    let jobs = jobs().await;

    let job = jobs
        .execute_sync(
            FlowId("sales_tax".into()),
            input(json!({"postal_code": "ZZZ", "base_amount": 100})),
        )
        .await
        .unwrap();

    let result = job.result.unwrap();
    assert_eq!(result.variables["postal_code_exists"], json!(false));
    assert!(!result.errors.is_empty());
    assert_eq!(result.errors[0].severity, Severity::Warning);
    assert_eq!(visited(&result), vec!["validation", "tax", "rejected"]);
    assert!(result.output.get("total_tax").is_none());
    // The failure was recovered by the FAILURE edge
    assert_eq!(job.status, JobStatus::Completed);
}

#[tokio::test]
async fn test_quebec_combines_gst_and_qst() {
    let jobs = jobs().await;

    let job = jobs
        .execute_sync(
            FlowId("sales_tax".into()),
            input(json!({"postal_code": "h3a 0g4", "base_amount": "200.00"})),
        )
        .await
        .unwrap();

    let result = job.result.unwrap();
    assert_eq!(result.variables["province"], json!("QC"));
    assert_eq!(result.output["total_tax"], json!(29.95));
}
