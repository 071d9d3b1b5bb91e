mod common;

use common::*;
use ruleflow_core::*;
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn test_passing_rule_runs_actions_in_sequence() {
    let interpreter = interpreter();
    let schema = schema();
    let rule = rule(
        "ordered",
        vec![line("c1", 1, "truthy", vec![Parameter::literal(0, json!("1"), FieldType::Boolean)])],
        vec![
            // Declared out of order on purpose
            line("a3", 3, "append", vec![text(0, "c"), Parameter::field(1, "calc.trace")]),
            line("a1", 1, "append", vec![text(0, "a"), Parameter::field(1, "calc.trace")]),
            line("a2", 2, "append", vec![text(0, "b"), Parameter::field(1, "calc.trace")]),
        ],
    );
    let mut ctx = ExecutionContext::new(input(json!({})));

    let outcome = interpreter.execute_rule(&rule, &schema, &mut ctx, None).await.unwrap();

    assert!(outcome.passed);
    assert_eq!(ctx.variables["trace"], json!("abc"));
    let order: Vec<&str> = outcome.actions.iter().map(|a| a.line_id.as_str()).collect();
    assert_eq!(order, vec!["a1", "a2", "a3"]);
}

#[tokio::test]
async fn test_false_condition_skips_all_actions() {
    let interpreter = interpreter();
    let schema = schema();
    let rule = rule(
        "guarded",
        vec![
            line("c1", 1, "truthy", vec![Parameter::literal(0, json!(true), FieldType::Boolean)]),
            line("c2", 2, "is_positive", vec![Parameter::field(0, "order.amount")]),
            line("c3", 3, "truthy", vec![Parameter::literal(0, json!(true), FieldType::Boolean)]),
        ],
        vec![line("a1", 1, "append", vec![text(0, "a"), Parameter::field(1, "calc.trace")])],
    );
    let mut ctx = ExecutionContext::new(input(json!({"amount": -5})));

    let outcome = interpreter.execute_rule(&rule, &schema, &mut ctx, Some("n1")).await.unwrap();

    assert!(!outcome.passed);
    // Short-circuit: the third condition is never evaluated
    assert_eq!(outcome.conditions.len(), 2);
    assert!(outcome.actions.is_empty());
    assert!(ctx.variables.get("trace").is_none());

    let warning = ctx.errors.last().unwrap();
    assert_eq!(warning.severity, Severity::Warning);
    assert_eq!(warning.node_id.as_deref(), Some("n1"));
    assert_eq!(warning.rule_id.as_deref(), Some("guarded"));
    assert!(warning.message.contains("is_positive"));
}

#[tokio::test]
async fn test_field_ref_and_literal_are_interchangeable() {
    let interpreter = interpreter();
    let schema = schema();

    let by_field = rule(
        "by_field",
        vec![],
        vec![line("a1", 1, "double", vec![Parameter::field(0, "order.amount"), Parameter::field(1, "calc.doubled")])],
    );
    let by_literal = rule(
        "by_literal",
        vec![],
        vec![line(
            "a1",
            1,
            "double",
            vec![Parameter::literal(0, json!("21.5"), FieldType::Decimal), Parameter::field(1, "calc.doubled")],
        )],
    );

    let mut a = ExecutionContext::new(input(json!({"amount": 21.5})));
    let mut b = ExecutionContext::new(input(json!({})));
    interpreter.execute_rule(&by_field, &schema, &mut a, None).await.unwrap();
    interpreter.execute_rule(&by_literal, &schema, &mut b, None).await.unwrap();

    assert_eq!(a.variables["doubled"], json!(43.0));
    assert_eq!(a.variables, b.variables);
}

#[tokio::test]
async fn test_output_class_assignments_land_in_output() {
    let interpreter = interpreter();
    let schema = schema();
    let catalog = catalog();
    let rule = catalog.rule("double_amount").unwrap();
    let mut ctx = ExecutionContext::new(input(json!({"order": {"amount": "10"}})));

    let outcome = interpreter.execute_rule(&rule, &schema, &mut ctx, None).await.unwrap();

    assert!(outcome.passed);
    assert_eq!(ctx.variables["doubled"], json!(20.0));
    assert_eq!(ctx.output["total"], json!(20.0));
    assert!(ctx.input().get("doubled").is_none());
}

#[tokio::test]
async fn test_missing_input_resolves_to_zero_with_warning() {
    let interpreter = interpreter();
    let schema = schema();
    let rule = rule(
        "zero",
        vec![],
        vec![line("a1", 1, "double", vec![Parameter::field(0, "order.amount"), Parameter::field(1, "calc.doubled")])],
    );
    let mut ctx = ExecutionContext::new(input(json!({})));

    let outcome = interpreter.execute_rule(&rule, &schema, &mut ctx, None).await.unwrap();

    assert!(outcome.passed);
    assert_eq!(ctx.variables["doubled"], json!(0.0));
    // Only the read-only slot warns; the output slot may start empty
    assert_eq!(ctx.errors.len(), 1);
    assert!(ctx.errors[0].message.contains("order.amount"));
}

#[tokio::test]
async fn test_action_failures() {
    let interpreter = interpreter();
    let schema = schema();

    let validation_only = rule(
        "validation_only",
        vec![],
        vec![
            line("a1", 1, "reject", vec![text(0, "x")]),
            line("a2", 2, "append", vec![text(0, "after"), Parameter::field(1, "calc.trace")]),
        ],
    );
    let mut ctx = ExecutionContext::new(input(json!({})));
    let outcome = interpreter.execute_rule(&validation_only, &schema, &mut ctx, None).await.unwrap();
    assert!(outcome.passed, "validation errors in actions do not flip success");
    assert_eq!(ctx.variables["trace"], json!("after"));
    assert!(!ctx.has_errors());

    let execution = rule(
        "execution",
        vec![],
        vec![
            line("a1", 1, "explode", vec![text(0, "x")]),
            line("a2", 2, "append", vec![text(0, "after"), Parameter::field(1, "calc.trace")]),
        ],
    );
    let mut ctx = ExecutionContext::new(input(json!({})));
    let outcome = interpreter.execute_rule(&execution, &schema, &mut ctx, None).await.unwrap();
    assert!(!outcome.passed);
    assert_eq!(ctx.variables["trace"], json!("after"), "later actions still run");
    assert!(ctx.has_errors());
    assert_eq!(ctx.errors[0].kind, ErrorKind::Execution);
}

#[tokio::test]
async fn test_unknown_function_and_bad_arity_fail_the_rule() {
    let interpreter = interpreter();
    let schema = schema();

    let unknown = rule("unknown", vec![line("c1", 1, "nope", vec![])], vec![]);
    let mut ctx = ExecutionContext::new(input(json!({})));
    let outcome = interpreter.execute_rule(&unknown, &schema, &mut ctx, None).await.unwrap();
    assert!(!outcome.passed);
    assert_eq!(ctx.errors[0].kind, ErrorKind::Lookup);

    let arity = rule("arity", vec![line("c1", 1, "truthy", vec![])], vec![]);
    let mut ctx = ExecutionContext::new(input(json!({})));
    let outcome = interpreter.execute_rule(&arity, &schema, &mut ctx, None).await.unwrap();
    assert!(!outcome.passed);
    assert_eq!(ctx.errors[0].kind, ErrorKind::Validation);
}

#[tokio::test]
async fn test_rule_group_combinations() {
    let interpreter = interpreter();
    let schema = schema();
    let pass = Arc::new(rule("pass", vec![], vec![line("a1", 1, "append", vec![text(0, "p"), Parameter::field(1, "calc.trace")])]));
    let fail = Arc::new(rule("fail", vec![line("c1", 1, "truthy", vec![text(0, "")])], vec![]));
    let group = |combination| RuleGroup {
        id: "g".into(),
        name: "g".into(),
        combination,
        members: vec![],
    };

    let mut ctx = ExecutionContext::new(input(json!({})));
    let and = interpreter
        .execute_group(&group(Combination::And), &[fail.clone(), pass.clone()], &schema, &mut ctx, None)
        .await
        .unwrap();
    assert!(!and.passed);
    assert_eq!(and.rules.len(), 1, "AND stops at the first failure");

    let mut ctx = ExecutionContext::new(input(json!({})));
    let or = interpreter
        .execute_group(&group(Combination::Or), &[pass.clone(), fail.clone()], &schema, &mut ctx, None)
        .await
        .unwrap();
    assert!(or.passed);
    assert_eq!(or.rules.len(), 1, "OR stops at the first success");

    let mut ctx = ExecutionContext::new(input(json!({})));
    let or_all_fail = interpreter
        .execute_group(&group(Combination::Or), &[fail.clone()], &schema, &mut ctx, None)
        .await
        .unwrap();
    assert!(!or_all_fail.passed);

    let empty = interpreter
        .execute_group(&group(Combination::Or), &[], &schema, &mut ctx, None)
        .await
        .unwrap();
    assert!(empty.passed);
}
