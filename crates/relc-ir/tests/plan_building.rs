//! Operator trees built from JSON plans and from the fluent builders
//! must agree on shape and schema.

use pretty_assertions::assert_eq;
use relc_ir::{
    count_star, DataType, InMemoryCatalog, IrError, PlanSpec, RelExt, RelKind, RelNode, Schema,
    TableSchema, Field,
};

fn setup_schema_provider() -> InMemoryCatalog {
    InMemoryCatalog::from(vec![
        TableSchema {
            name: "table".to_string(),
            fields: vec![
                Field::new("a", DataType::Int8),
                Field::new("b", DataType::Int16),
                Field::new("c", DataType::Int32),
                Field::new("g", DataType::String),
                Field::new("i", DataType::Timestamp),
            ],
        },
        TableSchema {
            name: "users".to_string(),
            fields: vec![
                Field::new("id", DataType::Int64),
                Field::new("name", DataType::String),
            ],
        },
    ])
}

fn table_schema() -> Schema {
    Schema::from_pairs([
        ("a", DataType::Int8),
        ("b", DataType::Int16),
        ("c", DataType::Int32),
        ("g", DataType::String),
        ("i", DataType::Timestamp),
    ])
}

#[test]
fn test_json_plan_matches_builder_plan() {
    let json = r#"{
        "op": "aggregate",
        "input": {"op": "table", "name": "table"},
        "keys": [{"expr": {"type": "column", "name": "i"}}],
        "metrics": [{"expr": {"type": "aggregate", "func": "count"}, "alias": "count"}]
    }"#;
    let spec: PlanSpec = serde_json::from_str(json).unwrap();
    let from_json = spec.build(&setup_schema_provider()).unwrap();

    let t = RelNode::table("table", table_schema()).unwrap();
    let from_builder = t.group_by(vec![t.col("i").unwrap().into()]).size().unwrap();

    assert_eq!(from_json, from_builder);
}

#[test]
fn test_join_plan_resolves_qualified_columns() {
    let json = r#"{
        "op": "join",
        "kind": "left",
        "left": {"op": "table", "name": "table"},
        "right": {"op": "table", "name": "users"},
        "predicates": [{"type": "binary", "op": "eq",
                        "left": {"type": "column", "name": "a", "table": "table"},
                        "right": {"type": "column", "name": "id", "table": "users"}}]
    }"#;
    let spec: PlanSpec = serde_json::from_str(json).unwrap();
    let rel = spec.build(&setup_schema_provider()).unwrap();

    assert!(matches!(rel.kind(), RelKind::Join { .. }));
    assert_eq!(rel.schema().names(), vec!["a", "b", "c", "g", "i", "id", "name"]);
}

#[test]
fn test_join_plan_unknown_column() {
    let json = r#"{
        "op": "join",
        "left": {"op": "table", "name": "table"},
        "right": {"op": "table", "name": "users"},
        "predicates": [{"type": "binary", "op": "eq",
                        "left": {"type": "column", "name": "nope"},
                        "right": {"type": "column", "name": "id"}}]
    }"#;
    let spec: PlanSpec = serde_json::from_str(json).unwrap();
    let err = spec.build(&setup_schema_provider()).unwrap_err();
    assert!(matches!(err, IrError::ColumnNotFound { ref column, .. } if column == "nope"));
}

#[test]
fn test_filtered_nunique_from_json() {
    let json = r#"{
        "op": "aggregate",
        "input": {"op": "table", "name": "table"},
        "metrics": [{"expr": {
            "type": "aggregate", "func": "nunique",
            "arg": {"type": "column", "name": "b"},
            "filter": {"type": "binary", "op": "eq",
                       "left": {"type": "column", "name": "g"},
                       "right": {"type": "literal", "value": "A"}}
        }}]
    }"#;
    let spec: PlanSpec = serde_json::from_str(json).unwrap();
    let rel = spec.build(&setup_schema_provider()).unwrap();
    assert_eq!(rel.schema().names(), vec!["CountDistinct(b)"]);
    assert_eq!(rel.schema().fields[0].data_type, DataType::Int64);
}

#[test]
fn test_window_plan() {
    let json = r#"{
        "op": "window",
        "input": {"op": "table", "name": "table"},
        "exprs": [{"alias": "prev_b", "expr": {
            "type": "window", "func": "lag",
            "args": [{"type": "column", "name": "b"}, {"type": "literal", "value": 2}],
            "partition_by": [{"type": "column", "name": "g"}],
            "order_by": [{"expr": {"type": "column", "name": "i"}, "desc": true}]
        }}]
    }"#;
    let spec: PlanSpec = serde_json::from_str(json).unwrap();
    let rel = spec.build(&setup_schema_provider()).unwrap();
    assert_eq!(rel.schema().find_field("prev_b").unwrap().data_type, DataType::Int16);
}

#[test]
fn test_having_with_builder_scope() {
    let t = RelNode::table("table", table_schema()).unwrap();
    let rel = t
        .group_by(vec![t.col("g").unwrap().into()])
        .having(count_star().gt_eq(1000).unwrap())
        .unwrap()
        .aggregate(vec![t.col("b").unwrap().sum().unwrap().name("b_sum")])
        .unwrap();

    match rel.kind() {
        RelKind::Having { input, predicates } => {
            assert_eq!(input.kind_name(), "Aggregate");
            assert_eq!(predicates.len(), 1);
        }
        other => panic!("expected having, got {:?}", other),
    }
}

#[test]
fn test_unknown_function_rejected() {
    let json = r#"{
        "op": "project",
        "input": {"op": "table", "name": "table"},
        "exprs": [{"expr": {"type": "call", "func": "frobnicate", "args": []}}]
    }"#;
    let spec: PlanSpec = serde_json::from_str(json).unwrap();
    assert!(matches!(
        spec.build(&setup_schema_provider()),
        Err(IrError::InvalidPlan(_))
    ));
}
