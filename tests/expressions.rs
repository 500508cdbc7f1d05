use json_dynamik::{DynAttr, Dynamik};
use serde_json::{Value, json};

fn build(schema: Value, value: Value, context: Value) -> Dynamik {
    Dynamik::builder().schema(schema).context(context).build(value).unwrap()
}

#[test]
fn defaults_without_attributes() {
    let dynamik = build(
        json!({ "type": "object", "properties": { "first": { "type": "string" }, "second": { "type": "string" } } }),
        json!({ "first": "the value" }),
        json!("the context"),
    );
    let root = dynamik.pointer();
    assert_eq!(root.abstract_text(), "the value");
    assert!(!root.hidden());
    assert!(!root.readonly());
    assert!(!root.mandatory());
    assert!(!root.minimized());
    assert!(root.only());
    assert!(root.kind());
    assert_eq!(root.change(), None);
    assert_eq!(root.rank(), None);
    assert_eq!(root.expression(), None);
    assert_eq!(root.init(), None);
    assert_eq!(root.match_value(), None);
}

#[test]
fn every_attribute_compiles() {
    let dynamik = build(
        json!({
            "type": "object",
            "_abstract": "${value.first}/${$.key}/${$.context}",
            "_hidden": "  true ",
            "_readonly": " true",
            "_mandatory": " true",
            "_minimized": " true",
            "_only": " false",
            "_kind": " false",
            "_rank": " 1 ",
            "_change": " 2 ",
            "_expression": " 3 ",
            "_init": " 4 ",
            "properties": { "first": { "type": "string" } }
        }),
        json!({ "first": "the value" }),
        json!("the context"),
    );
    let root = dynamik.pointer();
    // `$.key` is undefined at the root and renders empty
    assert_eq!(root.abstract_text(), "the value//the context");
    assert!(root.hidden());
    assert!(root.readonly());
    assert!(root.mandatory());
    assert!(root.minimized());
    assert!(!root.only());
    assert!(!root.kind());
    assert_eq!(root.rank(), Some(json!(1)));
    assert_eq!(root.change(), Some(json!(2)));
    assert_eq!(root.expression(), Some(json!(3)));
    assert_eq!(root.init(), Some(json!(4)));
    assert_eq!(root.attribute(DynAttr::Rank), Some(json!(1)));
}

#[test]
fn multiline_expressions_render_each_line() {
    let dynamik = build(
        json!({
            "type": "object",
            "_change": ["${value.first}", "${$.key}", "${$.context}"],
            "properties": { "first": { "type": "string" } }
        }),
        json!({ "first": "the value" }),
        json!("the context"),
    );
    let change = dynamik.pointer().change().unwrap();
    assert_eq!(change.as_str().unwrap().replace('\n', " "), "the value  the context ");
}

#[test]
fn mandatory_from_required_or_flag() {
    let dynamik = build(
        json!({
            "type": "object",
            "properties": {
                "first": { "type": "string" },
                "second": { "type": "string" },
                "third": { "type": "string", "_mandatory": " true " },
                "fourth": { "type": "string", "_mandatory": " false " },
                "fifth": { "type": "string", "_mandatory": " true " }
            },
            "required": ["second", "fourth"]
        }),
        json!({ "first": "first value", "second": "second value", "third": "third value", "fourth": "fourth value" }),
        Value::Null,
    );
    let root = dynamik.pointer();
    let mandatory: Vec<bool> = ["/first", "/second", "/third", "/fourth", "/fifth"]
        .into_iter()
        .map(|p| root.to(p).unwrap().mandatory())
        .collect();
    assert_eq!(mandatory, [false, true, true, true, true]);
}

#[test]
fn tag_backreferences() {
    let dynamik = build(
        json!({
            "type": "object",
            "_abstract": "${ _`0/a` + _`0/b` }",
            "_rank": "_`0/b` + _`0/c`",
            "properties": {
                "a": { "_abstract": "${_`1/a` + _`1/c`}", "type": "number" },
                "b": { "type": "number" },
                "c": { "type": "number" }
            }
        }),
        json!({ "a": 1, "b": 2, "c": 3 }),
        Value::Null,
    );
    let root = dynamik.pointer();
    assert_eq!(root.rank(), Some(json!(5)));
    assert_eq!(root.abstract_text(), "3");
    assert_eq!(root.to("/a").unwrap().abstract_text(), "4");
}

#[test]
fn tag_assignment_writes_through_the_protocol() {
    let dynamik = build(
        json!({
            "type": "object",
            "properties": {
                "source": { "type": "number" },
                "mirror": { "type": "number" },
                "sync": { "type": "boolean", "_change": "_`1/mirror${ _`1/source` * 10 }`" }
            }
        }),
        json!({ "source": 4, "mirror": 0, "sync": true }),
        Value::Null,
    );
    let sync = dynamik.at("/sync").unwrap();
    sync.change();
    assert_eq!(dynamik.at("/mirror").unwrap().value(), Some(json!(40)));
}

#[test]
fn failing_expressions_fall_back_per_kind() {
    let dynamik = build(
        json!({
            "type": "object",
            "properties": {
                "a": {
                    "type": "string",
                    "_abstract": "${ value.missing.deeper }",
                    "_hidden": "value +",
                    "_rank": "_`9/nowhere`"
                }
            }
        }),
        json!({ "a": "x" }),
        Value::Null,
    );
    let a = dynamik.at("/a").unwrap();
    assert_eq!(a.abstract_text(), "");
    assert!(a.hidden(), "a parse failure compiles to the boolean fallback");
    assert_eq!(a.rank(), Some(Value::Null));
}

#[test]
fn context_and_methods_in_expressions() {
    let dynamik = build(
        json!({
            "type": "object",
            "properties": {
                "name": {
                    "type": "string",
                    "_abstract": "${ value.trim().toUpperCase() } (${ $.context.roles.join('+') })",
                    "_hidden": "!$.context.roles.includes('admin')"
                }
            }
        }),
        json!({ "name": "  ada " }),
        json!({ "roles": ["editor", "viewer"] }),
    );
    let name = dynamik.at("/name").unwrap();
    assert_eq!(name.abstract_text(), "ADA (editor+viewer)");
    assert!(name.hidden());
}
