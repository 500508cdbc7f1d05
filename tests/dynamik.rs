use std::cell::RefCell;
use std::rc::Rc;

use json_dynamik::dynamik::proxy::MAX_ARRAY_GAP;
use json_dynamik::{ChangeEvent, Dynamik, DynamikError, EngineConfig, Key, Listener, LiveValue};
use serde_json::{Value, json};

fn object() -> Value {
    json!({
        "a": [1, 2, 3],
        "b": { "a": 1, "b": 2, "c": 3 },
        "c": { "num": 12, "bool": true, "str": "abcdef" },
        "d": [12, true, "abcdef"]
    })
}

fn dynamik(value: Value) -> Dynamik {
    Dynamik::builder().build(value).unwrap()
}

/// Records every event it receives.
fn recorder() -> (Listener, Rc<RefCell<Vec<(String, Option<Value>, Option<Value>)>>>) {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    let listener: Listener = Rc::new(move |event: &ChangeEvent| {
        sink.borrow_mut().push((event.pointer.pointer(), event.old_value.clone(), event.new_value.clone()));
    });
    (listener, seen)
}

#[test]
fn empty_containers() {
    let object = dynamik(json!({}));
    assert!(object.root().is_empty());
    assert!(!object.root().is_array());

    let array = dynamik(json!([]));
    assert!(array.root().is_array());
    assert_eq!(array.root().len(), 0);
}

#[test]
fn primitive_root_is_rejected() {
    let err = Dynamik::builder().build(json!(12)).unwrap_err();
    assert!(matches!(err, DynamikError::PrimitiveRoot(_)));
    assert_eq!(err.to_string(), "Dynamik root must be array | object");
}

#[test]
fn built_from_json_text() {
    let dynamik = Dynamik::from_json_str(&object().to_string(), "true").unwrap();
    assert_eq!(dynamik.to_json(), object());
    assert!(matches!(Dynamik::from_json_str("{", "true"), Err(DynamikError::Json(_))));
}

#[test]
fn primitive_access() {
    let dynamik = dynamik(json!({ "a": 1, "b": "a string", "c": false }));
    let root = dynamik.root();
    assert_eq!(root.get_value("a"), Some(json!(1)));
    assert_eq!(root.get_value("b"), Some(json!("a string")));
    assert_eq!(root.get_value("c"), Some(json!(false)));
    assert_eq!(root.get_value("d"), None);
    assert!(matches!(root.get("a"), Some(LiveValue::Primitive(Value::Number(_)))));
}

#[test]
fn object_updates_deletes_and_additions() {
    let dynamik = dynamik(json!({ "a": 1, "b": "2", "c": false }));
    let root = dynamik.root();
    assert!(root.set("a", json!(11)));
    assert!(root.set("b", json!("22")));
    assert!(root.set("c", json!(true)));
    assert_eq!(dynamik.to_json(), json!({ "a": 11, "b": "22", "c": true }));

    assert!(root.set("d", json!("defined")));
    let keys: Vec<String> = root.keys().iter().map(Key::to_name).collect();
    assert_eq!(keys, ["a", "b", "c", "d"]);

    for key in ["a", "b", "c", "d"] {
        assert!(root.delete(key));
    }
    assert!(root.keys().is_empty());
    assert_eq!(root.get_value("a"), None);
}

#[test]
fn array_access_and_updates() {
    let dynamik = dynamik(json!([1, 2, 3]));
    let root = dynamik.root();
    assert_eq!(root.len(), 3);
    assert_eq!(root.get_value(0), Some(json!(1)));
    for (i, v) in [11, 22, 33].into_iter().enumerate() {
        assert!(root.set(i, json!(v)));
    }
    assert_eq!(dynamik.to_json(), json!([11, 22, 33]));
    assert!(!root.set("name", json!(1)), "arrays only take indices");
}

#[test]
fn array_delete_keeps_length() {
    let dynamik = dynamik(json!([1, 2, 3]));
    let root = dynamik.root();
    for i in 0..3 {
        assert!(root.delete(i));
    }
    assert_eq!(root.len(), 3);
    assert_eq!(dynamik.to_json(), json!([null, null, null]));
}

#[test]
fn array_push_and_pop() {
    let dynamik = dynamik(json!([1, 2]));
    let root = dynamik.root();
    assert!(root.push(json!(3)));
    assert_eq!(dynamik.to_json(), json!([1, 2, 3]));
    assert_eq!(root.pop(), Some(json!(3)));
    assert_eq!(root.len(), 2);
    assert_eq!(dynamik.to_json(), json!([1, 2]));

    let object = self::dynamik(json!({}));
    assert!(!object.root().push(json!(1)));
    assert_eq!(object.root().pop(), None);
}

#[test]
fn writing_past_the_end_pads_with_null() {
    let dynamik = dynamik(json!([1]));
    assert!(dynamik.root().set(3, json!(4)));
    assert_eq!(dynamik.to_json(), json!([1, null, null, 4]));
}

#[test]
fn writes_far_past_the_end_are_refused() {
    let dynamik = dynamik(json!({ "list": [1] }));
    let (listener, seen) = recorder();
    dynamik.watch(&format!("/list/{}", usize::MAX), listener).unwrap();

    let list = dynamik.at("/list").unwrap().live().unwrap().as_proxy().cloned().unwrap();
    assert!(!list.set(usize::MAX, json!(2)));
    assert!(!list.set(1 + MAX_ARRAY_GAP + 1, json!(2)));
    assert!(!dynamik.at(&format!("/list/{}", usize::MAX)).unwrap().set_value(json!(2)));
    assert!(seen.borrow().is_empty());
    assert_eq!(dynamik.to_json(), json!({ "list": [1] }));

    assert!(list.set(1 + MAX_ARRAY_GAP, json!(2)));
    assert_eq!(list.len(), MAX_ARRAY_GAP + 2);
}

#[test]
fn nested_access_and_updates() {
    let dynamik = dynamik(object());
    let root = dynamik.root();
    let a = root.get("a").and_then(|v| v.as_proxy().cloned()).unwrap();
    assert_eq!(a.get_value(1), Some(json!(2)));
    assert!(a.set(1, json!(22)));

    let LiveValue::Proxy(b) = root.get("b").unwrap() else {
        panic!("/b is a container");
    };
    assert_eq!(b.pointer().pointer(), "/b");
    assert!(b.set("c", json!(33)));
    assert!(dynamik.at("/c/str").unwrap().set_value(json!("uvwxyz")));

    assert_eq!(dynamik.at("/a/1").unwrap().value(), Some(json!(22)));
    assert_eq!(dynamik.at("/b/c").unwrap().value(), Some(json!(33)));
    assert_eq!(dynamik.at("/c/str").unwrap().value(), Some(json!("uvwxyz")));
}

#[test]
fn assigned_containers_are_live() {
    let dynamik = dynamik(json!({}));
    assert!(dynamik.root().set("inner", json!({ "list": [1] })));
    let list = dynamik.at("/inner/list").unwrap();
    let proxy = list.live().and_then(|v| v.as_proxy().cloned()).unwrap();
    assert!(proxy.push(json!(2)));
    assert_eq!(dynamik.to_json(), json!({ "inner": { "list": [1, 2] } }));
}

#[test]
fn serializes_back_to_the_same_json() {
    let dynamik = dynamik(object());
    assert_eq!(serde_json::to_string(&dynamik.to_json()).unwrap(), serde_json::to_string(&object()).unwrap());
}

#[test]
fn context_is_exposed() {
    let context = json!({ "data": "My application context ..." });
    let dynamik = Dynamik::builder().context(context.clone()).build(object()).unwrap();
    assert_eq!(dynamik.context(), &context);
    assert_eq!(dynamik.pointer().context(), &context);
    assert_eq!(dynamik.pointer().key(), None);
}

#[test]
fn watch_absolute_pointer() {
    let dynamik = dynamik(object());
    let (listener, seen) = recorder();
    dynamik.watch("/b/b", listener).unwrap();
    assert!(dynamik.at("/b").unwrap().live().unwrap().as_proxy().unwrap().set("b", json!(22)));
    assert_eq!(*seen.borrow(), vec![("/b/b".to_string(), Some(json!(2)), Some(json!(22)))]);
}

#[test]
fn unwatch_removes_by_identity() {
    let dynamik = dynamik(object());
    let (listener, seen) = recorder();
    let (other, other_seen) = recorder();
    let b = dynamik.at("/b").unwrap();
    b.watch("/b/b", listener.clone()).unwrap();
    b.watch("0/b", other.clone()).unwrap();
    assert!(b.unwatch("/b/b", &listener).unwrap());
    assert!(!b.unwatch("/b/b", &listener).unwrap());

    assert!(b.to("0/b").unwrap().set_value(json!(22)));
    assert!(seen.borrow().is_empty());
    assert_eq!(other_seen.borrow().len(), 1);
}

#[test]
fn delete_and_pop_emit_events() {
    let dynamik = dynamik(json!({ "a": 1, "list": [1, 2] }));
    let (listener, seen) = recorder();
    dynamik.watch("/a", listener.clone()).unwrap();
    dynamik.watch("/list/1", listener).unwrap();

    assert!(dynamik.at("/a").unwrap().delete());
    assert_eq!(dynamik.at("/list").unwrap().live().unwrap().as_proxy().unwrap().pop(), Some(json!(2)));
    assert_eq!(
        *seen.borrow(),
        vec![("/a".to_string(), Some(json!(1)), None), ("/list/1".to_string(), Some(json!(2)), None)]
    );
}

#[test]
fn listener_sees_the_written_value() {
    let dynamik = dynamik(json!({ "n": 1 }));
    let reread = Rc::new(RefCell::new(None));
    let sink = reread.clone();
    let listener: Listener = Rc::new(move |event: &ChangeEvent| {
        *sink.borrow_mut() = event.pointer.value();
    });
    dynamik.watch("/n", listener).unwrap();
    dynamik.at("/n").unwrap().set_value(json!(2));
    assert_eq!(*reread.borrow(), Some(json!(2)));
}

#[test]
fn schema_follows_nested_writes() {
    let dynamik = Dynamik::new(
        json!({ "people": [] }),
        &json!({
            "type": "object",
            "properties": {
                "people": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": { "name": { "type": "string", "_init": "'anonymous'" } }
                    }
                }
            }
        }),
    )
    .unwrap();
    let people = dynamik.at("/people").unwrap().live().unwrap().as_proxy().cloned().unwrap();
    assert!(people.push(json!({})));
    assert!(people.push(json!({ "name": "ada" })));
    assert_eq!(dynamik.to_json(), json!({ "people": [{ "name": "anonymous" }, { "name": "ada" }] }));
    assert!(dynamik.at("/people/0/name").unwrap().schema().is_some());
}

#[test]
fn non_uniform_arrays_apply_matching_alternatives() {
    let dynamik = Dynamik::new(
        json!({ "shapes": [{ "kind": "circle", "r": 2 }, { "kind": "square", "side": 3 }] }),
        &json!({
            "type": "object",
            "properties": {
                "shapes": {
                    "type": "array",
                    "items": {
                        "oneOf": [
                            {
                                "type": "object",
                                "_match": "value.kind === 'circle'",
                                "properties": { "area": { "type": "number", "_expression": "3 * _`1/r` * _`1/r`" } }
                            },
                            {
                                "type": "object",
                                "_match": "value.kind === 'square'",
                                "properties": { "area": { "type": "number", "_expression": "_`1/side` * _`1/side`" } }
                            }
                        ]
                    }
                }
            }
        }),
    )
    .unwrap();
    assert_eq!(dynamik.at("/shapes/0/area").unwrap().value(), Some(json!(12)));
    assert_eq!(dynamik.at("/shapes/1/area").unwrap().value(), Some(json!(9)));
}

#[test]
fn config_changes_default_abstracts() {
    let config = EngineConfig { abstract_separator: " | ".into(), null_placeholder: "-".into(), ..Default::default() };
    let dynamik = Dynamik::builder().config(config).build(json!([1, null, "x"])).unwrap();
    assert_eq!(dynamik.pointer().abstract_text(), "1 | - | x");
}

#[test]
fn shared_tree_builds_sibling_graphs() {
    let first = Dynamik::new(json!({ "a": 1 }), &json!({ "type": "object", "properties": { "a": { "type": "number" } } }))
        .unwrap();
    let second = Dynamik::builder().tree(first.schema_tree()).build(json!({ "a": "x" })).unwrap();
    assert!(first.at("/a").unwrap().validate());
    assert!(!second.at("/a").unwrap().validate());
    assert!(!second.at("/a").unwrap().validation_errors().is_empty());
}
