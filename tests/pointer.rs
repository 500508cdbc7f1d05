use json_dynamik::{Dynamik, Key, PointerError};
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

#[test]
fn malformed_pointers_are_rejected() {
    let dyn_obj = dynamik(object());
    assert!(matches!(dyn_obj.at("toto"), Err(PointerError::Syntax(_))));
    assert!(matches!(dyn_obj.at("a//b"), Err(PointerError::Syntax(_))));
}

#[test]
fn root_pointer_of_object_and_array() {
    let dyn_obj = dynamik(object());
    let root = dyn_obj.pointer();
    assert!(root.is_root());
    assert_eq!(root.pointer(), "");
    assert_eq!(root.value(), Some(object()));

    let array = json!([[1, 2, 3], { "a": 1 }]);
    let dyn_arr = dynamik(array.clone());
    assert_eq!(dyn_arr.pointer().value(), Some(array));
    assert_eq!(dyn_arr.pointer().type_name(), "array");
}

#[test]
fn absolute_paths() {
    let root = dynamik(object()).pointer();
    assert_eq!(root.to("/a/1").unwrap().value(), Some(json!(2)));
    assert_eq!(root.to("/b/b").unwrap().value(), Some(json!(2)));
    assert_eq!(root.to("/c/bool").unwrap().value(), Some(json!(true)));
    assert_eq!(root.to("/d/2").unwrap().value(), Some(json!("abcdef")));
    assert_eq!(root.to("/d/xxx").unwrap().value(), None);
    assert_eq!(root.to("").unwrap().value(), Some(object()));
}

#[test]
fn relative_paths() {
    let root = dynamik(object()).pointer();
    let ptr = root.to("/b/b").unwrap();
    assert_eq!(ptr.key(), Some(&Key::from("b")));
    assert_eq!(serde_json::to_string(&ptr).unwrap(), "\"/b/b\"");
    assert_eq!(ptr.value(), Some(json!(2)));
    assert_eq!(ptr.to("1").unwrap().value(), Some(json!({ "a": 1, "b": 2, "c": 3 })));
    assert_eq!(ptr.parent().unwrap().value(), Some(json!({ "a": 1, "b": 2, "c": 3 })));
    assert_eq!(ptr.to("2").unwrap().value(), Some(object()));
    assert_eq!(ptr.to("2/d/2").unwrap().value(), Some(json!("abcdef")));
    assert_eq!(ptr.to("0").unwrap(), ptr);
}

#[test]
fn ascending_past_the_root_is_an_error() {
    let ptr = dynamik(object()).pointer().to("/b/b").unwrap();
    let err = ptr.to("5").unwrap_err();
    assert!(matches!(err, PointerError::Range { ascend: 5, .. }));
    assert!(err.to_string().contains("pointer reference out of limit"), "{err}");
    assert_eq!(ptr.to("/b/b/C/D").unwrap().value(), None);
    assert!(matches!(ptr.to("99999999999999999999/a"), Err(PointerError::Range { .. })));
}

#[test]
fn type_names() {
    let root = dynamik(json!({ "a": 1, "b": true, "c": "xyz", "d": null, "e": [], "f": {} })).pointer();
    let types: Vec<&str> = ["0/a", "0/b", "0/c", "0/d", "0/e", "0/f", "0/g"]
        .into_iter()
        .map(|p| root.to(p).unwrap().type_name())
        .collect();
    assert_eq!(types, ["number", "boolean", "string", "null", "array", "object", "undefined"]);
}

#[test]
fn children_follow_storage_order() {
    let root = dynamik(object()).pointer();
    let children: Vec<String> = root.children().iter().map(|c| c.pointer()).collect();
    assert_eq!(children, ["/a", "/b", "/c", "/d"]);
    let items: Vec<String> = root.to("/a").unwrap().children().iter().map(|c| c.pointer()).collect();
    assert_eq!(items, ["/a/0", "/a/1", "/a/2"]);
    assert!(root.to("/a/0").unwrap().children().is_empty());
}

#[test]
fn ranked_children_put_numbers_first() {
    let dynamik = Dynamik::new(
        json!({ "x": "x", "y": "y", "z": "z", "w": "w" }),
        &json!({
            "type": "object",
            "properties": {
                "x": { "type": "string", "_rank": "'b'" },
                "y": { "type": "string", "_rank": 2 },
                "z": { "type": "string", "_rank": "1" },
                "w": { "type": "string" }
            }
        }),
    )
    .unwrap();
    let ranked: Vec<String> = dynamik.pointer().ranked_children().iter().map(|c| c.pointer()).collect();
    assert_eq!(ranked, ["/z", "/y", "/x", "/w"]);
}

#[test]
fn tag_helpers_read_and_write() {
    let dynamik = dynamik(object());
    let b = dynamik.at("/b").unwrap();
    assert_eq!(b.tag("0/c").unwrap(), Some(json!(3)));
    assert_eq!(b.tag("1/d/0").unwrap(), Some(json!(12)));
    assert!(b.tag_set("0/c", json!(30)).unwrap());
    assert_eq!(dynamik.to_json()["b"]["c"], json!(30));
    assert!(b.tag("9").is_err());
}

#[test]
fn ascent_is_bounded_by_depth() {
    let root = dynamik(object()).pointer();
    for token in ["/b", "/b/c", "/a/2", "/c/str"] {
        let ptr = root.to(token).unwrap();
        assert_eq!(ptr.pointer(), token, "canonical form round-trips");
        let depth = ptr.path().len();
        assert!(ptr.to(&depth.to_string()).unwrap().is_root());
        assert!(ptr.to(&(depth + 1).to_string()).is_err());
    }
}
