use std::sync::Arc;

use parley::{
    ErrorKind, FieldDescriptor, OverlayMap, Session, Shape, StructureDescriptor, UnionShape, Value,
};

fn args(tokens: &[&str]) -> Vec<String> {
    tokens.iter().map(|token| token.to_string()).collect()
}

fn variant_a() -> Arc<StructureDescriptor> {
    StructureDescriptor::builder("A")
        .field(FieldDescriptor::new("x", Shape::Int).default_value(Value::Int(1)))
        .build()
}

fn variant_b() -> Arc<StructureDescriptor> {
    StructureDescriptor::builder("B")
        .field(FieldDescriptor::new("y", Shape::Str).default_value(Value::Str("bar".into())))
        .build()
}

/// `{model: union {a: A, b: B} = "a"}`
fn with_union(default: Option<&'static str>) -> Arc<StructureDescriptor> {
    let mut union = UnionShape::new([("a", variant_a()), ("b", variant_b())]);
    if let Some(key) = default {
        union = union.with_default(key);
    }

    StructureDescriptor::builder("Config")
        .field(FieldDescriptor::new("model", Shape::Union(union)))
        .build()
}

fn session_with(descriptor: Arc<StructureDescriptor>, dest: &str) -> Session {
    let mut session = Session::new("test");
    session.register_descriptor(descriptor, dest, None).unwrap();
    session
}

#[test]
fn selecting_a_variant_reconstructs_only_that_variant() {
    let session = session_with(with_union(Some("a")), "run");

    let parsed = session.parse(&args(&["--model", "b", "--y", "baz"])).unwrap();
    let model = parsed
        .instance("run")
        .unwrap()
        .get("model")
        .and_then(Value::as_struct)
        .unwrap();

    assert_eq!(model.name(), "B");
    assert_eq!(model.get("y"), Some(&Value::Str("baz".to_owned())));
    assert_eq!(model.get("x"), None);
}

#[test]
fn non_selected_variant_fields_are_absent_from_the_emitted_spec() {
    let session = session_with(with_union(Some("a")), "run");

    let compiled = session.compile(&args(&["--model", "b"])).unwrap();
    let names: Vec<&str> = compiled
        .arguments()
        .iter()
        .map(|argument| argument.external())
        .collect();

    assert!(names.contains(&"model"));
    assert!(names.contains(&"y"));
    assert!(!names.contains(&"x"));
}

#[test]
fn flags_of_the_non_selected_variant_are_silently_discarded() {
    let session = session_with(with_union(Some("a")), "run");

    let parsed = session
        .parse(&args(&["--model", "b", "--x", "5", "--y", "baz"]))
        .unwrap();
    let model = parsed
        .instance("run")
        .unwrap()
        .get("model")
        .and_then(Value::as_struct)
        .unwrap();

    assert_eq!(model.name(), "B");
    assert_eq!(model.get("y"), Some(&Value::Str("baz".to_owned())));
    // the --x value went nowhere
    assert_eq!(model.get("x"), None);
}

#[test]
fn omitting_the_selector_uses_the_default_variant() {
    let session = session_with(with_union(Some("a")), "run");

    let parsed = session.parse(&args(&[])).unwrap();
    let model = parsed
        .instance("run")
        .unwrap()
        .get("model")
        .and_then(Value::as_struct)
        .unwrap();

    assert_eq!(model.name(), "A");
    assert_eq!(model.get("x"), Some(&Value::Int(1)));
}

#[test]
fn unknown_variant_keys_fail_listing_the_valid_ones() {
    let session = session_with(with_union(Some("a")), "run");

    let error = session.parse(&args(&["--model", "c"])).unwrap_err();
    match error.kind() {
        ErrorKind::ValueConversion { path, raw, message, .. } => {
            assert_eq!(path, "run.model");
            assert_eq!(raw, "c");
            assert!(message.contains('a'));
            assert!(message.contains('b'));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn selector_without_default_is_required() {
    let session = session_with(with_union(None), "run");

    let error = session.parse(&args(&[])).unwrap_err();
    assert!(matches!(
        error.kind(),
        ErrorKind::MissingRequiredArgument { path } if path == "run.model"
    ));

    // but supplying the key on the command line proceeds
    let parsed = session.parse(&args(&["--model", "b"])).unwrap();
    let model = parsed
        .instance("run")
        .unwrap()
        .get("model")
        .and_then(Value::as_struct)
        .unwrap();
    assert_eq!(model.get("y"), Some(&Value::Str("bar".to_owned())));
}

#[test]
fn overlays_can_choose_the_variant() {
    let mut session = Session::new("test");
    session.register_descriptor(with_union(None), "run", None).unwrap();
    session.add_defaults(
        OverlayMap::from_json_str("<inline>", r#"{"run": {"model": "b"}}"#).unwrap(),
    );

    let parsed = session.parse(&args(&[])).unwrap();
    let model = parsed
        .instance("run")
        .unwrap()
        .get("model")
        .and_then(Value::as_struct)
        .unwrap();
    assert_eq!(model.name(), "B");
}

#[test]
fn nested_unions_resolve_over_multiple_rounds() {
    // the chosen variant itself contains a union
    let sub_x = StructureDescriptor::builder("SubX")
        .field(FieldDescriptor::new("depth", Shape::Int).default_value(Value::Int(2)))
        .build();
    let sub_y = StructureDescriptor::builder("SubY")
        .field(FieldDescriptor::new("width", Shape::Int).default_value(Value::Int(8)))
        .build();

    let outer_a = StructureDescriptor::builder("OuterA")
        .field(FieldDescriptor::new(
            "sub",
            Shape::Union(UnionShape::new([("x", sub_x), ("y", sub_y)]).with_default("x")),
        ))
        .build();
    let outer_b = StructureDescriptor::builder("OuterB")
        .field(FieldDescriptor::new("flat", Shape::Int).default_value(Value::Int(0)))
        .build();

    let config = StructureDescriptor::builder("Config")
        .field(FieldDescriptor::new(
            "model",
            Shape::Union(UnionShape::new([("a", outer_a), ("b", outer_b)]).with_default("b")),
        ))
        .build();

    let session = session_with(config, "run");

    let parsed = session
        .parse(&args(&["--model", "a", "--sub", "y", "--width", "16"]))
        .unwrap();

    let model = parsed
        .instance("run")
        .unwrap()
        .get("model")
        .and_then(Value::as_struct)
        .unwrap();
    assert_eq!(model.name(), "OuterA");

    let sub = model.get("sub").and_then(Value::as_struct).unwrap();
    assert_eq!(sub.name(), "SubY");
    assert_eq!(sub.get("width"), Some(&Value::Int(16)));
}

#[test]
fn conflicting_selectors_get_prefixed_like_any_field() {
    let shared = with_union(Some("a"));
    let mut session = Session::new("test");
    session.register_descriptor(shared.clone(), "first", None).unwrap();
    session.register_descriptor(shared, "second", None).unwrap();

    // the two selectors collide on "model" and grow their prefixes; the
    // chosen variants' own fields (y of B, x of A) stay bare because only
    // one registration emits each
    let parsed = session
        .parse(&args(&[
            "--first.model",
            "b",
            "--y",
            "from-first",
            "--second.model",
            "a",
        ]))
        .unwrap();

    let first = parsed
        .instance("first")
        .unwrap()
        .get("model")
        .and_then(Value::as_struct)
        .unwrap();
    assert_eq!(first.name(), "B");
    assert_eq!(first.get("y"), Some(&Value::Str("from-first".to_owned())));

    let second = parsed
        .instance("second")
        .unwrap()
        .get("model")
        .and_then(Value::as_struct)
        .unwrap();
    assert_eq!(second.name(), "A");
    assert_eq!(second.get("x"), Some(&Value::Int(1)));
}

#[test]
fn help_renders_for_required_selectors_too() {
    let session = session_with(with_union(None), "run");

    let help = session.render_help().unwrap();
    assert!(help.contains("--model"));
    assert!(help.contains("{a|b}"));
}
