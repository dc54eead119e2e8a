use std::sync::Arc;

use parley::{
    ConflictPolicy, ErrorKind, FieldDescriptor, Session, Shape, StructureDescriptor, Value,
};

fn args(tokens: &[&str]) -> Vec<String> {
    tokens.iter().map(|token| token.to_string()).collect()
}

fn simple() -> Arc<StructureDescriptor> {
    StructureDescriptor::builder("Simple")
        .field(FieldDescriptor::new("a", Shape::Int))
        .field(FieldDescriptor::new("b", Shape::Int).default_value(Value::Int(10)))
        .build()
}

fn externals(session: &Session) -> Vec<String> {
    session
        .compile(&[])
        .unwrap()
        .arguments()
        .iter()
        .filter(|argument| !argument.is_builtin())
        .map(|argument| argument.external().to_owned())
        .collect()
}

#[test]
fn two_destinations_prefix_on_conflict() {
    let shared = simple();
    let mut session = Session::new("test");
    session.register_descriptor(shared.clone(), "x", None).unwrap();
    session.register_descriptor(shared, "y", None).unwrap();

    assert_eq!(externals(&session), ["x.a", "x.b", "y.a", "y.b"]);

    let parsed = session
        .parse(&args(&["--x.a", "1", "--y.a", "2"]))
        .unwrap();

    let x = parsed.instance("x").unwrap();
    let y = parsed.instance("y").unwrap();
    assert_eq!(x.get("a"), Some(&Value::Int(1)));
    assert_eq!(x.get("b"), Some(&Value::Int(10)));
    assert_eq!(y.get("a"), Some(&Value::Int(2)));
    assert_eq!(y.get("b"), Some(&Value::Int(10)));
}

#[test]
fn single_registration_keeps_bare_names() {
    let mut session = Session::new("test");
    session.register_descriptor(simple(), "only", None).unwrap();

    assert_eq!(externals(&session), ["a", "b"]);
}

#[test]
fn nested_fields_stay_bare_without_conflicts() {
    let inner = StructureDescriptor::builder("Inner")
        .field(FieldDescriptor::new("path", Shape::Str).default_value(Value::Str("/".into())))
        .build();
    let outer = StructureDescriptor::builder("Outer")
        .field(FieldDescriptor::new("epochs", Shape::Int).default_value(Value::Int(1)))
        .field(FieldDescriptor::new("data", Shape::Struct(inner)))
        .build();

    let mut session = Session::new("test");
    session.register_descriptor(outer, "train", None).unwrap();

    assert_eq!(externals(&session), ["epochs", "path"]);

    let parsed = session.parse(&args(&["--path", "/data"])).unwrap();
    let data = parsed
        .instance("train")
        .unwrap()
        .get("data")
        .and_then(Value::as_struct)
        .unwrap();
    assert_eq!(data.get("path"), Some(&Value::Str("/data".to_owned())));
}

#[test]
fn parent_field_keeps_the_short_name_against_a_nested_one() {
    let inner = StructureDescriptor::builder("Opt")
        .field(FieldDescriptor::new("lr", Shape::Float).default_value(Value::Float(0.1)))
        .build();
    let outer = StructureDescriptor::builder("Main")
        .field(FieldDescriptor::new("lr", Shape::Float).default_value(Value::Float(1.0)))
        .field(FieldDescriptor::new("opt", Shape::Struct(inner)))
        .build();

    let mut session = Session::new("test");
    session.register_descriptor(outer, "main", None).unwrap();

    assert_eq!(externals(&session), ["lr", "opt.lr"]);

    let parsed = session
        .parse(&args(&["--lr", "2.0", "--opt.lr", "0.5"]))
        .unwrap();
    let instance = parsed.instance("main").unwrap();
    assert_eq!(instance.get("lr"), Some(&Value::Float(2.0)));
    assert_eq!(
        instance.get("opt").and_then(Value::as_struct).unwrap().get("lr"),
        Some(&Value::Float(0.5)),
    );
}

#[test]
fn always_prefix_renders_full_paths_unconditionally() {
    let mut session = Session::new("test").with_policy(ConflictPolicy::AlwaysPrefix);
    session.register_descriptor(simple(), "only", None).unwrap();

    assert_eq!(externals(&session), ["only.a", "only.b"]);

    let parsed = session.parse(&args(&["--only.a", "3"])).unwrap();
    assert_eq!(
        parsed.instance("only").unwrap().get("a"),
        Some(&Value::Int(3)),
    );
}

#[test]
fn reject_policy_makes_collisions_fatal() {
    let shared = simple();
    let mut session = Session::new("test").with_policy(ConflictPolicy::RejectOnConflict);
    session.register_descriptor(shared.clone(), "x", None).unwrap();
    session.register_descriptor(shared, "y", None).unwrap();

    let error = session.compile(&[]).unwrap_err();
    assert!(matches!(
        error.kind(),
        ErrorKind::ArgumentConflict { option, paths }
            if option == "a" && paths.contains(&"x.a".to_owned())
    ));
}

#[test]
fn duplicate_destinations_are_rejected() {
    let shared = simple();
    let mut session = Session::new("test");
    session.register_descriptor(shared.clone(), "x", None).unwrap();

    let error = session.register_descriptor(shared, "x", None).unwrap_err();
    assert!(matches!(
        error.kind(),
        ErrorKind::DuplicateDestination { path } if path == "x"
    ));
}

#[test]
fn name_overrides_are_pinned() {
    let renamed = StructureDescriptor::builder("Renamed")
        .field(FieldDescriptor::new("a", Shape::Int).rename("alpha"))
        .build();

    let mut session = Session::new("test");
    session.register_descriptor(renamed, "x", None).unwrap();
    session.register_descriptor(simple(), "y", None).unwrap();

    // the override takes "alpha"; y's fields don't collide with it, and
    // the pinned name never grows a prefix
    assert_eq!(externals(&session), ["alpha", "a", "b"]);
}

#[test]
fn field_colliding_with_a_builtin_is_prefixed_away() {
    let descriptor = StructureDescriptor::builder("Weird")
        .field(FieldDescriptor::new("help", Shape::Str).default_value(Value::Str("".into())))
        .build();

    let mut session = Session::new("test");
    session.register_descriptor(descriptor, "run", None).unwrap();

    assert_eq!(externals(&session), ["run.help"]);
}

#[test]
fn registrations_do_not_corrupt_earlier_name_sets() {
    let shared = simple();

    let mut single = Session::new("test");
    single.register_descriptor(shared.clone(), "x", None).unwrap();
    let before = externals(&single);

    let mut double = Session::new("test");
    double.register_descriptor(shared.clone(), "x", None).unwrap();
    double.register_descriptor(shared, "y", None).unwrap();
    let after = externals(&double);

    // the first registration's fields are still reachable, just under
    // their prefixed spellings
    assert_eq!(before, ["a", "b"]);
    assert_eq!(after, ["x.a", "x.b", "y.a", "y.b"]);
}
