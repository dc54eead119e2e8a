use std::path::PathBuf;
use std::sync::Arc;

use indoc::indoc;
use parley::{
    ErrorKind, FieldDescriptor, OverlayMap, Session, Shape, StructureDescriptor, Value,
};

fn args(tokens: &[&str]) -> Vec<String> {
    tokens.iter().map(|token| token.to_string()).collect()
}

fn config() -> Arc<StructureDescriptor> {
    StructureDescriptor::builder("Config")
        .field(FieldDescriptor::new("a", Shape::Int))
        .field(FieldDescriptor::new("b", Shape::Int).default_value(Value::Int(10)))
        .field(FieldDescriptor::new("rate", Shape::Float).default_value(Value::Float(0.5)))
        .build()
}

/// Write a uniquely named overlay file under the system temp directory.
fn temp_overlay(name: &str, contents: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "parley-overlay-{pid}-{name}",
        pid = std::process::id(),
    ));
    std::fs::write(&path, contents).unwrap();
    path
}

#[test]
fn a_required_field_satisfied_only_by_an_overlay_succeeds() {
    let mut session = Session::new("test");
    session.register_descriptor(config(), "run", None).unwrap();
    session.add_defaults(OverlayMap::from_json_str("<inline>", r#"{"run": {"a": 99}}"#).unwrap());

    let parsed = session.parse(&args(&[])).unwrap();
    let instance = parsed.instance("run").unwrap();
    assert_eq!(instance.get("a"), Some(&Value::Int(99)));
    assert_eq!(instance.get("b"), Some(&Value::Int(10)));
}

#[test]
fn command_line_values_beat_every_overlay() {
    let mut session = Session::new("test");
    session.register_descriptor(config(), "run", None).unwrap();
    session.add_defaults(
        OverlayMap::from_json_str("<inline>", r#"{"run": {"a": 99, "b": 20}}"#).unwrap(),
    );

    let parsed = session.parse(&args(&["--b", "30"])).unwrap();
    let instance = parsed.instance("run").unwrap();
    assert_eq!(instance.get("a"), Some(&Value::Int(99)));
    assert_eq!(instance.get("b"), Some(&Value::Int(30)));
}

#[test]
fn registration_overrides_sit_beneath_session_overlays() {
    let mut defaults = OverlayMap::new("<override>");
    defaults.set("b", Value::Int(1));
    defaults.set("rate", Value::Float(0.9));

    let mut session = Session::new("test");
    session
        .register_descriptor(config(), "run", Some(defaults))
        .unwrap();
    session.add_defaults(OverlayMap::from_json_str("<inline>", r#"{"run": {"b": 2, "a": 0}}"#).unwrap());

    let parsed = session.parse(&args(&[])).unwrap();
    let instance = parsed.instance("run").unwrap();

    // the session overlay wins for b; the registration override still
    // supplies rate
    assert_eq!(instance.get("b"), Some(&Value::Int(2)));
    assert_eq!(instance.get("rate"), Some(&Value::Float(0.9)));
}

#[test]
fn later_session_overlays_win_over_earlier_ones() {
    let mut session = Session::new("test");
    session.register_descriptor(config(), "run", None).unwrap();
    session.add_defaults(
        OverlayMap::from_json_str("<first>", r#"{"run": {"a": 1, "b": 1}}"#).unwrap(),
    );
    session.add_defaults(OverlayMap::from_json_str("<second>", r#"{"run": {"b": 2}}"#).unwrap());

    let parsed = session.parse(&args(&[])).unwrap();
    let instance = parsed.instance("run").unwrap();
    assert_eq!(instance.get("a"), Some(&Value::Int(1)));
    assert_eq!(instance.get("b"), Some(&Value::Int(2)));
}

#[test]
fn defaults_files_from_the_command_line_beat_session_overlays() {
    let file = temp_overlay("cli.json", r#"{"run": {"b": 42}}"#);

    let mut session = Session::new("test");
    session.register_descriptor(config(), "run", None).unwrap();
    session.add_defaults(
        OverlayMap::from_json_str("<inline>", r#"{"run": {"a": 1, "b": 1}}"#).unwrap(),
    );

    let tokens = args(&["--defaults", file.to_str().unwrap()]);
    let parsed = session.parse(&tokens).unwrap();
    let instance = parsed.instance("run").unwrap();

    assert_eq!(instance.get("a"), Some(&Value::Int(1)));
    assert_eq!(instance.get("b"), Some(&Value::Int(42)));

    std::fs::remove_file(file).unwrap();
}

#[test]
fn toml_defaults_files_load_too() {
    let file = temp_overlay(
        "cli.toml",
        indoc! {r#"
            [run]
            a = 7
            rate = 0.25
        "#},
    );

    let mut session = Session::new("test");
    session.register_descriptor(config(), "run", None).unwrap();

    let tokens = args(&["--defaults", file.to_str().unwrap()]);
    let parsed = session.parse(&tokens).unwrap();
    let instance = parsed.instance("run").unwrap();

    assert_eq!(instance.get("a"), Some(&Value::Int(7)));
    assert_eq!(instance.get("rate"), Some(&Value::Float(0.25)));

    std::fs::remove_file(file).unwrap();
}

#[test]
fn missing_defaults_file_is_an_overlay_error() {
    let mut session = Session::new("test");
    session.register_descriptor(config(), "run", None).unwrap();

    let error = session
        .parse(&args(&["--a", "1", "--defaults", "/no/such/file.json"]))
        .unwrap_err();
    assert!(matches!(error.kind(), ErrorKind::Overlay { .. }));
}

#[test]
fn overlay_values_are_checked_against_the_declared_shape() {
    let mut session = Session::new("test");
    session.register_descriptor(config(), "run", None).unwrap();
    session.add_defaults(
        OverlayMap::from_json_str("<inline>", r#"{"run": {"a": "not-a-number"}}"#).unwrap(),
    );

    let error = session.parse(&args(&[])).unwrap_err();
    assert!(matches!(
        error.kind(),
        ErrorKind::ValueConversion { path, .. } if path == "run.a"
    ));
}

#[test]
fn integers_in_overlays_satisfy_float_fields() {
    let mut session = Session::new("test");
    session.register_descriptor(config(), "run", None).unwrap();
    session.add_defaults(
        OverlayMap::from_json_str("<inline>", r#"{"run": {"a": 1, "rate": 2}}"#).unwrap(),
    );

    let parsed = session.parse(&args(&[])).unwrap();
    assert_eq!(
        parsed.instance("run").unwrap().get("rate"),
        Some(&Value::Float(2.0)),
    );
}

#[test]
fn without_the_defaults_option_the_flag_is_unknown() {
    let mut session = Session::new("test").without_defaults_option();
    session.register_descriptor(config(), "run", None).unwrap();

    let error = session
        .parse(&args(&["--a", "1", "--defaults", "x.json"]))
        .unwrap_err();
    assert!(matches!(error.kind(), ErrorKind::TokenSyntax(_)));
}
