//! CLI integration tests
//!
//! These tests verify the CLI commands work correctly by running the binary.

#![cfg(feature = "cli")]

use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};

fn xsdbind(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_xsdbind"))
        .args(args)
        .output()
        .expect("Failed to execute command")
}

fn fixture(name: &str) -> String {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    path.to_string_lossy().into_owned()
}

// ============================================================================
// Inspect Command Tests
// ============================================================================

#[test]
fn test_cli_inspect_basic() {
    let output = xsdbind(&["inspect", &fixture("shapes.xsd")]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "inspect should succeed");
    assert!(stdout.contains("xsdbind v"), "should show version");
    assert!(stdout.contains("Target Namespace: urn:shapes"));
    assert!(stdout.contains("{urn:shapes}Drawing"));
    assert!(stdout.contains("{urn:shapes}CircleType (complex)"));
    assert!(stdout.contains("Dependency Order: http://www.w3.org/2001/XMLSchema -> urn:shapes"));
}

#[test]
fn test_cli_inspect_json_output() {
    let output = xsdbind(&["inspect", "--json", &fixture("people.xsd")]);
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["targetNamespace"], "urn:people");
    let types: Vec<&str> = json["types"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|t| t["name"].as_str())
        .collect();
    assert!(types.contains(&"{urn:people}PersonType"));
    assert!(!types.iter().any(|t| t.contains("XMLSchema")));
}

#[test]
fn test_cli_inspect_element() {
    let output = xsdbind(&["inspect", &fixture("shapes.xsd"), "--element", "Shape"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("Abstract: true"));
    assert!(stdout.contains("Substitution Group:"));
    assert!(stdout.contains("{urn:shapes}Circle"));
}

#[test]
fn test_cli_inspect_missing_schema() {
    let output = xsdbind(&["inspect", "/nonexistent/schema.xsd"]);
    assert!(!output.status.success(), "missing schema should fail");
    assert!(String::from_utf8_lossy(&output.stderr).contains("Error"));
}

// ============================================================================
// Decode Command Tests
// ============================================================================

#[test]
fn test_cli_decode() {
    let output = xsdbind(&["decode", "--schema", &fixture("simple.xsd"), &fixture("root.xml")]);
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(
        json,
        serde_json::json!({ "Root": { "id": "A1", "Item": ["x", "y"] } })
    );
}

#[test]
fn test_cli_decode_to_file() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("person.json");
    let output = xsdbind(&[
        "decode",
        "--schema",
        &fixture("people.xsd"),
        &fixture("person.xml"),
        "--pretty",
        "--output",
        target.to_str().unwrap(),
    ]);
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&target).unwrap()).unwrap();
    assert_eq!(json["Person"]["age"], 41);
    assert_eq!(json["Person"]["tags"], serde_json::json!(["red", "green", "blue"]));
}

#[test]
fn test_cli_decode_unknown_root() {
    let dir = tempfile::tempdir().unwrap();
    let xml = dir.path().join("other.xml");
    fs::write(&xml, "<Other/>").unwrap();

    let strict = xsdbind(&["decode", "--schema", &fixture("simple.xsd"), xml.to_str().unwrap()]);
    assert!(!strict.status.success());

    let lenient = xsdbind(&[
        "decode",
        "--schema",
        &fixture("simple.xsd"),
        xml.to_str().unwrap(),
        "--lenient",
    ]);
    assert!(lenient.status.success());
}

// ============================================================================
// Encode Command Tests
// ============================================================================

#[test]
fn test_cli_encode() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("root.json");
    fs::write(&input, r#"{ "Root": { "id": "A1", "Item": ["x", "y"] } }"#).unwrap();

    let output = xsdbind(&[
        "encode",
        "--schema",
        &fixture("simple.xsd"),
        input.to_str().unwrap(),
        "--element",
        "Root",
        "--omit-declaration",
    ]);
    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        r#"<Root id="A1"><Item>x</Item><Item>y</Item></Root>"#
    );
}

#[test]
fn test_cli_encode_with_options_file() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("root.json");
    let options = dir.path().join("options.json");
    let target = dir.path().join("root.xml");
    fs::write(&input, r#"{ "Item": ["x"] }"#).unwrap();
    fs::write(&options, r#"{ "indent": true }"#).unwrap();

    let output = xsdbind(&[
        "encode",
        "--schema",
        &fixture("simple.xsd"),
        input.to_str().unwrap(),
        "--element",
        "Root",
        "--options",
        options.to_str().unwrap(),
        "--output",
        target.to_str().unwrap(),
    ]);
    assert!(output.status.success());

    let xml = fs::read_to_string(&target).unwrap();
    assert!(xml.starts_with("<?xml"));
    assert!(xml.contains("\n  <Item>x</Item>"));
}
