//! Configuration files and environment overrides driving the pipeline.

use plantchart::{compile, load_config, Config, DiagnosticCode};
use std::io::Write;
use tempfile::NamedTempFile;

const LOWER: &str = "@startuml\n\
    [*] --> idle\n\
    idle --> busy : start\n\
    busy --> idle : stop\n\
    @enduml\n";

const ORPHANED: &str = "@startuml\n\
    [*] --> idle\n\
    idle --> busy : start\n\
    busy --> idle : stop\n\
    orphan : entry / noop()\n\
    @enduml\n";

fn write_config(yaml: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();
    file
}

#[test]
fn test_uppercase_names_from_file() {
    let file = write_config("build:\n  uppercase_names: true\n");
    let config = Config::from_file(file.path()).unwrap();
    assert!(config.build.uppercase_names);
    assert!(config.validation.determinism_checks);

    let chart = compile(LOWER, &config).unwrap();
    assert!(chart.has_state("IDLE"));
    assert!(chart.has_state("BUSY"));
    assert!(!chart.has_state("idle"));
    assert_eq!(chart.initial.as_ref().unwrap().as_str(), "IDLE");
}

#[test]
fn test_validation_settings_from_file() {
    // Warnings make a chart unusable unless a file says otherwise.
    let err = compile(ORPHANED, &Config::default()).unwrap_err();
    assert!(err
        .diagnostics()
        .unwrap()
        .contains(DiagnosticCode::NoIncoming));

    let lenient = write_config("validation:\n  deny_warnings: false\n");
    let chart = compile(ORPHANED, &Config::from_file(lenient.path()).unwrap()).unwrap();
    assert!(chart.warnings().contains(DiagnosticCode::NoIncoming));

    let unchecked = write_config("validation:\n  determinism_checks: false\n");
    let chart = compile(ORPHANED, &Config::from_file(unchecked.path()).unwrap()).unwrap();
    assert!(chart.warnings().is_empty());
}

#[test]
fn test_bad_file_is_reported() {
    let file = write_config("build: [not, a, map]\n");
    let err = Config::from_file(file.path()).unwrap_err();
    assert!(err.to_string().contains(&file.path().display().to_string()));
}

// Kept as a single test: it owns the process environment.
#[test]
fn test_load_config_with_env() {
    let file = write_config("build:\n  uppercase_names: true\n");
    std::env::set_var("PLANTCHART_CONFIG", file.path());
    std::env::set_var("PLANTCHART_DENY_WARNINGS", "false");

    let config = load_config().unwrap();
    assert!(config.build.uppercase_names);
    assert!(!config.validation.deny_warnings);

    std::env::set_var("PLANTCHART_CONFIG", "/nonexistent/plantchart.yaml");
    assert!(load_config().is_err());

    std::env::remove_var("PLANTCHART_CONFIG");
    std::env::remove_var("PLANTCHART_DENY_WARNINGS");
    assert_eq!(load_config().unwrap(), Config::default());
}
