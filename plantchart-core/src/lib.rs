//! # plantchart-core
//!
//! Statechart model and runtime for plantchart.
//!
//! This crate provides:
//! - The statechart IR and its JSON form
//! - The IR builder and semantic validator
//! - Handler and transition bindings
//! - The transition dispatch engine and chart instances

pub mod bindings;
pub mod builder;
pub mod config;
pub mod definition;
pub mod engine;
pub mod error;
pub mod machine;
pub mod validate;

pub use bindings::{
    ActionFn, Bindings, BindingsBuilder, Destination, GuardFn, StateHandlers, Transition,
    TransitionTable,
};
pub use builder::IrBuilder;
pub use config::{BuildConfig, Config, ConfigError, ValidationConfig};
pub use definition::{Endpoint, Event, Statechart};
pub use engine::{DispatchEngine, DispatchOutcome, FatalReason, Reactor, StateId, Stringify};
pub use error::CoreError;
pub use machine::{Machine, SharedMachine};
pub use validate::{Diagnostic, DiagnosticCode, Diagnostics, Severity, ValidChart, Validator};

/// Parses, builds and validates a chart.
pub fn compile(source: &str, config: &Config) -> Result<ValidChart, CoreError> {
    let document = plantchart_syntax::parse(source)?;
    let (chart, diagnostics) = IrBuilder::new(config.build.clone()).build(&document);
    Validator::new(config.validation.clone())
        .validate_with(chart, diagnostics)
        .map_err(|diagnostics| CoreError::Invalid { diagnostics })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_reports_parse_errors() {
        let err = compile("@startuml\nA -> \n@enduml\n", &Config::default()).unwrap_err();
        assert_eq!(err.error_code(), "PARSE_ERROR");
    }

    #[test]
    fn test_compile_accumulates_diagnostics() {
        let source = "@startuml\n\
            A : entry / a()\n\
            A : entry / b()\n\
            A --> IGNORING_EVENT : go\n\
            @enduml\n";
        let config = Config {
            validation: ValidationConfig::lenient(),
            ..Config::default()
        };
        let err = compile(source, &config).unwrap_err();
        let diagnostics = err.diagnostics().unwrap();
        assert!(diagnostics.contains(DiagnosticCode::DuplicateHandler));
        assert!(diagnostics.contains(DiagnosticCode::ReservedState));
        assert!(diagnostics.contains(DiagnosticCode::MissingInitial));
        assert!(err.to_string().starts_with("invalid statechart: 3 error(s)"));
    }

    const UNREACHABLE: &str = "@startuml\n\
        [*] --> A\n\
        A --> C : go\n\
        C --> A : back\n\
        B --> A : x\n\
        @enduml\n";

    #[test]
    fn test_unreachable_state_is_unusable_by_default() {
        let err = compile(UNREACHABLE, &Config::default()).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CHART");
        let diagnostics = err.diagnostics().unwrap();
        assert!(diagnostics.iter().all(|d| d.is_error()));
        assert!(diagnostics.contains(DiagnosticCode::NoIncoming));
    }

    #[test]
    fn test_lenient_validation_keeps_warnings() {
        let config = Config {
            validation: ValidationConfig::lenient(),
            ..Config::default()
        };
        let chart = compile(UNREACHABLE, &config).unwrap();
        assert_eq!(chart.warnings().len(), 1);
        assert!(chart.warnings().contains(DiagnosticCode::NoIncoming));
    }
}
