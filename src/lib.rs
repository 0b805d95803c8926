//! plantchart - PlantUML statecharts, validated and executed.
//!
//! Text goes through the pipeline
//! `parse -> build IR -> validate -> bind -> dispatch`:
//!
//! ```no_run
//! use plantchart::{compile, BindingsBuilder, Config, Machine};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), plantchart::CoreError> {
//! let chart = compile(
//!     "@startuml\n[*] --> Off\nOff --> On : switch / click()\nOn --> Off : switch\n@enduml\n",
//!     &Config::default(),
//! )?;
//! let bindings = BindingsBuilder::new()
//!     .effect("click()", |clicks: &mut u32| *clicks += 1)
//!     .build(&chart)?;
//! let mut machine = Machine::new(Arc::new(bindings), 0u32)?;
//! machine.fire("switch")?;
//! assert!(machine.is_in("On"));
//! # Ok(())
//! # }
//! ```

pub use plantchart_core::*;
pub use plantchart_syntax::{self as syntax, parse, ParseError, Span};

/// Loads configuration the way hosts are expected to: from `PLANTCHART_CONFIG`
/// if set, then environment overrides.
pub fn load_config() -> Result<Config, ConfigError> {
    let config = Config::load().map_err(|e| {
        tracing::error!("Failed to load config: {}", e);
        e
    })?;

    match std::env::var("PLANTCHART_CONFIG") {
        Ok(path) => tracing::info!("Loaded config from {}", path),
        Err(_) => tracing::info!("Using default configuration"),
    }
    Ok(config)
}
