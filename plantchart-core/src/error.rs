//! Core error types.

use crate::validate::Diagnostics;
use plantchart_syntax::ParseError;
use thiserror::Error;

/// Errors from building, validating, binding and running statecharts.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("invalid statechart: {diagnostics}")]
    Invalid { diagnostics: Diagnostics },

    #[error("unknown state: {name}")]
    UnknownState { name: String },

    #[error("reserved state identifier: {name}")]
    ReservedState { name: String },

    #[error("unknown event: '{event}'")]
    UnknownEvent { event: String },

    #[error("no callable bound to action '{text}'")]
    UnboundAction { text: String },

    #[error("no callable bound to guard '{text}'")]
    UnboundGuard { text: String },

    #[error("invalid chart definition: {reason}")]
    InvalidDefinition { reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    /// Returns a stable error code for reporting.
    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::Parse(_) => "PARSE_ERROR",
            CoreError::Invalid { .. } => "INVALID_CHART",
            CoreError::UnknownState { .. } => "UNKNOWN_STATE",
            CoreError::ReservedState { .. } => "RESERVED_STATE",
            CoreError::UnknownEvent { .. } => "UNKNOWN_EVENT",
            CoreError::UnboundAction { .. } => "UNBOUND_ACTION",
            CoreError::UnboundGuard { .. } => "UNBOUND_GUARD",
            CoreError::InvalidDefinition { .. } => "BAD_DEFINITION",
            CoreError::Json(_) => "BAD_MODEL_JSON",
        }
    }

    /// Returns the diagnostics when the chart failed validation.
    pub fn diagnostics(&self) -> Option<&Diagnostics> {
        match self {
            CoreError::Invalid { diagnostics } => Some(diagnostics),
            _ => None,
        }
    }
}
