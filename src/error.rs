use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that abort compilation (or loading) of a single workflow document.
///
/// Problems inside a well-formed document, such as unknown operation types or
/// dangling links, are never reported here; they degrade instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error("Failed to parse workflow JSON at line {line}, column {column}: {message}")]
    MalformedDocument {
        message: String,
        line: usize,
        column: usize,
    },

    #[error("Workflow document is inconsistent: {message}{}", render_hint(.hint))]
    InvalidDocument {
        message: String,
        hint: Option<String>,
    },

    #[error("Failed to parse operation registry: {0}")]
    RegistryParse(String),

    #[error("Invalid extension: {0}")]
    InvalidExtension(String),

    #[error("Could not access '{path}': {message}")]
    Io { path: String, message: String },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl CompileError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        CompileError::InvalidDocument {
            message: message.into(),
            hint: None,
        }
    }

    pub(crate) fn from_json(err: &serde_json::Error) -> Self {
        CompileError::MalformedDocument {
            message: err.to_string(),
            line: err.line(),
            column: err.column(),
        }
    }

    /// Attaches a hint to document errors that do not carry one yet.
    pub fn with_hint(self, hint: Option<String>) -> Self {
        match self {
            CompileError::InvalidDocument {
                message,
                hint: None,
            } => CompileError::InvalidDocument { message, hint },
            other => other,
        }
    }
}

fn render_hint(hint: &Option<String>) -> String {
    hint.as_ref()
        .map(|h| format!(" (this may be due to {})", h))
        .unwrap_or_default()
}

/// A single validation failure the execution engine reported for a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeErrorReason {
    pub message: String,
    #[serde(default)]
    pub details: String,
}

/// All validation failures the execution engine reported for one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeError {
    pub class_type: String,
    #[serde(default)]
    pub errors: Vec<NodeErrorReason>,
}

/// Errors raised while handing a compiled prompt to the execution engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("{}", render_rejection(.message, .details, .node_errors))]
    Rejected {
        message: String,
        details: String,
        node_errors: BTreeMap<String, NodeError>,
    },

    #[error("Engine transport failed: {0}")]
    Transport(String),

    #[error(transparent)]
    Compile(#[from] CompileError),
}

fn render_rejection(
    message: &str,
    details: &str,
    node_errors: &BTreeMap<String, NodeError>,
) -> String {
    let mut out = message.to_string();
    if !details.is_empty() {
        out.push_str(": ");
        out.push_str(details);
    }
    for node_error in node_errors.values() {
        out.push('\n');
        out.push_str(&node_error.class_type);
        out.push(':');
        for reason in &node_error.errors {
            out.push_str(&format!("\n    - {}: {}", reason.message, reason.details));
        }
    }
    out
}
