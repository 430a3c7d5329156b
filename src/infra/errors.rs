// src/infra/errors.rs — Error types for the tool adapter

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ToolError {
    // Protocol errors (fatal to the connection)
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    // Resolution errors
    #[error("Unknown module '{module}'")]
    UnknownModule { module: String },

    #[error("Module '{module}' has no function '{function}'")]
    UnknownFunction { module: String, function: String },

    #[error("Module '{module}' is not ready: {reason}")]
    ModuleNotReady { module: String, reason: String },

    /// Compile or launch failure. Displays the raw diagnostic text only, so
    /// compiler logs reach the caller verbatim.
    #[error("{output}")]
    Build { module: String, output: String },

    // Worker errors
    #[error("Worker for '{module}' is broken: {message}")]
    ChannelBroken { module: String, message: String },

    #[error("Worker for '{module}' failed: {message}")]
    WorkerFailure { module: String, message: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Infra
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ToolError {
    /// True when the worker can no longer be trusted and needs a fresh define.
    pub fn breaks_channel(&self) -> bool {
        matches!(self, ToolError::ChannelBroken { .. })
    }

    /// Full diagnostic text for an `error` response field.
    pub fn diagnostic(&self) -> String {
        match self {
            ToolError::Other(e) => format!("{e:#}"),
            other => other.to_string(),
        }
    }

    pub(crate) fn broken(module: &str, message: impl Into<String>) -> Self {
        ToolError::ChannelBroken {
            module: module.to_string(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_error_is_verbatim() {
        let err = ToolError::Build {
            module: "gmm".into(),
            output: "Error at gmm.fut:3:1-5:\nUnknown name \"foo\"".into(),
        };
        assert_eq!(
            err.diagnostic(),
            "Error at gmm.fut:3:1-5:\nUnknown name \"foo\""
        );
    }

    #[test]
    fn test_only_broken_channel_breaks() {
        assert!(ToolError::broken("gmm", "exited").breaks_channel());
        assert!(!ToolError::WorkerFailure {
            module: "gmm".into(),
            message: "no such entry point".into(),
        }
        .breaks_channel());
        assert!(!ToolError::InvalidInput("x".into()).breaks_channel());
    }

    #[test]
    fn test_other_includes_context_chain() {
        let err = ToolError::from(anyhow::anyhow!("root cause").context("while storing"));
        assert_eq!(err.diagnostic(), "while storing: root cause");
    }
}
