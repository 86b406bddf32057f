//! Error kinds shared across the crate.
//!
//! Tool-level failures are recoverable by contract: they are rendered into
//! JSON error payloads and fed back to the model rather than propagated.
//! Config validation failures are fatal at load time.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SmartfolderError>;

#[derive(Error, Debug)]
pub enum SmartfolderError {
    #[error("path escapes the folder root: {0}")]
    PathEscape(String),

    #[error("{path} is {size} bytes, over the {limit} byte read cap")]
    SizeExceeded { path: String, size: u64, limit: u64 },

    #[error("config file {path} is {size} bytes, over the {limit} byte cap")]
    FileTooLarge { path: String, size: u64, limit: u64 },

    #[error("rename would change the extension from '{expected}'; try '{suggestion}'")]
    ExtensionMismatch {
        expected: String,
        suggestion: String,
    },

    #[error("target already exists: {0}")]
    ExistsAlready(String),

    #[error("no such file: {0}")]
    Missing(String),

    #[error("'{0}' has a binary extension; binary content is already attached to the prompt")]
    BinaryToolMisuse(String),

    #[error("environment variable ${0} is not on the config whitelist")]
    EnvVarNotAllowed(String),

    #[error("prompt is {len} characters, over the {limit} character cap")]
    PromptTooLong { len: usize, limit: usize },

    #[error("prompt contains a NUL byte")]
    PromptContainsNul,

    #[error("prompt is empty")]
    PromptEmpty,

    #[error("invalid config: {0}")]
    ConfigInvalid(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("watcher error: {0}")]
    Watcher(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SmartfolderError {
    /// Stable machine-readable code used in tool error payloads.
    pub fn code(&self) -> &'static str {
        match self {
            SmartfolderError::PathEscape(_) => "PathEscape",
            SmartfolderError::SizeExceeded { .. } => "SizeExceeded",
            SmartfolderError::FileTooLarge { .. } => "FileTooLarge",
            SmartfolderError::ExtensionMismatch { .. } => "ExtensionMismatch",
            SmartfolderError::ExistsAlready(_) => "ExistsAlready",
            SmartfolderError::Missing(_) => "Missing",
            SmartfolderError::BinaryToolMisuse(_) => "BinaryToolMisuse",
            SmartfolderError::EnvVarNotAllowed(_) => "EnvVarNotAllowed",
            SmartfolderError::PromptTooLong { .. } => "PromptTooLong",
            SmartfolderError::PromptContainsNul => "PromptContainsNul",
            SmartfolderError::PromptEmpty => "PromptEmpty",
            SmartfolderError::ConfigInvalid(_) => "ConfigInvalid",
            SmartfolderError::Provider(_) => "ProviderError",
            SmartfolderError::Watcher(_) => "WatcherError",
            SmartfolderError::Io(_) => "Io",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(
            SmartfolderError::PathEscape("../x".into()).code(),
            "PathEscape"
        );
        assert_eq!(
            SmartfolderError::ExtensionMismatch {
                expected: "pdf".into(),
                suggestion: "report.pdf".into(),
            }
            .code(),
            "ExtensionMismatch"
        );
        assert_eq!(SmartfolderError::PromptContainsNul.code(), "PromptContainsNul");
    }

    #[test]
    fn extension_mismatch_message_names_suggestion() {
        let err = SmartfolderError::ExtensionMismatch {
            expected: "pdf".into(),
            suggestion: "report.pdf".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("pdf"));
        assert!(msg.contains("report.pdf"));
    }
}
