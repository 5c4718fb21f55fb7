//! Typed errors for the script engine layer.

use rhai::{EvalAltResult, ParseError};
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by [`ScriptEngine`](crate::ScriptEngine) operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    /// Reading a script file failed.
    #[error("I/O error reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Script bytes could not be decoded with the detected encoding.
    #[error("Encoding error in {origin}: {reason}")]
    Encoding { origin: String, reason: String },

    /// Script compilation failed.
    #[error("Compile error in {origin}: {error}")]
    Compile {
        origin: String,
        #[source]
        error: ParseError,
    },

    /// Script execution failed at runtime.
    #[error("Execution error: {0}")]
    Execution(#[source] Box<EvalAltResult>),

    /// The value handed to `invoke` is not a function, script function or host type.
    #[error("Value of type {type_name} is not callable")]
    NotCallable { type_name: String },

    /// A member name that cannot appear in a method-call expression.
    #[error("Invalid member name: {0:?}")]
    InvalidMemberName(String),
}

impl EngineError {
    /// True for errors produced by the script itself (syntax or runtime),
    /// as opposed to host-side failures.
    pub fn is_script_error(&self) -> bool {
        matches!(self, EngineError::Compile { .. } | EngineError::Execution(_))
    }
}

impl From<Box<EvalAltResult>> for EngineError {
    fn from(err: Box<EvalAltResult>) -> Self {
        EngineError::Execution(err)
    }
}

/// Convenience result alias for the engine layer.
pub type EngineResult<T> = Result<T, EngineError>;
