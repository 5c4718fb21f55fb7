//! Plugin, reload and manager errors.

use kiln_engine::EngineError;
use rhai::{EvalAltResult, Position};
use std::fmt::Write as _;
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised by plugin operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PluginError {
    /// A member was looked up that is not in the plugin's context.
    #[error("No member named \"{member}\" in the context of plugin {plugin}")]
    MissingMember { member: String, plugin: Uuid },

    /// The `Guid` context variable holds something that is not an identity.
    #[error("Guid context variable must be a string, a 16-byte blob or a Uuid, found {found}")]
    InvalidIdentityOverride { found: String },

    /// Arguments were passed to a member that is not callable.
    #[error("Member \"{member}\" is not callable but was given {arg_count} argument(s)")]
    NotCallable { member: String, arg_count: usize },

    /// The script failed to compile or raised an error while running.
    #[error(transparent)]
    Runtime(#[from] PluginRuntimeError),

    /// A host-side engine failure, such as an unreadable script file.
    #[error(transparent)]
    Engine(EngineError),

    /// Execution was requested before any source was acquired.
    #[error("Plugin has no source to run")]
    Unsourced,

    /// The plugin was disposed and can no longer run.
    #[error("Plugin has been disposed")]
    Disposed,
}

impl From<EngineError> for PluginError {
    fn from(err: EngineError) -> Self {
        if err.is_script_error() {
            PluginError::Runtime(PluginRuntimeError::from_engine(err))
        } else {
            PluginError::Engine(err)
        }
    }
}

/// Result alias for plugin operations.
pub type PluginResult<T> = Result<T, PluginError>;

// ============================================================================
// Script runtime errors
// ============================================================================

/// A script-side failure with the script's own error name, message and call chain.
#[derive(Debug, Error)]
#[error("{error_name}: {message}")]
pub struct PluginRuntimeError {
    error_name: String,
    message: String,
    traceback: String,
    #[source]
    source: EngineError,
}

impl PluginRuntimeError {
    pub fn from_engine(error: EngineError) -> Self {
        let (error_name, message, traceback) = match &error {
            EngineError::Compile { origin, error: parse } => (
                "SyntaxError".to_string(),
                parse.to_string(),
                format!("  in {origin}{}\n", line_suffix(parse.position())),
            ),
            EngineError::Execution(eval) => {
                let (frames, innermost) = unwind(eval);
                let mut traceback = String::new();
                for frame in &frames {
                    let _ = writeln!(traceback, "  {frame}");
                }
                let _ = writeln!(traceback, "  at{}", line_suffix(innermost.position()));
                (
                    error_name(innermost).to_string(),
                    innermost.to_string(),
                    traceback,
                )
            }
            other => ("EngineError".to_string(), other.to_string(), String::new()),
        };

        Self {
            error_name,
            message,
            traceback,
            source: error,
        }
    }

    /// Script-level error category, e.g. `SyntaxError` or `RuntimeError`.
    pub fn error_name(&self) -> &str {
        &self.error_name
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Call chain from the outermost function call to the failing position,
    /// one frame per line.
    pub fn traceback(&self) -> &str {
        &self.traceback
    }

    pub fn engine_error(&self) -> &EngineError {
        &self.source
    }
}

fn unwind(mut err: &EvalAltResult) -> (Vec<String>, &EvalAltResult) {
    let mut frames = Vec::new();
    while let EvalAltResult::ErrorInFunctionCall(name, source, inner, pos) = err {
        let mut frame = format!("in fn {name}");
        if !source.is_empty() {
            let _ = write!(frame, " ({source})");
        }
        frame.push_str(&line_suffix(*pos));
        frames.push(frame);
        err = inner.as_ref();
    }
    (frames, err)
}

fn line_suffix(pos: Position) -> String {
    match pos.line() {
        Some(line) => format!(", line {line}"),
        None => String::new(),
    }
}

fn error_name(err: &EvalAltResult) -> &'static str {
    match err {
        EvalAltResult::ErrorParsing(..) => "SyntaxError",
        EvalAltResult::ErrorRuntime(..) => "RuntimeError",
        EvalAltResult::ErrorVariableNotFound(..) => "VariableNotFound",
        EvalAltResult::ErrorFunctionNotFound(..) => "FunctionNotFound",
        EvalAltResult::ErrorArithmetic(..) => "ArithmeticError",
        EvalAltResult::ErrorMismatchDataType(..) => "TypeError",
        EvalAltResult::ErrorArrayBounds(..) => "IndexError",
        EvalAltResult::ErrorTooManyOperations(..) | EvalAltResult::ErrorStackOverflow(..) => {
            "LimitExceeded"
        }
        EvalAltResult::ErrorInFunctionCall(_, _, inner, _) => error_name(inner),
        _ => "ScriptError",
    }
}

// ============================================================================
// Reload / manager errors
// ============================================================================

/// Errors produced while reloading plugins.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReloadError {
    /// A plugin failed to reload or re-run.
    #[error("Failed to reload plugin {plugin}: {source}")]
    Plugin {
        plugin: Uuid,
        path: Option<PathBuf>,
        #[source]
        source: PluginError,
    },

    /// The file watch service reported an error.
    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    /// The dispatch target is gone and can no longer accept reload work.
    #[error("Reload dispatch target is closed")]
    DispatchClosed,
}

/// Errors produced when adding plugins to a manager.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ManagerError {
    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error("Failed to watch directory: {0}")]
    Watch(#[from] notify::Error),
}
