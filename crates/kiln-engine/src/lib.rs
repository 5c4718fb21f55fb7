//! Kiln 脚本引擎层
//! Kiln script engine layer
//!
//! Thin wrapper over [Rhai](https://rhai.rs) exposing what the plugin layer
//! needs: reading and decoding script sources, compiling, executing against a
//! scope, invoking callable values, calling members on values, registering
//! host types and resolving module imports from search paths.

pub mod callable;
pub mod config;
pub mod engine;
pub mod error;
pub mod scope;
pub mod source;

pub use callable::{CompiledScript, HostType, ScriptFunction};
pub use config::EngineConfig;
pub use engine::ScriptEngine;
pub use error::{EngineError, EngineResult};
pub use scope::ScriptScope;
pub use source::{ScriptSource, SourceEncoding};

pub use rhai;
pub use rhai::Dynamic;

/// Whether `name` can be used as a bare identifier in a script.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first == '_' || first.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}
