//! In-memory text plugin.

use super::{Plugin, PluginCore, Resolvable};
use crate::error::PluginResult;
use kiln_engine::{EngineResult, ScriptEngine, ScriptSource};
use rhai::Dynamic;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// A plugin whose source is a string held in memory.
pub struct TextPlugin {
    core: PluginCore,
    code: String,
}

impl TextPlugin {
    pub fn new(engine: Arc<ScriptEngine>, code: impl Into<String>) -> Self {
        Self {
            core: PluginCore::new(engine),
            code: code.into(),
        }
    }

    pub fn with_identity(engine: Arc<ScriptEngine>, code: impl Into<String>, id: Uuid) -> Self {
        Self {
            core: PluginCore::with_identity(engine, id),
            code: code.into(),
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    /// Replace the script text. Takes effect after the next reload.
    pub fn set_code(&mut self, code: impl Into<String>) {
        self.code = code.into();
    }
}

impl Resolvable for TextPlugin {
    fn get(&self, name: &str) -> PluginResult<Dynamic> {
        self.core.get(name)
    }

    fn set(&mut self, name: &str, value: Dynamic) {
        self.core.set(name, value);
    }

    fn invoke_by_name(&self, name: &str, args: Vec<Dynamic>) -> PluginResult<Dynamic> {
        self.core.invoke(name, args)
    }
}

impl Plugin for TextPlugin {
    fn core(&self) -> &PluginCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut PluginCore {
        &mut self.core
    }

    fn acquire_source(&self, engine: &ScriptEngine) -> EngineResult<ScriptSource> {
        Ok(engine.source_from_text(self.code.clone()))
    }

    fn default_display(&self) -> String {
        "<inline>".to_string()
    }
}

impl fmt::Display for TextPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self as &dyn Plugin, f)
    }
}

impl fmt::Debug for TextPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextPlugin").field("core", &self.core).finish()
    }
}
