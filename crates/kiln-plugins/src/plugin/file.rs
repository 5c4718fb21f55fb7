//! File-backed plugin.

use super::{Plugin, PluginCore, Resolvable};
use crate::error::PluginResult;
use kiln_engine::{EngineResult, ScriptEngine, ScriptSource};
use rhai::Dynamic;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// A plugin whose source is read from a script file.
///
/// Two file plugins are the same plugin when they resolve to the same file.
pub struct FilePlugin {
    core: PluginCore,
    path: PathBuf,
}

impl FilePlugin {
    pub fn new(engine: Arc<ScriptEngine>, path: impl Into<PathBuf>) -> Self {
        Self {
            core: PluginCore::new(engine),
            path: path.into(),
        }
    }

    pub fn with_identity(engine: Arc<ScriptEngine>, path: impl Into<PathBuf>, id: Uuid) -> Self {
        Self {
            core: PluginCore::with_identity(engine, id),
            path: path.into(),
        }
    }

    /// Path as configured.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Canonical absolute path of the script file, falling back to the
    /// absolute form when the file cannot be resolved.
    pub fn resolved_path(&self) -> PathBuf {
        if let Some(path) = self.core.source_path() {
            return path.to_path_buf();
        }
        std::fs::canonicalize(&self.path)
            .or_else(|_| std::path::absolute(&self.path))
            .unwrap_or_else(|_| self.path.clone())
    }
}

impl Resolvable for FilePlugin {
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

impl Plugin for FilePlugin {
    fn core(&self) -> &PluginCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut PluginCore {
        &mut self.core
    }

    fn acquire_source(&self, engine: &ScriptEngine) -> EngineResult<ScriptSource> {
        engine.source_from_file(&self.path)
    }

    fn default_display(&self) -> String {
        self.path.display().to_string()
    }

    fn script_file(&self) -> Option<PathBuf> {
        Some(self.resolved_path())
    }

    fn same_plugin(&self, other: &dyn Plugin) -> bool {
        match other.script_file() {
            Some(path) => path == self.resolved_path(),
            None => false,
        }
    }
}

impl fmt::Display for FilePlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self as &dyn Plugin, f)
    }
}

impl fmt::Debug for FilePlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilePlugin")
            .field("path", &self.path)
            .field("core", &self.core)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PluginError;
    use crate::plugin::{PluginState, TextPlugin};
    use kiln_engine::EngineConfig;
    use std::fs;
    use tempfile::TempDir;

    fn engine() -> Arc<ScriptEngine> {
        ScriptEngine::shared(EngineConfig::default())
    }

    fn script(dir: &TempDir, name: &str, code: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, code).unwrap();
        path
    }

    #[test]
    fn test_run_reads_file() {
        let dir = TempDir::new().unwrap();
        let path = script(&dir, "calc.rhai", "let x = 15 + 1;");

        let mut plugin = FilePlugin::new(engine(), &path);
        assert_eq!(plugin.state(), PluginState::Uninitialized);
        plugin.run().unwrap();

        assert_eq!(plugin.get("x").unwrap().as_int().unwrap(), 16);
        assert_eq!(plugin.state(), PluginState::Ready);
        assert_eq!(plugin.source_path(), Some(fs::canonicalize(&path).unwrap().as_path()));
    }

    #[test]
    fn test_stale_until_reloaded() {
        let dir = TempDir::new().unwrap();
        let path = script(&dir, "value.rhai", "1");
        let mut plugin = FilePlugin::new(engine(), &path);
        assert_eq!(plugin.run().unwrap().as_int().unwrap(), 1);

        fs::write(&path, "2").unwrap();
        assert_eq!(plugin.run().unwrap().as_int().unwrap(), 1);

        plugin.reload_plugin();
        assert_eq!(plugin.state(), PluginState::Uninitialized);
        assert_eq!(plugin.run().unwrap().as_int().unwrap(), 2);
    }

    #[test]
    fn test_same_plugin_by_path() {
        let dir = TempDir::new().unwrap();
        let path = script(&dir, "a.rhai", "1");
        let engine = engine();

        let first = FilePlugin::new(engine.clone(), &path);
        let second = FilePlugin::new(engine.clone(), dir.path().join(".").join("a.rhai"));
        let other = FilePlugin::new(engine.clone(), script(&dir, "b.rhai", "2"));
        let text = TextPlugin::with_identity(engine, "1", first.core().generated_id());

        assert_ne!(first.identity().unwrap(), second.identity().unwrap());
        assert!(first.same_plugin(&second));
        assert!(!first.same_plugin(&other));
        assert!(!first.same_plugin(&text));
    }

    #[test]
    fn test_missing_file_is_engine_error() {
        let dir = TempDir::new().unwrap();
        let mut plugin = FilePlugin::new(engine(), dir.path().join("gone.rhai"));
        let err = plugin.run().unwrap_err();
        assert!(matches!(err, PluginError::Engine(_)));
        assert_eq!(plugin.state(), PluginState::Uninitialized);
    }

    #[test]
    fn test_display_prefers_to_string_member() {
        let dir = TempDir::new().unwrap();
        let path = script(&dir, "named.rhai", "let n = 1;");
        let mut plugin = FilePlugin::new(engine(), &path);
        assert_eq!(plugin.to_string(), path.display().to_string());

        plugin.run().unwrap();
        assert_eq!(plugin.to_string(), fs::canonicalize(&path).unwrap().display().to_string());

        fs::write(&path, "fn ToString() { \"greeter plugin\" }").unwrap();
        plugin.reload_plugin();
        plugin.run().unwrap();
        assert_eq!(plugin.to_string(), "greeter plugin");
    }
}
