//! 脚本插件
//! Script plugins
//!
//! A plugin owns one script source, its compiled form, a persistent variable
//! context and an identity. [`FilePlugin`] reads its source from disk and is
//! the unit the manager hot-reloads; [`TextPlugin`] runs in-memory text.

mod base;
mod file;
mod text;

pub use base::{DISPLAY_MEMBER, IDENTITY_VARIABLE, PluginCore};
pub use file::FilePlugin;
pub use text::TextPlugin;

use crate::context::Variable;
use crate::error::{PluginError, PluginResult};
use kiln_engine::{EngineResult, HostType, ScriptEngine, ScriptScope, ScriptSource};
use parking_lot::Mutex;
use rhai::{CustomType, Dynamic, Variant};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Lifecycle position of a plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PluginState {
    /// No source acquired, either never run or reset by a reload.
    Uninitialized,
    /// Source text held, not compiled yet (or compilation failed).
    Sourced,
    /// Compiled but not successfully executed since the last reload.
    Compiled,
    /// Compiled and executed at least once since the last reload.
    Ready,
}

/// Read, write and call members that exist only in a runtime context.
pub trait Resolvable {
    /// Value bound to `name`, or `MissingMember`.
    fn get(&self, name: &str) -> PluginResult<Dynamic>;

    /// Bind `name` to `value`, creating or overwriting it.
    fn set(&mut self, name: &str, value: Dynamic);

    /// Call the member `name` with `args`. Non-callable members are returned
    /// as-is when `args` is empty.
    fn invoke_by_name(&self, name: &str, args: Vec<Dynamic>) -> PluginResult<Dynamic>;
}

/// A hot-reloadable script plugin.
///
/// Implementors supply storage ([`PluginCore`]) and source acquisition; the
/// lifecycle is provided.
pub trait Plugin: Resolvable + Send + 'static {
    fn core(&self) -> &PluginCore;

    fn core_mut(&mut self) -> &mut PluginCore;

    /// Produce the script source this plugin runs.
    fn acquire_source(&self, engine: &ScriptEngine) -> EngineResult<ScriptSource>;

    /// Display fallback when neither a `ToString` member nor a source path exists.
    fn default_display(&self) -> String;

    /// Resolved file backing this plugin, if any.
    fn script_file(&self) -> Option<PathBuf> {
        self.core().source_path().map(Path::to_path_buf)
    }

    /// Whether `other` denotes the same plugin. Compares identities by default.
    ///
    /// A malformed `Guid` override never compares equal; the manager refuses
    /// such plugins before they reach a registry.
    fn same_plugin(&self, other: &dyn Plugin) -> bool {
        match (self.identity(), other.identity()) {
            (Ok(mine), Ok(theirs)) => mine == theirs,
            _ => false,
        }
    }

    fn identity(&self) -> PluginResult<Uuid> {
        self.core().identity()
    }

    fn state(&self) -> PluginState {
        self.core().state()
    }

    fn source_path(&self) -> Option<&Path> {
        self.core().source_path()
    }

    fn is_disposed(&self) -> bool {
        self.core().is_disposed()
    }

    /// Run against a fresh scope.
    fn run(&mut self) -> PluginResult<Dynamic> {
        let mut scope = ScriptScope::new();
        self.run_with_scope(&mut scope)
    }

    /// Acquire and compile if needed, then run against `scope`. Context
    /// variables take precedence over bindings already in `scope`.
    fn run_with_scope(&mut self, scope: &mut ScriptScope) -> PluginResult<Dynamic> {
        if self.core().is_disposed() {
            return Err(PluginError::Disposed);
        }
        if self.core().source().is_none() {
            let source = self.acquire_source(self.core().engine())?;
            self.core_mut().set_source(source);
        }
        self.core_mut().execute(scope)
    }

    /// Discard source, compiled artifact, hash and context. Does not run.
    fn reload_plugin(&mut self) {
        self.core_mut().reset();
        debug!("Plugin {} reset for reload", self.core().generated_id());
    }

    fn compute_hash(&mut self) -> String {
        self.core_mut().compute_hash()
    }

    fn add_context_variables(&mut self, variables: &[Variable]) {
        self.core_mut().add_variables(variables);
    }

    fn remove_context_variables(&mut self, names: &[&str]) {
        self.core_mut().remove_variables(names);
    }

    /// Snapshot of the context, in insertion order.
    fn context_variables(&self) -> Vec<Variable> {
        self.core().context().snapshot()
    }

    fn register_host_type(&mut self, host: HostType) {
        self.core_mut().register_host_type(host);
    }

    /// Register `T` with the engine and bind its constructor under its short name.
    fn register_type<T>(&mut self) -> HostType
    where
        T: CustomType + Variant + Clone,
        Self: Sized,
    {
        let host = self.core().engine().register_host_type::<T>();
        self.register_host_type(host.clone());
        host
    }

    /// Call `method` on the value bound to `member`.
    fn invoke_member(&self, member: &str, method: &str, args: Vec<Dynamic>) -> PluginResult<Dynamic> {
        self.core().invoke_member(member, method, args)
    }

    /// The `ToString` member's result when present, else the source path,
    /// else the variant's default.
    fn display_name(&self) -> PluginResult<String> {
        if self.core().context().contains(DISPLAY_MEMBER) {
            let value = self.invoke_by_name(DISPLAY_MEMBER, Vec::new())?;
            return Ok(value.to_string());
        }
        Ok(match self.source_path() {
            Some(path) => path.display().to_string(),
            None => self.default_display(),
        })
    }

    /// Release the plugin's resources. A disposed plugin cannot run again.
    fn dispose(&mut self) {
        if !self.core().is_disposed() {
            info!("Disposing plugin {}", self.core().identity_or_generated());
        }
        self.core_mut().dispose();
    }
}

impl fmt::Display for dyn Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.display_name() {
            Ok(name) => f.write_str(&name),
            Err(_) => f.write_str(&self.default_display()),
        }
    }
}

impl fmt::Debug for dyn Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plugin")
            .field("id", &self.core().identity_or_generated())
            .field("state", &self.state())
            .field("file", &self.script_file())
            .finish()
    }
}

/// Shared, lockable plugin.
pub type PluginHandle = Arc<Mutex<dyn Plugin>>;

/// Wrap a plugin into a [`PluginHandle`].
pub fn into_handle<P: Plugin>(plugin: P) -> PluginHandle {
    Arc::new(Mutex::new(plugin))
}

/// Whether two handles denote the same plugin.
///
/// Handles to the same allocation are equal without locking.
pub fn same_handle(a: &PluginHandle, b: &PluginHandle) -> bool {
    if Arc::ptr_eq(a, b) {
        return true;
    }
    let first = a.lock();
    let second = b.lock();
    first.same_plugin(&*second)
}
