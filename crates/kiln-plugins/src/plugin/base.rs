//! State shared by every plugin variant.

use super::PluginState;
use crate::context::{Variable, VariableSet};
use crate::error::{PluginError, PluginResult};
use kiln_engine::{CompiledScript, HostType, ScriptEngine, ScriptScope, ScriptSource};
use rhai::{Blob, Dynamic};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Context variable that overrides a plugin's identity.
pub const IDENTITY_VARIABLE: &str = "Guid";

/// Context member used to render a plugin for display.
pub const DISPLAY_MEMBER: &str = "ToString";

/// Source, compiled artifact, context and identity of one plugin.
///
/// `compiled` is only ever present together with `source`, and the cached
/// content hash is dropped whenever the source changes.
pub struct PluginCore {
    engine: Arc<ScriptEngine>,
    generated_id: Uuid,
    source: Option<ScriptSource>,
    compiled: Option<CompiledScript>,
    context: VariableSet,
    content_hash: Option<String>,
    executed: bool,
    disposed: bool,
}

impl PluginCore {
    pub fn new(engine: Arc<ScriptEngine>) -> Self {
        Self::with_identity(engine, Uuid::new_v4())
    }

    pub fn with_identity(engine: Arc<ScriptEngine>, id: Uuid) -> Self {
        Self {
            engine,
            generated_id: id,
            source: None,
            compiled: None,
            context: VariableSet::new(),
            content_hash: None,
            executed: false,
            disposed: false,
        }
    }

    pub fn engine(&self) -> &Arc<ScriptEngine> {
        &self.engine
    }

    /// Identity assigned at construction, ignoring any override.
    pub fn generated_id(&self) -> Uuid {
        self.generated_id
    }

    /// Effective identity: the `Guid` context variable when present,
    /// otherwise the constructed identity.
    pub fn identity(&self) -> PluginResult<Uuid> {
        match self.context.get(IDENTITY_VARIABLE) {
            Some(value) => identity_from_value(value),
            None => Ok(self.generated_id),
        }
    }

    /// Effective identity for diagnostics, falling back when the override is malformed.
    pub fn identity_or_generated(&self) -> Uuid {
        self.identity().unwrap_or(self.generated_id)
    }

    pub fn source(&self) -> Option<&ScriptSource> {
        self.source.as_ref()
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.source.as_ref().and_then(ScriptSource::path)
    }

    pub fn compiled(&self) -> Option<&CompiledScript> {
        self.compiled.as_ref()
    }

    pub fn context(&self) -> &VariableSet {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut VariableSet {
        &mut self.context
    }

    pub fn state(&self) -> PluginState {
        match (&self.source, &self.compiled, self.executed) {
            (None, _, _) => PluginState::Uninitialized,
            (Some(_), None, _) => PluginState::Sourced,
            (Some(_), Some(_), false) => PluginState::Compiled,
            (Some(_), Some(_), true) => PluginState::Ready,
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Install freshly acquired source text, invalidating the compiled
    /// artifact and the cached hash.
    pub fn set_source(&mut self, source: ScriptSource) {
        debug!("Plugin {} sourced from {}", self.generated_id, source.origin());
        self.source = Some(source);
        self.compiled = None;
        self.content_hash = None;
        self.executed = false;
    }

    /// Compile if needed, then run against `scope` and merge every visible
    /// binding and script function back into the context.
    pub fn execute(&mut self, scope: &mut ScriptScope) -> PluginResult<Dynamic> {
        if self.disposed {
            return Err(PluginError::Disposed);
        }
        let Some(source) = &self.source else {
            return Err(PluginError::Unsourced);
        };

        let compiled = match &self.compiled {
            Some(compiled) => compiled.clone(),
            None => {
                let compiled = self.engine.compile(source)?;
                self.compiled = Some(compiled.clone());
                compiled
            }
        };

        for variable in &self.context {
            scope.set_variable(variable.name(), variable.value().clone());
        }

        let result = self.engine.execute(&compiled, scope)?;

        for (name, value) in scope.bindings() {
            self.context.set(name, value);
        }
        for function in compiled.functions() {
            self.context
                .set(function.name().to_string(), Dynamic::from(function));
        }
        self.executed = true;
        debug!(
            "Plugin {} ran, context holds {} variable(s)",
            self.generated_id,
            self.context.len()
        );
        Ok(result)
    }

    /// Forget source, compiled artifact, hash and context.
    pub fn reset(&mut self) {
        self.source = None;
        self.compiled = None;
        self.content_hash = None;
        self.context.clear();
        self.executed = false;
    }

    /// SHA-256 of the source text in its detected encoding, lowercase hex.
    /// Empty when there is no source yet.
    pub fn compute_hash(&mut self) -> String {
        if let Some(hash) = &self.content_hash {
            return hash.clone();
        }
        let Some(source) = &self.source else {
            return String::new();
        };

        let encoding = source.detect_encoding().unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(encoding.encode(source.text()));
        let hash = format!("{:x}", hasher.finalize());
        self.content_hash = Some(hash.clone());
        hash
    }

    pub fn add_variables(&mut self, variables: &[Variable]) {
        self.context.extend(variables.iter().cloned());
    }

    pub fn remove_variables(&mut self, names: &[&str]) {
        for name in names {
            self.context.remove(name);
        }
    }

    pub fn register_host_type(&mut self, host: HostType) {
        self.context
            .set(host.name().to_string(), Dynamic::from(host));
    }

    // ========================================================================
    // Member resolution
    // ========================================================================

    pub fn get(&self, name: &str) -> PluginResult<Dynamic> {
        self.context
            .get(name)
            .cloned()
            .ok_or_else(|| self.missing(name))
    }

    pub fn set(&mut self, name: &str, value: Dynamic) {
        self.context.set(name, value);
    }

    /// Call a callable member, or read a plain member when no arguments are given.
    pub fn invoke(&self, name: &str, args: Vec<Dynamic>) -> PluginResult<Dynamic> {
        let value = self.context.get(name).ok_or_else(|| self.missing(name))?;

        if self.engine.is_callable(value) {
            return Ok(self.engine.invoke(value, args, self.compiled.as_ref())?);
        }
        if !args.is_empty() {
            return Err(PluginError::NotCallable {
                member: name.to_string(),
                arg_count: args.len(),
            });
        }
        Ok(value.clone())
    }

    /// Call `method` on the value bound to `member`.
    pub fn invoke_member(&self, member: &str, method: &str, args: Vec<Dynamic>) -> PluginResult<Dynamic> {
        let target = self.context.get(member).ok_or_else(|| self.missing(member))?;
        Ok(self
            .engine
            .invoke_member(target, method, args, self.compiled.as_ref())?)
    }

    fn missing(&self, member: &str) -> PluginError {
        PluginError::MissingMember {
            member: member.to_string(),
            plugin: self.identity_or_generated(),
        }
    }

    /// Drop everything and refuse to run again.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.reset();
        self.disposed = true;
        info!("Plugin {} disposed", self.generated_id);
    }
}

impl std::fmt::Debug for PluginCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginCore")
            .field("id", &self.generated_id)
            .field("state", &self.state())
            .field("variables", &self.context.len())
            .field("disposed", &self.disposed)
            .finish()
    }
}

fn identity_from_value(value: &Dynamic) -> PluginResult<Uuid> {
    if let Some(id) = value.clone().try_cast::<Uuid>() {
        return Ok(id);
    }
    if value.is_string() {
        let text = value.to_string();
        return Uuid::parse_str(text.trim()).map_err(|_| PluginError::InvalidIdentityOverride {
            found: format!("string {text:?}"),
        });
    }
    if value.is_blob() {
        let bytes = value.clone().cast::<Blob>();
        return Uuid::from_slice(&bytes).map_err(|_| PluginError::InvalidIdentityOverride {
            found: format!("blob of {} bytes", bytes.len()),
        });
    }
    Err(PluginError::InvalidIdentityOverride {
        found: value.type_name().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_engine::EngineConfig;

    fn core_with(code: &str) -> PluginCore {
        let engine = ScriptEngine::shared(EngineConfig::default());
        let mut core = PluginCore::new(engine.clone());
        core.set_source(engine.source_from_text(code));
        core
    }

    #[test]
    fn test_state_progression() {
        let mut core = core_with("let x = 1;");
        assert_eq!(core.state(), PluginState::Sourced);

        core.execute(&mut ScriptScope::new()).unwrap();
        assert_eq!(core.state(), PluginState::Ready);
        assert!(core.compiled().is_some());

        core.reset();
        assert_eq!(core.state(), PluginState::Uninitialized);
        assert!(core.compiled().is_none());
        assert!(core.context().is_empty());
    }

    #[test]
    fn test_failed_execution_leaves_compiled_state() {
        let mut core = core_with("throw \"nope\";");
        let err = core.execute(&mut ScriptScope::new()).unwrap_err();
        assert!(matches!(err, PluginError::Runtime(_)));
        assert_eq!(core.state(), PluginState::Compiled);
    }

    #[test]
    fn test_hash_is_cached_and_invalidated_with_source() {
        let mut core = core_with("let x = 1;");
        let first = core.compute_hash();
        assert_eq!(first.len(), 64);
        assert_eq!(first, core.compute_hash());

        let engine = core.engine().clone();
        core.set_source(engine.source_from_text("let x = 2;"));
        assert_ne!(first, core.compute_hash());

        core.reset();
        assert_eq!(core.compute_hash(), "");
    }

    #[test]
    fn test_identity_override_forms() {
        let mut core = core_with("1");
        let id = Uuid::new_v4();

        core.set(IDENTITY_VARIABLE, Dynamic::from(id.to_string()));
        assert_eq!(core.identity().unwrap(), id);

        core.set(IDENTITY_VARIABLE, Dynamic::from_blob(id.as_bytes().to_vec()));
        assert_eq!(core.identity().unwrap(), id);

        core.set(IDENTITY_VARIABLE, Dynamic::from(id));
        assert_eq!(core.identity().unwrap(), id);

        core.set(IDENTITY_VARIABLE, Dynamic::from(42_i64));
        assert!(matches!(
            core.identity(),
            Err(PluginError::InvalidIdentityOverride { .. })
        ));
        assert_eq!(core.identity_or_generated(), core.generated_id());

        core.set(IDENTITY_VARIABLE, Dynamic::from("not-a-uuid".to_string()));
        assert!(core.identity().is_err());
    }

    #[test]
    fn test_disposed_core_refuses_to_run() {
        let mut core = core_with("1");
        core.dispose();
        assert!(core.is_disposed());
        assert!(matches!(
            core.execute(&mut ScriptScope::new()),
            Err(PluginError::Disposed)
        ));
    }
}
