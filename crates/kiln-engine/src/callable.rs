//! Compiled scripts and the callable values they expose.

use rhai::{AST, FnAccess};
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

/// A compiled script, cheap to clone.
#[derive(Clone)]
pub struct CompiledScript {
    ast: Arc<AST>,
    library: Arc<AST>,
    compiled_at: SystemTime,
}

impl CompiledScript {
    pub(crate) fn new(ast: AST) -> Self {
        let library = Arc::new(ast.clone_functions_only());
        Self {
            ast: Arc::new(ast),
            library,
            compiled_at: SystemTime::now(),
        }
    }

    pub fn ast(&self) -> &AST {
        &self.ast
    }

    /// Function definitions only, for resolving calls made from outside the script.
    pub(crate) fn library(&self) -> &AST {
        &self.library
    }

    pub fn compiled_at(&self) -> SystemTime {
        self.compiled_at
    }

    /// Public script-defined functions, one entry per name with every arity.
    pub fn functions(&self) -> Vec<ScriptFunction> {
        let mut functions: Vec<ScriptFunction> = Vec::new();
        for meta in self.ast.iter_functions() {
            if meta.access == FnAccess::Private || !crate::is_identifier(meta.name) {
                continue;
            }
            let arity = meta.params.len();
            match functions.iter_mut().find(|f| f.name == meta.name) {
                Some(existing) => existing.arities.push(arity),
                None => functions.push(ScriptFunction {
                    name: meta.name.to_string(),
                    arities: vec![arity],
                    library: Arc::clone(&self.library),
                }),
            }
        }
        functions
    }
}

impl fmt::Debug for CompiledScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledScript")
            .field("source", &self.ast.source())
            .field("functions", &self.ast.iter_functions().count())
            .field("compiled_at", &self.compiled_at)
            .finish()
    }
}

/// A function defined by a script, bound to the library it was compiled in.
#[derive(Clone)]
pub struct ScriptFunction {
    name: String,
    arities: Vec<usize>,
    library: Arc<AST>,
}

impl ScriptFunction {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arities(&self) -> &[usize] {
        &self.arities
    }

    pub(crate) fn library(&self) -> &AST {
        &self.library
    }
}

impl fmt::Debug for ScriptFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptFunction")
            .field("name", &self.name)
            .field("arities", &self.arities)
            .finish()
    }
}

/// Handle to a host type registered with the engine. Calling it runs the
/// constructor registered under the type's script name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostType {
    name: String,
    rust_type: &'static str,
}

impl HostType {
    pub(crate) fn new(name: String, rust_type: &'static str) -> Self {
        Self { name, rust_type }
    }

    /// Name the type is known by inside scripts.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rust_type(&self) -> &'static str {
        self.rust_type
    }
}
