//! Rhai 脚本引擎封装
//! Rhai script engine wrapper
//!
//! 为插件层提供编译、执行、调用与宿主类型注册能力
//! Compiles, executes and invokes scripts and registers host types for the plugin layer

use crate::callable::{CompiledScript, HostType, ScriptFunction};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::scope::ScriptScope;
use crate::source::ScriptSource;
use parking_lot::{Mutex, RwLock};
use rhai::module_resolvers::{FileModuleResolver, ModuleResolversCollection};
use rhai::{AST, CustomType, Dynamic, Engine, EvalAltResult, FnPtr, Scope, Variant};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Scope variable holding the call target in generated member calls.
const MEMBER_TARGET: &str = "target";

// ============================================================================
// 脚本引擎
// Script Engine
// ============================================================================

/// 线程安全的脚本引擎，通过 `Arc` 在插件间共享
/// Thread-safe script engine, shared between plugins through `Arc`
pub struct ScriptEngine {
    engine: RwLock<Engine>,
    config: EngineConfig,
    search_paths: RwLock<Vec<PathBuf>>,
    installed_apis: Mutex<HashSet<String>>,
}

impl ScriptEngine {
    /// 创建新的脚本引擎
    /// Create a new script engine
    pub fn new(config: EngineConfig) -> Self {
        let mut engine = Engine::new();
        Self::apply_limits(&mut engine, &config);
        Self::route_output(&mut engine);
        Self::register_builtin_api(&mut engine);

        Self {
            engine: RwLock::new(engine),
            config,
            search_paths: RwLock::new(Vec::new()),
            installed_apis: Mutex::new(HashSet::new()),
        }
    }

    /// 创建可共享的引擎
    /// Create an engine ready to be shared
    pub fn shared(config: EngineConfig) -> Arc<Self> {
        Arc::new(Self::new(config))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn apply_limits(engine: &mut Engine, config: &EngineConfig) {
        engine.set_max_call_levels(config.max_call_levels);
        engine.set_max_operations(config.max_operations);
        engine.set_max_expr_depths(config.max_expr_depth, config.max_function_expr_depth);
        engine.set_strict_variables(config.strict_variables);
    }

    fn route_output(engine: &mut Engine) {
        engine.on_print(|text| {
            info!(target: "kiln::script", "{}", text);
        });
        engine.on_debug(|text, source, pos| {
            debug!(target: "kiln::script", source = source.unwrap_or("<inline>"), %pos, "{}", text);
        });
    }

    fn register_builtin_api(engine: &mut Engine) {
        engine.register_type_with_name::<ScriptFunction>("ScriptFunction");
        engine.register_type_with_name::<HostType>("HostType");
        engine.register_type_with_name::<Uuid>("Uuid");
        engine.register_fn("new_uuid", Uuid::new_v4);
        engine.register_fn("parse_uuid", |text: &str| -> Result<Uuid, Box<EvalAltResult>> {
            Uuid::parse_str(text).map_err(|e| e.to_string().into())
        });
        engine.register_fn("to_string", |id: &mut Uuid| id.to_string());
    }

    // ========================================================================
    // 源码与编译
    // Sources and compilation
    // ========================================================================

    /// 从文件读取脚本源码
    /// Read script source from a file
    pub fn source_from_file(&self, path: impl AsRef<Path>) -> EngineResult<ScriptSource> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| EngineError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let resolved = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        ScriptSource::from_bytes(&bytes, Some(resolved))
    }

    /// 从内存文本创建脚本源码
    /// Create a script source from in-memory text
    pub fn source_from_text(&self, code: impl Into<String>) -> ScriptSource {
        ScriptSource::from_text(code)
    }

    /// 编译脚本
    /// Compile a script
    pub fn compile(&self, source: &ScriptSource) -> EngineResult<CompiledScript> {
        let engine = self.engine.read_recursive();
        let mut ast = engine
            .compile(source.text())
            .map_err(|error| EngineError::Compile {
                origin: source.origin(),
                error,
            })?;
        if let Some(path) = source.path() {
            ast.set_source(path.display().to_string());
        }
        debug!("Compiled script {}", source.origin());
        Ok(CompiledScript::new(ast))
    }

    // ========================================================================
    // 执行与调用
    // Execution and invocation
    // ========================================================================

    /// 在给定作用域中执行已编译脚本
    /// Execute a compiled script against the given scope
    pub fn execute(&self, script: &CompiledScript, scope: &mut ScriptScope) -> EngineResult<Dynamic> {
        let engine = self.engine.read_recursive();
        let result = engine.eval_ast_with_scope::<Dynamic>(scope.inner_mut(), script.ast())?;
        Ok(result)
    }

    /// 判断值是否可调用
    /// Whether a value can be passed to [`ScriptEngine::invoke`]
    pub fn is_callable(&self, value: &Dynamic) -> bool {
        value.is::<FnPtr>() || value.is::<ScriptFunction>() || value.is::<HostType>()
    }

    /// 调用可调用值
    /// Invoke a callable value
    ///
    /// `library` supplies script functions that function pointers may refer to.
    pub fn invoke(
        &self,
        callable: &Dynamic,
        args: Vec<Dynamic>,
        library: Option<&CompiledScript>,
    ) -> EngineResult<Dynamic> {
        let engine = self.engine.read_recursive();

        if let Some(function) = callable.clone().try_cast::<ScriptFunction>() {
            let mut scope = Scope::new();
            let result =
                engine.call_fn::<Dynamic>(&mut scope, function.library(), function.name(), args)?;
            return Ok(result);
        }

        let empty = AST::empty();
        let ast = library.map(CompiledScript::library).unwrap_or(&empty);

        if let Some(pointer) = callable.clone().try_cast::<FnPtr>() {
            return Ok(pointer.call::<Dynamic>(&engine, ast, args)?);
        }

        if let Some(host) = callable.clone().try_cast::<HostType>() {
            let constructor = FnPtr::new(host.name())?;
            return Ok(constructor.call::<Dynamic>(&engine, ast, args)?);
        }

        Err(EngineError::NotCallable {
            type_name: callable.type_name().to_string(),
        })
    }

    /// 在值上调用成员方法
    /// Call a method on a value, as `target.name(args...)` would in a script
    ///
    /// `library` supplies the functions that closures stored on the target were defined in.
    pub fn invoke_member(
        &self,
        target: &Dynamic,
        name: &str,
        args: Vec<Dynamic>,
        library: Option<&CompiledScript>,
    ) -> EngineResult<Dynamic> {
        if !crate::is_identifier(name) {
            return Err(EngineError::InvalidMemberName(name.to_string()));
        }

        let mut scope = Scope::new();
        scope.push_dynamic(MEMBER_TARGET, target.clone());
        let mut params = Vec::with_capacity(args.len());
        for (index, arg) in args.into_iter().enumerate() {
            let param = format!("arg{index}");
            scope.push_dynamic(param.as_str(), arg);
            params.push(param);
        }
        let call = format!("{MEMBER_TARGET}.{name}({})", params.join(", "));

        let engine = self.engine.read_recursive();
        let call_ast = engine
            .compile_with_scope(&scope, &call)
            .map_err(|error| EngineError::Compile {
                origin: "<member call>".to_string(),
                error,
            })?;
        let ast = match library {
            Some(library) => library.library().merge(&call_ast),
            None => call_ast,
        };
        let result = engine.eval_ast_with_scope::<Dynamic>(&mut scope, &ast)?;
        Ok(result)
    }

    // ========================================================================
    // 宿主 API 注册
    // Host API registration
    // ========================================================================

    /// 注册宿主类型
    /// Register a host type and return a callable handle to its constructor
    pub fn register_host_type<T>(&self) -> HostType
    where
        T: CustomType + Variant + Clone,
    {
        let name = short_type_name::<T>();
        self.engine.write().build_type::<T>();
        debug!("Registered host type {}", name);
        HostType::new(name, std::any::type_name::<T>())
    }

    /// 直接配置底层引擎
    /// Configure the underlying engine directly
    pub fn configure<R>(&self, f: impl FnOnce(&mut Engine) -> R) -> R {
        let mut engine = self.engine.write();
        f(&mut engine)
    }

    /// 以给定键仅配置一次
    /// Configure the engine once per key; later calls with the same key are skipped
    pub fn configure_once(&self, key: &str, f: impl FnOnce(&mut Engine)) -> bool {
        let mut installed = self.installed_apis.lock();
        if installed.contains(key) {
            return false;
        }
        self.configure(f);
        installed.insert(key.to_string());
        true
    }

    // ========================================================================
    // 模块搜索路径
    // Module search paths
    // ========================================================================

    /// 添加模块搜索路径
    /// Add a directory scripts may `import` modules from
    pub fn add_search_path(&self, path: impl Into<PathBuf>) {
        self.add_search_paths([path.into()]);
    }

    pub fn add_search_paths(&self, paths: impl IntoIterator<Item = PathBuf>) {
        let mut search_paths = self.search_paths.write();
        for path in paths {
            if !search_paths.contains(&path) {
                search_paths.push(path);
            }
        }

        let mut resolvers = ModuleResolversCollection::new();
        for path in search_paths.iter() {
            let mut resolver = FileModuleResolver::new_with_path(path);
            resolver.enable_cache(false);
            resolvers.push(resolver);
        }
        self.engine.write().set_module_resolver(resolvers);
        debug!("Module search paths: {:?}", *search_paths);
    }

    pub fn search_paths(&self) -> Vec<PathBuf> {
        self.search_paths.read().clone()
    }
}

impl Default for ScriptEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl std::fmt::Debug for ScriptEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptEngine")
            .field("config", &self.config)
            .field("search_paths", &*self.search_paths.read())
            .finish()
    }
}

/// `my_crate::module::Widget<T>` -> `Widget`
fn short_type_name<T>() -> String {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}
