//! 可热重载的脚本插件
//! Hot-reloadable script plugins
//!
//! - 插件生命周期 / plugin lifecycle: source, compile, run, reload, dispose
//! - 运行时成员解析 / runtime member resolution over a persistent variable context
//! - 插件注册表 / an ordered registry with a duplicate policy
//! - 热重载管理器 / a manager that watches script directories and reloads on change
//!
//! ```no_run
//! use kiln_plugins::{FilePlugin, HotReloadConfig, PluginManager, ScriptEngine, into_handle};
//!
//! let engine = ScriptEngine::shared(Default::default());
//! let manager = PluginManager::new(HotReloadConfig::default());
//! manager.add_plugin(into_handle(FilePlugin::new(engine, "scripts/greeter.rhai")))?;
//! # Ok::<(), kiln_plugins::ManagerError>(())
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod hot_reload;
pub mod plugin;
pub mod registry;

pub use config::{ConfigError, HotReloadConfig, load_config};
pub use context::{Variable, VariableSet};
pub use error::{
    ManagerError, PluginError, PluginResult, PluginRuntimeError, ReloadError,
};
pub use hot_reload::{
    ChangeOutcome, DispatchQueue, Dispatcher, InlineDispatcher, ManagerHandle, PluginManager,
    QueueDispatcher, ReloadErrorEvent, ReloadEvent,
};
pub use plugin::{
    DISPLAY_MEMBER, FilePlugin, IDENTITY_VARIABLE, Plugin, PluginCore, PluginHandle, PluginState,
    Resolvable, TextPlugin, into_handle, same_handle,
};
pub use registry::{AddOutcome, DuplicateMode, PluginRegistry};

pub use kiln_engine::{
    Dynamic, EngineConfig, EngineError, HostType, ScriptEngine, ScriptFunction, ScriptScope,
    ScriptSource,
};
