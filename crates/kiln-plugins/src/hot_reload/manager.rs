//! Plugin manager
//!
//! Owns the registry, one directory watcher per watched directory, the
//! per-file debounce record and the globals injected into every plugin.
//! File changes are debounced, resolved to plugins and the reload is handed
//! to the configured [`Dispatcher`].

use super::dispatch::{Dispatcher, InlineDispatcher};
use super::events::{ReloadErrorEvent, ReloadEvent};
use super::watcher::DirectoryWatcher;
use crate::config::HotReloadConfig;
use crate::context::{Variable, VariableSet};
use crate::error::{ManagerError, ReloadError};
use crate::plugin::{Plugin, PluginHandle};
use crate::registry::{AddOutcome, DuplicateMode, PluginRegistry};
use kiln_engine::ScriptEngine;
use parking_lot::{Mutex, RwLock};
use rhai::Dynamic;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Instant, SystemTime};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

const EVENT_CAPACITY: usize = 64;
const MAX_UNHANDLED: usize = 64;

/// What [`PluginManager::handle_change`] did with a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOutcome {
    /// The path could not be read.
    Ignored,
    /// First time this path was seen; recorded, nothing reloaded.
    FirstObservation,
    /// Same write time, or too close to the previous one.
    Debounced,
    /// No registered plugin lives at the path.
    NoMatchingPlugins,
    /// Reload work was handed to the dispatcher.
    Dispatched,
}

/// Hot-reloading plugin manager. Cloning yields another handle to the same manager.
#[derive(Clone)]
pub struct PluginManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    config: HotReloadConfig,
    registry: RwLock<PluginRegistry>,
    plugin_count: AtomicUsize,
    watchers: Mutex<HashMap<PathBuf, DirectoryWatcher>>,
    last_write: Mutex<HashMap<PathBuf, SystemTime>>,
    globals: RwLock<VariableSet>,
    monitor_files: Arc<AtomicBool>,
    dispatcher: Arc<dyn Dispatcher>,
    reload_tx: broadcast::Sender<ReloadEvent>,
    error_tx: broadcast::Sender<ReloadErrorEvent>,
    unhandled: Mutex<VecDeque<ReloadError>>,
}

impl PluginManager {
    /// Manager that reloads on the notifying thread.
    pub fn new(config: HotReloadConfig) -> Self {
        Self::with_dispatcher(config, InlineDispatcher)
    }

    /// Manager that hands reload work to `dispatcher`.
    pub fn with_dispatcher(config: HotReloadConfig, dispatcher: impl Dispatcher + 'static) -> Self {
        let (reload_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let (error_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let monitor_files = Arc::new(AtomicBool::new(config.monitor_files));
        let registry = PluginRegistry::with_mode(config.duplicate_mode);

        Self {
            inner: Arc::new(ManagerInner {
                config,
                registry: RwLock::new(registry),
                plugin_count: AtomicUsize::new(0),
                watchers: Mutex::new(HashMap::new()),
                last_write: Mutex::new(HashMap::new()),
                globals: RwLock::new(VariableSet::new()),
                monitor_files,
                dispatcher: Arc::new(dispatcher),
                reload_tx,
                error_tx,
                unhandled: Mutex::new(VecDeque::new()),
            }),
        }
    }

    pub fn config(&self) -> &HotReloadConfig {
        &self.inner.config
    }

    /// Handle scripts and hosts can hold without keeping the manager alive.
    pub fn handle(&self) -> ManagerHandle {
        ManagerHandle {
            inner: Arc::downgrade(&self.inner),
        }
    }

    // ========================================================================
    // Plugins
    // ========================================================================

    /// Inject the manager handle and globals, run the plugin once, register it
    /// and start watching its directory if it is file-backed.
    ///
    /// Nothing is registered when the run fails, the `Guid` override is
    /// malformed or the directory cannot be watched.
    pub fn add_plugin(&self, plugin: PluginHandle) -> Result<AddOutcome, ManagerError> {
        let inner = &self.inner;
        let file = {
            let mut guard = plugin.lock();
            inner.inject(&mut *guard);
            if let Err(err) = guard.run().and_then(|_| guard.identity()) {
                guard.remove_context_variables(&[inner.config.manager_variable.as_str()]);
                return Err(err.into());
            }
            guard.script_file()
        };

        if let Some(directory) = file.as_deref().and_then(Path::parent) {
            if let Err(err) = inner.ensure_watcher(directory) {
                plugin
                    .lock()
                    .remove_context_variables(&[inner.config.manager_variable.as_str()]);
                return Err(err.into());
            }
        }

        let insertion = {
            let mut registry = inner.registry.write();
            let insertion = registry.insert(plugin.clone());
            inner.plugin_count.store(registry.len(), Ordering::SeqCst);
            insertion
        };
        if let Some(evicted) = &insertion.evicted {
            inner.release_watcher(evicted);
        }

        match insertion.outcome {
            AddOutcome::NotAdded => {
                inner.release_watcher(&plugin);
                plugin
                    .lock()
                    .remove_context_variables(&[inner.config.manager_variable.as_str()]);
                debug!("Plugin not added, an equal plugin is already registered");
            }
            AddOutcome::Added | AddOutcome::OverWrote => {
                if let Some(file) = &file {
                    inner.record_write(file);
                }
                info!(
                    "Plugin {} added ({:?})",
                    plugin.lock().core().identity_or_generated(),
                    insertion.outcome
                );
            }
        }
        Ok(insertion.outcome)
    }

    /// Remove the first registered plugin equal to `plugin`. Returns whether
    /// anything was removed.
    pub fn remove_plugin(&self, plugin: &PluginHandle) -> bool {
        let inner = &self.inner;
        let removed = {
            let mut registry = inner.registry.write();
            let removed = registry.remove(plugin);
            inner.plugin_count.store(registry.len(), Ordering::SeqCst);
            removed
        };
        let Some(removed) = removed else {
            return false;
        };

        inner.release_watcher(&removed);
        let manager_variable = inner.config.manager_variable.as_str();
        removed.lock().remove_context_variables(&[manager_variable]);
        if !Arc::ptr_eq(&removed, plugin) {
            plugin.lock().remove_context_variables(&[manager_variable]);
        }
        info!("Plugin removed, {} left", self.plugin_count());
        true
    }

    pub fn plugins(&self) -> Vec<PluginHandle> {
        self.inner.registry.read().iter().cloned().collect()
    }

    pub fn plugin_count(&self) -> usize {
        self.inner.plugin_count.load(Ordering::SeqCst)
    }

    pub fn duplicate_mode(&self) -> DuplicateMode {
        self.inner.registry.read().duplicate_mode()
    }

    pub fn set_duplicate_mode(&self, mode: DuplicateMode) {
        self.inner.registry.write().set_duplicate_mode(mode);
    }

    /// Reload and re-run one plugin now, with the same event semantics as a
    /// file-triggered reload.
    pub fn reload(&self, plugin: &PluginHandle) -> Result<(), ReloadError> {
        self.inner.reload_one(plugin, None)
    }

    // ========================================================================
    // File changes
    // ========================================================================

    /// Process a change notification for `path`, a file or a directory.
    ///
    /// Watchers call this; hosts may call it directly. Errors from an inline
    /// reload are returned when nobody subscribes to reload errors.
    pub fn handle_change(&self, path: impl AsRef<Path>) -> Result<ChangeOutcome, ReloadError> {
        self.inner.handle_change(path.as_ref())
    }

    pub fn set_monitor_files(&self, enabled: bool) {
        self.inner.monitor_files.store(enabled, Ordering::SeqCst);
        info!("File monitoring {}", if enabled { "enabled" } else { "paused" });
    }

    pub fn monitor_files(&self) -> bool {
        self.inner.monitor_files.load(Ordering::SeqCst)
    }

    /// Canonical directories currently watched, sorted.
    pub fn watched_directories(&self) -> Vec<PathBuf> {
        let mut directories: Vec<PathBuf> = self.inner.watchers.lock().keys().cloned().collect();
        directories.sort();
        directories
    }

    /// Errors raised on watcher threads with nobody subscribed to reload errors.
    ///
    /// Only the most recent 64 are kept; hosts that neither subscribe nor
    /// drain this lose the older ones.
    pub fn take_unhandled_errors(&self) -> Vec<ReloadError> {
        self.inner.unhandled.lock().drain(..).collect()
    }

    // ========================================================================
    // Events
    // ========================================================================

    pub fn subscribe_reloads(&self) -> broadcast::Receiver<ReloadEvent> {
        self.inner.reload_tx.subscribe()
    }

    /// Subscribing switches failed reloads from returned errors to events.
    pub fn subscribe_errors(&self) -> broadcast::Receiver<ReloadErrorEvent> {
        self.inner.error_tx.subscribe()
    }

    // ========================================================================
    // Globals
    // ========================================================================

    /// Set a variable injected into every plugin on add and reload.
    pub fn set_global(&self, name: impl Into<String>, value: Dynamic) {
        self.inner.globals.write().set(name, value);
    }

    pub fn global(&self, name: &str) -> Option<Dynamic> {
        self.inner.globals.read().get(name).cloned()
    }

    pub fn remove_global(&self, name: &str) -> Option<Dynamic> {
        self.inner.globals.write().remove(name)
    }

    pub fn globals(&self) -> Vec<Variable> {
        self.inner.globals.read().snapshot()
    }

    /// Stop every watcher and dispose every plugin.
    pub fn shutdown(&self) {
        let inner = &self.inner;
        let watchers: Vec<DirectoryWatcher> = inner.watchers.lock().drain().map(|(_, w)| w).collect();
        drop(watchers);
        inner.last_write.lock().clear();

        let plugins = {
            let mut registry = inner.registry.write();
            inner.plugin_count.store(0, Ordering::SeqCst);
            registry.clear()
        };
        for plugin in &plugins {
            plugin.lock().dispose();
        }
        info!("Plugin manager shut down, {} plugin(s) disposed", plugins.len());
    }
}

impl fmt::Debug for PluginManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginManager")
            .field("plugins", &self.plugin_count())
            .field("watched_directories", &self.watched_directories())
            .field("monitor_files", &self.monitor_files())
            .finish()
    }
}

impl ManagerInner {
    fn inject(self: &Arc<Self>, plugin: &mut dyn Plugin) {
        ManagerHandle::install(plugin.core().engine());
        let mut variables = self.globals.read().snapshot();
        variables.push(Variable::of(
            self.config.manager_variable.clone(),
            ManagerHandle {
                inner: Arc::downgrade(self),
            },
        ));
        plugin.add_context_variables(&variables);
    }

    fn ensure_watcher(self: &Arc<Self>, directory: &Path) -> Result<(), notify::Error> {
        let mut watchers = self.watchers.lock();
        if watchers.contains_key(directory) {
            return Ok(());
        }
        let weak = Arc::downgrade(self);
        let watcher = DirectoryWatcher::new(directory, self.monitor_files.clone(), move |path| {
            if let Some(inner) = weak.upgrade() {
                inner.on_notification(path);
            }
        })?;
        watchers.insert(directory.to_path_buf(), watcher);
        Ok(())
    }

    /// Record the current write time of `file` as its first observation.
    fn record_write(&self, file: &Path) {
        if let Ok(modified) = modified_time(file) {
            self.last_write.lock().insert(file.to_path_buf(), modified);
        }
    }

    /// Keep at most [`MAX_UNHANDLED`] errors, dropping the oldest.
    fn record_unhandled(&self, err: ReloadError) {
        let mut unhandled = self.unhandled.lock();
        if unhandled.len() == MAX_UNHANDLED {
            unhandled.pop_front();
        }
        unhandled.push_back(err);
    }

    /// Drop the watcher for `plugin`'s directory when no registered plugin lives there.
    fn release_watcher(&self, plugin: &PluginHandle) {
        let Some(file) = plugin.lock().script_file() else {
            return;
        };
        let Some(directory) = file.parent() else {
            return;
        };

        let still_used = self.registry.read().iter().any(|registered| {
            registered.lock().script_file().as_deref().and_then(Path::parent) == Some(directory)
        });
        if still_used {
            return;
        }

        if self.watchers.lock().remove(directory).is_some() {
            debug!("No plugins left under {:?}", directory);
        }
        self.last_write
            .lock()
            .retain(|path, _| path.parent() != Some(directory));
    }

    fn on_notification(self: &Arc<Self>, path: PathBuf) {
        if !self.config.should_watch(&path) {
            return;
        }
        match self.handle_change(&path) {
            Ok(outcome) => debug!("Change to {:?}: {:?}", path, outcome),
            Err(err) => {
                error!("Unhandled reload error for {:?}: {}", path, err);
                self.record_unhandled(err);
            }
        }
    }

    fn handle_change(self: &Arc<Self>, path: &Path) -> Result<ChangeOutcome, ReloadError> {
        let path = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        let modified = match modified_time(&path) {
            Ok(modified) => modified,
            Err(err) => {
                debug!("Ignoring change to {:?}: {}", path, err);
                return Ok(ChangeOutcome::Ignored);
            }
        };

        {
            let mut last_write = self.last_write.lock();
            let Some(previous) = last_write.get(&path).copied() else {
                last_write.insert(path.clone(), modified);
                debug!("First observation of {:?}", path);
                return Ok(ChangeOutcome::FirstObservation);
            };
            let gap = modified
                .duration_since(previous)
                .unwrap_or_else(|e| e.duration());
            if modified == previous || gap <= self.config.min_reload_interval {
                debug!("Debounced change to {:?} ({:?} since last)", path, gap);
                return Ok(ChangeOutcome::Debounced);
            }
            last_write.insert(path.clone(), modified);
        }

        if self.matching_plugins(&path).is_empty() {
            debug!("No plugins registered for {:?}", path);
            return Ok(ChangeOutcome::NoMatchingPlugins);
        }

        if !self.config.settle_delay.is_zero() {
            std::thread::sleep(self.config.settle_delay);
        }

        let inner = Arc::clone(self);
        self.dispatcher
            .dispatch(Box::new(move || inner.reload_matching(&path)))?;
        Ok(ChangeOutcome::Dispatched)
    }

    /// A file path matches plugins with the same file name; a directory path
    /// matches plugins whose file lives directly in it.
    fn matching_plugins(&self, path: &Path) -> Vec<PluginHandle> {
        let registry = self.registry.read();
        if path.is_dir() {
            return registry
                .iter()
                .filter(|plugin| {
                    plugin.lock().script_file().as_deref().and_then(Path::parent) == Some(path)
                })
                .cloned()
                .collect();
        }

        let Some(name) = path.file_name() else {
            return Vec::new();
        };
        registry
            .iter()
            .filter(|plugin| {
                plugin.lock().script_file().as_deref().and_then(Path::file_name) == Some(name)
            })
            .cloned()
            .collect()
    }

    fn reload_matching(self: &Arc<Self>, path: &Path) -> Result<(), ReloadError> {
        let plugins = self.matching_plugins(path);
        debug!("Reloading {} plugin(s) for {:?}", plugins.len(), path);
        for plugin in &plugins {
            self.reload_one(plugin, Some(path))?;
        }
        Ok(())
    }

    fn reload_one(self: &Arc<Self>, plugin: &PluginHandle, path: Option<&Path>) -> Result<(), ReloadError> {
        let started = Instant::now();
        let (plugin_id, result) = {
            let mut guard = plugin.lock();
            guard.reload_plugin();
            self.inject(&mut *guard);
            let result = guard.run().and_then(|_| guard.identity());
            (guard.core().identity_or_generated(), result)
        };
        let path = path.map(Path::to_path_buf);

        match result {
            Ok(_) => {
                let duration = started.elapsed();
                info!("Reloaded plugin {} in {:?}", plugin_id, duration);
                let _ = self.reload_tx.send(ReloadEvent {
                    plugin: plugin.clone(),
                    plugin_id,
                    path,
                    duration,
                });
                Ok(())
            }
            Err(source) => {
                let error = ReloadError::Plugin {
                    plugin: plugin_id,
                    path: path.clone(),
                    source,
                };
                if self.error_tx.receiver_count() == 0 {
                    return Err(error);
                }
                warn!("{}", error);
                let _ = self.error_tx.send(ReloadErrorEvent {
                    plugin: plugin.clone(),
                    plugin_id,
                    path,
                    error: Arc::new(error),
                });
                Ok(())
            }
        }
    }
}

fn modified_time(path: &Path) -> std::io::Result<SystemTime> {
    std::fs::metadata(path)?.modified()
}

// ============================================================================
// Script-side manager handle
// ============================================================================

/// Weak back-reference to a manager, injected into every managed plugin.
///
/// Scripts see it as a `PluginManager` value with `get_global(name)`,
/// `plugin_count()` and `monitor_files()`.
#[derive(Clone)]
pub struct ManagerHandle {
    inner: Weak<ManagerInner>,
}

impl ManagerHandle {
    fn install(engine: &ScriptEngine) {
        engine.configure_once("kiln::manager", |engine| {
            engine.register_type_with_name::<ManagerHandle>("PluginManager");
            engine.register_fn("get_global", |handle: &mut ManagerHandle, name: &str| {
                handle.global(name).unwrap_or(Dynamic::UNIT)
            });
            engine.register_fn("plugin_count", |handle: &mut ManagerHandle| {
                handle.plugin_count() as i64
            });
            engine.register_fn("monitor_files", |handle: &mut ManagerHandle| {
                handle.monitor_files()
            });
        });
    }

    /// Whether the manager still exists.
    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }

    pub fn global(&self, name: &str) -> Option<Dynamic> {
        let inner = self.inner.upgrade()?;
        let value = inner.globals.read().get(name).cloned();
        value
    }

    /// Registered plugin count; readable while the registry is busy.
    pub fn plugin_count(&self) -> usize {
        self.inner
            .upgrade()
            .map(|inner| inner.plugin_count.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    pub fn monitor_files(&self) -> bool {
        self.inner
            .upgrade()
            .map(|inner| inner.monitor_files.load(Ordering::SeqCst))
            .unwrap_or(false)
    }
}

impl fmt::Debug for ManagerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagerHandle")
            .field("alive", &self.is_alive())
            .finish()
    }
}
