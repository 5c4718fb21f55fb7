//! Kiln testing utilities
//!
//! Fixtures for exercising plugins and the hot-reload manager without
//! hand-rolling temp directories, write-time juggling or event waits.

use anyhow::{Context, Result, bail};
use kiln_engine::{EngineConfig, ScriptEngine};
use kiln_plugins::{FilePlugin, HotReloadConfig, PluginHandle, PluginManager, into_handle};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Once};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;
use tokio::sync::broadcast;

/// Install a test-writer subscriber once, filtered by `RUST_LOG`.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn engine() -> Arc<ScriptEngine> {
    ScriptEngine::shared(EngineConfig::default())
}

/// Manager config for deterministic tests: no OS notifications, no settle delay.
pub fn manual_config() -> HotReloadConfig {
    HotReloadConfig::new()
        .with_monitor_files(false)
        .with_settle_delay(Duration::ZERO)
        .with_min_reload_interval(Duration::from_millis(50))
}

pub fn manual_manager() -> PluginManager {
    PluginManager::new(manual_config())
}

/// A temporary directory of scripts.
pub struct ScriptDir {
    dir: TempDir,
    /// Seconds the next [`ScriptDir::edit`] pushes the write time ahead.
    clock: u64,
}

impl ScriptDir {
    pub fn new() -> Result<Self> {
        Ok(Self {
            dir: TempDir::new().context("creating script dir")?,
            clock: 0,
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `code` to `name` and return the canonical path.
    pub fn write(&self, name: &str, code: &str) -> Result<PathBuf> {
        let path = self.dir.path().join(name);
        fs::write(&path, code).with_context(|| format!("writing {}", path.display()))?;
        Ok(fs::canonicalize(&path)?)
    }

    /// Rewrite `name` and move its write time further into the future than
    /// any previous edit, so the manager never debounces it.
    pub fn edit(&mut self, name: &str, code: &str) -> Result<PathBuf> {
        let path = self.write(name, code)?;
        self.clock += 5;
        let stamp = SystemTime::now() + Duration::from_secs(self.clock);
        File::options()
            .write(true)
            .open(&path)?
            .set_modified(stamp)?;
        Ok(path)
    }

    /// Write `name` and wrap it in a file plugin.
    pub fn plugin(&self, name: &str, code: &str) -> Result<PluginHandle> {
        let path = self.write(name, code)?;
        Ok(into_handle(FilePlugin::new(engine(), path)))
    }
}

/// Receive the next broadcast event or fail after `wait`.
pub async fn next_event<T: Clone>(rx: &mut broadcast::Receiver<T>, wait: Duration) -> Result<T> {
    match tokio::time::timeout(wait, rx.recv()).await {
        Ok(Ok(event)) => Ok(event),
        Ok(Err(err)) => bail!("event channel failed: {err}"),
        Err(_) => bail!("no event within {wait:?}"),
    }
}

/// Assert that a plugin member holds the given integer.
#[macro_export]
macro_rules! assert_plugin_int {
    ($plugin:expr, $name:expr, $expected:expr) => {{
        use kiln_plugins::Resolvable as _;
        let value = $plugin
            .lock()
            .get($name)
            .unwrap_or_else(|e| panic!("member {} missing: {e}", $name));
        assert_eq!(value.as_int().ok(), Some($expected), "member {}", $name);
    }};
}
