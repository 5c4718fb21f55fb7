//! Live reload demo
//!
//! Loads every `.rhai` file in a directory as a plugin, then calls into them
//! on a timer. Edit the scripts while it runs to see them reload.
//!
//! ```text
//! cargo run -p live-reload -- [scripts-dir]
//! RUST_LOG=kiln_plugins=debug cargo run -p live-reload
//! ```

use anyhow::Result;
use kiln_plugins::{
    Dynamic, EngineConfig, FilePlugin, HotReloadConfig, PluginHandle, PluginManager, Resolvable,
    ScriptEngine, into_handle,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const TICKS: usize = 30;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let scripts = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("scripts"));
    info!("Loading plugins from {}", scripts.display());

    let engine = ScriptEngine::shared(EngineConfig::default());
    let manager = PluginManager::new(HotReloadConfig::default().with_extension("rhai"));
    manager.set_global("max_len", Dynamic::from(24_i64));

    spawn_event_log(&manager);

    let mut plugins = Vec::new();
    for entry in std::fs::read_dir(&scripts)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("rhai") {
            continue;
        }
        let plugin = into_handle(FilePlugin::new(engine.clone(), &path));
        match manager.add_plugin(plugin.clone()) {
            Ok(outcome) => {
                info!("{} -> {:?}", plugin.lock(), outcome);
                plugins.push(plugin);
            }
            Err(err) => warn!("Skipping {}: {}", path.display(), err),
        }
    }
    info!("Watching {:?}", manager.watched_directories());

    let mut ticker = tokio::time::interval(Duration::from_secs(2));
    for tick in 1..=TICKS {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => break,
        }
        for plugin in &plugins {
            exercise(tick, plugin);
        }
    }

    manager.shutdown();
    info!("Done");
    Ok(())
}

fn spawn_event_log(manager: &PluginManager) {
    let mut reloads = manager.subscribe_reloads();
    let mut errors = manager.subscribe_errors();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                Ok(event) = reloads.recv() => {
                    info!("Reloaded {} in {:?}", event.plugin.lock(), event.duration);
                }
                Ok(event) = errors.recv() => {
                    warn!("Reload of {:?} failed: {}", event.path, event.error);
                }
                else => break,
            }
        }
    });
}

fn exercise(tick: usize, plugin: &PluginHandle) {
    let guard = plugin.lock();
    let name = guard.to_string();
    let result = match name.as_str() {
        "greeter" => guard.get("greeting").and_then(|greeting| {
            let punctuation = guard.get("punctuation")?;
            guard.invoke_by_name("greet", vec![greeting, Dynamic::from("Kiln"), punctuation])
        }),
        "rules" => guard.get("limit").and_then(|limit| {
            let text = "a message from the host";
            guard.invoke_by_name("check", vec![Dynamic::from(text), limit])
        }),
        _ => return,
    };
    match result {
        Ok(value) => info!("[{tick}] {name}: {value}"),
        Err(err) => warn!("[{tick}] {name}: {err}"),
    }
}
