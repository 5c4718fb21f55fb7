use kiln_engine::{Dynamic, EngineConfig, ScriptEngine};
use kiln_plugins::{
    AddOutcome, ChangeOutcome, DuplicateMode, FilePlugin, HotReloadConfig, IDENTITY_VARIABLE,
    Plugin, PluginManager, into_handle, load_config,
};
use kiln_testing::{ScriptDir, assert_plugin_int, init_tracing, manual_config, manual_manager, next_event};
use std::time::Duration;
use uuid::Uuid;

#[test]
fn test_edit_reload_cycle() -> anyhow::Result<()> {
    init_tracing();
    let mut dir = ScriptDir::new()?;
    let plugin = dir.plugin("counter.rhai", "let total = 1;")?;
    let manager = manual_manager();
    manager.add_plugin(plugin.clone())?;
    assert_plugin_int!(plugin, "total", 1);

    for n in 2..5 {
        let path = dir.edit("counter.rhai", &format!("let total = {n};"))?;
        assert_eq!(manager.handle_change(&path)?, ChangeOutcome::Dispatched);
        assert_plugin_int!(plugin, "total", n);
    }
    Ok(())
}

#[test]
fn test_identity_override_survives_reload() -> anyhow::Result<()> {
    init_tracing();
    let id = Uuid::new_v4();
    let mut dir = ScriptDir::new()?;
    let plugin = dir.plugin("id.rhai", &format!("let {IDENTITY_VARIABLE} = \"{id}\";"))?;
    let manager = manual_manager();
    let mut reloads = manager.subscribe_reloads();
    manager.add_plugin(plugin.clone())?;
    assert_eq!(plugin.lock().identity()?, id);

    let path = dir.edit("id.rhai", &format!("let {IDENTITY_VARIABLE} = \"{id}\"; let extra = 1;"))?;
    manager.handle_change(&path)?;
    let event = reloads.try_recv()?;
    assert_eq!(event.plugin_id, id);
    Ok(())
}

#[test]
fn test_same_file_through_two_managers_is_independent() -> anyhow::Result<()> {
    let dir = ScriptDir::new()?;
    let path = dir.write("shared.rhai", "let v = 1;")?;
    let engine = ScriptEngine::shared(EngineConfig::default());

    let first = manual_manager();
    let second = manual_manager();
    first.add_plugin(into_handle(FilePlugin::new(engine.clone(), &path)))?;
    second.add_plugin(into_handle(FilePlugin::new(engine, &path)))?;

    first.shutdown();
    assert_eq!(first.plugin_count(), 0);
    assert_eq!(second.plugin_count(), 1);
    assert_eq!(second.watched_directories().len(), 1);
    Ok(())
}

#[test]
fn test_scripts_read_globals_through_manager() -> anyhow::Result<()> {
    let mut dir = ScriptDir::new()?;
    let manager = manual_manager();
    manager.set_global("base", Dynamic::from(10_i64));

    let plugin = dir.plugin(
        "globals.rhai",
        "let total = manager.get_global(\"base\") + 1; let seen = manager.plugin_count();",
    )?;
    manager.add_plugin(plugin.clone())?;
    assert_plugin_int!(plugin, "total", 11);
    assert_plugin_int!(plugin, "seen", 0);

    manager.set_global("base", Dynamic::from(20_i64));
    let path = dir.edit(
        "globals.rhai",
        "let total = base + 2; let seen = manager.plugin_count();",
    )?;
    manager.handle_change(&path)?;
    assert_plugin_int!(plugin, "total", 22);
    assert_plugin_int!(plugin, "seen", 1);
    Ok(())
}

#[test]
fn test_module_import_is_picked_up_on_reload() -> anyhow::Result<()> {
    let mut dir = ScriptDir::new()?;
    dir.write("helper.rhai", "export const LIMIT = 3;")?;
    let engine = ScriptEngine::shared(EngineConfig::default());
    engine.add_search_path(dir.path());

    let path = dir.write("main.rhai", "import \"helper\" as h; let limit = h::LIMIT;")?;
    let plugin = into_handle(FilePlugin::new(engine, &path));
    let manager = manual_manager();
    manager.add_plugin(plugin.clone())?;
    assert_plugin_int!(plugin, "limit", 3);

    // the helper is not a plugin, so editing it alone reloads nothing
    let helper = dir.edit("helper.rhai", "export const LIMIT = 7;")?;
    manager.handle_change(&helper)?;
    let helper = dir.edit("helper.rhai", "export const LIMIT = 7;")?;
    assert_eq!(manager.handle_change(&helper)?, ChangeOutcome::NoMatchingPlugins);
    assert_plugin_int!(plugin, "limit", 3);

    let path = dir.edit("main.rhai", "import \"helper\" as h; let limit = h::LIMIT;")?;
    manager.handle_change(&path)?;
    assert_plugin_int!(plugin, "limit", 7);
    Ok(())
}

#[test]
fn test_config_file_drives_manager() -> anyhow::Result<()> {
    let dir = ScriptDir::new()?;
    let config_path = dir.write(
        "kiln.json",
        r#"{ "monitor_files": false, "duplicate_mode": "disallow", "settle_delay_ms": 0 }"#,
    )?;
    let config: HotReloadConfig = load_config(&config_path)?;
    let manager = PluginManager::new(config);
    assert_eq!(manager.duplicate_mode(), DuplicateMode::Disallow);
    assert!(!manager.monitor_files());

    let path = dir.write("once.rhai", "1")?;
    let engine = ScriptEngine::shared(EngineConfig::default());
    assert_eq!(
        manager.add_plugin(into_handle(FilePlugin::new(engine.clone(), &path)))?,
        AddOutcome::Added
    );
    assert_eq!(
        manager.add_plugin(into_handle(FilePlugin::new(engine, &path)))?,
        AddOutcome::NotAdded
    );
    Ok(())
}

#[tokio::test]
async fn test_error_events_name_the_failure() -> anyhow::Result<()> {
    let mut dir = ScriptDir::new()?;
    let plugin = dir.plugin("math.rhai", "let v = 1;")?;
    let manager = PluginManager::new(manual_config());
    let mut errors = manager.subscribe_errors();
    manager.add_plugin(plugin)?;

    let path = dir.edit("math.rhai", "let v = 1 / 0;")?;
    assert_eq!(manager.handle_change(&path)?, ChangeOutcome::Dispatched);

    let event = next_event(&mut errors, Duration::from_secs(1)).await?;
    assert!(event.error.to_string().contains("ArithmeticError"));
    Ok(())
}
