//! Notifications emitted after reload attempts.

use crate::error::ReloadError;
use crate::plugin::PluginHandle;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// A plugin was reloaded and ran successfully.
#[derive(Debug, Clone)]
pub struct ReloadEvent {
    pub plugin: PluginHandle,
    pub plugin_id: Uuid,
    /// Changed path that triggered the reload; `None` for manual reloads.
    pub path: Option<PathBuf>,
    pub duration: Duration,
}

/// A plugin failed to reload or run.
#[derive(Debug, Clone)]
pub struct ReloadErrorEvent {
    pub plugin: PluginHandle,
    pub plugin_id: Uuid,
    pub path: Option<PathBuf>,
    pub error: Arc<ReloadError>,
}
