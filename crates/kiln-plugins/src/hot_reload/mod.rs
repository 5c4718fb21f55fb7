//! 热重载
//! Hot reload
//!
//! [`PluginManager`] registers plugins, watches the directories their script
//! files live in and reloads the matching plugins when a file changes.
//! Reload outcomes are broadcast as [`ReloadEvent`] / [`ReloadErrorEvent`].

mod dispatch;
mod events;
mod manager;
mod watcher;

pub use dispatch::{DispatchQueue, Dispatcher, InlineDispatcher, QueueDispatcher, ReloadJob, queue};
pub use events::{ReloadErrorEvent, ReloadEvent};
pub use manager::{ChangeOutcome, ManagerHandle, PluginManager};
pub use watcher::DirectoryWatcher;
