//! One OS watch per directory.

use notify::event::ModifyKind;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// Watches a single directory, non-recursively, and reports modified paths.
///
/// Notifications are delivered on the watch service's own thread and are
/// dropped while `enabled` is false. The OS watch is released on drop.
pub struct DirectoryWatcher {
    directory: PathBuf,
    _watcher: RecommendedWatcher,
}

impl DirectoryWatcher {
    pub fn new<F>(directory: &Path, enabled: Arc<AtomicBool>, on_change: F) -> notify::Result<Self>
    where
        F: Fn(PathBuf) + Send + 'static,
    {
        let watched = directory.to_path_buf();
        let mut watcher = RecommendedWatcher::new(
            move |result: notify::Result<Event>| match result {
                Ok(event) => {
                    if !enabled.load(Ordering::SeqCst) || !is_modification(&event.kind) {
                        return;
                    }
                    for path in event.paths {
                        debug!("Modified: {:?}", path);
                        on_change(path);
                    }
                }
                Err(err) => warn!("Watch error under {:?}: {}", watched, err),
            },
            Config::default(),
        )?;
        watcher.watch(directory, RecursiveMode::NonRecursive)?;
        info!("Watching directory {:?}", directory);

        Ok(Self {
            directory: directory.to_path_buf(),
            _watcher: watcher,
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

impl Drop for DirectoryWatcher {
    fn drop(&mut self) {
        info!("Stopped watching directory {:?}", self.directory);
    }
}

fn is_modification(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Modify(ModifyKind::Data(_)) | EventKind::Modify(ModifyKind::Any)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, RemoveKind};

    #[test]
    fn test_only_modifications_count() {
        assert!(is_modification(&EventKind::Modify(ModifyKind::Data(DataChange::Content))));
        assert!(is_modification(&EventKind::Modify(ModifyKind::Any)));
        assert!(!is_modification(&EventKind::Create(CreateKind::File)));
        assert!(!is_modification(&EventKind::Remove(RemoveKind::File)));
    }

    #[test]
    fn test_watch_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");
        let result = DirectoryWatcher::new(&missing, Arc::new(AtomicBool::new(true)), |_| {});
        assert!(result.is_err());
    }
}
