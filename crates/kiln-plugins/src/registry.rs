//! Ordered plugin collection with a duplicate-handling policy.

use crate::plugin::{PluginHandle, same_handle};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// What [`PluginRegistry::add`] does with a plugin equal to one already present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateMode {
    /// Reject the newcomer.
    Disallow,
    /// Substitute the newcomer at the existing position and dispose the old plugin.
    #[default]
    Replace,
    /// Keep both.
    Allow,
}

/// Result of adding a plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    OverWrote,
    NotAdded,
}

/// Outcome of an insertion plus the plugin it displaced, if any.
pub struct Insertion {
    pub outcome: AddOutcome,
    pub evicted: Option<PluginHandle>,
}

/// Ordered list of plugins. Never holds two equal plugins unless the mode is
/// [`DuplicateMode::Allow`].
#[derive(Default)]
pub struct PluginRegistry {
    plugins: Vec<PluginHandle>,
    duplicate_mode: DuplicateMode,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(duplicate_mode: DuplicateMode) -> Self {
        Self {
            plugins: Vec::new(),
            duplicate_mode,
        }
    }

    pub fn duplicate_mode(&self) -> DuplicateMode {
        self.duplicate_mode
    }

    pub fn set_duplicate_mode(&mut self, mode: DuplicateMode) {
        self.duplicate_mode = mode;
    }

    pub fn add(&mut self, plugin: PluginHandle) -> AddOutcome {
        self.insert(plugin).outcome
    }

    /// Add `plugin` according to the duplicate mode, returning any plugin it replaced.
    ///
    /// A replaced plugin is disposed unless it is the same allocation as `plugin`.
    pub fn insert(&mut self, plugin: PluginHandle) -> Insertion {
        if self.duplicate_mode == DuplicateMode::Allow {
            self.plugins.push(plugin);
            debug!("Registry appended plugin, {} total", self.plugins.len());
            return Insertion {
                outcome: AddOutcome::Added,
                evicted: None,
            };
        }

        let Some(position) = self.index_of(&plugin) else {
            self.plugins.push(plugin);
            debug!("Registry added plugin, {} total", self.plugins.len());
            return Insertion {
                outcome: AddOutcome::Added,
                evicted: None,
            };
        };

        match self.duplicate_mode {
            DuplicateMode::Disallow => {
                debug!("Registry rejected duplicate plugin at {}", position);
                Insertion {
                    outcome: AddOutcome::NotAdded,
                    evicted: None,
                }
            }
            _ => {
                let previous = std::mem::replace(&mut self.plugins[position], plugin);
                let evicted = if Arc::ptr_eq(&previous, &self.plugins[position]) {
                    None
                } else {
                    previous.lock().dispose();
                    info!("Registry replaced plugin at {}", position);
                    Some(previous)
                };
                Insertion {
                    outcome: AddOutcome::OverWrote,
                    evicted,
                }
            }
        }
    }

    /// Remove the first plugin equal to `plugin`, returning the removed entry.
    pub fn remove(&mut self, plugin: &PluginHandle) -> Option<PluginHandle> {
        let position = self.index_of(plugin)?;
        let removed = self.plugins.remove(position);
        debug!("Registry removed plugin at {}, {} left", position, self.plugins.len());
        Some(removed)
    }

    pub fn index_of(&self, plugin: &PluginHandle) -> Option<usize> {
        self.plugins
            .iter()
            .position(|existing| same_handle(plugin, existing))
    }

    pub fn contains(&self, plugin: &PluginHandle) -> bool {
        self.index_of(plugin).is_some()
    }

    pub fn get(&self, index: usize) -> Option<&PluginHandle> {
        self.plugins.get(index)
    }

    /// First plugin whose effective identity is `id`.
    pub fn find_by_identity(&self, id: Uuid) -> Option<PluginHandle> {
        self.plugins
            .iter()
            .find(|plugin| matches!(plugin.lock().identity(), Ok(found) if found == id))
            .cloned()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PluginHandle> {
        self.plugins.iter()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Remove every plugin without disposing them.
    pub fn clear(&mut self) -> Vec<PluginHandle> {
        std::mem::take(&mut self.plugins)
    }
}

impl<'a> IntoIterator for &'a PluginRegistry {
    type Item = &'a PluginHandle;
    type IntoIter = std::slice::Iter<'a, PluginHandle>;

    fn into_iter(self) -> Self::IntoIter {
        self.plugins.iter()
    }
}
