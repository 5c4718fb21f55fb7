//! Variable bindings visible to a running script.

use rhai::{Dynamic, Scope};

/// A set of named bindings a script runs against.
///
/// Setting a name that is already bound shadows the earlier binding, so the
/// most recent value is the one scripts observe.
#[derive(Debug, Clone, Default)]
pub struct ScriptScope {
    scope: Scope<'static>,
}

impl ScriptScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_variable(&mut self, name: &str, value: Dynamic) {
        self.scope.push_dynamic(name, value);
    }

    /// Current value bound to `name`.
    pub fn get_variable(&self, name: &str) -> Option<Dynamic> {
        self.scope
            .iter()
            .filter(|(binding, _, _)| *binding == name)
            .last()
            .map(|(_, _, value)| value)
    }

    /// Distinct binding names, in first-bound order.
    pub fn variable_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for (name, _, _) in self.scope.iter() {
            if !names.iter().any(|seen| seen == name) {
                names.push(name.to_string());
            }
        }
        names
    }

    /// Every visible binding with its current value, in first-bound order.
    pub fn bindings(&self) -> Vec<(String, Dynamic)> {
        self.variable_names()
            .into_iter()
            .filter_map(|name| self.get_variable(&name).map(|value| (name, value)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.scope.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scope.is_empty()
    }

    pub(crate) fn inner_mut(&mut self) -> &mut Scope<'static> {
        &mut self.scope
    }
}
