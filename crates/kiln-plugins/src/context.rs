//! 插件上下文变量
//! Plugin context variables
//!
//! A plugin's context is the set of named values that persists across runs:
//! everything the script binds is read back into it, and everything in it is
//! visible to the next run.

use rhai::{Dynamic, Variant};
use std::collections::HashMap;

/// A named value. The name is fixed once created.
#[derive(Debug, Clone)]
pub struct Variable {
    name: String,
    value: Dynamic,
}

impl Variable {
    pub fn new(name: impl Into<String>, value: Dynamic) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    /// Wrap any script-compatible value.
    pub fn of<T: Variant + Clone>(name: impl Into<String>, value: T) -> Self {
        Self::new(name, Dynamic::from(value))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &Dynamic {
        &self.value
    }

    pub fn set_value(&mut self, value: Dynamic) {
        self.value = value;
    }

    pub fn into_value(self) -> Dynamic {
        self.value
    }
}

/// Insertion-ordered map of variables with unique names.
///
/// Re-setting an existing name keeps its original position.
#[derive(Debug, Clone, Default)]
pub struct VariableSet {
    entries: Vec<Variable>,
    index: HashMap<String, usize>,
}

impl VariableSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to `value`, returning the previous value if there was one.
    pub fn set(&mut self, name: impl Into<String>, value: Dynamic) -> Option<Dynamic> {
        let name = name.into();
        match self.index.get(&name) {
            Some(&position) => Some(std::mem::replace(&mut self.entries[position].value, value)),
            None => {
                self.index.insert(name.clone(), self.entries.len());
                self.entries.push(Variable { name, value });
                None
            }
        }
    }

    pub fn insert(&mut self, variable: Variable) -> Option<Dynamic> {
        let Variable { name, value } = variable;
        self.set(name, value)
    }

    pub fn get(&self, name: &str) -> Option<&Dynamic> {
        self.index.get(name).map(|&position| &self.entries[position].value)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Dynamic> {
        match self.index.get(name) {
            Some(&position) => Some(&mut self.entries[position].value),
            None => None,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Dynamic> {
        let position = self.index.remove(name)?;
        let removed = self.entries.remove(position);
        for slot in self.index.values_mut() {
            if *slot > position {
                *slot -= 1;
            }
        }
        Some(removed.value)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Variable> {
        self.entries.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|v| v.name.as_str())
    }

    /// Owned copy of every variable, in order.
    pub fn snapshot(&self) -> Vec<Variable> {
        self.entries.clone()
    }
}

impl<'a> IntoIterator for &'a VariableSet {
    type Item = &'a Variable;
    type IntoIter = std::slice::Iter<'a, Variable>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl Extend<Variable> for VariableSet {
    fn extend<I: IntoIterator<Item = Variable>>(&mut self, iter: I) {
        for variable in iter {
            self.insert(variable);
        }
    }
}

impl FromIterator<Variable> for VariableSet {
    fn from_iter<I: IntoIterator<Item = Variable>>(iter: I) -> Self {
        let mut set = VariableSet::new();
        set.extend(iter);
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(set: &VariableSet, name: &str) -> i64 {
        set.get(name).unwrap().as_int().unwrap()
    }

    #[test]
    fn test_set_keeps_original_position() {
        let mut set = VariableSet::new();
        assert!(set.set("a", Dynamic::from(1_i64)).is_none());
        set.set("b", Dynamic::from(2_i64));
        let previous = set.set("a", Dynamic::from(3_i64)).unwrap();

        assert_eq!(previous.as_int().unwrap(), 1);
        assert_eq!(set.names().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(int(&set, "a"), 3);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_remove_reindexes() {
        let mut set: VariableSet = vec![
            Variable::of("a", 1_i64),
            Variable::of("b", 2_i64),
            Variable::of("c", 3_i64),
        ]
        .into_iter()
        .collect();

        assert_eq!(set.remove("a").unwrap().as_int().unwrap(), 1);
        assert!(set.remove("a").is_none());
        assert_eq!(int(&set, "b"), 2);
        assert_eq!(int(&set, "c"), 3);

        set.set("a", Dynamic::from(4_i64));
        assert_eq!(set.names().collect::<Vec<_>>(), vec!["b", "c", "a"]);
    }

    #[test]
    fn test_get_mut_and_clear() {
        let mut set = VariableSet::new();
        set.set("count", Dynamic::from(1_i64));
        *set.get_mut("count").unwrap() = Dynamic::from(5_i64);
        assert_eq!(int(&set, "count"), 5);
        assert!(set.get_mut("missing").is_none());

        set.clear();
        assert!(set.is_empty());
        assert!(!set.contains("count"));
    }

    #[test]
    fn test_snapshot_is_detached() {
        let mut set = VariableSet::new();
        set.set("x", Dynamic::from(1_i64));
        let snapshot = set.snapshot();
        set.set("x", Dynamic::from(2_i64));

        assert_eq!(snapshot[0].name(), "x");
        assert_eq!(snapshot[0].value().as_int().unwrap(), 1);
    }
}
