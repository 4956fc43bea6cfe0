//! Append-only name to index map.

use std::collections::HashMap;

/// Entries keep the index they were added at for the table's lifetime;
/// bytecode embeds those indices directly.
///
/// `add` does not reject duplicate keys. A later `add` rebinds the name and
/// leaves the earlier entry in place, so callers check with `find` first.
#[derive(Debug, Clone)]
pub struct SymbolTable<T> {
    entries: Vec<T>,
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl<T> Default for SymbolTable<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            names: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<T: Default> SymbolTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a default entry bound to `key` and return it for filling in.
    pub fn add(&mut self, key: impl Into<String>) -> &mut T {
        let key = key.into();
        let idx = self.entries.len();
        self.index.insert(key.clone(), idx);
        self.names.push(key);
        self.entries.push(T::default());
        &mut self.entries[idx]
    }
}

impl<T> SymbolTable<T> {
    pub fn find(&self, key: &str) -> Option<usize> {
        self.index.get(key).copied()
    }

    pub fn get(&self, idx: usize) -> Option<&T> {
        self.entries.get(idx)
    }

    pub fn get_mut(&mut self, idx: usize) -> Option<&mut T> {
        self.entries.get_mut(idx)
    }

    /// Name an entry was added under.
    pub fn name(&self, idx: usize) -> Option<&str> {
        self.names.get(idx).map(String::as_str)
    }

    pub fn lookup(&self, key: &str) -> Option<&T> {
        self.find(key).and_then(|i| self.entries.get(i))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.names.clear();
        self.index.clear();
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.names
            .iter()
            .map(String::as_str)
            .zip(self.entries.iter())
    }
}
