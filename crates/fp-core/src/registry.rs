use crate::rule::{ChainSpec, RuleSpec};

/// Identity predicate used for dedup and removal.
pub type Matcher<T> = fn(&T, &T) -> bool;

/// Ordered collection that never holds two matching entries.
///
/// Insertion order is replay order for every bulk install or cancel, so
/// entries are appended and never sorted.
#[derive(Debug, Clone)]
pub struct Registry<T> {
    entries: Vec<T>,
    matcher: Matcher<T>,
}

pub type ChainRegistry = Registry<ChainSpec>;
pub type RuleRegistry = Registry<RuleSpec>;

fn structural<T: PartialEq>(a: &T, b: &T) -> bool {
    a == b
}

impl<T: PartialEq> Registry<T> {
    /// Registry using the entry type's `PartialEq` as identity.
    pub fn new() -> Self {
        Self::with_matcher(structural::<T>)
    }
}

impl<T> Registry<T> {
    pub fn with_matcher(matcher: Matcher<T>) -> Self {
        Self {
            entries: Vec::new(),
            matcher,
        }
    }

    pub fn contains(&self, entry: &T) -> bool {
        self.entries.iter().any(|e| (self.matcher)(e, entry))
    }

    /// Appends `entry` unless a matching one is already present.
    /// Returns whether the registry changed.
    pub fn add(&mut self, entry: T) -> bool {
        if self.contains(&entry) {
            return false;
        }
        self.entries.push(entry);
        true
    }

    /// Removes the first matching entry, keeping the order of the rest.
    pub fn remove(&mut self, entry: &T) -> Option<T> {
        let idx = self.entries.iter().position(|e| (self.matcher)(e, entry))?;
        Some(self.entries.remove(idx))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.entries
    }
}

impl<T: PartialEq> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, T> IntoIterator for &'a Registry<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl<T: PartialEq> FromIterator<T> for Registry<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut registry = Self::new();
        for entry in iter {
            registry.add(entry);
        }
        registry
    }
}
