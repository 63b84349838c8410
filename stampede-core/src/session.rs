use ahash::AHashMap;

/// Values correlated across the requests of one virtual user (tokens, validators, ids).
///
/// Owned by exactly one virtual user for its whole lifetime and dropped when the user
/// finishes. It is never shared, so it needs no synchronization.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    values: AHashMap<String, String>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Overwrites any previous value, returning it.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.values.insert(key.into(), value.into())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Apply extracted updates in order; later updates to the same key win.
    pub fn apply(&mut self, updates: impl IntoIterator<Item = (String, String)>) {
        for (key, value) in updates {
            self.values.insert(key, value);
        }
    }
}
