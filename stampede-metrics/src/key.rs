use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::RwLock;

/// Interned string id. Tag keys and tag values share one id space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyId(u32);

impl From<u32> for KeyId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

#[derive(Debug, Default)]
struct Table {
    ids: AHashMap<Arc<str>, KeyId>,
    strings: Vec<Arc<str>>,
}

#[derive(Debug, Default)]
pub struct Interner {
    table: RwLock<Table>,
}

impl Interner {
    pub fn get_or_intern(&self, s: &str) -> KeyId {
        if let Some(id) = self.table.read().ids.get(s) {
            return *id;
        }

        let mut table = self.table.write();
        if let Some(id) = table.ids.get(s) {
            return *id;
        }

        let id = KeyId(table.strings.len() as u32);
        let s: Arc<str> = Arc::from(s);
        table.strings.push(s.clone());
        table.ids.insert(s, id);
        id
    }

    pub fn get(&self, s: &str) -> Option<KeyId> {
        self.table.read().ids.get(s).copied()
    }

    pub fn resolve(&self, id: KeyId) -> Option<Arc<str>> {
        self.table.read().strings.get(id.0 as usize).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_stable_and_resolvable() {
        let interner = Interner::default();
        let a = interner.get_or_intern("step");
        let b = interner.get_or_intern("class");
        assert_ne!(a, b);
        assert_eq!(interner.get_or_intern("step"), a);
        assert_eq!(interner.get("class"), Some(b));
        assert_eq!(interner.get("missing"), None);
        assert_eq!(interner.resolve(a).as_deref(), Some("step"));
    }
}
