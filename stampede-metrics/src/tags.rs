use smallvec::SmallVec;

use crate::key::KeyId;

/// Sorted `(key, value)` pairs identifying one series of a metric.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TagSet {
    // Series in this workspace carry at most a handful of tags.
    pub(crate) tags: SmallVec<[(KeyId, KeyId); 4]>,
}

impl TagSet {
    pub fn from_pairs(pairs: impl IntoIterator<Item = (KeyId, KeyId)>) -> Self {
        let mut tags: SmallVec<[(KeyId, KeyId); 4]> = pairs.into_iter().collect();
        tags.sort_unstable();
        tags.dedup_by(|a, b| a.0 == b.0);
        Self { tags }
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (KeyId, KeyId)> + '_ {
        self.tags.iter().copied()
    }

    pub fn get(&self, key: KeyId) -> Option<KeyId> {
        let idx = self.tags.partition_point(|(k, _)| *k < key);
        self.tags
            .get(idx)
            .and_then(|(k, v)| (*k == key).then_some(*v))
    }

    /// Keep only the given keys (those present).
    pub fn project(&self, keys: &[KeyId]) -> TagSet {
        TagSet::from_pairs(
            keys.iter()
                .filter_map(|k| self.get(*k).map(|v| (*k, v))),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairs_are_sorted_and_lookup_works() {
        let (a, b, c) = (KeyId::from(1), KeyId::from(2), KeyId::from(3));

        let set = TagSet::from_pairs([(c, a), (a, b)]);
        assert_eq!(set.len(), 2);
        assert_eq!(set.get(a), Some(b));
        assert_eq!(set.get(c), Some(a));
        assert_eq!(set.get(b), None);
        assert_eq!(set, TagSet::from_pairs([(a, b), (c, a)]));
    }

    #[test]
    fn project_drops_other_keys() {
        let (a, b, c) = (KeyId::from(1), KeyId::from(2), KeyId::from(3));
        let set = TagSet::from_pairs([(a, b), (c, a)]);

        let projected = set.project(&[c]);
        assert_eq!(projected.len(), 1);
        assert_eq!(projected.get(c), Some(a));
        assert!(set.project(&[]).is_empty());
    }
}
