use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;

use crate::key::{Interner, KeyId};
use crate::metrics::{MetricHandle, MetricKind, MetricStorage};
use crate::query::Query;
use crate::tags::TagSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MetricId(u32);

#[derive(Debug)]
struct MetricDef {
    name: KeyId,
    kind: MetricKind,
}

#[derive(Debug, Default)]
pub struct Registry {
    interner: Interner,
    defs: RwLock<Vec<MetricDef>>,
    series: DashMap<MetricId, DashMap<TagSet, MetricStorage>>,
}

impl Registry {
    /// Register a metric by name. Registering the same name twice returns the same id.
    pub fn register(&self, name: &str, kind: MetricKind) -> MetricId {
        let name = self.interner.get_or_intern(name);

        let mut defs = self.defs.write();
        if let Some(idx) = defs.iter().position(|d| d.name == name) {
            return MetricId(idx as u32);
        }

        let id = MetricId(defs.len() as u32);
        defs.push(MetricDef { name, kind });
        self.series.insert(id, DashMap::new());
        id
    }

    pub fn kind(&self, metric: MetricId) -> Option<MetricKind> {
        self.defs.read().get(metric.0 as usize).map(|d| d.kind)
    }

    pub fn name(&self, metric: MetricId) -> Option<Arc<str>> {
        let name = self.defs.read().get(metric.0 as usize)?.name;
        self.interner.resolve(name)
    }

    pub fn key(&self, s: &str) -> KeyId {
        self.interner.get_or_intern(s)
    }

    pub fn resolve_key(&self, id: KeyId) -> Option<Arc<str>> {
        self.interner.resolve(id)
    }

    pub fn tags(&self, tags: &[(&str, &str)]) -> TagSet {
        TagSet::from_pairs(tags.iter().map(|(k, v)| (self.key(k), self.key(v))))
    }

    /// Get (or lazily create) the write handle for one series.
    pub fn handle(&self, metric: MetricId, tags: TagSet) -> Option<MetricHandle> {
        let kind = self.kind(metric)?;
        let series = self.series.get(&metric)?;
        let handle = series
            .entry(tags)
            .or_insert_with(|| MetricStorage::new(kind))
            .handle();
        Some(handle)
    }

    pub fn query(&self, metric: MetricId) -> Query<'_> {
        Query::new(self, metric)
    }

    pub(crate) fn visit_series(
        &self,
        metric: MetricId,
        mut f: impl FnMut(&TagSet, &MetricStorage),
    ) {
        let Some(series) = self.series.get(&metric) else {
            return;
        };
        for entry in series.iter() {
            f(entry.key(), entry.value());
        }
    }

    /// Distinct values of `key` across the series of `metric`.
    pub fn tag_values(&self, metric: MetricId, key: KeyId) -> Vec<Arc<str>> {
        let mut ids: Vec<KeyId> = Vec::new();
        self.visit_series(metric, |tags, _| {
            if let Some(v) = tags.get(key)
                && !ids.contains(&v)
            {
                ids.push(v);
            }
        });

        let mut out: Vec<Arc<str>> = ids
            .into_iter()
            .filter_map(|id| self.interner.resolve(id))
            .collect();
        out.sort();
        out
    }
}
