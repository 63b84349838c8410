use std::collections::HashMap;
use std::sync::atomic::Ordering;

use hdrhistogram::Histogram;
use smallvec::SmallVec;

use crate::key::KeyId;
use crate::metrics::{HistogramSummary, MetricStorage, new_default_histogram, summarize_histogram};
use crate::registry::{MetricId, Registry};
use crate::tags::TagSet;

#[derive(Debug, Clone, Copy)]
enum TagFilter {
    Eq(KeyId, KeyId),
    Has(KeyId),
    Missing(KeyId),
}

impl TagFilter {
    fn matches(self, tags: &TagSet) -> bool {
        match self {
            TagFilter::Eq(k, v) => tags.get(k) == Some(v),
            TagFilter::Has(k) => tags.get(k).is_some(),
            TagFilter::Missing(k) => tags.get(k).is_none(),
        }
    }
}

/// Read-side aggregation over the series of one metric.
#[derive(Debug, Clone)]
pub struct Query<'a> {
    registry: &'a Registry,
    metric: MetricId,
    filters: SmallVec<[TagFilter; 4]>,
    group_keys: SmallVec<[KeyId; 4]>,
}

impl<'a> Query<'a> {
    pub(crate) fn new(registry: &'a Registry, metric: MetricId) -> Self {
        Self {
            registry,
            metric,
            filters: SmallVec::new(),
            group_keys: SmallVec::new(),
        }
    }

    #[must_use]
    pub fn where_eq(mut self, key: &str, value: &str) -> Self {
        // Unknown strings can't match any series; intern them so the filter stays exact.
        let filter = TagFilter::Eq(self.registry.key(key), self.registry.key(value));
        self.filters.push(filter);
        self
    }

    #[must_use]
    pub fn where_has(mut self, key: &str) -> Self {
        self.filters.push(TagFilter::Has(self.registry.key(key)));
        self
    }

    #[must_use]
    pub fn where_missing(mut self, key: &str) -> Self {
        self.filters.push(TagFilter::Missing(self.registry.key(key)));
        self
    }

    #[must_use]
    pub fn group_by(mut self, key: &str) -> Self {
        let id = self.registry.key(key);
        if !self.group_keys.contains(&id) {
            self.group_keys.push(id);
        }
        self
    }

    fn matches(&self, tags: &TagSet) -> bool {
        self.filters.iter().all(|f| f.matches(tags))
    }

    fn group_key(&self, tags: &TagSet) -> TagSet {
        tags.project(&self.group_keys)
    }

    pub fn sum_counter(self) -> HashMap<TagSet, u64> {
        let mut out: HashMap<TagSet, u64> = HashMap::new();

        self.registry.visit_series(self.metric, |tags, storage| {
            if !self.matches(tags) {
                return;
            }
            let MetricStorage::Counter(c) = storage else {
                return;
            };

            let v = c.load(Ordering::Relaxed);
            if v == 0 {
                return;
            }

            let entry = out.entry(self.group_key(tags)).or_insert(0);
            *entry = entry.saturating_add(v);
        });

        out
    }

    pub fn sum_counter_total(self) -> u64 {
        self.sum_counter().values().copied().sum()
    }

    /// Counter totals keyed by the value of a single tag.
    pub fn sum_counter_by(self, key: &str) -> Vec<(String, u64)> {
        let registry = self.registry;
        let key_id = registry.key(key);
        let mut out: Vec<(String, u64)> = self
            .group_by(key)
            .sum_counter()
            .into_iter()
            .filter_map(|(tags, v)| {
                let value = tags.get(key_id)?;
                Some((registry.resolve_key(value)?.to_string(), v))
            })
            .collect();
        out.sort();
        out
    }

    pub fn merge_histogram_summary(self) -> HashMap<TagSet, HistogramSummary> {
        let mut acc: HashMap<TagSet, Histogram<u64>> = HashMap::new();

        self.registry.visit_series(self.metric, |tags, storage| {
            if !self.matches(tags) {
                return;
            }
            let MetricStorage::Histogram(h) = storage else {
                return;
            };

            let merged = acc
                .entry(self.group_key(tags))
                .or_insert_with(new_default_histogram);
            let _ = merged.add(&*h.lock());
        });

        acc.into_iter()
            .map(|(k, h)| (k, summarize_histogram(&h)))
            .collect()
    }

    /// Merge every matching series into one summary (ignores `group_by`).
    pub fn merge_histogram_total(mut self) -> HistogramSummary {
        self.group_keys.clear();
        self.merge_histogram_summary()
            .into_values()
            .next()
            .unwrap_or_default()
    }
}
