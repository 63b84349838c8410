//! Tagged, concurrently writable metric registry.
//!
//! Writers obtain a [`MetricHandle`] once per series and record through atomics (counters,
//! gauges) or a short mutex (histograms). Readers walk the registry with [`Query`] to sum or
//! merge series, optionally grouped by tag keys.

pub mod key;
pub mod metrics;
pub mod query;
pub mod registry;
pub mod tags;

pub use key::KeyId;
pub use metrics::{HistogramSummary, MetricHandle, MetricKind};
pub use query::Query;
pub use registry::{MetricId, Registry};
pub use tags::TagSet;
