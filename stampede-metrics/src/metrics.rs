use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use hdrhistogram::Histogram;
use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistogramSummary {
    pub count: u64,
    pub min: Option<f64>,
    pub mean: Option<f64>,
    pub p50: Option<f64>,
    pub p75: Option<f64>,
    pub p90: Option<f64>,
    pub p95: Option<f64>,
    pub p99: Option<f64>,
    pub max: Option<f64>,
    pub stdev: Option<f64>,
}

pub(crate) fn new_default_histogram() -> Histogram<u64> {
    // Microsecond resolution, 1us..1h, 3 significant digits.
    match Histogram::<u64>::new_with_bounds(1, 3_600_000_000, 3) {
        Ok(h) => h,
        Err(err) => panic!("failed to create histogram: {err}"),
    }
}

pub(crate) fn summarize_histogram(h: &Histogram<u64>) -> HistogramSummary {
    let count = h.len();
    let has = count > 0;
    let q = |quantile| has.then(|| h.value_at_quantile(quantile) as f64);

    HistogramSummary {
        count,
        min: has.then(|| h.min() as f64),
        mean: has.then(|| h.mean()),
        p50: q(0.50),
        p75: q(0.75),
        p90: q(0.90),
        p95: q(0.95),
        p99: q(0.99),
        max: has.then(|| h.max() as f64),
        stdev: has.then(|| h.stdev()),
    }
}

#[derive(Debug)]
pub(crate) enum MetricStorage {
    Counter(Arc<AtomicU64>),
    Gauge(Arc<AtomicI64>),
    Histogram(Arc<Mutex<Histogram<u64>>>),
}

impl MetricStorage {
    pub(crate) fn new(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Counter => Self::Counter(Arc::new(AtomicU64::new(0))),
            MetricKind::Gauge => Self::Gauge(Arc::new(AtomicI64::new(0))),
            MetricKind::Histogram => Self::Histogram(Arc::new(Mutex::new(new_default_histogram()))),
        }
    }

    pub(crate) fn handle(&self) -> MetricHandle {
        match self {
            Self::Counter(c) => MetricHandle::Counter(c.clone()),
            Self::Gauge(g) => MetricHandle::Gauge(g.clone()),
            Self::Histogram(h) => MetricHandle::Histogram(h.clone()),
        }
    }
}

/// Write handle for one series. Operations that don't match the handle's kind are no-ops.
#[derive(Debug, Clone)]
pub enum MetricHandle {
    Counter(Arc<AtomicU64>),
    Gauge(Arc<AtomicI64>),
    Histogram(Arc<Mutex<Histogram<u64>>>),
}

impl MetricHandle {
    #[inline]
    pub fn increment(&self, value: u64) {
        if let Self::Counter(c) = self {
            c.fetch_add(value, Ordering::Relaxed);
        }
    }

    #[inline]
    /// Adjust a gauge and return the value this adjustment produced.
    pub fn add_gauge(&self, delta: i64) -> i64 {
        match self {
            Self::Gauge(g) => g.fetch_add(delta, Ordering::Relaxed) + delta,
            _ => 0,
        }
    }

    #[inline]
    pub fn observe(&self, value: u64) {
        if let Self::Histogram(h) = self {
            // Values outside the histogram bounds are clamped rather than dropped.
            h.lock().saturating_record(value.max(1));
        }
    }

    pub fn counter_value(&self) -> u64 {
        match self {
            Self::Counter(c) => c.load(Ordering::Relaxed),
            _ => 0,
        }
    }

    pub fn gauge_value(&self) -> i64 {
        match self {
            Self::Gauge(g) => g.load(Ordering::Relaxed),
            _ => 0,
        }
    }

    pub fn histogram_summary(&self) -> Option<HistogramSummary> {
        match self {
            Self::Histogram(h) => Some(summarize_histogram(&h.lock())),
            _ => None,
        }
    }
}
