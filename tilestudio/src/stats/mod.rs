//! Rolling per-style, per-zoom rendering statistics.
//!
//! Every successful tile fetch records its draw time and source byte count
//! at the tile's zoom. Aggregates are kept as `{count, min, max, sum}`; the
//! average is derived when a snapshot is taken. Nothing is evicted.
//!
//! # Locking
//!
//! Each style owns one `parking_lot::Mutex` behind a `DashMap` entry, so
//! count, min, max and sum are updated together and different styles never
//! contend with each other.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

/// A recorded metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Metric {
    /// Milliseconds spent rendering a tile.
    DrawTime,
    /// Bytes read from the underlying source.
    SrcBytes,
}

impl Metric {
    /// Cookie name the metric is reported under.
    pub fn name(&self) -> &'static str {
        match self {
            Metric::DrawTime => "drawtime",
            Metric::SrcBytes => "srcbytes",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Running aggregate for one `(style, metric, zoom)` key.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatAggregate {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub sum: f64,
}

impl StatAggregate {
    fn first(value: f64) -> Self {
        Self {
            count: 1,
            min: value,
            max: value,
            sum: value,
        }
    }

    fn add(&mut self, value: f64) {
        self.count += 1;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.sum += value;
    }

    /// Mean rounded to the nearest integer.
    pub fn avg(&self) -> f64 {
        (self.sum / self.count as f64).round()
    }
}

/// Per-zoom summary reported to clients.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomStat {
    pub zoom: u8,
    pub min: f64,
    pub avg: f64,
    pub max: f64,
}

impl fmt::Display for ZoomStat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}-{}", self.zoom, self.min, self.avg, self.max)
    }
}

#[derive(Debug, Default)]
struct StyleStats {
    metrics: BTreeMap<(Metric, u8), StatAggregate>,
}

impl StyleStats {
    fn record(&mut self, metric: Metric, zoom: u8, value: f64) {
        self.metrics
            .entry((metric, zoom))
            .and_modify(|agg| agg.add(value))
            .or_insert_with(|| StatAggregate::first(value));
    }

    fn snapshot(&self, metric: Metric) -> Vec<ZoomStat> {
        // BTreeMap keys order by (metric, zoom), so the range is zoom-ascending.
        self.metrics
            .range((metric, 0)..=(metric, u8::MAX))
            .map(|(&(_, zoom), agg)| ZoomStat {
                zoom,
                min: agg.min,
                avg: agg.avg(),
                max: agg.max,
            })
            .collect()
    }
}

/// Process-wide statistics store.
#[derive(Debug, Default)]
pub struct StatsTracker {
    styles: DashMap<String, Arc<Mutex<StyleStats>>>,
}

impl StatsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn style(&self, style_id: &str) -> Arc<Mutex<StyleStats>> {
        if let Some(entry) = self.styles.get(style_id) {
            return Arc::clone(entry.value());
        }
        Arc::clone(
            self.styles
                .entry(style_id.to_string())
                .or_default()
                .value(),
        )
    }

    /// Records one sample. Non-finite values are ignored.
    pub fn record(&self, style_id: &str, metric: Metric, zoom: u8, value: f64) {
        if !value.is_finite() {
            return;
        }
        self.style(style_id).lock().record(metric, zoom, value);
    }

    /// Per-zoom summaries for a metric, ascending by zoom.
    pub fn snapshot(&self, style_id: &str, metric: Metric) -> Vec<ZoomStat> {
        match self.styles.get(style_id) {
            Some(entry) => entry.value().lock().snapshot(metric),
            None => Vec::new(),
        }
    }

    /// Records a sample and returns the snapshot taken under the same lock.
    pub fn record_and_snapshot(
        &self,
        style_id: &str,
        metric: Metric,
        zoom: u8,
        value: f64,
    ) -> Vec<ZoomStat> {
        let style = self.style(style_id);
        let mut stats = style.lock();
        if value.is_finite() {
            stats.record(metric, zoom, value);
        }
        stats.snapshot(metric)
    }

    /// Number of styles with at least one recorded sample.
    pub fn style_count(&self) -> usize {
        self.styles.len()
    }

    /// Encodes a snapshot as `zoom-min-avg-max` entries joined by `.`.
    pub fn encode(snapshot: &[ZoomStat]) -> String {
        snapshot
            .iter()
            .map(ZoomStat::to_string)
            .collect::<Vec<_>>()
            .join(".")
    }
}
