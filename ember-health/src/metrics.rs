//! Process wide counter, gauge and histogram store
//!
//! Families are created on first use and registered into a private
//! [prometheus::Registry]. Values are only reached through the handles the
//! registry hands out.
//!
//! ```rust,ignore
//! let metrics = MetricsRegistry::new();
//! metrics.counter("ember_http_requests_total", &[("path", "/health")])?.inc();
//! let text = metrics.serialize()?;
//! ```

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
    time::{SystemTime, UNIX_EPOCH},
};

use log::{debug, info};
use prometheus::{
    core::Collector,
    proto::MetricFamily,
    Encoder, GaugeVec, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};

use sysinfo::System;

use crate::error::MetricsError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Counter,
    Gauge,
    Histogram,
}

#[derive(Clone)]
enum Family {
    Counter(IntCounterVec),
    Gauge(GaugeVec),
    Histogram(HistogramVec),
}

impl Family {
    fn kind(&self) -> Kind {
        match self {
            Family::Counter(_) => Kind::Counter,
            Family::Gauge(_) => Kind::Gauge,
            Family::Histogram(_) => Kind::Histogram,
        }
    }
}

struct Entry {
    family: Family,
    label_names: Vec<String>,
}

/// Counter handle. Adds are atomic.
#[derive(Clone, Debug)]
pub struct Counter(prometheus::IntCounter);

impl Counter {
    pub fn inc(&self) {
        self.0.inc();
    }

    pub fn increment(&self, n: u64) {
        self.0.inc_by(n);
    }

    pub fn get(&self) -> u64 {
        self.0.get()
    }
}

/// Gauge handle
#[derive(Clone, Debug)]
pub struct Gauge(prometheus::Gauge);

impl Gauge {
    pub fn set(&self, value: f64) {
        self.0.set(value);
    }

    pub fn add(&self, value: f64) {
        self.0.add(value);
    }

    pub fn get(&self) -> f64 {
        self.0.get()
    }
}

/// Histogram handle with the default prometheus buckets
#[derive(Clone, Debug)]
pub struct Histogram(prometheus::Histogram);

impl Histogram {
    pub fn observe(&self, value: f64) {
        self.0.observe(value);
    }

    pub fn sample_count(&self) -> u64 {
        self.0.get_sample_count()
    }
}

/// Registry of metrics exposed in the text exposition format
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Registry,
    families: Arc<Mutex<HashMap<String, Entry>>>,
}

impl std::fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let families = self.families.lock().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<_> = families.keys().collect();
        names.sort();
        f.debug_struct("MetricsRegistry")
            .field("families", &names)
            .finish()
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Supplies the default process metrics into a registry at startup
pub trait DefaultMetrics {
    fn register_defaults(&self, registry: &MetricsRegistry) -> Result<(), MetricsError>;
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
            families: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Registry with the defaults of `defaults` registered once
    pub fn with_defaults(defaults: &dyn DefaultMetrics) -> Result<Self, MetricsError> {
        let registry = Self::new();
        defaults.register_defaults(&registry)?;
        info!("Prometheus metrics registry initialised");
        Ok(registry)
    }

    /// Register a collector that is not managed through the handles, eg process metrics
    pub fn register_collector(&self, collector: Box<dyn Collector>) -> Result<(), MetricsError> {
        Ok(self.registry.register(collector)?)
    }

    pub fn counter(&self, name: &str, labels: &[(&str, &str)]) -> Result<Counter, MetricsError> {
        let (names, values) = split_labels(labels);
        match self.family(name, Kind::Counter, names)? {
            Family::Counter(vec) => Ok(Counter(vec.get_metric_with_label_values(&values)?)),
            _ => Err(mismatch(name)),
        }
    }

    pub fn gauge(&self, name: &str, labels: &[(&str, &str)]) -> Result<Gauge, MetricsError> {
        let (names, values) = split_labels(labels);
        match self.family(name, Kind::Gauge, names)? {
            Family::Gauge(vec) => Ok(Gauge(vec.get_metric_with_label_values(&values)?)),
            _ => Err(mismatch(name)),
        }
    }

    pub fn histogram(
        &self,
        name: &str,
        labels: &[(&str, &str)],
    ) -> Result<Histogram, MetricsError> {
        let (names, values) = split_labels(labels);
        match self.family(name, Kind::Histogram, names)? {
            Family::Histogram(vec) => Ok(Histogram(vec.get_metric_with_label_values(&values)?)),
            _ => Err(mismatch(name)),
        }
    }

    /// Get the family called `name`, creating and registering it on first use
    fn family(&self, name: &str, kind: Kind, label_names: Vec<&str>) -> Result<Family, MetricsError> {
        let mut families = self.families.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(entry) = families.get(name) {
            if entry.family.kind() != kind || entry.label_names != label_names {
                return Err(mismatch(name));
            }
            return Ok(entry.family.clone());
        }

        let family = match kind {
            Kind::Counter => {
                let vec = IntCounterVec::new(Opts::new(name, name), &label_names)?;
                self.registry.register(Box::new(vec.clone()))?;
                Family::Counter(vec)
            }
            Kind::Gauge => {
                let vec = GaugeVec::new(Opts::new(name, name), &label_names)?;
                self.registry.register(Box::new(vec.clone()))?;
                Family::Gauge(vec)
            }
            Kind::Histogram => {
                let vec = HistogramVec::new(HistogramOpts::new(name, name), &label_names)?;
                self.registry.register(Box::new(vec.clone()))?;
                Family::Histogram(vec)
            }
        };

        families.insert(
            name.to_owned(),
            Entry {
                family: family.clone(),
                label_names: label_names.into_iter().map(str::to_owned).collect(),
            },
        );
        Ok(family)
    }

    /// Families ordered by name, series within a family ordered by label values
    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }

    /// Text exposition of every current metric
    pub fn serialize(&self) -> Result<String, MetricsError> {
        let mut buffer = vec![];
        TextEncoder::new().encode(&self.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    /// Content type of [MetricsRegistry::serialize]
    pub fn content_type(&self) -> &'static str {
        prometheus::TEXT_FORMAT
    }
}

fn mismatch(name: &str) -> MetricsError {
    MetricsError::LabelMismatch {
        name: name.to_owned(),
    }
}

/// Split label pairs into names and values ordered by name
fn split_labels<'a>(labels: &[(&'a str, &'a str)]) -> (Vec<&'a str>, Vec<&'a str>) {
    let mut sorted = labels.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    sorted.into_iter().unzip()
}

/// Default process metrics sampled with sysinfo: start time, resident and
/// virtual memory, cpu usage.
///
/// Values are sampled at registration and on [ProcessDefaults::refresh], never
/// while gathering, so scrapes between two refreshes are identical.
#[derive(Clone)]
pub struct ProcessDefaults {
    system: Arc<Mutex<System>>,
}

impl std::fmt::Debug for ProcessDefaults {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessDefaults").finish_non_exhaustive()
    }
}

impl Default for ProcessDefaults {
    fn default() -> Self {
        Self::new()
    }
}

struct ProcessSample {
    start_time: u64,
    resident: u64,
    virtual_memory: u64,
    cpu_usage: f32,
}

impl ProcessDefaults {
    pub fn new() -> Self {
        Self {
            system: Arc::new(Mutex::new(System::new())),
        }
    }

    fn sample(&self) -> Option<ProcessSample> {
        let pid = sysinfo::get_current_pid().ok()?;
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        system.refresh_process(pid);
        system.process(pid).map(|process| ProcessSample {
            start_time: process.start_time(),
            resident: process.memory(),
            virtual_memory: process.virtual_memory(),
            cpu_usage: process.cpu_usage(),
        })
    }

    /// Sample the process again and update the gauges in `registry`
    pub fn refresh(&self, registry: &MetricsRegistry) -> Result<(), MetricsError> {
        let Some(sample) = self.sample() else {
            debug!("No process information to sample");
            return Ok(());
        };

        registry
            .gauge("process_resident_memory_bytes", &[])?
            .set(sample.resident as f64);
        registry
            .gauge("process_virtual_memory_bytes", &[])?
            .set(sample.virtual_memory as f64);
        registry
            .gauge("process_cpu_usage_percent", &[])?
            .set(f64::from(sample.cpu_usage));
        Ok(())
    }
}

impl DefaultMetrics for ProcessDefaults {
    fn register_defaults(&self, registry: &MetricsRegistry) -> Result<(), MetricsError> {
        let started = match self.sample() {
            Some(sample) => sample.start_time,
            None => SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|since| since.as_secs())
                .unwrap_or_default(),
        };
        registry
            .gauge("process_start_time_seconds", &[])?
            .set(started as f64);

        self.refresh(registry)
    }
}

/// Collectors that make gathering or encoding fail
#[cfg(test)]
pub(crate) mod failing {
    use prometheus::{
        core::{Collector, Desc},
        proto::MetricFamily,
    };

    /// Collector whose family loses its name, which the text encoder rejects
    pub(crate) struct NamelessCollector(prometheus::Gauge);

    impl NamelessCollector {
        pub(crate) fn new() -> Self {
            Self(prometheus::Gauge::new("nameless", "loses its name when collected").unwrap())
        }
    }

    impl Collector for NamelessCollector {
        fn desc(&self) -> Vec<&Desc> {
            self.0.desc()
        }

        fn collect(&self) -> Vec<MetricFamily> {
            let mut families = self.0.collect();
            for family in &mut families {
                family.set_name(String::new());
            }
            families
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialize_is_stable() {
        let metrics = MetricsRegistry::new();
        metrics.counter("requests_total", &[("path", "/")]).unwrap().inc();
        metrics.gauge("queue_depth", &[]).unwrap().set(3.0);
        metrics.histogram("latency_seconds", &[]).unwrap().observe(0.2);

        let first = metrics.serialize().unwrap();
        let second = metrics.serialize().unwrap();
        assert_eq!(first, second);
        assert!(first.contains("requests_total{path=\"/\"} 1"));
        assert!(first.contains("queue_depth 3"));
        assert!(first.contains("latency_seconds_count 1"));
    }

    #[test]
    fn ordered_by_name_then_labels() {
        let metrics = MetricsRegistry::new();
        metrics.counter("zeta_total", &[]).unwrap().inc();
        metrics.counter("alpha_total", &[("path", "/z")]).unwrap().inc();
        metrics.counter("alpha_total", &[("path", "/a")]).unwrap().inc();

        let text = metrics.serialize().unwrap();
        let alpha_z = text.find("alpha_total{path=\"/z\"}").unwrap();
        let alpha_a = text.find("alpha_total{path=\"/a\"}").unwrap();
        let zeta = text.find("zeta_total 1").unwrap();
        assert!(alpha_a < alpha_z);
        assert!(alpha_z < zeta);
    }

    #[test]
    fn label_order_does_not_matter() {
        let metrics = MetricsRegistry::new();
        metrics
            .counter("hits_total", &[("a", "1"), ("b", "2")])
            .unwrap()
            .increment(2);
        let counter = metrics
            .counter("hits_total", &[("b", "2"), ("a", "1")])
            .unwrap();
        assert_eq!(counter.get(), 2);
    }

    #[test]
    fn mismatches_are_rejected() {
        let metrics = MetricsRegistry::new();
        metrics.counter("thing", &[("a", "1")]).unwrap();

        assert!(matches!(
            metrics.gauge("thing", &[("a", "1")]),
            Err(MetricsError::LabelMismatch { .. })
        ));
        assert!(matches!(
            metrics.counter("thing", &[("b", "1")]),
            Err(MetricsError::LabelMismatch { .. })
        ));
        assert!(matches!(
            metrics.counter("not a name", &[]),
            Err(MetricsError::Prometheus(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_increments_are_not_lost() {
        let metrics = MetricsRegistry::new();
        let tasks: Vec<_> = (0..1000)
            .map(|_| {
                let metrics = metrics.clone();
                tokio::spawn(async move {
                    metrics.counter("events_total", &[("kind", "x")]).unwrap().inc();
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }

        let counter = metrics.counter("events_total", &[("kind", "x")]).unwrap();
        assert_eq!(counter.get(), 1000);
    }

    #[test]
    fn defaults_are_sampled_not_scraped() {
        let process = ProcessDefaults::new();
        let metrics = MetricsRegistry::with_defaults(&process).unwrap();

        let first = metrics.serialize().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        let second = metrics.serialize().unwrap();
        assert_eq!(first, second);
        assert!(first.contains("process_start_time_seconds"));
        assert!(first.contains("process_resident_memory_bytes"));
        assert_eq!(metrics.content_type(), "text/plain; version=0.0.4");

        process.refresh(&metrics).unwrap();
        let resident = metrics
            .gauge("process_resident_memory_bytes", &[])
            .unwrap()
            .get();
        assert!(resident > 0.0);
    }

    #[test]
    fn encoding_failure_is_an_error() {
        let metrics = MetricsRegistry::new();
        metrics
            .register_collector(Box::new(failing::NamelessCollector::new()))
            .unwrap();

        assert!(matches!(
            metrics.serialize(),
            Err(MetricsError::Prometheus(_))
        ));
    }
}
