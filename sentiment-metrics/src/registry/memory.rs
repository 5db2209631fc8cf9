use std::{
    collections::{hash_map::Entry, HashMap},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use indexmap::{map::Entry as IndexEntry, IndexMap};
use metrics::{Counter, Histogram, Key, SharedString, Unit};
use metrics_util::{
    registry::{AtomicStorage, Registry},
    storage::Summary,
    Quantile,
};
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use super::{GaugeSource, MeterRegistry};
use crate::{
    error::{KindMismatch, RegistryClosed},
    meter::{identity, Meter, MeterKind},
    MetricsError,
};

#[derive(Clone)]
struct Descriptor {
    kind: MeterKind,
    description: Option<SharedString>,
    unit: Option<Unit>,
    percentiles: Arc<Vec<Quantile>>,
    scale: Option<f64>,
}

impl Descriptor {
    fn from_meter(meter: &Meter) -> Descriptor {
        Descriptor {
            kind: meter.kind(),
            description: meter.description().cloned(),
            unit: meter.unit().cloned(),
            percentiles: meter.percentiles().clone(),
            scale: meter.scale(),
        }
    }
}

/// Running aggregate of a timer or distribution summary.
///
/// Raw samples are drained out of the registry's bucket into here whenever a snapshot is taken, so
/// memory stays bounded by the sketch rather than by the number of observations.
struct Aggregate {
    count: usize,
    total: f64,
    max: Option<f64>,
    summary: Summary,
}

impl Aggregate {
    fn new() -> Aggregate {
        Aggregate { count: 0, total: 0.0, max: None, summary: Summary::with_defaults() }
    }

    fn record_samples(&mut self, samples: &[f64]) {
        for sample in samples {
            self.summary.add(*sample);
            self.total += *sample;
            self.max = Some(self.max.map_or(*sample, |m| m.max(*sample)));
        }
        self.count += samples.len();
    }

    fn snapshot(&self, quantiles: &[Quantile]) -> DistributionSnapshot {
        let percentiles = quantiles
            .iter()
            .map(|q| (q.clone(), self.summary.quantile(q.value()).unwrap_or(0.0)))
            .collect();

        DistributionSnapshot {
            count: self.count,
            total: self.total,
            max: self.max.unwrap_or(0.0),
            percentiles,
        }
    }
}

/// Aggregated view of a timer or distribution summary.
#[derive(Debug, Clone, PartialEq)]
pub struct DistributionSnapshot {
    count: usize,
    total: f64,
    max: f64,
    percentiles: Vec<(Quantile, f64)>,
}

impl DistributionSnapshot {
    /// Number of observations.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Sum of all observations.
    pub fn total(&self) -> f64 {
        self.total
    }

    /// Largest observation, or `0.0` if nothing was recorded.
    pub fn max(&self) -> f64 {
        self.max
    }

    /// Mean observation, or `0.0` if nothing was recorded.
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total / self.count as f64
        }
    }

    /// All configured percentiles with their estimated values.
    pub fn percentiles(&self) -> &[(Quantile, f64)] {
        &self.percentiles
    }

    /// Estimated value at the given quantile, if that quantile was configured.
    pub fn percentile(&self, quantile: f64) -> Option<f64> {
        self.percentiles.iter().find(|(q, _)| q.value() == quantile).map(|(_, v)| *v)
    }
}

/// Point-in-time value of a single meter.
#[derive(Debug, Clone, PartialEq)]
pub enum MeterValue {
    /// Counter.
    Counter(u64),
    /// Gauge, as read from its source when the snapshot was taken.
    Gauge(f64),
    /// Timer.
    Timer(DistributionSnapshot),
    /// Distribution summary.
    Summary(DistributionSnapshot),
}

/// A meter and its value at the time a [`Snapshot`] was taken.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotEntry {
    /// Kind of meter.
    pub kind: MeterKind,
    /// Identity of the meter.
    pub key: Key,
    /// Description given at registration, if any.
    pub description: Option<SharedString>,
    /// Unit given at registration, if any.
    pub unit: Option<Unit>,
    /// Display scale factor, if any.
    pub scale: Option<f64>,
    /// The value.
    pub value: MeterValue,
}

/// Point-in-time view of an [`InMemoryRegistry`], in first-registration order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Snapshot {
    entries: Vec<SnapshotEntry>,
}

impl Snapshot {
    /// All entries.
    pub fn entries(&self) -> &[SnapshotEntry] {
        &self.entries
    }

    /// Consumes the snapshot, returning its entries.
    pub fn into_vec(self) -> Vec<SnapshotEntry> {
        self.entries
    }

    /// Number of meters in the snapshot.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the snapshot holds no meters.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up the entry for the given name and tag set.
    pub fn get(&self, name: &str, tags: &[(&str, &str)]) -> Option<&SnapshotEntry> {
        let key = identity(name, tags);
        self.entries.iter().find(|entry| entry.key == key)
    }

    /// Value of the counter with the given name and tags.
    pub fn counter(&self, name: &str, tags: &[(&str, &str)]) -> Option<u64> {
        match self.get(name, tags)?.value {
            MeterValue::Counter(value) => Some(value),
            _ => None,
        }
    }

    /// Value of the gauge with the given name and tags.
    pub fn gauge(&self, name: &str, tags: &[(&str, &str)]) -> Option<f64> {
        match self.get(name, tags)?.value {
            MeterValue::Gauge(value) => Some(value),
            _ => None,
        }
    }

    /// Aggregates of the timer with the given name and tags.
    pub fn timer(&self, name: &str, tags: &[(&str, &str)]) -> Option<&DistributionSnapshot> {
        match &self.get(name, tags)?.value {
            MeterValue::Timer(dist) => Some(dist),
            _ => None,
        }
    }

    /// Aggregates of the distribution summary with the given name and tags.
    pub fn summary(&self, name: &str, tags: &[(&str, &str)]) -> Option<&DistributionSnapshot> {
        match &self.get(name, tags)?.value {
            MeterValue::Summary(dist) => Some(dist),
            _ => None,
        }
    }
}

/// An in-process registry that aggregates everything recorded into it.
///
/// Counters and distributions live in a [`metrics_util::registry::Registry`] with atomic storage;
/// gauges are bound to their sources and only read when a [`Snapshot`] is taken. Taking a snapshot
/// folds the samples recorded since the last one into a running aggregate per distribution, so
/// values never reset between snapshots.
pub struct InMemoryRegistry {
    registry: Registry<Key, AtomicStorage>,
    meters: RwLock<IndexMap<Key, Descriptor>>,
    gauges: RwLock<IndexMap<Key, GaugeSource>>,
    distributions: Mutex<HashMap<Key, Aggregate>>,
    kinds: Mutex<HashMap<String, MeterKind>>,
    closed: AtomicBool,
}

impl InMemoryRegistry {
    /// Creates a new, empty `InMemoryRegistry`.
    pub fn new() -> InMemoryRegistry {
        InMemoryRegistry {
            registry: Registry::atomic(),
            meters: RwLock::new(IndexMap::new()),
            gauges: RwLock::new(IndexMap::new()),
            distributions: Mutex::new(HashMap::new()),
            kinds: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Closes the registry.
    ///
    /// Every registration attempted afterwards fails with [`RegistryClosed`]. Handles obtained
    /// before closing keep working.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Takes a snapshot of every registered meter.
    pub fn snapshot(&self) -> Snapshot {
        let meters = self.meters.read().clone();
        let gauges = self.gauges.read().clone();
        let mut distributions = self.distributions.lock();

        let entries = meters
            .into_iter()
            .map(|(key, desc)| {
                let value = match desc.kind {
                    MeterKind::Counter => MeterValue::Counter(
                        self.registry
                            .get_counter(&key)
                            .map(|c| c.load(Ordering::Acquire))
                            .unwrap_or(0),
                    ),
                    MeterKind::Gauge => {
                        MeterValue::Gauge(gauges.get(&key).map(|source| source()).unwrap_or(0.0))
                    }
                    MeterKind::Timer => {
                        MeterValue::Timer(self.distribution(&mut distributions, &key, &desc))
                    }
                    MeterKind::Summary => {
                        MeterValue::Summary(self.distribution(&mut distributions, &key, &desc))
                    }
                };

                SnapshotEntry {
                    kind: desc.kind,
                    key,
                    description: desc.description,
                    unit: desc.unit,
                    scale: desc.scale,
                    value,
                }
            })
            .collect();

        Snapshot { entries }
    }

    fn distribution(
        &self,
        distributions: &mut HashMap<Key, Aggregate>,
        key: &Key,
        desc: &Descriptor,
    ) -> DistributionSnapshot {
        let aggregate = distributions.entry(key.clone()).or_insert_with(Aggregate::new);
        if let Some(bucket) = self.registry.get_histogram(key) {
            bucket.clear_with(|samples| aggregate.record_samples(samples));
        }
        aggregate.snapshot(&desc.percentiles)
    }

    fn register(&self, meter: &Meter) -> Result<Key, MetricsError> {
        if self.is_closed() {
            return Err(MetricsError::backend(RegistryClosed));
        }

        let key = meter.key();
        if self.meters.read().get(&key).map_or(false, |desc| desc.kind == meter.kind()) {
            return Ok(key);
        }

        let mut meters = self.meters.write();
        if let IndexEntry::Vacant(entry) = meters.entry(key.clone()) {
            self.claim_name(meter)?;
            debug!(name = meter.name(), kind = %meter.kind(), "registered meter");
            entry.insert(Descriptor::from_meter(meter));
        } else {
            // Registered concurrently, or held by another kind.
            self.claim_name(meter)?;
        }

        Ok(key)
    }

    fn claim_name(&self, meter: &Meter) -> Result<(), MetricsError> {
        let mut kinds = self.kinds.lock();
        match kinds.entry(meter.name().to_owned()) {
            Entry::Occupied(entry) if *entry.get() != meter.kind() => {
                Err(MetricsError::backend(KindMismatch {
                    name: meter.name().to_owned(),
                    registered: *entry.get(),
                    requested: meter.kind(),
                }))
            }
            Entry::Occupied(_) => Ok(()),
            Entry::Vacant(entry) => {
                entry.insert(meter.kind());
                Ok(())
            }
        }
    }
}

impl Default for InMemoryRegistry {
    fn default() -> Self {
        InMemoryRegistry::new()
    }
}

impl MeterRegistry for InMemoryRegistry {
    fn counter(&self, meter: &Meter) -> Result<Counter, MetricsError> {
        let key = self.register(meter)?;
        Ok(self.registry.get_or_create_counter(&key, |c| Counter::from_arc(c.clone())))
    }

    fn timer(&self, meter: &Meter) -> Result<Histogram, MetricsError> {
        let key = self.register(meter)?;
        Ok(self.registry.get_or_create_histogram(&key, |h| Histogram::from_arc(h.clone())))
    }

    fn summary(&self, meter: &Meter) -> Result<Histogram, MetricsError> {
        let key = self.register(meter)?;
        Ok(self.registry.get_or_create_histogram(&key, |h| Histogram::from_arc(h.clone())))
    }

    fn gauge(&self, meter: &Meter, source: GaugeSource) -> Result<(), MetricsError> {
        let key = self.register(meter)?;
        let mut gauges = self.gauges.write();
        match gauges.entry(key) {
            IndexEntry::Occupied(_) => {
                debug!(name = meter.name(), "gauge already bound, keeping existing source");
            }
            IndexEntry::Vacant(entry) => {
                entry.insert(source);
            }
        }
        Ok(())
    }
}
