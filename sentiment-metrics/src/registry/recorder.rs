use std::collections::HashSet;

use indexmap::{map::Entry, IndexMap};
use metrics::{Counter, Gauge, Histogram, Key, KeyName, Level, Metadata, Recorder, SharedString};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use super::{GaugeSource, MeterRegistry};
use crate::{
    meter::{Meter, MeterKind},
    MetricsError,
};

static METADATA: Metadata<'static> =
    Metadata::new(module_path!(), Level::INFO, Some(module_path!()));

/// Registers meters against a [`metrics::Recorder`].
///
/// Counters map onto recorder counters, and timers and summaries onto recorder histograms. Each
/// metric name is described once, the first time a meter with that name is registered.
///
/// Recorders only understand push-based gauges, so pull gauges are held here until
/// [`upkeep`](RecorderRegistry::upkeep) is called: each call reads every gauge source and sets the
/// corresponding recorder gauge. Whoever drives the exporter is expected to call it before the
/// exporter reads its state, such as right before rendering a scrape.
pub struct RecorderRegistry<R> {
    recorder: R,
    described: Mutex<HashSet<(MeterKind, String)>>,
    gauges: RwLock<IndexMap<Key, (Gauge, GaugeSource)>>,
}

impl<R> RecorderRegistry<R>
where
    R: Recorder,
{
    /// Creates a new `RecorderRegistry` wrapping `recorder`.
    pub fn new(recorder: R) -> RecorderRegistry<R> {
        RecorderRegistry {
            recorder,
            described: Mutex::new(HashSet::new()),
            gauges: RwLock::new(IndexMap::new()),
        }
    }

    /// Gets a reference to the wrapped recorder.
    pub fn recorder(&self) -> &R {
        &self.recorder
    }

    /// Reads every bound gauge source and pushes the value into the recorder.
    pub fn upkeep(&self) {
        let gauges = self.gauges.read();
        for (gauge, source) in gauges.values() {
            gauge.set(source());
        }
        trace!(gauges = gauges.len(), "sampled pull gauges");
    }

    fn describe(&self, meter: &Meter) {
        let first = self.described.lock().insert((meter.kind(), meter.name().to_owned()));
        if !first {
            return;
        }

        let name = KeyName::from(meter.name().to_owned());
        let unit = meter.unit().cloned();
        let description =
            meter.description().cloned().unwrap_or_else(|| SharedString::from(""));
        match meter.kind() {
            MeterKind::Counter => self.recorder.describe_counter(name, unit, description),
            MeterKind::Gauge => self.recorder.describe_gauge(name, unit, description),
            MeterKind::Timer | MeterKind::Summary => {
                self.recorder.describe_histogram(name, unit, description)
            }
        }
        debug!(name = meter.name(), kind = %meter.kind(), "described meter");
    }
}

impl<R> MeterRegistry for RecorderRegistry<R>
where
    R: Recorder + Send + Sync,
{
    fn counter(&self, meter: &Meter) -> Result<Counter, MetricsError> {
        self.describe(meter);
        Ok(self.recorder.register_counter(&meter.key(), &METADATA))
    }

    fn timer(&self, meter: &Meter) -> Result<Histogram, MetricsError> {
        self.describe(meter);
        Ok(self.recorder.register_histogram(&meter.key(), &METADATA))
    }

    fn summary(&self, meter: &Meter) -> Result<Histogram, MetricsError> {
        self.describe(meter);
        Ok(self.recorder.register_histogram(&meter.key(), &METADATA))
    }

    fn gauge(&self, meter: &Meter, source: GaugeSource) -> Result<(), MetricsError> {
        self.describe(meter);
        let key = meter.key();
        let mut gauges = self.gauges.write();
        match gauges.entry(key) {
            Entry::Occupied(_) => {
                debug!(name = meter.name(), "gauge already bound, keeping existing source");
            }
            Entry::Vacant(entry) => {
                let gauge = self.recorder.register_gauge(entry.key(), &METADATA);
                entry.insert((gauge, source));
            }
        }
        Ok(())
    }
}
