//! Instrument identities and descriptors.
//!
//! A [`Meter`] describes an instrument before it is handed to a [`MeterRegistry`]: what kind of
//! instrument it is, its name and tags, and the metadata an exporter may want to show alongside
//! it. The registry deduplicates instruments by [`Meter::key`], which is the name plus the tag
//! set sorted by tag key, so the order in which tags are attached never creates a new identity.
//!
//! [`MeterRegistry`]: crate::MeterRegistry
use std::{fmt, sync::Arc};

use metrics::{Key, Label, SharedString, Unit};
use metrics_util::{parse_quantiles, Quantile};

/// Percentiles published for timers and summaries unless configured otherwise.
pub const DEFAULT_PERCENTILES: &[f64] = &[0.5, 0.95, 0.99];

/// The kind of instrument a meter describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MeterKind {
    /// Monotonically increasing count.
    Counter,
    /// Current value, read on demand.
    Gauge,
    /// Distribution of durations.
    Timer,
    /// Distribution of arbitrary-unit observations.
    Summary,
}

impl MeterKind {
    /// Lowercase name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            MeterKind::Counter => "counter",
            MeterKind::Gauge => "gauge",
            MeterKind::Timer => "timer",
            MeterKind::Summary => "summary",
        }
    }
}

impl fmt::Display for MeterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Describes an instrument: identity plus metadata.
#[derive(Debug, Clone)]
pub struct Meter {
    kind: MeterKind,
    name: SharedString,
    tags: Vec<Label>,
    description: Option<SharedString>,
    unit: Option<Unit>,
    percentiles: Arc<Vec<Quantile>>,
    scale: Option<f64>,
}

impl Meter {
    fn new<N>(kind: MeterKind, name: N) -> Meter
    where
        N: Into<SharedString>,
    {
        Meter {
            kind,
            name: name.into(),
            tags: Vec::new(),
            description: None,
            unit: None,
            percentiles: Arc::new(Vec::new()),
            scale: None,
        }
    }

    /// Starts describing a counter.
    pub fn counter<N: Into<SharedString>>(name: N) -> Meter {
        Meter::new(MeterKind::Counter, name)
    }

    /// Starts describing a pull-based gauge.
    pub fn gauge<N: Into<SharedString>>(name: N) -> Meter {
        Meter::new(MeterKind::Gauge, name)
    }

    /// Starts describing a timer.
    ///
    /// Timers record milliseconds unless another unit is set.
    pub fn timer<N: Into<SharedString>>(name: N) -> Meter {
        Meter::new(MeterKind::Timer, name).with_unit(Unit::Milliseconds)
    }

    /// Starts describing a distribution summary.
    pub fn summary<N: Into<SharedString>>(name: N) -> Meter {
        Meter::new(MeterKind::Summary, name)
    }

    /// Attaches a tag.
    ///
    /// Setting a tag key twice keeps the last value.
    pub fn tag<K, V>(mut self, key: K, value: V) -> Meter
    where
        K: Into<SharedString>,
        V: Into<SharedString>,
    {
        let label = Label::new(key, value);
        match self.tags.iter_mut().find(|existing| existing.key() == label.key()) {
            Some(existing) => *existing = label,
            None => self.tags.push(label),
        }
        self
    }

    /// Sets the human-readable description.
    pub fn with_description<D: Into<SharedString>>(mut self, description: D) -> Meter {
        self.description = Some(description.into());
        self
    }

    /// Sets the unit of recorded values.
    pub fn with_unit(mut self, unit: Unit) -> Meter {
        self.unit = Some(unit);
        self
    }

    /// Sets the percentiles to publish for a timer or summary.
    pub fn with_percentiles(mut self, percentiles: Arc<Vec<Quantile>>) -> Meter {
        self.percentiles = percentiles;
        self
    }

    /// Sets the display scale factor of a summary.
    ///
    /// The factor is metadata for exporters; recorded values are not multiplied by it.
    pub fn with_scale(mut self, scale: f64) -> Meter {
        self.scale = Some(scale);
        self
    }

    /// Kind of instrument.
    pub fn kind(&self) -> MeterKind {
        self.kind
    }

    /// Metric name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tags in the order they were attached.
    pub fn tags(&self) -> &[Label] {
        &self.tags
    }

    /// Human-readable description, if any.
    pub fn description(&self) -> Option<&SharedString> {
        self.description.as_ref()
    }

    /// Unit of recorded values, if any.
    pub fn unit(&self) -> Option<&Unit> {
        self.unit.as_ref()
    }

    /// Percentiles to publish.
    pub fn percentiles(&self) -> &Arc<Vec<Quantile>> {
        &self.percentiles
    }

    /// Display scale factor, if any.
    pub fn scale(&self) -> Option<f64> {
        self.scale
    }

    /// The identity registries deduplicate on.
    pub fn key(&self) -> Key {
        let mut labels = self.tags.clone();
        labels.sort_by(|a, b| a.key().cmp(b.key()));
        Key::from_parts(self.name.clone(), labels)
    }
}

/// Builds the identity of a meter from its name and tags.
///
/// Produces the same key as [`Meter::key`] for the same name and tag set, regardless of tag order.
pub fn identity(name: &str, tags: &[(&str, &str)]) -> Key {
    let mut labels =
        tags.iter().map(|(k, v)| Label::new(k.to_string(), v.to_string())).collect::<Vec<_>>();
    labels.sort_by(|a, b| a.key().cmp(b.key()));
    Key::from_parts(name.to_string(), labels)
}

/// Validates and converts a list of percentiles.
///
/// Every percentile must be finite and within `[0.0, 1.0]`, and the list must not be empty.
pub(crate) fn checked_percentiles(percentiles: &[f64]) -> Result<Vec<Quantile>, String> {
    if percentiles.is_empty() {
        return Err("at least one percentile must be configured".to_owned());
    }

    if let Some(bad) = percentiles.iter().find(|p| !p.is_finite() || **p < 0.0 || **p > 1.0) {
        return Err(format!("percentile {} is outside of [0.0, 1.0]", bad));
    }

    Ok(parse_quantiles(percentiles))
}

#[cfg(test)]
mod tests {
    use metrics::Unit;

    use super::{checked_percentiles, identity, Meter, MeterKind, DEFAULT_PERCENTILES};

    #[test]
    fn tag_order_does_not_change_identity() {
        let a = Meter::counter("sentiment.analysis.total")
            .tag("sentiment", "positive")
            .tag("company", "Acme");
        let b = Meter::counter("sentiment.analysis.total")
            .tag("company", "Acme")
            .tag("sentiment", "positive");

        assert_eq!(a.key(), b.key());
        assert_eq!(
            a.key(),
            identity("sentiment.analysis.total", &[("sentiment", "positive"), ("company", "Acme")])
        );
    }

    #[test]
    fn different_tag_values_are_different_identities() {
        let a = Meter::counter("requests").tag("company", "Acme");
        let b = Meter::counter("requests").tag("company", "Globex");
        assert_ne!(a.key(), b.key());
    }

    #[test]
    fn repeated_tag_key_keeps_last_value() {
        let meter = Meter::counter("requests").tag("company", "Acme").tag("company", "Globex");
        assert_eq!(meter.tags().len(), 1);
        assert_eq!(meter.key(), identity("requests", &[("company", "Globex")]));
    }

    #[test]
    fn timer_defaults_to_milliseconds() {
        let timer = Meter::timer("latency");
        assert_eq!(timer.kind(), MeterKind::Timer);
        assert_eq!(timer.unit(), Some(&Unit::Milliseconds));

        let summary = Meter::summary("score").with_unit(Unit::Percent).with_scale(100.0);
        assert_eq!(summary.unit(), Some(&Unit::Percent));
        assert_eq!(summary.scale(), Some(100.0));
    }

    #[test]
    fn accessors_read_back_builder_settings() {
        let meter = Meter::counter("requests").with_description("Total requests");
        assert_eq!(meter.description().map(|d| &**d), Some("Total requests"));
        assert_eq!(meter.unit(), None);
        assert_eq!(meter.scale(), None);
        assert!(meter.percentiles().is_empty());
    }

    #[test]
    fn percentile_validation() {
        let parsed = checked_percentiles(DEFAULT_PERCENTILES).expect("defaults are valid");
        let labels = parsed.iter().map(|q| q.label().to_owned()).collect::<Vec<_>>();
        assert_eq!(labels, vec!["p50", "p95", "p99"]);

        assert!(checked_percentiles(&[]).is_err());
        assert!(checked_percentiles(&[0.5, 1.5]).is_err());
        assert!(checked_percentiles(&[f64::NAN]).is_err());
        assert!(checked_percentiles(&[-0.1]).is_err());
    }
}
