use std::sync::{
    atomic::{AtomicI32, Ordering},
    Arc,
};

use metrics::Unit;
use metrics_util::Quantile;
use tracing::debug;

use crate::{
    cardinality::{CardinalityWatch, DEFAULT_CARDINALITY_LIMIT},
    meter::{checked_percentiles, Meter, DEFAULT_PERCENTILES},
    MeterRegistry, MetricsError,
};

/// Counter of analysis requests, tagged by `sentiment` and `company`.
pub const ANALYSIS_TOTAL: &str = "sentiment.analysis.total";

/// Timer of analysis durations in milliseconds, tagged by `company` and `model`.
pub const ANALYSIS_DURATION: &str = "sentiment.analysis.duration";

/// Gauge of the number of companies detected by the most recent analysis.
pub const COMPANIES_DETECTED: &str = "sentiment.companies.detected";

/// Summary of confidence scores on a 0-100 scale, tagged by `sentiment` and `company`.
pub const CONFIDENCE_SCORE: &str = "sentiment.confidence.score";

/// Display scale of [`CONFIDENCE_SCORE`].
pub const CONFIDENCE_SCALE: f64 = 100.0;

/// Builder for [`SentimentMetrics`].
pub struct SentimentMetricsBuilder {
    registry: Option<Arc<dyn MeterRegistry>>,
    percentiles: Vec<f64>,
    cardinality_limit: usize,
}

impl SentimentMetricsBuilder {
    /// Creates a new `SentimentMetricsBuilder` with no registry and default settings.
    pub fn new() -> SentimentMetricsBuilder {
        SentimentMetricsBuilder {
            registry: None,
            percentiles: DEFAULT_PERCENTILES.to_vec(),
            cardinality_limit: DEFAULT_CARDINALITY_LIMIT,
        }
    }

    /// Sets the registry meters are registered against.
    ///
    /// Required.
    pub fn registry<R>(mut self, registry: R) -> SentimentMetricsBuilder
    where
        R: MeterRegistry + 'static,
    {
        let registry: Arc<dyn MeterRegistry> = Arc::new(registry);
        self.registry = Some(registry);
        self
    }

    /// Sets the percentiles published for the duration timer and the confidence summary.
    ///
    /// Defaults to p50, p95 and p99. Every value must lie within `[0.0, 1.0]`.
    pub fn percentiles(mut self, percentiles: &[f64]) -> SentimentMetricsBuilder {
        self.percentiles = percentiles.to_vec();
        self
    }

    /// Sets how many distinct tag sets a meter may reach before a warning is logged.
    ///
    /// Defaults to 1000. Exceeding the limit never drops values.
    pub fn cardinality_limit(mut self, limit: usize) -> SentimentMetricsBuilder {
        self.cardinality_limit = limit;
        self
    }

    /// Builds the facade and registers the companies-detected gauge.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::InvalidConfiguration`] if no registry was set or the settings are
    /// invalid, in which case nothing is registered. Errors raised by the registry while
    /// registering the gauge are returned as-is.
    pub fn build(self) -> Result<SentimentMetrics, MetricsError> {
        let registry = self.registry.ok_or_else(|| {
            MetricsError::InvalidConfiguration("a meter registry is required".to_owned())
        })?;
        let percentiles =
            checked_percentiles(&self.percentiles).map_err(MetricsError::InvalidConfiguration)?;
        if self.cardinality_limit == 0 {
            return Err(MetricsError::InvalidConfiguration(
                "cardinality limit must be greater than zero".to_owned(),
            ));
        }

        let last_company_count = Arc::new(AtomicI32::new(0));
        let source = Arc::clone(&last_company_count);
        registry.gauge(
            &Meter::gauge(COMPANIES_DETECTED)
                .with_description("Number of companies detected in the last analysis")
                .with_unit(Unit::Count),
            Arc::new(move || f64::from(source.load(Ordering::Acquire))),
        )?;

        debug!(
            percentiles = ?self.percentiles,
            cardinality_limit = self.cardinality_limit,
            "sentiment metrics initialized"
        );

        Ok(SentimentMetrics {
            registry,
            last_company_count,
            percentiles: Arc::new(percentiles),
            cardinality: CardinalityWatch::new(self.cardinality_limit),
        })
    }
}

impl Default for SentimentMetricsBuilder {
    fn default() -> Self {
        SentimentMetricsBuilder::new()
    }
}

/// Instrumentation for the sentiment analysis pipeline.
///
/// Construct one per process, once the registry exists, and hand a reference to every caller.
/// All methods take `&self` and are safe to call from any number of threads.
///
/// The only state owned here is the last "companies detected" count, which backs the
/// [`COMPANIES_DETECTED`] gauge. Every other meter is looked up in the registry by identity on
/// each call, so the registry does all of the aggregation.
pub struct SentimentMetrics {
    registry: Arc<dyn MeterRegistry>,
    last_company_count: Arc<AtomicI32>,
    percentiles: Arc<Vec<Quantile>>,
    cardinality: CardinalityWatch,
}

impl SentimentMetrics {
    /// Creates a facade over `registry` with default settings.
    pub fn new<R>(registry: R) -> Result<SentimentMetrics, MetricsError>
    where
        R: MeterRegistry + 'static,
    {
        SentimentMetricsBuilder::new().registry(registry).build()
    }

    /// Creates a builder.
    pub fn builder() -> SentimentMetricsBuilder {
        SentimentMetricsBuilder::new()
    }

    /// Counts one analysis of `company` that produced `sentiment`.
    pub fn record_analysis(&self, sentiment: &str, company: &str) -> Result<(), MetricsError> {
        let meter = Meter::counter(ANALYSIS_TOTAL)
            .tag("sentiment", sentiment.to_owned())
            .tag("company", company.to_owned())
            .with_description("Total number of sentiment analysis requests");

        self.registry.counter(&meter)?.increment(1);
        self.cardinality.observe(&meter);
        Ok(())
    }

    /// Records how long an analysis of `company` with `model` took.
    pub fn record_duration(
        &self,
        milliseconds: u64,
        company: &str,
        model: &str,
    ) -> Result<(), MetricsError> {
        let meter = Meter::timer(ANALYSIS_DURATION)
            .tag("company", company.to_owned())
            .tag("model", model.to_owned())
            .with_description("Duration of sentiment analysis operations in milliseconds")
            .with_percentiles(Arc::clone(&self.percentiles));

        self.registry.timer(&meter)?.record(milliseconds as f64);
        self.cardinality.observe(&meter);
        Ok(())
    }

    /// Stores the number of companies detected by the latest analysis.
    ///
    /// Nothing is pushed: the gauge reads this value whenever it is observed. Negative counts are
    /// stored as given.
    pub fn record_companies_detected(&self, count: i32) {
        self.last_company_count.store(count, Ordering::Release);
    }

    /// The last value passed to [`record_companies_detected`](Self::record_companies_detected).
    pub fn companies_detected(&self) -> i32 {
        self.last_company_count.load(Ordering::Acquire)
    }

    /// Records a model confidence in `[0.0, 1.0]` as a 0-100 score.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::InvalidValue`] without recording anything if `confidence` is not a
    /// finite number within `[0.0, 1.0]`.
    pub fn record_confidence(
        &self,
        confidence: f64,
        sentiment: &str,
        company: &str,
    ) -> Result<(), MetricsError> {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(MetricsError::InvalidValue { meter: CONFIDENCE_SCORE, value: confidence });
        }

        let meter = Meter::summary(CONFIDENCE_SCORE)
            .tag("sentiment", sentiment.to_owned())
            .tag("company", company.to_owned())
            .with_description("Distribution of confidence scores for sentiment analysis")
            .with_unit(Unit::Percent)
            .with_scale(CONFIDENCE_SCALE)
            .with_percentiles(Arc::clone(&self.percentiles));

        self.registry.summary(&meter)?.record(confidence * CONFIDENCE_SCALE);
        self.cardinality.observe(&meter);
        Ok(())
    }
}
