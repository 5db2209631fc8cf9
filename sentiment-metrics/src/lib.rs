//! Instrumentation facade for the sentiment analysis service.
//!
//! [`SentimentMetrics`] is constructed once, against a [`MeterRegistry`], and shared with every
//! caller. It records four things:
//!
//! - `sentiment.analysis.total`: a counter of analyses, tagged by sentiment and company
//! - `sentiment.analysis.duration`: a timer of analysis durations, tagged by company and model
//! - `sentiment.companies.detected`: a pull-based gauge of the companies found by the last analysis
//! - `sentiment.confidence.score`: a summary of model confidence on a 0-100 scale
//!
//! Two registries are provided. [`InMemoryRegistry`] aggregates in-process and can be snapshotted
//! at any time. [`RecorderRegistry`] forwards to any [`metrics::Recorder`], so the facade can feed
//! an existing exporter.
//!
//! ```
//! use std::sync::Arc;
//! use sentiment_metrics::{InMemoryRegistry, SentimentMetrics};
//!
//! let registry = Arc::new(InMemoryRegistry::new());
//! let metrics = SentimentMetrics::new(Arc::clone(&registry)).unwrap();
//!
//! metrics.record_analysis("positive", "Acme").unwrap();
//! metrics.record_companies_detected(2);
//!
//! let snapshot = registry.snapshot();
//! assert_eq!(
//!     snapshot.counter("sentiment.analysis.total", &[("sentiment", "positive"), ("company", "Acme")]),
//!     Some(1),
//! );
//! assert_eq!(snapshot.gauge("sentiment.companies.detected", &[]), Some(2.0));
//! ```
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]
mod cardinality;
pub use self::cardinality::{CardinalityWatch, DEFAULT_CARDINALITY_LIMIT};

mod error;
pub use self::error::{KindMismatch, MetricsError, RegistryClosed};

mod facade;
pub use self::facade::{
    SentimentMetrics, SentimentMetricsBuilder, ANALYSIS_DURATION, ANALYSIS_TOTAL,
    COMPANIES_DETECTED, CONFIDENCE_SCALE, CONFIDENCE_SCORE,
};

mod meter;
pub use self::meter::{identity, Meter, MeterKind, DEFAULT_PERCENTILES};

mod registry;
pub use self::registry::{
    DistributionSnapshot, GaugeSource, InMemoryRegistry, MeterRegistry, MeterValue,
    RecorderRegistry, Snapshot, SnapshotEntry,
};
