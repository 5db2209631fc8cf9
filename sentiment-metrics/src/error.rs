use std::error::Error;

use thiserror::Error as ThisError;

use crate::meter::MeterKind;

/// Errors that can occur while constructing the facade or recording into it.
#[derive(Debug, ThisError)]
pub enum MetricsError {
    /// The facade was constructed with missing or invalid configuration.
    #[error("invalid metrics configuration: {0}")]
    InvalidConfiguration(String),

    /// A recorded value fell outside the range the meter accepts.
    #[error("invalid value {value} for meter `{meter}`")]
    InvalidValue {
        /// Name of the meter the value was destined for.
        meter: &'static str,
        /// The rejected value.
        value: f64,
    },

    /// The underlying registry failed to register or record a meter.
    #[error("metrics backend failure: {0}")]
    BackendFailure(#[source] Box<dyn Error + Send + Sync + 'static>),
}

impl MetricsError {
    /// Wraps a registry-specific error as a [`MetricsError::BackendFailure`].
    pub fn backend<E>(err: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        MetricsError::BackendFailure(Box::new(err))
    }
}

/// Returned by [`InMemoryRegistry`][crate::InMemoryRegistry] once it has been closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ThisError)]
#[error("registry has been closed")]
pub struct RegistryClosed;

/// Returned when a meter name is reused for a different kind of instrument.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
#[error("meter `{name}` is already registered as a {registered}, cannot register it as a {requested}")]
pub struct KindMismatch {
    /// Name of the meter.
    pub name: String,
    /// Kind the name was first registered as.
    pub registered: MeterKind,
    /// Kind that was requested.
    pub requested: MeterKind,
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn backend_failure_preserves_source() {
        let err = MetricsError::backend(RegistryClosed);
        assert_eq!(err.to_string(), "metrics backend failure: registry has been closed");

        let source = err.source().expect("backend failure should carry a source");
        assert!(source.downcast_ref::<RegistryClosed>().is_some());
    }

    #[test]
    fn kind_mismatch_display() {
        let err = KindMismatch {
            name: "sentiment.analysis.total".to_owned(),
            registered: MeterKind::Counter,
            requested: MeterKind::Timer,
        };
        assert_eq!(
            err.to_string(),
            "meter `sentiment.analysis.total` is already registered as a counter, cannot register it as a timer"
        );
    }
}
