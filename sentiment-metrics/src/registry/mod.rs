//! Registries that meters are registered against.
use std::sync::Arc;

use metrics::{Counter, Histogram};

use crate::{meter::Meter, MetricsError};

mod memory;
pub use self::memory::{DistributionSnapshot, InMemoryRegistry, MeterValue, Snapshot, SnapshotEntry};

mod recorder;
pub use self::recorder::RecorderRegistry;

/// Source of a pull-based gauge.
///
/// Invoked whenever the gauge is observed. Must be free of side effects.
pub type GaugeSource = Arc<dyn Fn() -> f64 + Send + Sync>;

/// A registry that instruments are created in and looked up from.
///
/// Registries deduplicate instruments by [`Meter::key`]: asking for the same identity twice yields
/// handles to the same underlying instrument. Implementations must be safe to call from any
/// number of threads at once.
pub trait MeterRegistry: Send + Sync {
    /// Gets or creates a counter.
    fn counter(&self, meter: &Meter) -> Result<Counter, MetricsError>;

    /// Gets or creates a timer.
    ///
    /// Every value recorded into the returned handle is a single duration observation in the
    /// meter's unit.
    fn timer(&self, meter: &Meter) -> Result<Histogram, MetricsError>;

    /// Gets or creates a distribution summary.
    fn summary(&self, meter: &Meter) -> Result<Histogram, MetricsError>;

    /// Binds a pull-based gauge to `source`.
    ///
    /// The source is only invoked when the gauge is observed. If a gauge with the same identity is
    /// already bound, the existing binding is kept.
    fn gauge(&self, meter: &Meter, source: GaugeSource) -> Result<(), MetricsError>;
}

// Blanket implementations.
macro_rules! impl_meter_registry {
    ($inner_ty:ident, $ptr_ty:ty) => {
        impl<$inner_ty> MeterRegistry for $ptr_ty
        where
            $inner_ty: MeterRegistry + ?Sized,
        {
            fn counter(&self, meter: &Meter) -> Result<Counter, MetricsError> {
                std::ops::Deref::deref(self).counter(meter)
            }

            fn timer(&self, meter: &Meter) -> Result<Histogram, MetricsError> {
                std::ops::Deref::deref(self).timer(meter)
            }

            fn summary(&self, meter: &Meter) -> Result<Histogram, MetricsError> {
                std::ops::Deref::deref(self).summary(meter)
            }

            fn gauge(&self, meter: &Meter, source: GaugeSource) -> Result<(), MetricsError> {
                std::ops::Deref::deref(self).gauge(meter, source)
            }
        }
    };
}

impl_meter_registry!(T, &T);
impl_meter_registry!(T, std::boxed::Box<T>);
impl_meter_registry!(T, std::sync::Arc<T>);
