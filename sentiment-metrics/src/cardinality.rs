use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use metrics::Key;
use parking_lot::RwLock;
use tracing::warn;

use crate::meter::Meter;

/// Default number of distinct identities a meter may reach before a warning is logged.
pub const DEFAULT_CARDINALITY_LIMIT: usize = 1000;

#[derive(Default)]
struct Seen {
    keys: RwLock<HashSet<Key>>,
    exceeded: AtomicBool,
}

/// Watches how many distinct tag sets each meter name accumulates.
///
/// Tag values such as company names are free-form, so nothing bounds the number of identities a
/// meter can grow to. The watch does not change what gets recorded: the first time a meter goes
/// past the limit it logs a warning and stops tracking that meter.
///
/// Observing an identity that was already seen, or a meter that already went past the limit,
/// only takes shared locks.
pub struct CardinalityWatch {
    limit: usize,
    seen: RwLock<HashMap<String, Arc<Seen>>>,
}

impl CardinalityWatch {
    /// Creates a watch that warns once a meter exceeds `limit` distinct identities.
    pub fn new(limit: usize) -> CardinalityWatch {
        CardinalityWatch { limit, seen: RwLock::new(HashMap::new()) }
    }

    /// The configured limit.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Records that `meter` was used.
    ///
    /// Returns `true` only for the observation that took the meter past the limit.
    pub fn observe(&self, meter: &Meter) -> bool {
        let seen = self.entry(meter.name());
        if seen.exceeded.load(Ordering::Acquire) {
            return false;
        }

        let key = meter.key();
        if seen.keys.read().contains(&key) {
            return false;
        }

        let mut keys = seen.keys.write();
        if seen.exceeded.load(Ordering::Acquire) || !keys.insert(key) || keys.len() <= self.limit {
            return false;
        }

        seen.exceeded.store(true, Ordering::Release);
        *keys = HashSet::new();
        warn!(
            meter = meter.name(),
            limit = self.limit,
            "meter exceeded its tag cardinality limit, tag values may be unbounded"
        );
        true
    }

    /// Number of distinct identities seen for `name`, or `None` once the meter went past the limit
    /// or if it was never observed.
    pub fn distinct(&self, name: &str) -> Option<usize> {
        let seen = self.seen.read().get(name).cloned()?;
        if seen.exceeded.load(Ordering::Acquire) {
            return None;
        }
        let distinct = seen.keys.read().len();
        Some(distinct)
    }

    /// Whether `name` has gone past the limit.
    pub fn exceeded(&self, name: &str) -> bool {
        self.seen.read().get(name).map_or(false, |s| s.exceeded.load(Ordering::Acquire))
    }

    fn entry(&self, name: &str) -> Arc<Seen> {
        if let Some(seen) = self.seen.read().get(name) {
            return Arc::clone(seen);
        }
        Arc::clone(self.seen.write().entry(name.to_owned()).or_default())
    }
}

impl Default for CardinalityWatch {
    fn default() -> Self {
        CardinalityWatch::new(DEFAULT_CARDINALITY_LIMIT)
    }
}
