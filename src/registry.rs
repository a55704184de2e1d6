use std::sync::Arc;

use dashmap::DashMap;

use crate::estimator::Snapshot;
use crate::shared::SharedMeter;

/// Named meters that a reporter reads together. Each meter keeps its own
/// state; nothing is combined across entries.
#[derive(Default)]
pub struct MeterRegistry {
    meters: DashMap<String, Arc<SharedMeter>>,
}

impl MeterRegistry {
    pub fn new() -> Self {
        Self { meters: DashMap::new() }
    }

    /// Register `meter` under its name, disposing any meter it replaces.
    pub fn insert(&self, meter: Arc<SharedMeter>) {
        if let Some(old) = self.meters.insert(meter.name().to_string(), meter) {
            old.dispose();
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<SharedMeter>> {
        self.meters.get(name).map(|e| Arc::clone(e.value()))
    }

    pub fn remove(&self, name: &str) -> Option<Arc<SharedMeter>> {
        let (_, meter) = self.meters.remove(name)?;
        meter.dispose();
        Some(meter)
    }

    pub fn len(&self) -> usize {
        self.meters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meters.is_empty()
    }

    /// Dispose and drop every meter.
    pub fn dispose(&self) {
        for entry in self.meters.iter() {
            entry.value().dispose();
        }
        self.meters.clear();
    }

    /// Snapshot every meter, sorted by name.
    pub fn snapshot(&self) -> Vec<Snapshot> {
        // Clone the handles first so no shard lock is held while each
        // meter's own mutex is taken.
        let meters: Vec<Arc<SharedMeter>> = self.meters.iter().map(|e| Arc::clone(e.value())).collect();
        let mut out: Vec<Snapshot> = meters.iter().map(|m| m.snapshot()).collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }
}
