use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

use serde_json::{Number, Value};
use tracing::trace;

use crate::models::sensor_record::SensorRecord;

/// Latest record per meter id. Cheap to clone; clones share the same map.
///
/// Records are replaced whole and never mutated in place, so readers only
/// ever see complete records.
#[derive(Debug, Clone, Default)]
pub struct SensorCache {
    records: Arc<RwLock<HashMap<String, Arc<SensorRecord>>>>,
}

impl SensorCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `record` under its own meter id, replacing any previous record.
    pub fn put(&self, record: SensorRecord) {
        let mut records = self
            .records
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        trace!("Caching record for meter {}.", record.meter_id);
        records.insert(record.meter_id.clone(), Arc::new(record));
    }

    pub fn get_record(&self, meter_id: &str) -> Option<Arc<SensorRecord>> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(meter_id)
            .cloned()
    }

    pub fn get_message(&self, meter_id: &str) -> Option<Value> {
        self.get_record(meter_id)
            .and_then(|record| record.message().cloned())
    }

    pub fn get_consumption(&self, meter_id: &str) -> Option<Number> {
        self.get_record(meter_id)
            .and_then(|record| record.consumption.clone())
    }

    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
