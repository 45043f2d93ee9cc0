use std::any::Any;
use std::collections::HashMap;

use crate::error::ProcessError;

/// The keyed, typed data store owned by a `Process` (§4.4).
///
/// Values are type-erased on insert and downcast on read. `get` throws
/// (returns `Err`) on a missing key or a type mismatch; `try_get` turns
/// either case into `None` without erroring.
#[derive(Default)]
pub struct DataStore {
    values: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl DataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set<T: Send + Sync + 'static>(&mut self, key: impl Into<String>, value: T) {
        self.values.insert(key.into(), Box::new(value));
    }

    /// §4.4: "`GetData<T>(key)` throws on missing key or type mismatch."
    pub fn get<T: Clone + Send + Sync + 'static>(&self, key: &str) -> Result<T, ProcessError> {
        let boxed = self
            .values
            .get(key)
            .ok_or_else(|| ProcessError::Contract(format!("no data for key '{key}'")))?;
        boxed
            .downcast_ref::<T>()
            .cloned()
            .ok_or_else(|| ProcessError::Contract(format!("data for key '{key}' has a different type")))
    }

    /// §4.4: "`TryGetData<T>(key, out v)` returns false on either [missing
    /// key or type mismatch]."
    pub fn try_get<T: Clone + Send + Sync + 'static>(&self, key: &str) -> Option<T> {
        self.values.get(key)?.downcast_ref::<T>().cloned()
    }
}
