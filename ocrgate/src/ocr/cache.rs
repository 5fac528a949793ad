//! Process-lifetime cache of loaded OCR models.
//!
//! Each [`ModelKey`] owns one slot. The global map lock is held only long
//! enough to find or create the slot; the slot itself is an async once-cell,
//! so construction of one key never blocks lookups or construction of
//! another, while concurrent requests for the same key wait on a single
//! construction. A failed construction leaves the slot empty and the next
//! request tries again.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::error::{OcrGateError, Result};

use super::backend::{ModelFactory, OcrModel};
use super::types::{BackendName, ModelKey};

type Slot = Arc<OnceCell<Arc<dyn OcrModel>>>;

pub struct ModelCache {
    factory: Arc<dyn ModelFactory>,
    slots: Mutex<HashMap<ModelKey, Slot>>,
    load_timeout: Duration,
}

impl ModelCache {
    pub fn new(factory: Arc<dyn ModelFactory>, load_timeout: Duration) -> Self {
        Self {
            factory,
            slots: Mutex::new(HashMap::new()),
            load_timeout,
        }
    }

    /// Resolve a backend by name plus extra languages.
    ///
    /// Names outside [`BackendName`] fail with `UnknownBackend` before any
    /// cache state is touched.
    pub async fn resolve<S: AsRef<str>>(
        &self,
        backend: &str,
        extra_langs: &[S],
    ) -> Result<Arc<dyn OcrModel>> {
        let backend: BackendName = backend.parse()?;
        self.get_or_load(ModelKey::new(backend, extra_langs)).await
    }

    pub async fn get_or_load(&self, key: ModelKey) -> Result<Arc<dyn OcrModel>> {
        let slot = self.slot(&key);

        if let Some(model) = slot.get() {
            debug!(model = %key, "Model cache hit");
            return Ok(Arc::clone(model));
        }

        let model = slot
            .get_or_try_init(|| self.construct(&key))
            .await?;

        Ok(Arc::clone(model))
    }

    /// Number of successfully loaded models.
    pub fn len(&self) -> usize {
        self.lock_slots()
            .values()
            .filter(|slot| slot.initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Display names of loaded models, sorted.
    pub fn loaded_keys(&self) -> Vec<String> {
        let slots = self.lock_slots();
        let mut keys: Vec<&ModelKey> = slots
            .iter()
            .filter(|(_, slot)| slot.initialized())
            .map(|(key, _)| key)
            .collect();
        keys.sort();
        keys.into_iter().map(ToString::to_string).collect()
    }

    fn slot(&self, key: &ModelKey) -> Slot {
        let mut slots = self.lock_slots();
        Arc::clone(slots.entry(key.clone()).or_default())
    }

    // Nothing panics while the lock is held, so a poisoned map is still consistent.
    fn lock_slots(&self) -> std::sync::MutexGuard<'_, HashMap<ModelKey, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn construct(&self, key: &ModelKey) -> Result<Arc<dyn OcrModel>> {
        info!(model = %key, "Loading model");
        let started = Instant::now();

        match tokio::time::timeout(self.load_timeout, self.factory.construct(key)).await {
            Ok(Ok(model)) => {
                info!(
                    model = %key,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Model loaded"
                );
                Ok(model)
            }
            Ok(Err(e)) => {
                warn!(model = %key, error = %e, "Model construction failed");
                Err(e)
            }
            Err(_) => {
                warn!(model = %key, "Model construction timed out");
                Err(OcrGateError::ModelLoad(format!(
                    "Loading {key} timed out after {} seconds",
                    self.load_timeout.as_secs()
                )))
            }
        }
    }
}
