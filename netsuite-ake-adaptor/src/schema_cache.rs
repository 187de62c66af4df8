//! Schemas of remote functions, fetched once per adaptor.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::introspection::Schema;

/// Caches schemas by the name of the function that described them.
///
/// Entries are never evicted or refreshed. The lock is only held to look up or
/// insert an entry, never while a fetch is in flight: two callers that miss on
/// the same function name concurrently both fetch, and the last insert wins.
/// Sequential callers fetch at most once per function name.
#[derive(Debug, Default)]
pub struct SchemaCache {
    schemas: Mutex<HashMap<String, Arc<Schema>>>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, function_name: &str) -> Option<Arc<Schema>> {
        self.schemas.lock().get(function_name).cloned()
    }

    /// Returns the cached schema for `function_name`, running `fetch` to populate
    /// the entry on a miss. A failed fetch leaves the cache untouched, so the next
    /// call fetches again.
    pub async fn get_or_fetch<F, Fut, E>(
        &self,
        function_name: &str,
        fetch: F,
    ) -> Result<Arc<Schema>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Schema, E>>,
    {
        if let Some(schema) = self.get(function_name) {
            tracing::trace!(function_name, "schema cache hit");
            return Ok(schema);
        }

        tracing::debug!(function_name, "schema cache miss, fetching");
        let schema = Arc::new(fetch().await?);
        self.schemas
            .lock()
            .insert(function_name.to_owned(), schema.clone());
        Ok(schema)
    }

    pub fn len(&self) -> usize {
        self.schemas.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.lock().is_empty()
    }
}
