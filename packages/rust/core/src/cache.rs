//! Run-scoped enrichment cache with single-flight initialisation.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::OnceCell;

/// Maps a fingerprint to its computed value.
///
/// Concurrent callers asking for the same fingerprint share one computation:
/// the first runs it, the rest wait for its value. A computation that is
/// dropped before finishing leaves the slot empty for the next caller.
#[derive(Debug)]
pub struct EnrichmentCache<V> {
    cells: Mutex<HashMap<String, Arc<OnceCell<V>>>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl<V> Default for EnrichmentCache<V> {
    fn default() -> Self {
        Self {
            cells: Mutex::new(HashMap::new()),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }
}

impl<V: Clone> EnrichmentCache<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached value for `key`, computing it with `init` if absent.
    pub async fn get_or_compute<F, Fut>(&self, key: &str, init: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        let cell = {
            let mut cells = self.cells.lock().unwrap_or_else(|p| p.into_inner());
            Arc::clone(cells.entry(key.to_string()).or_default())
        };

        let mut computed = false;
        let value = cell
            .get_or_init(|| {
                computed = true;
                init()
            })
            .await
            .clone();

        if computed {
            self.misses.fetch_add(1, Ordering::Relaxed);
        } else {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        value
    }

    /// `(hits, misses)` so far.
    pub fn stats(&self) -> (usize, usize) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }
}
