//! Process-wide baseline cache.
//!
//! Readers clone an `Arc` to the current snapshot; a rebuild constructs a
//! complete new baseline outside the lock and swaps the pointer. A reader
//! never observes a partially built grid.

use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};

use crate::synthesizer::Baseline;

/// A baseline together with when it was generated.
#[derive(Debug, Clone)]
pub struct CachedBaseline {
    /// The cached baseline.
    pub baseline: Baseline,
    /// Generation time.
    pub generated_at: DateTime<Utc>,
}

/// Holds the most recently built baseline.
#[derive(Debug, Default)]
pub struct BaselineCache {
    current: RwLock<Option<Arc<CachedBaseline>>>,
}

impl BaselineCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The current snapshot, if one has been built.
    #[must_use]
    pub fn get(&self) -> Option<Arc<CachedBaseline>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replaces the snapshot and returns the new one.
    pub fn replace(&self, baseline: Baseline) -> Arc<CachedBaseline> {
        let entry = Arc::new(CachedBaseline {
            baseline,
            generated_at: Utc::now(),
        });
        *self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&entry));
        log::info!(
            "Baseline cache rebuilt: {} cells, {:.0} tonnes/year",
            entry.baseline.grid.len(),
            entry.baseline.statistics.annual_emissions_tonnes
        );
        entry
    }
}
