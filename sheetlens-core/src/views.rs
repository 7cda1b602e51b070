//! Derived-view cache
//!
//! Holds the last successful meta-analysis and dossiers together with a
//! fingerprint of the inputs they were computed from. A view is recomputed
//! only when its fingerprint no longer matches (or a refresh is forced), and
//! a failed recomputation keeps the previous value.
//!
//! | View | Fingerprint inputs | Refresh |
//! |------|--------------------|---------|
//! | Meta-analysis | report ids + analysis prompt | automatic on change |
//! | Dossiers | report ids | on demand, or forced |
//!
//! Dossiers can be snapshotted to the configuration store so the cache
//! outlives the process. Column summaries are not cached.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::aggregate::Aggregator;
use crate::error::Result;
use crate::types::{AnalysisResult, MetaAnalysis, StrategicDossiers};

/// Order-insensitive hash of the report collection
pub fn collection_fingerprint(results: &[AnalysisResult]) -> String {
    let mut ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
    ids.sort_unstable();

    let mut hasher = Sha256::new();
    for id in ids {
        hasher.update(id.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}

fn meta_fingerprint(results: &[AnalysisResult], prompt: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(collection_fingerprint(results).as_bytes());
    hasher.update([0u8]);
    hasher.update(prompt.unwrap_or_default().trim().as_bytes());
    hex::encode(hasher.finalize())
}

/// Persistable form of the dossier cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DossierSnapshot {
    pub fingerprint: String,
    pub dossiers: StrategicDossiers,
}

#[derive(Debug, Clone)]
struct Cached<T> {
    fingerprint: String,
    value: T,
}

/// Cache of derived views, owned by the sync controller
#[derive(Debug, Default)]
pub struct DerivedViews {
    meta: Option<Cached<MetaAnalysis>>,
    dossiers: Option<Cached<StrategicDossiers>>,
}

impl DerivedViews {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last successful meta-analysis, possibly stale
    pub fn cached_meta(&self) -> Option<&MetaAnalysis> {
        self.meta.as_ref().map(|c| &c.value)
    }

    /// Last successful dossiers, possibly stale
    pub fn cached_dossiers(&self) -> Option<&StrategicDossiers> {
        self.dossiers.as_ref().map(|c| &c.value)
    }

    /// Whether the cached dossiers were computed from this collection
    pub fn dossiers_are_current(&self, results: &[AnalysisResult]) -> bool {
        let fingerprint = collection_fingerprint(results);
        self.dossiers
            .as_ref()
            .is_some_and(|c| c.fingerprint == fingerprint)
    }

    /// Seed the dossier cache from a stored snapshot
    pub fn restore_dossiers(&mut self, snapshot: DossierSnapshot) {
        self.dossiers = Some(Cached {
            fingerprint: snapshot.fingerprint,
            value: snapshot.dossiers,
        });
    }

    pub fn dossier_snapshot(&self) -> Option<DossierSnapshot> {
        self.dossiers.as_ref().map(|c| DossierSnapshot {
            fingerprint: c.fingerprint.clone(),
            dossiers: c.value.clone(),
        })
    }

    /// Whether the cached meta-analysis matches these inputs
    pub fn meta_is_current(&self, results: &[AnalysisResult], prompt: Option<&str>) -> bool {
        let fingerprint = meta_fingerprint(results, prompt);
        self.meta
            .as_ref()
            .is_some_and(|c| c.fingerprint == fingerprint)
    }

    /// Meta-analysis for these inputs, recomputing only when they changed
    pub async fn meta(
        &mut self,
        aggregator: &Aggregator,
        results: &[AnalysisResult],
        prompt: Option<&str>,
    ) -> Result<&MetaAnalysis> {
        let fingerprint = meta_fingerprint(results, prompt);
        let cached = match self.meta.take() {
            Some(current) if current.fingerprint == fingerprint => current,
            previous => {
                tracing::debug!(reports = results.len(), "Recomputing meta-analysis");
                match aggregator.synthesize_meta(results, prompt).await {
                    Ok(value) => Cached { fingerprint, value },
                    Err(e) => {
                        self.meta = previous;
                        return Err(e);
                    }
                }
            }
        };
        Ok(&self.meta.insert(cached).value)
    }

    /// Dossiers for this collection. Served from cache unless the collection
    /// changed or `force` is set.
    pub async fn dossiers(
        &mut self,
        aggregator: &Aggregator,
        results: &[AnalysisResult],
        force: bool,
    ) -> Result<&StrategicDossiers> {
        let fingerprint = collection_fingerprint(results);
        let cached = match self.dossiers.take() {
            Some(current) if !force && current.fingerprint == fingerprint => current,
            previous => {
                tracing::debug!(reports = results.len(), force, "Recomputing dossiers");
                match aggregator.synthesize_dossiers(results).await {
                    Ok(value) => Cached { fingerprint, value },
                    Err(e) => {
                        self.dossiers = previous;
                        return Err(e);
                    }
                }
            }
        };
        Ok(&self.dossiers.insert(cached).value)
    }

    /// Drop cached dossiers so the next request regenerates them
    pub fn invalidate_dossiers(&mut self) {
        self.dossiers = None;
    }
}
