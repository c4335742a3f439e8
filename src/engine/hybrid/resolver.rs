//! Filter resolvers for each store
//!
//! Reader calls are blocking. Each one runs on the blocking pool under the
//! configured timeout, and every failure mode maps to `UpstreamUnavailable`.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::engine::nosql::{DocumentReader, Variant, VariantFilter};
use crate::engine::relational::{RelationalFilter, RelationalReader, SampleId};
use crate::engine::vocab::StoreKind;

use super::error::{FederationError, FederationResult};
use super::idset::IdSet;

/// Document resolver output: matched variants are kept so assembly never
/// rescans documents.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentResolution {
    Unconstrained,
    Matched(BTreeMap<SampleId, Vec<Variant>>),
}

impl DocumentResolution {
    pub fn id_set(&self) -> IdSet {
        match self {
            DocumentResolution::Unconstrained => IdSet::Unconstrained,
            DocumentResolution::Matched(matches) => IdSet::from_ids(matches.keys().copied()),
        }
    }

    pub fn into_matches(self) -> BTreeMap<SampleId, Vec<Variant>> {
        match self {
            DocumentResolution::Unconstrained => BTreeMap::new(),
            DocumentResolution::Matched(matches) => matches,
        }
    }
}

/// Run one blocking reader call with a timeout.
///
/// Dropping the returned future abandons the wait; the blocking call itself
/// finishes on its pool thread and its result is discarded.
pub async fn call_store<T, E, F>(store: StoreKind, timeout: Duration, call: F) -> FederationResult<T>
where
    F: FnOnce() -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Display + Send + 'static,
{
    let task = tokio::task::spawn_blocking(call);
    let outcome = match tokio::time::timeout(timeout, task).await {
        Err(_) => Err(format!("timed out after {} ms", timeout.as_millis())),
        Ok(Err(join)) => Err(format!("reader task failed: {}", join)),
        Ok(Ok(Err(e))) => Err(e.to_string()),
        Ok(Ok(Ok(value))) => Ok(value),
    };

    outcome.map_err(|reason| {
        warn!(%store, %reason, "store call failed");
        FederationError::upstream(store, reason)
    })
}

pub async fn resolve_relational(
    reader: &Arc<dyn RelationalReader>,
    filter: &RelationalFilter,
    timeout: Duration,
) -> FederationResult<IdSet> {
    if filter.is_unconstrained() {
        return Ok(IdSet::Unconstrained);
    }

    let reader = Arc::clone(reader);
    let filter = filter.clone();
    let ids = call_store(StoreKind::Relational, timeout, move || reader.find_sample_ids(&filter)).await?;
    Ok(IdSet::from_ids(ids))
}

pub async fn resolve_documents(
    reader: &Arc<dyn DocumentReader>,
    filter: &VariantFilter,
    timeout: Duration,
) -> FederationResult<DocumentResolution> {
    if filter.is_unconstrained() {
        return Ok(DocumentResolution::Unconstrained);
    }

    let reader = Arc::clone(reader);
    let filter = filter.clone();
    let matches = call_store(StoreKind::Document, timeout, move || reader.find_matching_samples(&filter)).await?;

    // Readers may repeat a key; keep the first occurrence's variants
    let mut by_sample: BTreeMap<SampleId, Vec<Variant>> = BTreeMap::new();
    for m in matches.into_iter().filter(|m| !m.variants.is_empty()) {
        by_sample.entry(m.sample_id).or_insert(m.variants);
    }
    Ok(DocumentResolution::Matched(by_sample))
}
