//! Cross-store references
//!
//! Neither store enforces the link from a variant document to its sample.
//! It is modelled here as a soft reference that is checked at read time, and
//! every unresolved key becomes a warning on the query result.

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

use crate::engine::relational::SampleId;
use crate::engine::vocab::StoreKind;

/// A field reference (store.collection.field)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRef {
    pub store: StoreKind,
    pub collection: &'static str,
    pub field: &'static str,
}

impl FieldRef {
    pub const fn relational(table: &'static str, column: &'static str) -> Self {
        Self {
            store: StoreKind::Relational,
            collection: table,
            field: column,
        }
    }

    pub const fn document(collection: &'static str, field: &'static str) -> Self {
        Self {
            store: StoreKind::Document,
            collection,
            field,
        }
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.store, self.collection, self.field)
    }
}

/// A convention-only foreign key, validated when read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoftReference {
    pub source: FieldRef,
    pub target: FieldRef,
}

/// Variant documents point at relational samples by id
pub const SAMPLE_REFERENCE: SoftReference = SoftReference {
    source: FieldRef::document("variants", "sample_id"),
    target: FieldRef::relational("samples", "sample_id"),
};

impl SoftReference {
    /// Split `referenced` into keys that resolve against `existing` and orphans
    pub fn partition(
        &self,
        referenced: &BTreeSet<SampleId>,
        existing: &[SampleId],
    ) -> (BTreeSet<SampleId>, Vec<SampleId>) {
        let existing: BTreeSet<SampleId> = existing.iter().copied().collect();
        let (resolved, orphans): (BTreeSet<SampleId>, BTreeSet<SampleId>) =
            referenced.iter().copied().partition(|id| existing.contains(id));
        (resolved, orphans.into_iter().collect())
    }

    pub fn orphan_warning(&self, id: SampleId) -> QueryWarning {
        QueryWarning {
            kind: WarningKind::OrphanDocument,
            sample_id: id,
            message: format!("{} = {} does not resolve to {}", self.source, id, self.target),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WarningKind {
    /// A document whose sample does not exist in the relational store
    OrphanDocument,
    /// An intersected id the relational fetch did not return
    InternalInvariantViolation,
}

/// Non-fatal problem reported alongside a successful result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryWarning {
    pub kind: WarningKind,
    pub sample_id: SampleId,
    pub message: String,
}

impl QueryWarning {
    pub fn invariant_violation(id: SampleId, message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::InternalInvariantViolation,
            sample_id: id,
            message: message.into(),
        }
    }
}
