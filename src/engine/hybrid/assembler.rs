//! Result assembly: relational rows joined with already-matched variants

use serde::Serialize;
use std::collections::BTreeMap;

use crate::engine::nosql::Variant;
use crate::engine::relational::{ClinicalTest, Patient, PatientSampleRecord, Sample, SampleId};

use super::relations::{QueryWarning, SAMPLE_REFERENCE};

/// Denormalized view of one sample across both stores
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinedRecord {
    pub patient: Patient,
    pub sample: Sample,
    pub tests: Vec<ClinicalTest>,
    /// Matched variants in document order; empty when the document side
    /// did not filter or the sample has no document
    pub variants: Vec<Variant>,
}

/// Where the assembled ids came from, which decides how a missing
/// relational row is reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdOrigin {
    /// Only the document side constrained the query
    DocumentKeys,
    /// The relational side produced or confirmed every id
    Relational,
}

#[derive(Debug, Default)]
pub struct Assembly {
    pub records: Vec<CombinedRecord>,
    pub warnings: Vec<QueryWarning>,
}

/// Build one record per id in `ids` order.
///
/// Ids the relational fetch did not return are dropped with a warning.
pub fn assemble(
    ids: &[SampleId],
    fetched: Vec<PatientSampleRecord>,
    mut variants: BTreeMap<SampleId, Vec<Variant>>,
    origin: IdOrigin,
) -> Assembly {
    let mut rows: BTreeMap<SampleId, PatientSampleRecord> =
        fetched.into_iter().map(|r| (r.sample.sample_id, r)).collect();

    let mut assembly = Assembly::default();
    for &id in ids {
        match rows.remove(&id) {
            Some(row) => assembly.records.push(CombinedRecord {
                patient: row.patient,
                sample: row.sample,
                tests: row.tests,
                variants: variants.remove(&id).unwrap_or_default(),
            }),
            None => assembly.warnings.push(match origin {
                IdOrigin::DocumentKeys => SAMPLE_REFERENCE.orphan_warning(id),
                IdOrigin::Relational => QueryWarning::invariant_violation(
                    id,
                    format!("sample {} was resolved but missing from the relational fetch", id),
                ),
            }),
        }
    }
    assembly
}
