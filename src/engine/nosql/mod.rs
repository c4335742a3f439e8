//! Document side: per-sample variant documents
//!
//! The document collaborator owns these files. The engine reads them through
//! [`DocumentReader`] and never writes during a query.

pub mod document;
pub mod error;
pub mod query;
pub mod storage;

pub use document::{
    Annotations, CopyNumberVariant, PopulationFrequency, Prediction, StructuralVariant, Variant, VariantDocument,
};
pub use error::{NoSqlError, Result};
pub use query::VariantFilter;
pub use storage::VariantStore;

use serde::Serialize;
use std::collections::BTreeMap;

use crate::engine::relational::{PatientId, SampleId};

/// A sample whose document matched, with only the variants that matched
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleMatch {
    pub sample_id: SampleId,
    pub variants: Vec<Variant>,
}

/// A copy number variant touching the requested gene, with its document key
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CnvHit {
    pub sample_id: SampleId,
    pub patient_id: Option<PatientId>,
    pub cnv: CopyNumberVariant,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SvHit {
    pub sample_id: SampleId,
    pub patient_id: Option<PatientId>,
    pub sv: StructuralVariant,
}

/// Collection-wide counts.
///
/// Significance and type buckets use the canonical spelling when the stored
/// value is recognized, the stored text otherwise, and `Unspecified` when the
/// field is absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantStats {
    pub total_samples: usize,
    pub total_variants: usize,
    pub significance_counts: BTreeMap<String, usize>,
    pub type_counts: BTreeMap<String, usize>,
    pub total_cnvs: usize,
    pub total_svs: usize,
}

/// Read-only capability over the document store.
///
/// Blocking; results are ordered by sample id and contain no empty matches.
pub trait DocumentReader: Send + Sync {
    fn find_matching_samples(&self, filter: &VariantFilter) -> Result<Vec<SampleMatch>>;
}
