//! Variant document shape
//!
//! Documents are irregular: every variant field is optional and anything the
//! model does not name is kept in `extra` so it survives a read/write cycle.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

use crate::engine::relational::{PatientId, SampleId};

/// Per-sample variant calls, keyed by the relational sample id.
///
/// The key is a soft reference: nothing guarantees the sample exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantDocument {
    pub sample_id: SampleId,
    #[serde(default, alias = "mysql_patient_id", skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<PatientId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_genome: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_pipeline: Option<String>,
    #[serde(default)]
    pub variants: Vec<Variant>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub copy_number_variants: Vec<CopyNumberVariant>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub structural_variants: Vec<StructuralVariant>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl VariantDocument {
    pub fn new(sample_id: SampleId, variants: Vec<Variant>) -> Self {
        Self {
            sample_id,
            patient_id: None,
            external_id: None,
            reference_genome: None,
            analysis_date: None,
            analysis_pipeline: None,
            variants,
            copy_number_variants: Vec::new(),
            structural_variants: Vec::new(),
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chromosome: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_allele: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternate_allele: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gene: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hgvs_c: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hgvs_p: Option<String>,
    /// Stored as written; compared after normalization
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zygosity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allele_frequency: Option<f64>,
    /// Stored as written; compared after normalization
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clinical_significance: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Annotations>,
    #[serde(default)]
    pub phenotypes: BTreeSet<String>,
    #[serde(default)]
    pub citations: BTreeSet<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Variant {
    pub fn cadd(&self) -> Option<f64> {
        self.annotations.as_ref().and_then(|a| a.cadd)
    }
}

/// Copy number gain or loss over a genomic segment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CopyNumberVariant {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cnv_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chromosome: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<i64>,
    /// Deletion, Duplication, Amplification
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub cnv_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copy_number: Option<i64>,
    #[serde(default)]
    pub genes_affected: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clinical_significance: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CopyNumberVariant {
    pub fn affects(&self, gene: &str) -> bool {
        self.genes_affected.iter().any(|g| g == gene)
    }
}

/// Rearrangement spanning one or more chromosomes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuralVariant {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sv_id: Option<String>,
    /// Translocation, Inversion, Complex Rearrangement
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub sv_type: Option<String>,
    #[serde(default)]
    pub chromosomes: Vec<String>,
    #[serde(default)]
    pub breakpoints: Vec<i64>,
    #[serde(default)]
    pub genes_affected: Vec<String>,
    /// Fusion product, e.g. `BCR-ABL1`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fusion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clinical_significance: Option<String>,
    #[serde(default)]
    pub phenotypes: BTreeSet<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StructuralVariant {
    pub fn affects(&self, gene: &str) -> bool {
        self.genes_affected.iter().any(|g| g == gene)
    }
}

/// Prediction scores and population frequencies
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Annotations {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sift: Option<Prediction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polyphen: Option<Prediction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cadd: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gnomad: Option<PopulationFrequency>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prediction: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PopulationFrequency {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allele_frequency: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homozygous: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heterozygous: Option<i64>,
}
