//! Variant predicate evaluation
//!
//! A variant matches when every active predicate holds. A field the variant
//! does not carry never satisfies a predicate on that field.

use crate::engine::vocab::{ClinicalSignificance, VariantType};

use super::document::{Variant, VariantDocument};

/// Normalized document-side predicates, AND-ed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariantFilter {
    /// Exact, case-sensitive gene symbol
    pub gene: Option<String>,
    pub clinical_significance: Option<ClinicalSignificance>,
    pub variant_type: Option<VariantType>,
    pub min_quality: Option<f64>,
    pub min_cadd: Option<f64>,
    pub chromosome: Option<String>,
    /// Inclusive
    pub position_min: Option<i64>,
    /// Inclusive
    pub position_max: Option<i64>,
    /// Document-level; the other predicates are per variant
    pub reference_genome: Option<String>,
}

impl VariantFilter {
    pub fn is_unconstrained(&self) -> bool {
        self.reference_genome.is_none()
            && self.gene.is_none()
            && self.clinical_significance.is_none()
            && self.variant_type.is_none()
            && self.min_quality.is_none()
            && self.min_cadd.is_none()
            && self.chromosome.is_none()
            && self.position_min.is_none()
            && self.position_max.is_none()
    }

    pub fn accepts_document(&self, doc: &VariantDocument) -> bool {
        match (&self.reference_genome, &doc.reference_genome) {
            (None, _) => true,
            (Some(wanted), Some(actual)) => actual == wanted,
            (Some(_), None) => false,
        }
    }

    /// Check if a single variant satisfies every per-variant predicate
    pub fn matches(&self, variant: &Variant) -> bool {
        if let Some(gene) = &self.gene {
            if variant.gene.as_deref() != Some(gene.as_str()) {
                return false;
            }
        }

        if let Some(wanted) = self.clinical_significance {
            let actual = variant
                .clinical_significance
                .as_deref()
                .and_then(|raw| ClinicalSignificance::parse(raw).ok());
            if actual != Some(wanted) {
                return false;
            }
        }

        if let Some(wanted) = self.variant_type {
            let actual = variant
                .variant_type
                .as_deref()
                .and_then(|raw| VariantType::parse(raw).ok());
            if actual != Some(wanted) {
                return false;
            }
        }

        if let Some(chromosome) = &self.chromosome {
            if variant.chromosome.as_deref() != Some(chromosome.as_str()) {
                return false;
            }
        }

        at_least(variant.quality, self.min_quality)
            && at_least(variant.cadd(), self.min_cadd)
            && within(variant.position, self.position_min, self.position_max)
    }

    /// The variants of `doc` that match, in document order
    pub fn matching_variants(&self, doc: &VariantDocument) -> Vec<Variant> {
        if !self.accepts_document(doc) {
            return Vec::new();
        }
        doc.variants.iter().filter(|v| self.matches(v)).cloned().collect()
    }
}

fn at_least(actual: Option<f64>, min: Option<f64>) -> bool {
    match (min, actual) {
        (None, _) => true,
        (Some(_), None) => false,
        (Some(min), Some(actual)) => actual >= min,
    }
}

fn within(actual: Option<i64>, min: Option<i64>, max: Option<i64>) -> bool {
    if min.is_none() && max.is_none() {
        return true;
    }
    match actual {
        None => false,
        Some(pos) => min.map_or(true, |m| pos >= m) && max.map_or(true, |m| pos <= m),
    }
}
