//! File-backed variant store
//!
//! One pretty-printed JSON file per sample (`<sample_id>.json`) inside a
//! collection directory.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::engine::relational::SampleId;
use crate::engine::vocab::{ClinicalSignificance, VariantType};

use super::document::VariantDocument;
use super::error::{NoSqlError, Result};
use super::query::VariantFilter;
use super::{CnvHit, DocumentReader, SampleMatch, SvHit, VariantStats};

pub struct VariantStore {
    path: PathBuf,
}

impl VariantStore {
    /// Open an existing collection under `base_path`
    pub fn open(base_path: &Path, collection: &str) -> Result<Self> {
        let path = base_path.join(collection);
        if !path.is_dir() {
            return Err(NoSqlError::CollectionNotFound(path));
        }
        Ok(Self { path })
    }

    pub fn create(base_path: &Path, collection: &str) -> Result<Self> {
        let path = base_path.join(collection);
        fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    pub fn open_or_create(base_path: &Path, collection: &str) -> Result<Self> {
        if base_path.join(collection).is_dir() {
            Self::open(base_path, collection)
        } else {
            Self::create(base_path, collection)
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn doc_path(&self, sample_id: SampleId) -> PathBuf {
        self.path.join(format!("{}.json", sample_id))
    }

    /// Store a new document; an existing key is rejected
    pub fn insert(&self, doc: &VariantDocument) -> Result<SampleId> {
        let doc_path = self.doc_path(doc.sample_id);
        if doc_path.exists() {
            return Err(NoSqlError::DuplicateId(doc.sample_id));
        }

        let content = serde_json::to_string_pretty(doc)?;
        fs::write(doc_path, content)?;
        Ok(doc.sample_id)
    }

    pub fn get_document(&self, sample_id: SampleId) -> Result<Option<VariantDocument>> {
        let doc_path = self.doc_path(sample_id);
        if !doc_path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(doc_path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    pub fn count(&self) -> Result<usize> {
        Ok(self.document_paths()?.len())
    }

    /// Distinct gene symbols across all documents, sorted
    pub fn available_genes(&self) -> Result<Vec<String>> {
        let genes: BTreeSet<String> = self
            .all()?
            .into_iter()
            .flat_map(|doc| doc.variants.into_iter().filter_map(|v| v.gene))
            .collect();
        Ok(genes.into_iter().collect())
    }

    fn document_paths(&self) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let path = entry?.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                paths.push(path);
            }
        }
        Ok(paths)
    }

    pub fn variant_stats(&self) -> Result<VariantStats> {
        let mut stats = VariantStats::default();
        for doc in self.all()? {
            stats.total_samples += 1;
            stats.total_variants += doc.variants.len();
            stats.total_cnvs += doc.copy_number_variants.len();
            stats.total_svs += doc.structural_variants.len();

            for variant in &doc.variants {
                let significance = bucket(variant.clinical_significance.as_deref(), |raw| {
                    ClinicalSignificance::parse(raw).ok().map(|s| s.as_str())
                });
                *stats.significance_counts.entry(significance).or_default() += 1;

                let kind = bucket(variant.variant_type.as_deref(), |raw| {
                    VariantType::parse(raw).ok().map(|t| t.as_str())
                });
                *stats.type_counts.entry(kind).or_default() += 1;
            }
        }
        Ok(stats)
    }

    /// Copy number variants whose `genes_affected` contains `gene` (exact)
    pub fn copy_number_variants_by_gene(&self, gene: &str) -> Result<Vec<CnvHit>> {
        let mut hits = Vec::new();
        for doc in self.all()? {
            for cnv in doc.copy_number_variants.into_iter().filter(|c| c.affects(gene)) {
                hits.push(CnvHit {
                    sample_id: doc.sample_id,
                    patient_id: doc.patient_id,
                    cnv,
                });
            }
        }
        Ok(hits)
    }

    pub fn structural_variants_by_gene(&self, gene: &str) -> Result<Vec<SvHit>> {
        let mut hits = Vec::new();
        for doc in self.all()? {
            for sv in doc.structural_variants.into_iter().filter(|s| s.affects(gene)) {
                hits.push(SvHit {
                    sample_id: doc.sample_id,
                    patient_id: doc.patient_id,
                    sv,
                });
            }
        }
        Ok(hits)
    }

    /// Every decodable document, ordered by sample id.
    ///
    /// Files that do not decode are logged and skipped.
    pub fn all(&self) -> Result<Vec<VariantDocument>> {
        let mut docs = Vec::new();
        for path in self.document_paths()? {
            let content = fs::read_to_string(&path)?;
            match serde_json::from_str::<VariantDocument>(&content) {
                Ok(doc) => docs.push(doc),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping undecodable variant document"),
            }
        }
        docs.sort_by_key(|d| d.sample_id);
        Ok(docs)
    }
}

fn bucket(raw: Option<&str>, canonical: impl Fn(&str) -> Option<&'static str>) -> String {
    match raw.map(str::trim) {
        None | Some("") => "Unspecified".to_string(),
        Some(raw) => canonical(raw).map(str::to_string).unwrap_or_else(|| raw.to_string()),
    }
}

impl DocumentReader for VariantStore {
    fn find_matching_samples(&self, filter: &VariantFilter) -> Result<Vec<SampleMatch>> {
        let docs = self.all()?;
        let scanned = docs.len();

        let matches: Vec<SampleMatch> = docs
            .into_iter()
            .filter_map(|doc| {
                let variants = filter.matching_variants(&doc);
                (!variants.is_empty()).then_some(SampleMatch {
                    sample_id: doc.sample_id,
                    variants,
                })
            })
            .collect();

        debug!(scanned, matched = matches.len(), "variant document scan");
        Ok(matches)
    }
}
