//! Federated query coordinator
//!
//! Drives one combined query through
//! `Validating -> ResolvingBothSides -> Intersecting -> Assembling -> Paginating -> Done`,
//! with `Errored` reachable from any stage. An empty intersection goes
//! straight from `Intersecting` to `Done`, after orphan detection has run on
//! whatever the document side matched.
//!
//! The coordinator holds no per-query state and is cheap to clone, so one
//! instance serves any number of concurrent callers. Cancelling a query is
//! dropping its future: in-flight store calls are abandoned and no later
//! stage runs.

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine::config::QueryLimits;
use crate::engine::nosql::{DocumentReader, Variant};
use crate::engine::relational::{RelationalReader, SampleId};
use crate::engine::vocab::StoreKind;

use super::assembler::{assemble, CombinedRecord, IdOrigin};
use super::error::{FederationError, FederationResult};
use super::idset::{cap_ids, IdSet};
use super::predicates::{validate, CombinedPredicates, Pagination};
use super::relations::{QueryWarning, SAMPLE_REFERENCE};
use super::resolver::{call_store, resolve_documents, resolve_relational};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum QueryStage {
    Validating,
    ResolvingBothSides,
    Intersecting,
    Assembling,
    Paginating,
    Done,
    Errored,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinedQueryResult {
    pub query_id: Uuid,
    pub records: Vec<CombinedRecord>,
    pub warnings: Vec<QueryWarning>,
    /// Reference date ages were computed against
    pub as_of: NaiveDate,
    /// Assembled records before pagination
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
    /// The identifier list hit `result_cap`
    pub truncated: bool,
    /// States visited, in order
    pub stages: Vec<QueryStage>,
}

/// Stage bookkeeping for a single query
struct StageTrace {
    query_id: Uuid,
    stages: Vec<QueryStage>,
}

impl StageTrace {
    fn new() -> Self {
        Self {
            query_id: Uuid::new_v4(),
            stages: Vec::new(),
        }
    }

    fn enter(&mut self, stage: QueryStage) {
        debug!(query_id = %self.query_id, ?stage, "combined query stage");
        self.stages.push(stage);
    }

    fn fail(&mut self, err: FederationError) -> FederationError {
        self.enter(QueryStage::Errored);
        warn!(query_id = %self.query_id, error = %err, "combined query failed");
        err
    }
}

struct Page {
    as_of: NaiveDate,
    records: Vec<CombinedRecord>,
    total: usize,
    offset: usize,
    limit: usize,
    truncated: bool,
}

#[derive(Clone)]
pub struct FederatedQueryCoordinator {
    relational: Arc<dyn RelationalReader>,
    documents: Arc<dyn DocumentReader>,
    limits: QueryLimits,
}

impl FederatedQueryCoordinator {
    pub fn new(
        relational: Arc<dyn RelationalReader>,
        documents: Arc<dyn DocumentReader>,
        limits: QueryLimits,
    ) -> Self {
        Self {
            relational,
            documents,
            limits,
        }
    }

    pub fn limits(&self) -> &QueryLimits {
        &self.limits
    }

    /// Run a combined query with ages computed as of today (UTC)
    pub async fn run_combined_query(
        &self,
        predicates: &CombinedPredicates,
        pagination: &Pagination,
    ) -> FederationResult<CombinedQueryResult> {
        self.run_combined_query_as_of(predicates, pagination, Utc::now().date_naive())
            .await
    }

    pub async fn run_combined_query_as_of(
        &self,
        predicates: &CombinedPredicates,
        pagination: &Pagination,
        as_of: NaiveDate,
    ) -> FederationResult<CombinedQueryResult> {
        let mut trace = StageTrace::new();
        let timeout = self.limits.timeout();

        trace.enter(QueryStage::Validating);
        let query = validate(predicates, pagination, &self.limits, as_of)
            .map_err(|e| trace.fail(e.into()))?;
        let empty = Page {
            as_of: query.as_of,
            records: Vec::new(),
            total: 0,
            offset: query.offset,
            limit: query.limit,
            truncated: false,
        };

        trace.enter(QueryStage::ResolvingBothSides);
        let (relational_ids, documents) = tokio::try_join!(
            resolve_relational(&self.relational, &query.relational, timeout),
            resolve_documents(&self.documents, &query.document, timeout),
        )
        .map_err(|e| trace.fail(e))?;

        trace.enter(QueryStage::Intersecting);
        let document_ids = documents.id_set();
        if document_ids.is_empty() {
            return Ok(self.finish(trace, Vec::new(), empty));
        }

        let mut warnings = Vec::new();
        let mut variants = documents.into_matches();
        let document_ids = match document_ids {
            IdSet::Unconstrained => IdSet::Unconstrained,
            IdSet::Ids(keys) => {
                let resolved = self
                    .detect_orphans(&trace, keys, &mut variants, &mut warnings)
                    .await
                    .map_err(|e| trace.fail(e))?;
                IdSet::Ids(resolved)
            }
        };
        if relational_ids.is_empty() || document_ids.is_empty() {
            return Ok(self.finish(trace, warnings, empty));
        }

        let origin = if relational_ids.is_unconstrained() && !document_ids.is_unconstrained() {
            IdOrigin::DocumentKeys
        } else {
            IdOrigin::Relational
        };

        let cap = self.limits.result_cap;
        let (ids, truncated) = match relational_ids.intersect(document_ids) {
            IdSet::Ids(set) => cap_ids(set, cap),
            IdSet::Unconstrained => {
                let reader = Arc::clone(&self.relational);
                let mut listed = call_store(StoreKind::Relational, timeout, move || {
                    reader.list_sample_ids(cap.saturating_add(1))
                })
                .await
                .map_err(|e| trace.fail(e))?;
                listed.sort();
                listed.dedup();
                cap_ids(listed, cap)
            }
        };
        if truncated {
            info!(query_id = %trace.query_id, cap, "combined query hit the result cap");
        }
        if ids.is_empty() {
            return Ok(self.finish(trace, warnings, Page { truncated, ..empty }));
        }

        trace.enter(QueryStage::Assembling);
        let reader = Arc::clone(&self.relational);
        let fetch_ids = ids.clone();
        let fetched = call_store(StoreKind::Relational, timeout, move || {
            reader.fetch_patients_and_samples(&fetch_ids)
        })
        .await
        .map_err(|e| trace.fail(e))?;

        let assembly = assemble(&ids, fetched, variants, origin);
        for warning in &assembly.warnings {
            warn!(query_id = %trace.query_id, sample_id = %warning.sample_id, kind = ?warning.kind, "{}", warning.message);
        }
        warnings.extend(assembly.warnings);

        trace.enter(QueryStage::Paginating);
        let total = assembly.records.len();
        let records = assembly
            .records
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .collect();

        Ok(self.finish(
            trace,
            warnings,
            Page {
                records,
                total,
                truncated,
                ..empty
            },
        ))
    }

    /// Check matched document keys against the relational store; orphans
    /// are dropped from `variants` and reported
    async fn detect_orphans(
        &self,
        trace: &StageTrace,
        keys: BTreeSet<SampleId>,
        variants: &mut BTreeMap<SampleId, Vec<Variant>>,
        warnings: &mut Vec<QueryWarning>,
    ) -> FederationResult<BTreeSet<SampleId>> {
        let reader = Arc::clone(&self.relational);
        let lookup: Vec<SampleId> = keys.iter().copied().collect();
        let existing = call_store(StoreKind::Relational, self.limits.timeout(), move || {
            reader.existing_sample_ids(&lookup)
        })
        .await?;

        let (resolved, orphans) = SAMPLE_REFERENCE.partition(&keys, &existing);
        for id in orphans {
            let warning = SAMPLE_REFERENCE.orphan_warning(id);
            warn!(query_id = %trace.query_id, sample_id = %id, "{}", warning.message);
            variants.remove(&id);
            warnings.push(warning);
        }
        Ok(resolved)
    }

    fn finish(&self, mut trace: StageTrace, warnings: Vec<QueryWarning>, page: Page) -> CombinedQueryResult {
        trace.enter(QueryStage::Done);
        info!(
            query_id = %trace.query_id,
            records = page.records.len(),
            total = page.total,
            warnings = warnings.len(),
            "combined query complete"
        );
        CombinedQueryResult {
            query_id: trace.query_id,
            as_of: page.as_of,
            records: page.records,
            warnings,
            total: page.total,
            offset: page.offset,
            limit: page.limit,
            truncated: page.truncated,
            stages: trace.stages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::hybrid::relations::WarningKind;
    use crate::engine::nosql::{SampleMatch, VariantFilter};
    use crate::engine::relational::sqlite::fixtures::{patient, sample};
    use crate::engine::relational::{PatientSampleRecord, RelationalFilter, RelationalResult};
    use crate::engine::vocab::Sex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Barrier, Mutex};
    use std::time::Duration;

    #[derive(Default)]
    struct Calls {
        find: AtomicUsize,
        list: AtomicUsize,
        existing: AtomicUsize,
        fetch: AtomicUsize,
    }

    /// Scripted relational store over a fixed set of sample ids
    #[derive(Default)]
    struct ScriptedRelational {
        /// What `find_sample_ids` returns, in this order
        found: Vec<i64>,
        /// Samples that exist
        rows: Vec<i64>,
        /// Samples `fetch` pretends not to see
        hidden: Vec<i64>,
        delay: Option<Duration>,
        barrier: Option<Arc<Barrier>>,
        last_list_limit: Mutex<Option<usize>>,
        calls: Calls,
    }

    impl ScriptedRelational {
        fn record(id: i64) -> PatientSampleRecord {
            PatientSampleRecord {
                patient: patient(id * 100, Sex::Female, "1990-01-01"),
                sample: sample(id, id * 100),
                tests: vec![],
            }
        }
    }

    impl RelationalReader for ScriptedRelational {
        fn find_sample_ids(&self, _filter: &RelationalFilter) -> RelationalResult<Vec<SampleId>> {
            self.calls.find.fetch_add(1, Ordering::SeqCst);
            if let Some(barrier) = &self.barrier {
                barrier.wait();
            }
            if let Some(delay) = self.delay {
                std::thread::sleep(delay);
            }
            Ok(self.found.iter().copied().map(SampleId).collect())
        }

        fn list_sample_ids(&self, limit: usize) -> RelationalResult<Vec<SampleId>> {
            self.calls.list.fetch_add(1, Ordering::SeqCst);
            *self.last_list_limit.lock().unwrap() = Some(limit);
            let mut rows = self.rows.clone();
            rows.sort();
            Ok(rows.into_iter().take(limit).map(SampleId).collect())
        }

        fn existing_sample_ids(&self, ids: &[SampleId]) -> RelationalResult<Vec<SampleId>> {
            self.calls.existing.fetch_add(1, Ordering::SeqCst);
            Ok(ids.iter().copied().filter(|id| self.rows.contains(&id.0)).collect())
        }

        fn fetch_patients_and_samples(&self, ids: &[SampleId]) -> RelationalResult<Vec<PatientSampleRecord>> {
            self.calls.fetch.fetch_add(1, Ordering::SeqCst);
            Ok(ids
                .iter()
                .filter(|id| self.rows.contains(&id.0) && !self.hidden.contains(&id.0))
                .map(|id| Self::record(id.0))
                .collect())
        }
    }

    #[derive(Default)]
    struct ScriptedDocuments {
        /// (sample id, genes of matched variants)
        matches: Vec<(i64, Vec<&'static str>)>,
        barrier: Option<Arc<Barrier>>,
        calls: AtomicUsize,
    }

    impl DocumentReader for ScriptedDocuments {
        fn find_matching_samples(&self, _filter: &VariantFilter) -> crate::engine::nosql::Result<Vec<SampleMatch>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(barrier) = &self.barrier {
                barrier.wait();
            }
            Ok(self
                .matches
                .iter()
                .map(|(id, genes)| SampleMatch {
                    sample_id: SampleId(*id),
                    variants: genes
                        .iter()
                        .map(|g| Variant {
                            gene: Some(g.to_string()),
                            ..Default::default()
                        })
                        .collect(),
                })
                .collect())
        }
    }

    fn coordinator(
        relational: ScriptedRelational,
        documents: ScriptedDocuments,
    ) -> (FederatedQueryCoordinator, Arc<ScriptedRelational>, Arc<ScriptedDocuments>) {
        coordinator_with(relational, documents, QueryLimits::default())
    }

    fn coordinator_with(
        relational: ScriptedRelational,
        documents: ScriptedDocuments,
        limits: QueryLimits,
    ) -> (FederatedQueryCoordinator, Arc<ScriptedRelational>, Arc<ScriptedDocuments>) {
        let relational = Arc::new(relational);
        let documents = Arc::new(documents);
        let coordinator = FederatedQueryCoordinator::new(relational.clone(), documents.clone(), limits);
        (coordinator, relational, documents)
    }

    fn as_of() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
    }

    fn both_sides() -> CombinedPredicates {
        CombinedPredicates {
            sex: Some("Female".to_string()),
            gene: Some("BRCA1".to_string()),
            ..Default::default()
        }
    }

    fn ids(result: &CombinedQueryResult) -> Vec<i64> {
        result.records.iter().map(|r| r.sample.sample_id.0).collect()
    }

    async fn run(coordinator: &FederatedQueryCoordinator, predicates: &CombinedPredicates, page: Pagination) -> FederationResult<CombinedQueryResult> {
        coordinator.run_combined_query_as_of(predicates, &page, as_of()).await
    }

    #[tokio::test]
    async fn test_result_is_exact_intersection() {
        let (coordinator, _, _) = coordinator(
            ScriptedRelational {
                found: vec![4, 1, 3, 2],
                rows: vec![1, 2, 3, 4, 5],
                ..Default::default()
            },
            ScriptedDocuments {
                matches: vec![(3, vec!["BRCA1"]), (4, vec!["BRCA1", "BRCA1"]), (5, vec!["BRCA1"])],
                ..Default::default()
            },
        );

        let result = run(&coordinator, &both_sides(), Pagination::default()).await.unwrap();
        assert_eq!(ids(&result), vec![3, 4]);
        assert_eq!(result.records[1].variants.len(), 2);
        assert!(result.warnings.is_empty());
        assert_eq!(
            result.stages,
            vec![
                QueryStage::Validating,
                QueryStage::ResolvingBothSides,
                QueryStage::Intersecting,
                QueryStage::Assembling,
                QueryStage::Paginating,
                QueryStage::Done,
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_side_short_circuits_to_done() {
        let (coordinator, relational, documents) = coordinator(
            ScriptedRelational {
                found: vec![],
                rows: vec![1, 2],
                ..Default::default()
            },
            ScriptedDocuments {
                matches: vec![(1, vec!["BRCA1"]), (7, vec!["BRCA1"])],
                ..Default::default()
            },
        );

        let predicates = CombinedPredicates {
            age_min: Some(200),
            gene: Some("BRCA1".to_string()),
            ..Default::default()
        };
        let result = run(&coordinator, &predicates, Pagination::default()).await.unwrap();

        assert!(result.records.is_empty());
        assert!(!result.stages.contains(&QueryStage::Assembling));
        assert_eq!(result.stages.last(), Some(&QueryStage::Done));
        assert_eq!(relational.calls.fetch.load(Ordering::SeqCst), 0);
        assert_eq!(documents.calls.load(Ordering::SeqCst), 1);

        // the orphan is still reported although the relational side matched nothing
        assert_eq!(relational.calls.existing.load(Ordering::SeqCst), 1);
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].kind, WarningKind::OrphanDocument);
        assert_eq!(result.warnings[0].sample_id, SampleId(7));
    }

    #[tokio::test]
    async fn test_empty_document_side_skips_orphan_check() {
        let (coordinator, relational, _) = coordinator(
            ScriptedRelational {
                found: vec![1, 2],
                rows: vec![1, 2],
                ..Default::default()
            },
            ScriptedDocuments::default(),
        );

        let result = run(&coordinator, &both_sides(), Pagination::default()).await.unwrap();
        assert!(result.records.is_empty());
        assert!(result.warnings.is_empty());
        assert_eq!(relational.calls.existing.load(Ordering::SeqCst), 0);
        assert_eq!(relational.calls.fetch.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_result_echoes_reference_date() {
        let (coordinator, _, _) = coordinator(
            ScriptedRelational {
                found: vec![1],
                rows: vec![1],
                ..Default::default()
            },
            ScriptedDocuments {
                matches: vec![(1, vec!["BRCA1"])],
                ..Default::default()
            },
        );

        let result = run(&coordinator, &both_sides(), Pagination::default()).await.unwrap();
        assert_eq!(result.as_of, as_of());
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["asOf"], "2024-06-15");

        let invalid = CombinedPredicates { age_min: Some(-1), ..Default::default() };
        assert!(run(&coordinator, &invalid, Pagination::default()).await.is_err());
    }

    #[tokio::test]
    async fn test_disjoint_sets_skip_assembly() {
        let (coordinator, relational, _) = coordinator(
            ScriptedRelational {
                found: vec![1, 2],
                rows: vec![1, 2, 3],
                ..Default::default()
            },
            ScriptedDocuments {
                matches: vec![(3, vec!["BRCA1"])],
                ..Default::default()
            },
        );

        let result = run(&coordinator, &both_sides(), Pagination::default()).await.unwrap();
        assert!(result.records.is_empty());
        assert!(!result.stages.contains(&QueryStage::Assembling));
        assert_eq!(relational.calls.fetch.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_validation_happens_before_any_store_access() {
        let (coordinator, relational, documents) = coordinator(ScriptedRelational::default(), ScriptedDocuments::default());

        for predicates in [
            CombinedPredicates { age_min: Some(-3), ..Default::default() },
            CombinedPredicates { sex: Some("robot".to_string()), ..Default::default() },
        ] {
            let err = run(&coordinator, &predicates, Pagination::default()).await.unwrap_err();
            assert!(matches!(err, FederationError::Validation(_)));
        }
        let err = run(&coordinator, &both_sides(), Pagination { offset: None, limit: Some(0) })
            .await
            .unwrap_err();
        assert!(matches!(err, FederationError::Validation(ref v) if v.field == "limit"));

        assert_eq!(relational.calls.find.load(Ordering::SeqCst), 0);
        assert_eq!(documents.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_pages_reassemble_the_full_result() {
        let (coordinator, _, _) = coordinator(
            ScriptedRelational {
                found: (1..=10).rev().collect(),
                rows: (1..=10).collect(),
                ..Default::default()
            },
            ScriptedDocuments::default(),
        );
        let predicates = CombinedPredicates {
            sex: Some("Female".to_string()),
            ..Default::default()
        };

        let full = run(&coordinator, &predicates, Pagination::default()).await.unwrap();
        assert_eq!(ids(&full), (1..=10).collect::<Vec<_>>());

        let mut paged = Vec::new();
        for offset in (0..10).step_by(3) {
            let page = run(&coordinator, &predicates, Pagination { offset: Some(offset), limit: Some(3) })
                .await
                .unwrap();
            assert_eq!(page.total, 10);
            paged.extend(ids(&page));
        }
        assert_eq!(paged, ids(&full));

        let beyond = run(&coordinator, &predicates, Pagination { offset: Some(50), limit: Some(3) })
            .await
            .unwrap();
        assert!(beyond.records.is_empty());
        assert_eq!(beyond.total, 10);
    }

    #[tokio::test]
    async fn test_repeated_queries_are_identical() {
        let (coordinator, _, _) = coordinator(
            ScriptedRelational {
                found: vec![7, 3, 5],
                rows: vec![3, 5, 7],
                ..Default::default()
            },
            ScriptedDocuments {
                matches: vec![(7, vec!["BRCA1"]), (5, vec!["BRCA1"])],
                ..Default::default()
            },
        );

        let first = run(&coordinator, &both_sides(), Pagination::default()).await.unwrap();
        let second = run(&coordinator, &both_sides(), Pagination::default()).await.unwrap();
        assert_eq!(first.records, second.records);
        assert_eq!(first.warnings, second.warnings);
        assert_ne!(first.query_id, second.query_id);
    }

    #[tokio::test]
    async fn test_orphan_documents_become_warnings() {
        let (coordinator, relational, _) = coordinator(
            ScriptedRelational {
                rows: vec![3],
                ..Default::default()
            },
            ScriptedDocuments {
                matches: vec![(3, vec!["BRCA1"]), (99, vec!["BRCA1"])],
                ..Default::default()
            },
        );
        let predicates = CombinedPredicates {
            gene: Some("BRCA1".to_string()),
            ..Default::default()
        };

        let result = run(&coordinator, &predicates, Pagination::default()).await.unwrap();
        assert_eq!(ids(&result), vec![3]);
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].kind, WarningKind::OrphanDocument);
        assert_eq!(result.warnings[0].sample_id, SampleId(99));
        assert_eq!(relational.calls.existing.load(Ordering::SeqCst), 1);
        assert_eq!(relational.calls.find.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_orphan_is_reported_even_when_relational_side_filters() {
        let (coordinator, _, _) = coordinator(
            ScriptedRelational {
                found: vec![3],
                rows: vec![3],
                ..Default::default()
            },
            ScriptedDocuments {
                matches: vec![(3, vec!["BRCA1"]), (42, vec!["BRCA1"])],
                ..Default::default()
            },
        );
        let result = run(&coordinator, &both_sides(), Pagination::default()).await.unwrap();
        assert_eq!(ids(&result), vec![3]);
        assert_eq!(result.warnings[0].sample_id, SampleId(42));
    }

    #[tokio::test]
    async fn test_only_orphans_yield_empty_result_with_warnings() {
        let (coordinator, relational, _) = coordinator(
            ScriptedRelational::default(),
            ScriptedDocuments {
                matches: vec![(8, vec!["BRCA1"])],
                ..Default::default()
            },
        );
        let predicates = CombinedPredicates {
            gene: Some("BRCA1".to_string()),
            ..Default::default()
        };
        let result = run(&coordinator, &predicates, Pagination::default()).await.unwrap();
        assert!(result.records.is_empty());
        assert_eq!(result.warnings.len(), 1);
        assert!(!result.stages.contains(&QueryStage::Assembling));
        assert_eq!(relational.calls.fetch.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_fetch_row_is_invariant_violation() {
        let (coordinator, _, _) = coordinator(
            ScriptedRelational {
                found: vec![1, 2],
                rows: vec![1, 2],
                hidden: vec![2],
                ..Default::default()
            },
            ScriptedDocuments::default(),
        );
        let predicates = CombinedPredicates {
            sex: Some("Female".to_string()),
            ..Default::default()
        };
        let result = run(&coordinator, &predicates, Pagination::default()).await.unwrap();
        assert_eq!(ids(&result), vec![1]);
        assert_eq!(result.warnings[0].kind, WarningKind::InternalInvariantViolation);
        assert_eq!(result.total, 1);
    }

    #[tokio::test]
    async fn test_unconstrained_query_lists_with_hard_cap() {
        let limits = QueryLimits {
            result_cap: 5,
            ..QueryLimits::default()
        };
        let (coordinator, relational, documents) = coordinator_with(
            ScriptedRelational {
                rows: (1..=20).collect(),
                ..Default::default()
            },
            ScriptedDocuments::default(),
            limits,
        );

        let result = run(&coordinator, &CombinedPredicates::default(), Pagination::default())
            .await
            .unwrap();
        assert_eq!(ids(&result), vec![1, 2, 3, 4, 5]);
        assert!(result.truncated);
        assert_eq!(result.total, 5);
        assert!(result.records.iter().all(|r| r.variants.is_empty()));
        assert_eq!(*relational.last_list_limit.lock().unwrap(), Some(6));
        assert_eq!(relational.calls.find.load(Ordering::SeqCst), 0);
        assert_eq!(documents.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cap_applies_to_intersections() {
        let limits = QueryLimits {
            result_cap: 2,
            ..QueryLimits::default()
        };
        let (coordinator, _, _) = coordinator_with(
            ScriptedRelational {
                found: vec![1, 2, 3],
                rows: vec![1, 2, 3],
                ..Default::default()
            },
            ScriptedDocuments::default(),
            limits,
        );
        let predicates = CombinedPredicates {
            sex: Some("Female".to_string()),
            ..Default::default()
        };
        let result = run(&coordinator, &predicates, Pagination::default()).await.unwrap();
        assert_eq!(ids(&result), vec![1, 2]);
        assert!(result.truncated);
    }

    #[tokio::test]
    async fn test_slow_store_times_out_as_upstream_unavailable() {
        let limits = QueryLimits {
            timeout_ms: 20,
            ..QueryLimits::default()
        };
        let (coordinator, relational, _) = coordinator_with(
            ScriptedRelational {
                found: vec![1],
                rows: vec![1],
                delay: Some(Duration::from_millis(300)),
                ..Default::default()
            },
            ScriptedDocuments {
                matches: vec![(1, vec!["BRCA1"])],
                ..Default::default()
            },
            limits,
        );

        let err = run(&coordinator, &both_sides(), Pagination::default()).await.unwrap_err();
        assert!(matches!(
            err,
            FederationError::UpstreamUnavailable { store: StoreKind::Relational, .. }
        ));
        assert_eq!(relational.calls.fetch.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_resolvers_run_concurrently() {
        // Each resolver blocks until the other one has started
        let barrier = Arc::new(Barrier::new(2));
        let (coordinator, _, _) = coordinator(
            ScriptedRelational {
                found: vec![1],
                rows: vec![1],
                barrier: Some(barrier.clone()),
                ..Default::default()
            },
            ScriptedDocuments {
                matches: vec![(1, vec!["BRCA1"])],
                barrier: Some(barrier),
                ..Default::default()
            },
        );

        let result = run(&coordinator, &both_sides(), Pagination::default()).await.unwrap();
        assert_eq!(ids(&result), vec![1]);
    }

    #[tokio::test]
    async fn test_dropped_query_enters_no_further_stage() {
        let (coordinator, relational, _) = coordinator(
            ScriptedRelational {
                found: vec![1],
                rows: vec![1],
                delay: Some(Duration::from_millis(200)),
                ..Default::default()
            },
            ScriptedDocuments {
                matches: vec![(1, vec!["BRCA1"])],
                ..Default::default()
            },
        );

        let predicates = both_sides();
        let outcome = tokio::time::timeout(
            Duration::from_millis(20),
            run(&coordinator, &predicates, Pagination::default()),
        )
        .await;
        assert!(outcome.is_err());

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(relational.calls.existing.load(Ordering::SeqCst), 0);
        assert_eq!(relational.calls.fetch.load(Ordering::SeqCst), 0);
    }
}
