use chrono::NaiveDate;
use genomedb_lib::engine::config::QueryLimits;
use genomedb_lib::engine::hybrid::{
    CombinedPredicates, FederatedQueryCoordinator, FederationError, Pagination, QueryStage, WarningKind,
};
use genomedb_lib::engine::nosql::{Annotations, Variant, VariantDocument, VariantStore};
use genomedb_lib::engine::relational::{
    ClinicalTest, Patient, PatientId, Sample, SampleId, SqliteRelationalReader, TestPanel,
};
use genomedb_lib::engine::vocab::{SampleStatus, SampleType, Sex, TestResultStatus, TestType};
use std::sync::Arc;
use tempfile::TempDir;

fn date(raw: &str) -> NaiveDate {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").unwrap()
}

fn as_of() -> NaiveDate {
    date("2024-06-15")
}

fn patient(id: i64, sex: Sex, dob: &str) -> Patient {
    Patient {
        patient_id: PatientId(id),
        first_name: format!("Pat{}", id),
        last_name: "Doe".to_string(),
        date_of_birth: date(dob),
        sex,
        medical_record_number: Some(format!("MRN{:08}", id)),
        contact_phone: None,
        contact_email: None,
        address_line1: None,
        address_line2: None,
        city: None,
        state: None,
        postal_code: None,
        country: Some("United States".to_string()),
        created_at: "2023-01-01 10:00:00".to_string(),
        updated_at: None,
    }
}

fn sample(id: i64, patient_id: i64) -> Sample {
    Sample {
        sample_id: SampleId(id),
        patient_id: PatientId(patient_id),
        sample_type: SampleType::Blood,
        collection_date: Some(date("2024-01-05")),
        received_date: Some(date("2024-01-07")),
        status: SampleStatus::Completed,
        external_sample_id: Some(format!("EXT-{}", id)),
        collection_method: Some("Venipuncture".to_string()),
        collection_site: None,
        specimen_notes: None,
        created_at: "2024-01-05 08:30:00".to_string(),
    }
}

fn panel_test(id: i64, sample_id: i64, status: TestResultStatus) -> ClinicalTest {
    ClinicalTest {
        test_id: id,
        sample_id: SampleId(sample_id),
        test_type: TestType::Panel,
        test_code: Some("PNL-BRCA".to_string()),
        test_name: Some("BRCA1/2 Panel".to_string()),
        test_date: Some(date("2024-01-20")),
        result_status: status,
        ordering_physician: Some("Dr. Rivera".to_string()),
        result_summary: None,
        report_date: None,
        report_version: Some(1),
        report_file_path: None,
        created_at: "2024-01-20 12:00:00".to_string(),
    }
}

fn variant(gene: &str, significance: &str, cadd: Option<f64>) -> Variant {
    Variant {
        variant_id: Some(format!("chr17_{}_{}", gene, significance.len())),
        chromosome: Some("chr17".to_string()),
        position: Some(43_045_712),
        gene: Some(gene.to_string()),
        variant_type: Some("SNV".to_string()),
        quality: Some(55.5),
        clinical_significance: Some(significance.to_string()),
        annotations: cadd.map(|c| Annotations {
            cadd: Some(c),
            ..Default::default()
        }),
        ..Default::default()
    }
}

struct Fixture {
    _dir: TempDir,
    coordinator: FederatedQueryCoordinator,
}

/// Patients:
///   1 Female, 34 -> sample 1 (BRCA1 Pathogenic + TP53 Benign), Final HBOC panel
///   2 Male,   39 -> sample 2 (BRCA1 Pathogenic)
///   3 Female, 25 -> sample 3 (BRCA1 Pathogenic), Pending panel
///   4 Female, 40 -> sample 4 (TP53 Benign), sample 5 (no document)
/// Orphan document: sample 99 (BRCA1 Pathogenic)
fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();

    let relational = SqliteRelationalReader::new(&dir.path().join("clinical.db"), 4).unwrap();
    relational.insert_patient(&patient(1, Sex::Female, "1990-01-10")).unwrap();
    relational.insert_patient(&patient(2, Sex::Male, "1985-03-02")).unwrap();
    relational.insert_patient(&patient(3, Sex::Female, "1999-02-11")).unwrap();
    relational.insert_patient(&patient(4, Sex::Female, "1984-06-15")).unwrap();
    for (sample_id, patient_id) in [(1, 1), (2, 2), (3, 3), (4, 4), (5, 4)] {
        relational.insert_sample(&sample(sample_id, patient_id)).unwrap();
    }
    relational.insert_test(&panel_test(10, 1, TestResultStatus::Final)).unwrap();
    relational.insert_test(&panel_test(11, 3, TestResultStatus::Pending)).unwrap();
    relational
        .insert_panel(&TestPanel {
            panel_id: 1,
            panel_code: "HBOC".to_string(),
            panel_name: "Hereditary Breast and Ovarian Cancer".to_string(),
            panel_version: Some("v3".to_string()),
            genes_included: Some(28),
            panel_description: None,
            created_at: "2023-06-01 00:00:00".to_string(),
        })
        .unwrap();
    relational.assign_panel(10, 1).unwrap();

    let documents = VariantStore::create(dir.path(), "variants").unwrap();
    let docs = [
        (1, vec![variant("BRCA1", "Pathogenic", Some(31.0)), variant("TP53", "Benign", Some(2.0))]),
        (2, vec![variant("BRCA1", "Pathogenic", None)]),
        (3, vec![variant("BRCA1", "pathogenic", Some(12.5))]),
        (4, vec![variant("TP53", "Benign", None)]),
        (99, vec![variant("BRCA1", "Pathogenic", Some(29.9))]),
    ];
    for (sample_id, variants) in docs {
        let mut doc = VariantDocument::new(SampleId(sample_id), variants);
        doc.reference_genome = Some(if sample_id == 2 { "GRCh37" } else { "GRCh38" }.to_string());
        documents.insert(&doc).unwrap();
    }

    let coordinator = FederatedQueryCoordinator::new(
        Arc::new(relational),
        Arc::new(documents),
        QueryLimits::default(),
    );
    Fixture { _dir: dir, coordinator }
}

fn sample_ids(records: &[genomedb_lib::engine::hybrid::CombinedRecord]) -> Vec<i64> {
    records.iter().map(|r| r.sample.sample_id.0).collect()
}

#[tokio::test]
async fn test_brca1_pathogenic_female_over_thirty() -> Result<(), Box<dyn std::error::Error>> {
    let fixture = fixture();
    let predicates = CombinedPredicates {
        gene: Some("BRCA1".to_string()),
        clinical_significance: Some("Pathogenic".to_string()),
        sex: Some("Female".to_string()),
        age_min: Some(30),
        ..Default::default()
    };

    let result = fixture
        .coordinator
        .run_combined_query_as_of(&predicates, &Pagination::default(), as_of())
        .await?;

    assert_eq!(result.records.len(), 1);
    let record = &result.records[0];
    assert_eq!(record.patient.patient_id, PatientId(1));
    assert_eq!(record.sample.sample_id, SampleId(1));
    assert_eq!(record.tests.len(), 1);
    assert_eq!(record.variants.len(), 1);
    assert_eq!(record.variants[0].gene.as_deref(), Some("BRCA1"));

    assert_eq!(result.warnings.len(), 1);
    assert_eq!(result.warnings[0].kind, WarningKind::OrphanDocument);
    assert_eq!(result.warnings[0].sample_id, SampleId(99));
    Ok(())
}

#[tokio::test]
async fn test_document_only_query_includes_every_sex_and_age() -> Result<(), Box<dyn std::error::Error>> {
    let fixture = fixture();
    let predicates = CombinedPredicates {
        gene: Some("BRCA1".to_string()),
        clinical_significance: Some("PATHOGENIC".to_string()),
        ..Default::default()
    };

    let result = fixture
        .coordinator
        .run_combined_query_as_of(&predicates, &Pagination::default(), as_of())
        .await?;
    assert_eq!(sample_ids(&result.records), vec![1, 2, 3]);
    assert_eq!(result.warnings.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_relational_only_query_keeps_samples_without_documents() -> Result<(), Box<dyn std::error::Error>> {
    let fixture = fixture();
    let predicates = CombinedPredicates {
        sex: Some("female".to_string()),
        age_min: Some(35),
        ..Default::default()
    };

    let result = fixture
        .coordinator
        .run_combined_query_as_of(&predicates, &Pagination::default(), as_of())
        .await?;
    assert_eq!(sample_ids(&result.records), vec![4, 5]);
    assert!(result.records.iter().all(|r| r.variants.is_empty()));
    assert!(result.warnings.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_age_boundaries_are_inclusive() -> Result<(), Box<dyn std::error::Error>> {
    let fixture = fixture();
    // patient 4 turns 40 on the reference date
    let predicates = CombinedPredicates {
        age_min: Some(40),
        age_max: Some(40),
        ..Default::default()
    };
    let result = fixture
        .coordinator
        .run_combined_query_as_of(&predicates, &Pagination::default(), as_of())
        .await?;
    assert_eq!(sample_ids(&result.records), vec![4, 5]);

    let day_before = date("2024-06-14");
    let result = fixture
        .coordinator
        .run_combined_query_as_of(&predicates, &Pagination::default(), day_before)
        .await?;
    assert!(result.records.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_impossible_age_skips_assembly() -> Result<(), Box<dyn std::error::Error>> {
    let fixture = fixture();
    let predicates = CombinedPredicates {
        gene: Some("BRCA1".to_string()),
        age_min: Some(200),
        ..Default::default()
    };
    let result = fixture
        .coordinator
        .run_combined_query_as_of(&predicates, &Pagination::default(), as_of())
        .await?;
    assert!(result.records.is_empty());
    assert!(!result.stages.contains(&QueryStage::Assembling));
    assert_eq!(result.stages.last(), Some(&QueryStage::Done));
    // the orphan is reported even though no patient satisfies the age bound
    assert_eq!(result.warnings.len(), 1);
    assert_eq!(result.warnings[0].kind, WarningKind::OrphanDocument);
    assert_eq!(result.warnings[0].sample_id, SampleId(99));
    Ok(())
}

#[tokio::test]
async fn test_orphan_reported_alongside_relational_constraint() -> Result<(), Box<dyn std::error::Error>> {
    let fixture = fixture();
    let predicates = CombinedPredicates {
        gene: Some("BRCA1".to_string()),
        sex: Some("Male".to_string()),
        ..Default::default()
    };
    let result = fixture
        .coordinator
        .run_combined_query_as_of(&predicates, &Pagination::default(), as_of())
        .await?;
    assert_eq!(sample_ids(&result.records), vec![2]);
    assert_eq!(result.warnings.len(), 1);
    assert_eq!(result.warnings[0].kind, WarningKind::OrphanDocument);
    assert_eq!(result.warnings[0].sample_id, SampleId(99));
    assert_eq!(result.as_of, as_of());
    Ok(())
}

#[tokio::test]
async fn test_panel_code_narrows_to_assigned_tests() -> Result<(), Box<dyn std::error::Error>> {
    let fixture = fixture();
    let hboc = CombinedPredicates {
        gene: Some("BRCA1".to_string()),
        panel_code: Some("HBOC".to_string()),
        ..Default::default()
    };
    let result = fixture
        .coordinator
        .run_combined_query_as_of(&hboc, &Pagination::default(), as_of())
        .await?;
    assert_eq!(sample_ids(&result.records), vec![1]);

    // codes are matched exactly
    let lower = CombinedPredicates {
        panel_code: Some("hboc".to_string()),
        ..Default::default()
    };
    let result = fixture
        .coordinator
        .run_combined_query_as_of(&lower, &Pagination::default(), as_of())
        .await?;
    assert!(result.records.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_test_predicates_and_supplemented_filters() -> Result<(), Box<dyn std::error::Error>> {
    let fixture = fixture();

    let finals = CombinedPredicates {
        test_type: Some("panel".to_string()),
        test_result_status: Some("final".to_string()),
        ..Default::default()
    };
    let result = fixture
        .coordinator
        .run_combined_query_as_of(&finals, &Pagination::default(), as_of())
        .await?;
    assert_eq!(sample_ids(&result.records), vec![1]);

    let high_cadd = CombinedPredicates {
        gene: Some("BRCA1".to_string()),
        min_cadd: Some(20.0),
        reference_genome: Some("GRCh38".to_string()),
        ..Default::default()
    };
    let result = fixture
        .coordinator
        .run_combined_query_as_of(&high_cadd, &Pagination::default(), as_of())
        .await?;
    // sample 2 has no CADD score and is GRCh37; 99 is an orphan
    assert_eq!(sample_ids(&result.records), vec![1]);
    assert_eq!(result.warnings.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_unconstrained_query_lists_everything_up_to_cap() -> Result<(), Box<dyn std::error::Error>> {
    let fixture = fixture();
    let result = fixture
        .coordinator
        .run_combined_query_as_of(
            &CombinedPredicates::default(),
            &Pagination { offset: Some(1), limit: Some(2) },
            as_of(),
        )
        .await?;
    assert_eq!(result.total, 5);
    assert!(!result.truncated);
    assert_eq!(sample_ids(&result.records), vec![2, 3]);
    Ok(())
}

#[tokio::test]
async fn test_validation_error_names_the_field() {
    let fixture = fixture();
    let predicates = CombinedPredicates {
        variant_type: Some("Translocation".to_string()),
        ..Default::default()
    };
    let err = fixture
        .coordinator
        .run_combined_query_as_of(&predicates, &Pagination::default(), as_of())
        .await
        .unwrap_err();
    match err {
        FederationError::Validation(v) => assert_eq!(v.field, "variantType"),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_missing_collection_is_upstream_unavailable() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let relational = SqliteRelationalReader::in_memory()?;
    let documents = VariantStore::create(dir.path(), "variants")?;
    std::fs::remove_dir_all(documents.path())?;

    let coordinator = FederatedQueryCoordinator::new(
        Arc::new(relational),
        Arc::new(documents),
        QueryLimits::default(),
    );
    let predicates = CombinedPredicates {
        gene: Some("BRCA1".to_string()),
        sex: Some("Male".to_string()),
        ..Default::default()
    };
    let err = coordinator
        .run_combined_query_as_of(&predicates, &Pagination::default(), as_of())
        .await
        .unwrap_err();
    assert!(matches!(err, FederationError::UpstreamUnavailable { .. }));
    Ok(())
}
