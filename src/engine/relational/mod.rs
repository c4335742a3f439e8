//! Relational side: normalized patient / sample / clinical test records
//!
//! The relational collaborator owns the lifecycle of these rows. The engine
//! only reads them, through [`RelationalReader`].

pub mod sqlite;

pub use sqlite::SqliteRelationalReader;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use thiserror::Error;

use crate::engine::vocab::{SampleStatus, SampleType, Sex, TestResultStatus, TestType};

/// Store-assigned patient identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatientId(pub i64);

/// Store-assigned sample identifier; also the key of variant documents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SampleId(pub i64);

impl fmt::Display for PatientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for SampleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Older documents carry the key as a numeric string
impl<'de> Deserialize<'de> for SampleId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Int(i64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Int(id) => Ok(SampleId(id)),
            Raw::Text(s) => s
                .trim()
                .parse()
                .map(SampleId)
                .map_err(|_| serde::de::Error::custom(format!("invalid sample id '{}'", s))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    pub patient_id: PatientId,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub sex: Sex,
    pub medical_record_number: Option<String>,
    pub contact_phone: Option<String>,
    pub contact_email: Option<String>,
    pub address_line1: Option<String>,
    pub address_line2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub created_at: String,
    pub updated_at: Option<String>,
}

impl Patient {
    /// Whole years on `as_of`
    pub fn age_on(&self, as_of: NaiveDate) -> i32 {
        use chrono::Datelike;
        let mut age = as_of.year() - self.date_of_birth.year();
        if (as_of.month(), as_of.day()) < (self.date_of_birth.month(), self.date_of_birth.day()) {
            age -= 1;
        }
        age
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    pub sample_id: SampleId,
    pub patient_id: PatientId,
    pub sample_type: SampleType,
    pub collection_date: Option<NaiveDate>,
    pub received_date: Option<NaiveDate>,
    pub status: SampleStatus,
    pub external_sample_id: Option<String>,
    pub collection_method: Option<String>,
    pub collection_site: Option<String>,
    pub specimen_notes: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClinicalTest {
    pub test_id: i64,
    pub sample_id: SampleId,
    pub test_type: TestType,
    pub test_code: Option<String>,
    pub test_name: Option<String>,
    pub test_date: Option<NaiveDate>,
    pub result_status: TestResultStatus,
    pub ordering_physician: Option<String>,
    pub result_summary: Option<String>,
    pub report_date: Option<NaiveDate>,
    pub report_version: Option<i64>,
    pub report_file_path: Option<String>,
    pub created_at: String,
}

/// One sample joined to its owning patient and its tests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientSampleRecord {
    pub patient: Patient,
    pub sample: Sample,
    pub tests: Vec<ClinicalTest>,
}

/// Gene panel a panel test can be assigned to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestPanel {
    pub panel_id: i64,
    pub panel_code: String,
    pub panel_name: String,
    pub panel_version: Option<String>,
    pub genes_included: Option<i64>,
    pub panel_description: Option<String>,
    pub created_at: String,
}

/// Sequencing QC metric recorded against a test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityMetric {
    pub metric_id: i64,
    pub test_id: i64,
    pub metric_name: String,
    pub metric_value: f64,
    pub metric_unit: Option<String>,
    pub metric_pass: bool,
    pub threshold_value: Option<f64>,
}

/// A test with its panel assignment and QC metrics
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestDetails {
    #[serde(flatten)]
    pub test: ClinicalTest,
    pub panel: Option<TestPanel>,
    pub quality_metrics: Vec<QualityMetric>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleWithTests {
    #[serde(flatten)]
    pub sample: Sample,
    pub tests: Vec<ClinicalTest>,
}

/// Everything the relational store knows about one patient
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientSummary {
    pub patient: Patient,
    /// Most recently collected first
    pub samples: Vec<SampleWithTests>,
    pub total_samples: usize,
    pub total_tests: usize,
}

/// Normalized relational predicates; every field is optional and AND-ed.
///
/// Age bounds are already converted into date-of-birth bounds so readers do
/// not need to know the query's reference date.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelationalFilter {
    pub sex: Option<Sex>,
    /// Inclusive: `date_of_birth <= born_on_or_before`
    pub born_on_or_before: Option<NaiveDate>,
    /// Exclusive: `date_of_birth > born_after`
    pub born_after: Option<NaiveDate>,
    pub sample_type: Option<SampleType>,
    pub sample_status: Option<SampleStatus>,
    /// Test predicates must hold on the same test row
    pub test_type: Option<TestType>,
    pub test_result_status: Option<TestResultStatus>,
    /// Code of the gene panel the test is assigned to, matched exactly
    pub panel_code: Option<String>,
}

impl RelationalFilter {
    /// True when no predicate is active, i.e. this side does not filter
    pub fn is_unconstrained(&self) -> bool {
        self.sex.is_none()
            && self.born_on_or_before.is_none()
            && self.born_after.is_none()
            && self.sample_type.is_none()
            && self.sample_status.is_none()
            && !self.has_test_predicates()
    }

    pub fn has_test_predicates(&self) -> bool {
        self.test_type.is_some() || self.test_result_status.is_some() || self.panel_code.is_some()
    }
}

#[derive(Error, Debug)]
pub enum RelationalError {
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Query error: {0}")]
    Query(String),
    #[error("Schema error: {0}")]
    Schema(String),
    #[error("Corrupt row: {0}")]
    Decode(String),
}

impl From<r2d2::Error> for RelationalError {
    fn from(err: r2d2::Error) -> Self {
        RelationalError::Connection(err.to_string())
    }
}

impl From<rusqlite::Error> for RelationalError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::FromSqlConversionFailure(..) | rusqlite::Error::InvalidColumnType(..) => {
                RelationalError::Decode(err.to_string())
            }
            other => RelationalError::Query(other.to_string()),
        }
    }
}

pub type RelationalResult<T> = Result<T, RelationalError>;

/// Read-only capability over the relational store.
///
/// Implementations must be side-effect free and return identifiers in
/// ascending order. Calls are blocking; the coordinator runs them on the
/// blocking pool under a timeout.
pub trait RelationalReader: Send + Sync {
    /// Samples satisfying every predicate in `filter`
    fn find_sample_ids(&self, filter: &RelationalFilter) -> RelationalResult<Vec<SampleId>>;

    /// The first `limit` samples by identifier
    fn list_sample_ids(&self, limit: usize) -> RelationalResult<Vec<SampleId>>;

    /// The subset of `ids` that exist
    fn existing_sample_ids(&self, ids: &[SampleId]) -> RelationalResult<Vec<SampleId>>;

    /// Full patient + sample + tests rows for `ids`; missing ids are omitted
    fn fetch_patients_and_samples(&self, ids: &[SampleId]) -> RelationalResult<Vec<PatientSampleRecord>>;
}
