//! SQLite relational reader
//!
//! Implements [`RelationalReader`] over rusqlite + r2d2 connection pooling.
//! Also owns the clinical schema and the row insertion helpers fixtures use.

use chrono::NaiveDate;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::{Type, Value as SqlValue};
use rusqlite::{params, params_from_iter, OptionalExtension, Row};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

use super::{
    ClinicalTest, Patient, PatientId, PatientSampleRecord, PatientSummary, QualityMetric, RelationalError,
    RelationalFilter, RelationalReader, RelationalResult, Sample, SampleId, SampleWithTests, TestDetails,
    TestPanel,
};

type DbPool = Pool<SqliteConnectionManager>;
type DbConn = PooledConnection<SqliteConnectionManager>;

/// Bound parameters per `IN (...)` statement
const IN_CHUNK: usize = 500;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS patients (
        patient_id INTEGER PRIMARY KEY AUTOINCREMENT,
        first_name TEXT NOT NULL,
        last_name TEXT NOT NULL,
        date_of_birth TEXT NOT NULL,
        sex TEXT NOT NULL,
        medical_record_number TEXT UNIQUE,
        contact_phone TEXT,
        contact_email TEXT,
        address_line1 TEXT,
        address_line2 TEXT,
        city TEXT,
        state TEXT,
        postal_code TEXT,
        country TEXT,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        updated_at TEXT
    );

    CREATE TABLE IF NOT EXISTS samples (
        sample_id INTEGER PRIMARY KEY AUTOINCREMENT,
        patient_id INTEGER NOT NULL REFERENCES patients(patient_id) ON DELETE CASCADE,
        sample_type TEXT NOT NULL,
        collection_date TEXT,
        received_date TEXT,
        status TEXT NOT NULL,
        external_sample_id TEXT UNIQUE,
        collection_method TEXT,
        collection_site TEXT,
        specimen_notes TEXT,
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    );
    CREATE INDEX IF NOT EXISTS idx_samples_patient ON samples(patient_id);

    CREATE TABLE IF NOT EXISTS clinical_tests (
        test_id INTEGER PRIMARY KEY AUTOINCREMENT,
        sample_id INTEGER NOT NULL REFERENCES samples(sample_id) ON DELETE CASCADE,
        test_type TEXT NOT NULL,
        test_code TEXT,
        test_name TEXT,
        test_date TEXT,
        result_status TEXT NOT NULL,
        ordering_physician TEXT,
        result_summary TEXT,
        report_date TEXT,
        report_version INTEGER,
        report_file_path TEXT,
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    );
    CREATE INDEX IF NOT EXISTS idx_tests_sample ON clinical_tests(sample_id);

    CREATE TABLE IF NOT EXISTS test_panels (
        panel_id INTEGER PRIMARY KEY AUTOINCREMENT,
        panel_code TEXT NOT NULL UNIQUE,
        panel_name TEXT NOT NULL,
        panel_version TEXT,
        genes_included INTEGER,
        panel_description TEXT,
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE TABLE IF NOT EXISTS test_panel_assignment (
        test_id INTEGER NOT NULL REFERENCES clinical_tests(test_id) ON DELETE CASCADE,
        panel_id INTEGER NOT NULL REFERENCES test_panels(panel_id) ON DELETE CASCADE,
        PRIMARY KEY (test_id, panel_id)
    );

    CREATE TABLE IF NOT EXISTS test_quality_metrics (
        metric_id INTEGER PRIMARY KEY AUTOINCREMENT,
        test_id INTEGER NOT NULL REFERENCES clinical_tests(test_id) ON DELETE CASCADE,
        metric_name TEXT NOT NULL,
        metric_value REAL NOT NULL,
        metric_unit TEXT,
        metric_pass INTEGER NOT NULL,
        threshold_value REAL,
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    );
    CREATE INDEX IF NOT EXISTS idx_metrics_test ON test_quality_metrics(test_id);
";

const PATIENT_COLUMNS: &str = "p.patient_id, p.first_name, p.last_name, p.date_of_birth, p.sex, \
    p.medical_record_number, p.contact_phone, p.contact_email, p.address_line1, p.address_line2, \
    p.city, p.state, p.postal_code, p.country, p.created_at, p.updated_at";
const PATIENT_WIDTH: usize = 16;

const SAMPLE_COLUMNS: &str = "s.sample_id, s.patient_id, s.sample_type, s.collection_date, \
    s.received_date, s.status, s.external_sample_id, s.collection_method, s.collection_site, \
    s.specimen_notes, s.created_at";

const TEST_COLUMNS: &str = "t.test_id, t.sample_id, t.test_type, t.test_code, t.test_name, \
    t.test_date, t.result_status, t.ordering_physician, t.result_summary, t.report_date, \
    t.report_version, t.report_file_path, t.created_at";

const PANEL_COLUMNS: &str = "tp.panel_id, tp.panel_code, tp.panel_name, tp.panel_version, \
    tp.genes_included, tp.panel_description, tp.created_at";

pub struct SqliteRelationalReader {
    pool: DbPool,
    db_path: PathBuf,
}

impl SqliteRelationalReader {
    pub fn new(db_path: &Path, pool_size: u32) -> RelationalResult<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                RelationalError::Connection(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }

        let manager = SqliteConnectionManager::file(db_path)
            .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys=ON;"));
        let pool = Pool::builder().max_size(pool_size.max(1)).build(manager)?;

        let reader = Self {
            pool,
            db_path: db_path.to_path_buf(),
        };
        reader.init_schema()?;
        Ok(reader)
    }

    pub fn in_memory() -> RelationalResult<Self> {
        let manager = SqliteConnectionManager::memory()
            .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys=ON;"));
        let pool = Pool::builder().max_size(1).build(manager)?;

        let reader = Self {
            pool,
            db_path: PathBuf::from(":memory:"),
        };
        reader.init_schema()?;
        Ok(reader)
    }

    fn init_schema(&self) -> RelationalResult<()> {
        let conn = self.get_conn()?;

        let _: String = conn
            .query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))
            .map_err(|e| RelationalError::Schema(e.to_string()))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| RelationalError::Schema(e.to_string()))?;

        Ok(())
    }

    fn get_conn(&self) -> RelationalResult<DbConn> {
        Ok(self.pool.get()?)
    }

    /// Raw pooled connection, for fixtures and maintenance
    pub fn get_connection(&self) -> RelationalResult<DbConn> {
        self.get_conn()
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    // ========== Fixture helpers ==========

    pub fn insert_patient(&self, patient: &Patient) -> RelationalResult<PatientId> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO patients (patient_id, first_name, last_name, date_of_birth, sex,
                medical_record_number, contact_phone, contact_email, address_line1, address_line2,
                city, state, postal_code, country, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            params![
                patient.patient_id.0,
                patient.first_name,
                patient.last_name,
                patient.date_of_birth.to_string(),
                patient.sex.as_str(),
                patient.medical_record_number,
                patient.contact_phone,
                patient.contact_email,
                patient.address_line1,
                patient.address_line2,
                patient.city,
                patient.state,
                patient.postal_code,
                patient.country,
                patient.created_at,
                patient.updated_at,
            ],
        )?;
        Ok(patient.patient_id)
    }

    pub fn insert_sample(&self, sample: &Sample) -> RelationalResult<SampleId> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO samples (sample_id, patient_id, sample_type, collection_date, received_date,
                status, external_sample_id, collection_method, collection_site, specimen_notes, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                sample.sample_id.0,
                sample.patient_id.0,
                sample.sample_type.as_str(),
                sample.collection_date.map(|d| d.to_string()),
                sample.received_date.map(|d| d.to_string()),
                sample.status.as_str(),
                sample.external_sample_id,
                sample.collection_method,
                sample.collection_site,
                sample.specimen_notes,
                sample.created_at,
            ],
        )?;
        Ok(sample.sample_id)
    }

    pub fn insert_test(&self, test: &ClinicalTest) -> RelationalResult<i64> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO clinical_tests (test_id, sample_id, test_type, test_code, test_name, test_date,
                result_status, ordering_physician, result_summary, report_date, report_version,
                report_file_path, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                test.test_id,
                test.sample_id.0,
                test.test_type.as_str(),
                test.test_code,
                test.test_name,
                test.test_date.map(|d| d.to_string()),
                test.result_status.as_str(),
                test.ordering_physician,
                test.result_summary,
                test.report_date.map(|d| d.to_string()),
                test.report_version,
                test.report_file_path,
                test.created_at,
            ],
        )?;
        Ok(test.test_id)
    }

    pub fn insert_panel(&self, panel: &TestPanel) -> RelationalResult<i64> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO test_panels (panel_id, panel_code, panel_name, panel_version, genes_included,
                panel_description, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                panel.panel_id,
                panel.panel_code,
                panel.panel_name,
                panel.panel_version,
                panel.genes_included,
                panel.panel_description,
                panel.created_at,
            ],
        )?;
        Ok(panel.panel_id)
    }

    pub fn assign_panel(&self, test_id: i64, panel_id: i64) -> RelationalResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO test_panel_assignment (test_id, panel_id) VALUES (?1, ?2)",
            params![test_id, panel_id],
        )?;
        Ok(())
    }

    pub fn insert_quality_metric(&self, metric: &QualityMetric) -> RelationalResult<i64> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO test_quality_metrics (metric_id, test_id, metric_name, metric_value, metric_unit,
                metric_pass, threshold_value)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                metric.metric_id,
                metric.test_id,
                metric.metric_name,
                metric.metric_value,
                metric.metric_unit,
                metric.metric_pass,
                metric.threshold_value,
            ],
        )?;
        Ok(metric.metric_id)
    }

    // ========== Lookups ==========

    pub fn get_patient(&self, id: PatientId) -> RelationalResult<Option<Patient>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM patients p WHERE p.patient_id = ?1", PATIENT_COLUMNS);
        let patient = conn
            .query_row(&sql, [id.0], |row| patient_from_row(row, 0))
            .optional()?;
        Ok(patient)
    }

    pub fn get_sample(&self, id: SampleId) -> RelationalResult<Option<PatientSampleRecord>> {
        Ok(self.fetch_patients_and_samples(&[id])?.into_iter().next())
    }

    /// A patient's samples, most recently collected first
    pub fn samples_for_patient(&self, id: PatientId) -> RelationalResult<Vec<Sample>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM samples s WHERE s.patient_id = ?1 \
             ORDER BY s.collection_date IS NULL, s.collection_date DESC, s.sample_id",
            SAMPLE_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let samples = stmt
            .query_map([id.0], |row| sample_from_row(row, 0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(samples)
    }

    /// A sample's tests, most recent first
    pub fn tests_for_sample(&self, id: SampleId) -> RelationalResult<Vec<ClinicalTest>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM clinical_tests t WHERE t.sample_id = ?1 \
             ORDER BY t.test_date IS NULL, t.test_date DESC, t.test_id",
            TEST_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let tests = stmt
            .query_map([id.0], test_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tests)
    }

    /// Patient demographics with every sample and its tests; `None` for an
    /// unknown patient
    pub fn patient_summary(&self, id: PatientId) -> RelationalResult<Option<PatientSummary>> {
        let Some(patient) = self.get_patient(id)? else {
            return Ok(None);
        };

        let mut samples = Vec::new();
        for sample in self.samples_for_patient(id)? {
            let tests = self.tests_for_sample(sample.sample_id)?;
            samples.push(SampleWithTests { sample, tests });
        }
        let total_tests = samples.iter().map(|s| s.tests.len()).sum();

        Ok(Some(PatientSummary {
            patient,
            total_samples: samples.len(),
            total_tests,
            samples,
        }))
    }

    /// One test with its panel (if assigned) and QC metrics
    pub fn get_test(&self, test_id: i64) -> RelationalResult<Option<TestDetails>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM clinical_tests t WHERE t.test_id = ?1", TEST_COLUMNS);
        let Some(test) = conn.query_row(&sql, [test_id], test_from_row).optional()? else {
            return Ok(None);
        };

        let sql = format!(
            "SELECT {} FROM test_panels tp \
             JOIN test_panel_assignment a ON a.panel_id = tp.panel_id \
             WHERE a.test_id = ?1 ORDER BY tp.panel_id LIMIT 1",
            PANEL_COLUMNS
        );
        let panel = conn.query_row(&sql, [test_id], panel_from_row).optional()?;

        let mut stmt = conn.prepare(
            "SELECT metric_id, test_id, metric_name, metric_value, metric_unit, metric_pass, threshold_value
             FROM test_quality_metrics WHERE test_id = ?1 ORDER BY metric_id",
        )?;
        let quality_metrics = stmt
            .query_map([test_id], metric_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(TestDetails {
            test,
            panel,
            quality_metrics,
        }))
    }

    pub fn count_samples(&self) -> RelationalResult<u64> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM samples", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn tests_for(&self, conn: &DbConn, ids: &[SampleId]) -> RelationalResult<BTreeMap<SampleId, Vec<ClinicalTest>>> {
        let mut by_sample: BTreeMap<SampleId, Vec<ClinicalTest>> = BTreeMap::new();
        for chunk in ids.chunks(IN_CHUNK) {
            let sql = format!(
                "SELECT {} FROM clinical_tests t WHERE t.sample_id IN ({}) ORDER BY t.sample_id, t.test_id",
                TEST_COLUMNS,
                placeholders(chunk.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(chunk.iter().map(|id| id.0)), test_from_row)?;
            for test in rows {
                let test = test?;
                by_sample.entry(test.sample_id).or_default().push(test);
            }
        }
        Ok(by_sample)
    }
}

impl RelationalReader for SqliteRelationalReader {
    fn find_sample_ids(&self, filter: &RelationalFilter) -> RelationalResult<Vec<SampleId>> {
        let mut test_clause = String::new();
        let mut conditions: Vec<&str> = Vec::new();
        let mut values: Vec<SqlValue> = Vec::new();

        if let Some(sex) = filter.sex {
            conditions.push("p.sex = ? COLLATE NOCASE");
            values.push(SqlValue::Text(sex.as_str().to_string()));
        }
        if let Some(date) = filter.born_on_or_before {
            conditions.push("p.date_of_birth <= ?");
            values.push(SqlValue::Text(date.to_string()));
        }
        if let Some(date) = filter.born_after {
            conditions.push("p.date_of_birth > ?");
            values.push(SqlValue::Text(date.to_string()));
        }
        if let Some(sample_type) = filter.sample_type {
            conditions.push("s.sample_type = ? COLLATE NOCASE");
            values.push(SqlValue::Text(sample_type.as_str().to_string()));
        }
        if let Some(status) = filter.sample_status {
            conditions.push("s.status = ? COLLATE NOCASE");
            values.push(SqlValue::Text(status.as_str().to_string()));
        }

        if filter.has_test_predicates() {
            test_clause.push_str("EXISTS (SELECT 1 FROM clinical_tests t WHERE t.sample_id = s.sample_id");
            if let Some(test_type) = filter.test_type {
                test_clause.push_str(" AND t.test_type = ? COLLATE NOCASE");
                values.push(SqlValue::Text(test_type.as_str().to_string()));
            }
            if let Some(status) = filter.test_result_status {
                test_clause.push_str(" AND t.result_status = ? COLLATE NOCASE");
                values.push(SqlValue::Text(status.as_str().to_string()));
            }
            if let Some(code) = &filter.panel_code {
                test_clause.push_str(
                    " AND EXISTS (SELECT 1 FROM test_panel_assignment a \
                     JOIN test_panels tp ON tp.panel_id = a.panel_id \
                     WHERE a.test_id = t.test_id AND tp.panel_code = ?)",
                );
                values.push(SqlValue::Text(code.clone()));
            }
            test_clause.push(')');
            conditions.push(&test_clause);
        }

        let mut sql = String::from(
            "SELECT s.sample_id FROM samples s JOIN patients p ON p.patient_id = s.patient_id",
        );
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(" ORDER BY s.sample_id");
        debug!(%sql, params = values.len(), "relational sample lookup");

        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let ids = stmt
            .query_map(params_from_iter(values), |row| row.get(0).map(SampleId))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    fn list_sample_ids(&self, limit: usize) -> RelationalResult<Vec<SampleId>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare("SELECT sample_id FROM samples ORDER BY sample_id LIMIT ?1")?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let ids = stmt
            .query_map([limit], |row| row.get(0).map(SampleId))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    fn existing_sample_ids(&self, ids: &[SampleId]) -> RelationalResult<Vec<SampleId>> {
        let conn = self.get_conn()?;
        let mut found = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(IN_CHUNK) {
            let sql = format!(
                "SELECT sample_id FROM samples WHERE sample_id IN ({})",
                placeholders(chunk.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(chunk.iter().map(|id| id.0)), |row| {
                row.get(0).map(SampleId)
            })?;
            for id in rows {
                found.push(id?);
            }
        }
        found.sort();
        found.dedup();
        Ok(found)
    }

    fn fetch_patients_and_samples(&self, ids: &[SampleId]) -> RelationalResult<Vec<PatientSampleRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.get_conn()?;
        let mut joined: Vec<(Patient, Sample)> = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(IN_CHUNK) {
            let sql = format!(
                "SELECT {}, {} FROM samples s JOIN patients p ON p.patient_id = s.patient_id \
                 WHERE s.sample_id IN ({}) ORDER BY s.sample_id",
                PATIENT_COLUMNS,
                SAMPLE_COLUMNS,
                placeholders(chunk.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(chunk.iter().map(|id| id.0)), |row| {
                Ok((patient_from_row(row, 0)?, sample_from_row(row, PATIENT_WIDTH)?))
            })?;
            for pair in rows {
                joined.push(pair?);
            }
        }

        let found: Vec<SampleId> = joined.iter().map(|(_, s)| s.sample_id).collect();
        let mut tests = self.tests_for(&conn, &found)?;

        let mut records: Vec<PatientSampleRecord> = joined
            .into_iter()
            .map(|(patient, sample)| PatientSampleRecord {
                tests: tests.remove(&sample.sample_id).unwrap_or_default(),
                patient,
                sample,
            })
            .collect();
        records.sort_by_key(|r| r.sample.sample_id);
        Ok(records)
    }
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn conversion_error(idx: usize, err: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

/// Dates are stored as ISO text; a time suffix is tolerated
fn parse_date(idx: usize, raw: &str) -> rusqlite::Result<NaiveDate> {
    let day = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").map_err(|e| conversion_error(idx, e))
}

fn date_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    parse_date(idx, &raw)
}

fn opt_date_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<NaiveDate>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| parse_date(idx, &s)).transpose()
}

fn token_at<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| conversion_error(idx, e))
}

fn patient_from_row(row: &Row<'_>, at: usize) -> rusqlite::Result<Patient> {
    Ok(Patient {
        patient_id: PatientId(row.get(at)?),
        first_name: row.get(at + 1)?,
        last_name: row.get(at + 2)?,
        date_of_birth: date_at(row, at + 3)?,
        sex: token_at(row, at + 4)?,
        medical_record_number: row.get(at + 5)?,
        contact_phone: row.get(at + 6)?,
        contact_email: row.get(at + 7)?,
        address_line1: row.get(at + 8)?,
        address_line2: row.get(at + 9)?,
        city: row.get(at + 10)?,
        state: row.get(at + 11)?,
        postal_code: row.get(at + 12)?,
        country: row.get(at + 13)?,
        created_at: row.get(at + 14)?,
        updated_at: row.get(at + 15)?,
    })
}

fn sample_from_row(row: &Row<'_>, at: usize) -> rusqlite::Result<Sample> {
    Ok(Sample {
        sample_id: SampleId(row.get(at)?),
        patient_id: PatientId(row.get(at + 1)?),
        sample_type: token_at(row, at + 2)?,
        collection_date: opt_date_at(row, at + 3)?,
        received_date: opt_date_at(row, at + 4)?,
        status: token_at(row, at + 5)?,
        external_sample_id: row.get(at + 6)?,
        collection_method: row.get(at + 7)?,
        collection_site: row.get(at + 8)?,
        specimen_notes: row.get(at + 9)?,
        created_at: row.get(at + 10)?,
    })
}

fn panel_from_row(row: &Row<'_>) -> rusqlite::Result<TestPanel> {
    Ok(TestPanel {
        panel_id: row.get(0)?,
        panel_code: row.get(1)?,
        panel_name: row.get(2)?,
        panel_version: row.get(3)?,
        genes_included: row.get(4)?,
        panel_description: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn metric_from_row(row: &Row<'_>) -> rusqlite::Result<QualityMetric> {
    Ok(QualityMetric {
        metric_id: row.get(0)?,
        test_id: row.get(1)?,
        metric_name: row.get(2)?,
        metric_value: row.get(3)?,
        metric_unit: row.get(4)?,
        metric_pass: row.get(5)?,
        threshold_value: row.get(6)?,
    })
}

fn test_from_row(row: &Row<'_>) -> rusqlite::Result<ClinicalTest> {
    Ok(ClinicalTest {
        test_id: row.get(0)?,
        sample_id: SampleId(row.get(1)?),
        test_type: token_at(row, 2)?,
        test_code: row.get(3)?,
        test_name: row.get(4)?,
        test_date: opt_date_at(row, 5)?,
        result_status: token_at(row, 6)?,
        ordering_physician: row.get(7)?,
        result_summary: row.get(8)?,
        report_date: opt_date_at(row, 9)?,
        report_version: row.get(10)?,
        report_file_path: row.get(11)?,
        created_at: row.get(12)?,
    })
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::engine::vocab::{SampleStatus, SampleType, Sex, TestResultStatus, TestType};

    pub fn patient(id: i64, sex: Sex, dob: &str) -> Patient {
        Patient {
            patient_id: PatientId(id),
            first_name: format!("First{}", id),
            last_name: format!("Last{}", id),
            date_of_birth: NaiveDate::parse_from_str(dob, "%Y-%m-%d").unwrap(),
            sex,
            medical_record_number: Some(format!("MRN-{:05}", id)),
            contact_phone: None,
            contact_email: None,
            address_line1: None,
            address_line2: None,
            city: Some("Boston".to_string()),
            state: Some("MA".to_string()),
            postal_code: None,
            country: Some("USA".to_string()),
            created_at: "2024-01-01 00:00:00".to_string(),
            updated_at: None,
        }
    }

    pub fn sample(id: i64, patient_id: i64) -> Sample {
        Sample {
            sample_id: SampleId(id),
            patient_id: PatientId(patient_id),
            sample_type: SampleType::Blood,
            collection_date: NaiveDate::from_ymd_opt(2024, 3, 1),
            received_date: NaiveDate::from_ymd_opt(2024, 3, 2),
            status: SampleStatus::Completed,
            external_sample_id: Some(format!("EXT-{:06}", id)),
            collection_method: None,
            collection_site: None,
            specimen_notes: None,
            created_at: "2024-03-02 09:00:00".to_string(),
        }
    }

    pub fn test(id: i64, sample_id: i64, test_type: TestType, status: TestResultStatus) -> ClinicalTest {
        ClinicalTest {
            test_id: id,
            sample_id: SampleId(sample_id),
            test_type,
            test_code: Some("PNL-BRCA".to_string()),
            test_name: Some("BRCA1/2 Panel".to_string()),
            test_date: NaiveDate::from_ymd_opt(2024, 3, 10),
            result_status: status,
            ordering_physician: None,
            result_summary: None,
            report_date: None,
            report_version: Some(1),
            report_file_path: None,
            created_at: "2024-03-10 12:00:00".to_string(),
        }
    }

    pub fn panel(id: i64, code: &str) -> TestPanel {
        TestPanel {
            panel_id: id,
            panel_code: code.to_string(),
            panel_name: format!("{} Panel", code),
            panel_version: Some("v2".to_string()),
            genes_included: Some(24),
            panel_description: None,
            created_at: "2023-06-01 00:00:00".to_string(),
        }
    }

    pub fn metric(id: i64, test_id: i64, name: &str, value: f64, threshold: f64) -> QualityMetric {
        QualityMetric {
            metric_id: id,
            test_id,
            metric_name: name.to_string(),
            metric_value: value,
            metric_unit: Some("%".to_string()),
            metric_pass: value >= threshold,
            threshold_value: Some(threshold),
        }
    }
}
