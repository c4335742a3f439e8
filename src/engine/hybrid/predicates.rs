//! Combined query input and its validation
//!
//! Wire predicates arrive as loosely typed camelCase fields. [`validate`]
//! turns them into one [`RelationalFilter`] and one [`VariantFilter`] before
//! any store is touched.

use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use utoipa::ToSchema;

use crate::engine::config::QueryLimits;
use crate::engine::nosql::VariantFilter;
use crate::engine::relational::RelationalFilter;
use crate::engine::vocab::UnknownToken;

use super::error::ValidationError;

/// Predicates over both stores; every field is optional and all are AND-ed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct CombinedPredicates {
    // document side
    pub gene: Option<String>,
    #[serde(alias = "significance")]
    pub clinical_significance: Option<String>,
    pub variant_type: Option<String>,
    pub min_quality: Option<f64>,
    pub min_cadd: Option<f64>,
    pub chromosome: Option<String>,
    pub position_min: Option<i64>,
    pub position_max: Option<i64>,
    pub reference_genome: Option<String>,

    // relational side
    pub sex: Option<String>,
    pub age_min: Option<i64>,
    pub age_max: Option<i64>,
    pub test_type: Option<String>,
    pub test_result_status: Option<String>,
    /// Gene panel code of a clinical test, e.g. `HBOC`
    pub panel_code: Option<String>,
    pub sample_type: Option<String>,
    pub sample_status: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct Pagination {
    pub offset: Option<i64>,
    pub limit: Option<i64>,
}

/// Normalized, checked query, ready to resolve
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedQuery {
    pub relational: RelationalFilter,
    pub document: VariantFilter,
    pub offset: usize,
    pub limit: usize,
    /// Reference date for age predicates
    pub as_of: NaiveDate,
}

pub fn validate(
    predicates: &CombinedPredicates,
    pagination: &Pagination,
    limits: &QueryLimits,
    as_of: NaiveDate,
) -> Result<ValidatedQuery, ValidationError> {
    let age_min = non_negative("ageMin", predicates.age_min)?;
    let age_max = non_negative("ageMax", predicates.age_max)?;
    if let (Some(min), Some(max)) = (age_min, age_max) {
        if min > max {
            return Err(ValidationError::new(
                "ageMin",
                format!("ageMin ({}) is greater than ageMax ({})", min, max),
            ));
        }
    }

    let position_min = non_negative("positionMin", predicates.position_min)?;
    let position_max = non_negative("positionMax", predicates.position_max)?;
    if let (Some(min), Some(max)) = (position_min, position_max) {
        if min > max {
            return Err(ValidationError::new(
                "positionMin",
                format!("positionMin ({}) is greater than positionMax ({})", min, max),
            ));
        }
    }

    let relational = RelationalFilter {
        sex: token("sex", &predicates.sex)?,
        born_on_or_before: age_min.map(|a| born_on_or_before(as_of, a)),
        born_after: age_max.and_then(|a| born_after(as_of, a)),
        sample_type: token("sampleType", &predicates.sample_type)?,
        sample_status: token("sampleStatus", &predicates.sample_status)?,
        test_type: token("testType", &predicates.test_type)?,
        test_result_status: token("testResultStatus", &predicates.test_result_status)?,
        panel_code: identifier("panelCode", &predicates.panel_code)?,
    };

    let document = VariantFilter {
        gene: identifier("gene", &predicates.gene)?,
        clinical_significance: token("clinicalSignificance", &predicates.clinical_significance)?,
        variant_type: token("variantType", &predicates.variant_type)?,
        min_quality: score("minQuality", predicates.min_quality)?,
        min_cadd: score("minCadd", predicates.min_cadd)?,
        chromosome: identifier("chromosome", &predicates.chromosome)?,
        position_min,
        position_max,
        reference_genome: identifier("referenceGenome", &predicates.reference_genome)?,
    };

    let offset = match pagination.offset {
        None => 0,
        Some(o) if o < 0 => {
            return Err(ValidationError::new("offset", format!("must be >= 0, got {}", o)));
        }
        Some(o) => usize::try_from(o).unwrap_or(usize::MAX),
    };

    let limit = match pagination.limit {
        None => limits.default_limit,
        Some(l) if l < 1 || l as u64 > limits.max_limit as u64 => {
            return Err(ValidationError::new(
                "limit",
                format!("must be between 1 and {}, got {}", limits.max_limit, l),
            ));
        }
        Some(l) => l as usize,
    };

    Ok(ValidatedQuery {
        relational,
        document,
        offset,
        limit,
        as_of,
    })
}

/// Latest birth date for someone at least `age` whole years old on `as_of`
fn born_on_or_before(as_of: NaiveDate, age: i64) -> NaiveDate {
    years_before(as_of, age).unwrap_or(NaiveDate::MIN)
}

/// Exclusive lower birth date bound for someone at most `age` years old;
/// `None` when the bound falls before the calendar and excludes no one
fn born_after(as_of: NaiveDate, age: i64) -> Option<NaiveDate> {
    years_before(as_of, age.checked_add(1)?)
}

fn years_before(as_of: NaiveDate, years: i64) -> Option<NaiveDate> {
    let months = u32::try_from(years.checked_mul(12)?).ok()?;
    as_of.checked_sub_months(Months::new(months))
}

fn non_negative(field: &'static str, value: Option<i64>) -> Result<Option<i64>, ValidationError> {
    match value {
        Some(v) if v < 0 => Err(ValidationError::new(field, format!("must be >= 0, got {}", v))),
        other => Ok(other),
    }
}

fn score(field: &'static str, value: Option<f64>) -> Result<Option<f64>, ValidationError> {
    match value {
        Some(v) if !v.is_finite() || v < 0.0 => Err(ValidationError::new(
            field,
            format!("must be a finite number >= 0, got {}", v),
        )),
        other => Ok(other),
    }
}

fn identifier(field: &'static str, value: &Option<String>) -> Result<Option<String>, ValidationError> {
    match value.as_deref().map(str::trim) {
        None => Ok(None),
        Some("") => Err(ValidationError::new(field, "must not be blank")),
        Some(v) => Ok(Some(v.to_string())),
    }
}

fn token<T>(field: &'static str, value: &Option<String>) -> Result<Option<T>, ValidationError>
where
    T: FromStr<Err = UnknownToken>,
{
    value
        .as_deref()
        .map(|raw| raw.parse::<T>().map_err(|e| ValidationError::new(field, e.to_string())))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::vocab::{ClinicalSignificance, Sex, TestType};

    fn as_of() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
    }

    fn check(predicates: CombinedPredicates) -> Result<ValidatedQuery, ValidationError> {
        validate(&predicates, &Pagination::default(), &QueryLimits::default(), as_of())
    }

    #[test]
    fn test_empty_predicates_are_unconstrained() {
        let query = check(CombinedPredicates::default()).unwrap();
        assert!(query.relational.is_unconstrained());
        assert!(query.document.is_unconstrained());
        assert_eq!(query.offset, 0);
        assert_eq!(query.limit, 100);
    }

    #[test]
    fn test_tokens_are_normalized() {
        let query = check(CombinedPredicates {
            sex: Some("female".to_string()),
            clinical_significance: Some("likely pathogenic".to_string()),
            test_type: Some("wgs".to_string()),
            gene: Some("  BRCA1 ".to_string()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(query.relational.sex, Some(Sex::Female));
        assert_eq!(query.relational.test_type, Some(TestType::Wgs));
        assert_eq!(query.document.clinical_significance, Some(ClinicalSignificance::LikelyPathogenic));
        assert_eq!(query.document.gene.as_deref(), Some("BRCA1"));
    }

    #[test]
    fn test_panel_code_is_a_test_predicate() {
        let query = check(CombinedPredicates {
            panel_code: Some(" HBOC ".to_string()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(query.relational.panel_code.as_deref(), Some("HBOC"));
        assert!(query.relational.has_test_predicates());
        assert!(query.document.is_unconstrained());
    }

    #[test]
    fn test_age_bounds_become_birth_dates() {
        let query = check(CombinedPredicates {
            age_min: Some(30),
            age_max: Some(34),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(query.relational.born_on_or_before, NaiveDate::from_ymd_opt(1994, 6, 15));
        assert_eq!(query.relational.born_after, NaiveDate::from_ymd_opt(1989, 6, 15));
    }

    #[test]
    fn test_huge_ages_do_not_overflow() {
        let query = check(CombinedPredicates {
            age_min: Some(i64::MAX),
            age_max: Some(i64::MAX),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(query.relational.born_on_or_before, Some(NaiveDate::MIN));
        assert_eq!(query.relational.born_after, None);
    }

    #[test]
    fn test_rejections() {
        let cases = [
            (CombinedPredicates { age_min: Some(-1), ..Default::default() }, "ageMin"),
            (CombinedPredicates { age_min: Some(50), age_max: Some(40), ..Default::default() }, "ageMin"),
            (CombinedPredicates { sex: Some("robot".to_string()), ..Default::default() }, "sex"),
            (CombinedPredicates { clinical_significance: Some("bad".to_string()), ..Default::default() }, "clinicalSignificance"),
            (CombinedPredicates { min_quality: Some(f64::NAN), ..Default::default() }, "minQuality"),
            (CombinedPredicates { min_cadd: Some(-0.5), ..Default::default() }, "minCadd"),
            (CombinedPredicates { gene: Some("   ".to_string()), ..Default::default() }, "gene"),
            (CombinedPredicates { panel_code: Some("".to_string()), ..Default::default() }, "panelCode"),
            (CombinedPredicates { position_min: Some(10), position_max: Some(5), ..Default::default() }, "positionMin"),
        ];
        for (predicates, field) in cases {
            let err = check(predicates).unwrap_err();
            assert_eq!(err.field, field);
        }
    }

    #[test]
    fn test_pagination_bounds() {
        let limits = QueryLimits::default();
        let none = CombinedPredicates::default();

        let page = Pagination { offset: Some(20), limit: Some(1000) };
        let query = validate(&none, &page, &limits, as_of()).unwrap();
        assert_eq!((query.offset, query.limit), (20, 1000));

        for page in [
            Pagination { offset: Some(-1), limit: None },
            Pagination { offset: None, limit: Some(0) },
            Pagination { offset: None, limit: Some(1001) },
        ] {
            assert!(validate(&none, &page, &limits, as_of()).is_err());
        }
    }

    #[test]
    fn test_significance_alias_on_the_wire() {
        let predicates: CombinedPredicates =
            serde_json::from_str(r#"{"significance": "Pathogenic", "ageMin": 30}"#).unwrap();
        assert_eq!(predicates.clinical_significance.as_deref(), Some("Pathogenic"));
        assert_eq!(predicates.age_min, Some(30));
    }
}
