//! GenomeDB API Module
//! REST surface over the combined query engine, with OpenAPI documentation

use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::{IntoParams, OpenApi, ToSchema};

use crate::engine::config::QueryLimits;
use crate::engine::hybrid::{
    call_store, CombinedPredicates, CombinedQueryResult, FederatedQueryCoordinator, FederationError,
    Pagination, ValidationError,
};
use crate::engine::nosql::VariantStore;
use crate::engine::relational::{PatientId, SampleId, SqliteRelationalReader};
use crate::engine::vocab::StoreKind;

#[derive(Clone)]
pub struct ApiState {
    pub coordinator: FederatedQueryCoordinator,
    pub relational: Arc<SqliteRelationalReader>,
    pub documents: Arc<VariantStore>,
}

impl ApiState {
    pub fn new(relational: Arc<SqliteRelationalReader>, documents: Arc<VariantStore>, limits: QueryLimits) -> Self {
        let coordinator = FederatedQueryCoordinator::new(relational.clone(), documents.clone(), limits);
        Self {
            coordinator,
            relational,
            documents,
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        combined_query_get,
        combined_query_post,
        get_patient,
        get_patient_samples,
        get_patient_summary,
        get_sample,
        get_sample_tests,
        get_sample_variants,
        get_test,
        cnvs_by_gene,
        svs_by_gene,
        list_genes,
        variant_stats,
    ),
    components(schemas(CombinedQueryRequest, CombinedPredicates, Pagination)),
    tags(
        (name = "query", description = "Combined relational + document queries"),
        (name = "lookup", description = "Single record lookups"),
        (name = "variants", description = "Document store aggregates and CNV/SV lookups"),
    )
)]
pub struct ApiDoc;

pub fn create_router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/combined-query", get(combined_query_get).post(combined_query_post))
        .route("/api/patients/{id}", get(get_patient))
        .route("/api/patients/{id}/samples", get(get_patient_samples))
        .route("/api/patients/{id}/summary", get(get_patient_summary))
        .route("/api/samples/{id}", get(get_sample))
        .route("/api/samples/{id}/tests", get(get_sample_tests))
        .route("/api/samples/{id}/variants", get(get_sample_variants))
        .route("/api/tests/{id}", get(get_test))
        .route("/api/cnv/by-gene/{gene}", get(cnvs_by_gene))
        .route("/api/sv/by-gene/{gene}", get(svs_by_gene))
        .route("/api/genes", get(list_genes))
        .route("/api/variant-stats", get(variant_stats))
        .route("/api/health", get(health_check))
        .route("/api/openapi.json", get(openapi_json))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub enum ApiError {
    Federation(FederationError),
    NotFound(String),
}

impl From<FederationError> for ApiError {
    fn from(err: FederationError) -> Self {
        ApiError::Federation(err)
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::Federation(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Federation(FederationError::Validation(err)) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({ "error": "validation_error", "field": err.field, "message": err.message }),
            ),
            ApiError::Federation(FederationError::UpstreamUnavailable { store, reason }) => (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({ "error": "upstream_unavailable", "store": store, "reason": reason }),
            ),
            ApiError::NotFound(message) => (
                StatusCode::NOT_FOUND,
                json!({ "error": "not_found", "message": message }),
            ),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Flat query-string form of the combined query
#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct CombinedQueryParams {
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
    pub sex: Option<String>,
    pub age_min: Option<i64>,
    pub age_max: Option<i64>,
    pub test_type: Option<String>,
    pub test_result_status: Option<String>,
    pub panel_code: Option<String>,
    pub sample_type: Option<String>,
    pub sample_status: Option<String>,
    pub offset: Option<i64>,
    pub limit: Option<i64>,
}

impl CombinedQueryParams {
    pub fn into_parts(self) -> (CombinedPredicates, Pagination) {
        let predicates = CombinedPredicates {
            gene: self.gene,
            clinical_significance: self.clinical_significance,
            variant_type: self.variant_type,
            min_quality: self.min_quality,
            min_cadd: self.min_cadd,
            chromosome: self.chromosome,
            position_min: self.position_min,
            position_max: self.position_max,
            reference_genome: self.reference_genome,
            sex: self.sex,
            age_min: self.age_min,
            age_max: self.age_max,
            test_type: self.test_type,
            test_result_status: self.test_result_status,
            panel_code: self.panel_code,
            sample_type: self.sample_type,
            sample_status: self.sample_status,
        };
        let pagination = Pagination {
            offset: self.offset,
            limit: self.limit,
        };
        (predicates, pagination)
    }
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct CombinedQueryRequest {
    pub predicates: CombinedPredicates,
    pub pagination: Pagination,
}

#[utoipa::path(
    get,
    path = "/api/combined-query",
    params(CombinedQueryParams),
    responses(
        (status = 200, description = "Combined records with warnings", body = Value),
        (status = 422, description = "Invalid predicate or pagination", body = Value),
        (status = 503, description = "A store is unavailable", body = Value)
    ),
    tag = "query"
)]
async fn combined_query_get(
    State(state): State<ApiState>,
    params: Result<Query<CombinedQueryParams>, QueryRejection>,
) -> Result<Json<CombinedQueryResult>, ApiError> {
    let Query(params) = params.map_err(|e| ValidationError::new("query", e.body_text()))?;
    let (predicates, pagination) = params.into_parts();
    let result = state.coordinator.run_combined_query(&predicates, &pagination).await?;
    Ok(Json(result))
}

#[utoipa::path(
    post,
    path = "/api/combined-query",
    request_body = CombinedQueryRequest,
    responses(
        (status = 200, description = "Combined records with warnings", body = Value),
        (status = 422, description = "Invalid predicate or pagination", body = Value),
        (status = 503, description = "A store is unavailable", body = Value)
    ),
    tag = "query"
)]
async fn combined_query_post(
    State(state): State<ApiState>,
    body: Result<Json<CombinedQueryRequest>, JsonRejection>,
) -> Result<Json<CombinedQueryResult>, ApiError> {
    let Json(request) = body.map_err(|e| ValidationError::new("body", e.body_text()))?;
    let result = state
        .coordinator
        .run_combined_query(&request.predicates, &request.pagination)
        .await?;
    Ok(Json(result))
}

#[utoipa::path(
    get,
    path = "/api/patients/{id}",
    params(
        ("id" = i64, Path, description = "Patient ID"),
    ),
    responses(
        (status = 200, description = "Patient", body = Value),
        (status = 404, description = "No such patient", body = Value)
    ),
    tag = "lookup"
)]
async fn get_patient(State(state): State<ApiState>, Path(id): Path<i64>) -> Result<Json<Value>, ApiError> {
    let reader = state.relational.clone();
    let timeout = state.coordinator.limits().timeout();
    let patient = call_store(StoreKind::Relational, timeout, move || reader.get_patient(PatientId(id)))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("patient {} not found", id)))?;
    Ok(Json(json!(patient)))
}

#[utoipa::path(
    get,
    path = "/api/patients/{id}/samples",
    params(
        ("id" = i64, Path, description = "Patient ID"),
    ),
    responses(
        (status = 200, description = "The patient's samples, most recently collected first", body = Value),
        (status = 404, description = "No such patient", body = Value)
    ),
    tag = "lookup"
)]
async fn get_patient_samples(State(state): State<ApiState>, Path(id): Path<i64>) -> Result<Json<Value>, ApiError> {
    let reader = state.relational.clone();
    let timeout = state.coordinator.limits().timeout();
    let samples = call_store(StoreKind::Relational, timeout, move || {
        match reader.get_patient(PatientId(id))? {
            Some(_) => reader.samples_for_patient(PatientId(id)).map(Some),
            None => Ok(None),
        }
    })
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("patient {} not found", id)))?;
    Ok(Json(json!(samples)))
}

#[utoipa::path(
    get,
    path = "/api/patients/{id}/summary",
    params(
        ("id" = i64, Path, description = "Patient ID"),
    ),
    responses(
        (status = 200, description = "Patient with samples, tests and totals", body = Value),
        (status = 404, description = "No such patient", body = Value)
    ),
    tag = "lookup"
)]
async fn get_patient_summary(State(state): State<ApiState>, Path(id): Path<i64>) -> Result<Json<Value>, ApiError> {
    let reader = state.relational.clone();
    let timeout = state.coordinator.limits().timeout();
    let summary = call_store(StoreKind::Relational, timeout, move || reader.patient_summary(PatientId(id)))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("patient {} not found", id)))?;
    Ok(Json(json!(summary)))
}

#[utoipa::path(
    get,
    path = "/api/samples/{id}",
    params(
        ("id" = i64, Path, description = "Sample ID"),
    ),
    responses(
        (status = 200, description = "Sample with its patient and clinical tests", body = Value),
        (status = 404, description = "No such sample", body = Value)
    ),
    tag = "lookup"
)]
async fn get_sample(State(state): State<ApiState>, Path(id): Path<i64>) -> Result<Json<Value>, ApiError> {
    let reader = state.relational.clone();
    let timeout = state.coordinator.limits().timeout();
    let record = call_store(StoreKind::Relational, timeout, move || reader.get_sample(SampleId(id)))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("sample {} not found", id)))?;
    Ok(Json(json!(record)))
}

#[utoipa::path(
    get,
    path = "/api/samples/{id}/tests",
    params(
        ("id" = i64, Path, description = "Sample ID"),
    ),
    responses(
        (status = 200, description = "The sample's clinical tests, most recent first", body = Value),
        (status = 404, description = "No such sample", body = Value)
    ),
    tag = "lookup"
)]
async fn get_sample_tests(State(state): State<ApiState>, Path(id): Path<i64>) -> Result<Json<Value>, ApiError> {
    let reader = state.relational.clone();
    let timeout = state.coordinator.limits().timeout();
    let tests = call_store(StoreKind::Relational, timeout, move || {
        if reader.get_sample(SampleId(id))?.is_none() {
            return Ok(None);
        }
        reader.tests_for_sample(SampleId(id)).map(Some)
    })
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("sample {} not found", id)))?;
    Ok(Json(json!(tests)))
}

#[utoipa::path(
    get,
    path = "/api/tests/{id}",
    params(
        ("id" = i64, Path, description = "Test ID"),
    ),
    responses(
        (status = 200, description = "Test with panel assignment and quality metrics", body = Value),
        (status = 404, description = "No such test", body = Value)
    ),
    tag = "lookup"
)]
async fn get_test(State(state): State<ApiState>, Path(id): Path<i64>) -> Result<Json<Value>, ApiError> {
    let reader = state.relational.clone();
    let timeout = state.coordinator.limits().timeout();
    let details = call_store(StoreKind::Relational, timeout, move || reader.get_test(id))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("test {} not found", id)))?;
    Ok(Json(json!(details)))
}

#[utoipa::path(
    get,
    path = "/api/samples/{id}/variants",
    params(
        ("id" = i64, Path, description = "Sample ID"),
    ),
    responses(
        (status = 200, description = "Variant document for the sample", body = Value),
        (status = 404, description = "No document for the sample", body = Value)
    ),
    tag = "lookup"
)]
async fn get_sample_variants(State(state): State<ApiState>, Path(id): Path<i64>) -> Result<Json<Value>, ApiError> {
    let store = state.documents.clone();
    let timeout = state.coordinator.limits().timeout();
    let doc = call_store(StoreKind::Document, timeout, move || store.get_document(SampleId(id)))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("no variant document for sample {}", id)))?;
    Ok(Json(json!(doc)))
}

#[utoipa::path(
    get,
    path = "/api/genes",
    responses(
        (status = 200, description = "Distinct gene symbols", body = Vec<String>)
    ),
    tag = "lookup"
)]
async fn list_genes(State(state): State<ApiState>) -> Result<Json<Vec<String>>, ApiError> {
    let store = state.documents.clone();
    let timeout = state.coordinator.limits().timeout();
    let genes = call_store(StoreKind::Document, timeout, move || store.available_genes()).await?;
    Ok(Json(genes))
}

#[utoipa::path(
    get,
    path = "/api/cnv/by-gene/{gene}",
    params(
        ("gene" = String, Path, description = "Gene symbol (exact)"),
    ),
    responses(
        (status = 200, description = "Copy number variants affecting the gene", body = Value)
    ),
    tag = "variants"
)]
async fn cnvs_by_gene(State(state): State<ApiState>, Path(gene): Path<String>) -> Result<Json<Value>, ApiError> {
    let store = state.documents.clone();
    let timeout = state.coordinator.limits().timeout();
    let hits = call_store(StoreKind::Document, timeout, move || store.copy_number_variants_by_gene(&gene)).await?;
    Ok(Json(json!(hits)))
}

#[utoipa::path(
    get,
    path = "/api/sv/by-gene/{gene}",
    params(
        ("gene" = String, Path, description = "Gene symbol (exact)"),
    ),
    responses(
        (status = 200, description = "Structural variants affecting the gene", body = Value)
    ),
    tag = "variants"
)]
async fn svs_by_gene(State(state): State<ApiState>, Path(gene): Path<String>) -> Result<Json<Value>, ApiError> {
    let store = state.documents.clone();
    let timeout = state.coordinator.limits().timeout();
    let hits = call_store(StoreKind::Document, timeout, move || store.structural_variants_by_gene(&gene)).await?;
    Ok(Json(json!(hits)))
}

#[utoipa::path(
    get,
    path = "/api/variant-stats",
    responses(
        (status = 200, description = "Variant, CNV and SV counts", body = Value)
    ),
    tag = "variants"
)]
async fn variant_stats(State(state): State<ApiState>) -> Result<Json<Value>, ApiError> {
    let store = state.documents.clone();
    let timeout = state.coordinator.limits().timeout();
    let stats = call_store(StoreKind::Document, timeout, move || store.variant_stats()).await?;
    Ok(Json(json!(stats)))
}
