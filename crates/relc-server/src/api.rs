//! HTTP API
//!
//! - `POST /compile`: JSON plan + dialect → SQL, result schema, fingerprints
//! - `POST /ddl`: DDL statement + dialect → SQL
//! - `GET /dialects`: syntax descriptor of every dialect
//! - `GET /health`, `GET /metrics`

use crate::config::Config;
use crate::metrics::{Metrics, Outcome};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use relc_ir::{Field, InMemoryCatalog, IrError, PlanSpec, Schema, SchemaProvider};
use relc_registry::{Dialect, DialectDescriptor, RegistryError, RuleTable};
use relc_sql::{CompileError, DdlStatement};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Shared, read-only state behind every handler.
pub struct AppState {
    catalog: InMemoryCatalog,
    rules: RuleTable,
    default_dialect: Dialect,
    metrics: Metrics,
}

impl AppState {
    pub fn new(config: &Config) -> Result<Self, prometheus::Error> {
        Ok(Self {
            catalog: config.catalog(),
            rules: RuleTable::builtin(),
            default_dialect: config.compiler.default_dialect,
            metrics: Metrics::new()?,
        })
    }

    fn dialect(&self, requested: Option<&str>) -> Result<Dialect, RegistryError> {
        match requested {
            Some(name) => name.parse(),
            None => Ok(self.default_dialect),
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/compile", post(compile_plan))
        .route("/ddl", post(render_ddl))
        .route("/dialects", get(list_dialects))
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct CompileRequest {
    pub plan: PlanSpec,
    #[serde(default)]
    pub dialect: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CompileResponse {
    pub request_id: Uuid,
    pub dialect: Dialect,
    pub sql: String,
    pub schema: Schema,
    pub fingerprint: String,
    pub plan_fingerprint: String,
}

#[derive(Debug, Deserialize)]
pub struct DdlRequest {
    pub statement: DdlSpec,
    #[serde(default)]
    pub dialect: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DdlResponse {
    pub request_id: Uuid,
    pub dialect: Dialect,
    pub sql: String,
}

/// JSON form of a DDL statement; view queries are plans.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DdlSpec {
    CreateTable {
        name: String,
        fields: Vec<Field>,
        #[serde(default)]
        if_not_exists: bool,
        #[serde(default)]
        properties: BTreeMap<String, String>,
    },
    CreateView {
        name: String,
        query: PlanSpec,
        #[serde(default)]
        temporary: bool,
        #[serde(default)]
        or_replace: bool,
    },
    DropTable {
        name: String,
        #[serde(default)]
        if_exists: bool,
    },
    DropView {
        name: String,
        #[serde(default)]
        if_exists: bool,
        #[serde(default)]
        temporary: bool,
    },
    RenameTable {
        from: String,
        to: String,
    },
    CreateDatabase {
        name: String,
        #[serde(default)]
        if_not_exists: bool,
        #[serde(default)]
        location: Option<String>,
    },
    DropDatabase {
        name: String,
        #[serde(default)]
        if_exists: bool,
        #[serde(default)]
        cascade: bool,
    },
    AnalyzeTable {
        name: String,
        #[serde(default)]
        noscan: bool,
    },
}

impl DdlSpec {
    pub fn build(self, catalog: &dyn SchemaProvider) -> Result<DdlStatement, IrError> {
        Ok(match self {
            DdlSpec::CreateTable {
                name,
                fields,
                if_not_exists,
                properties,
            } => {
                let schema = Schema::new(fields);
                if let Some(dup) = schema.duplicate_name() {
                    return Err(IrError::DuplicateColumn(dup.to_string()));
                }
                DdlStatement::CreateTable {
                    name,
                    schema,
                    if_not_exists,
                    properties: properties.into_iter().collect(),
                }
            }
            DdlSpec::CreateView {
                name,
                query,
                temporary,
                or_replace,
            } => DdlStatement::CreateView {
                name,
                query: query.build(catalog)?,
                temporary,
                or_replace,
            },
            DdlSpec::DropTable { name, if_exists } => DdlStatement::DropTable { name, if_exists },
            DdlSpec::DropView {
                name,
                if_exists,
                temporary,
            } => DdlStatement::DropView {
                name,
                if_exists,
                temporary,
            },
            DdlSpec::RenameTable { from, to } => DdlStatement::RenameTable { from, to },
            DdlSpec::CreateDatabase {
                name,
                if_not_exists,
                location,
            } => DdlStatement::CreateDatabase {
                name,
                if_not_exists,
                location,
            },
            DdlSpec::DropDatabase {
                name,
                if_exists,
                cascade,
            } => DdlStatement::DropDatabase {
                name,
                if_exists,
                cascade,
            },
            DdlSpec::AnalyzeTable { name, noscan } => DdlStatement::AnalyzeTable { name, noscan },
        })
    }
}

/// Error body returned by every endpoint.
#[derive(Debug, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    status: StatusCode,
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Uuid>,
}

impl ApiError {
    fn dialect(err: RegistryError, request_id: Uuid) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "unknown_dialect",
            message: err.to_string(),
            request_id: Some(request_id),
        }
    }

    /// Plans the dialect cannot express are well-formed but unprocessable.
    fn compile(err: &CompileError, request_id: Uuid) -> Self {
        let status = match err {
            CompileError::UnsupportedOperator { .. } | CompileError::UnsupportedExpression { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            _ => StatusCode::BAD_REQUEST,
        };
        Self {
            status,
            code: err.kind(),
            message: err.to_string(),
            request_id: Some(request_id),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal",
            message: message.into(),
            request_id: None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

async fn compile_plan(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CompileRequest>,
) -> Result<Json<CompileResponse>, ApiError> {
    let request_id = Uuid::new_v4();
    let dialect = state
        .dialect(req.dialect.as_deref())
        .map_err(|e| ApiError::dialect(e, request_id))?;

    let started = Instant::now();
    let result = req
        .plan
        .build(&state.catalog)
        .map_err(CompileError::from)
        .and_then(|rel| relc_sql::compile(&rel, dialect, &state.rules));
    let elapsed = started.elapsed();

    match result {
        Ok(compiled) => {
            state.metrics.record_compile(dialect, Outcome::Ok, elapsed);
            tracing::info!(
                %request_id,
                %dialect,
                elapsed_us = elapsed.as_micros() as u64,
                sql_len = compiled.sql.len(),
                "compiled plan"
            );
            Ok(Json(CompileResponse {
                request_id,
                dialect,
                fingerprint: compiled.fingerprint(),
                plan_fingerprint: req.plan.fingerprint(),
                sql: compiled.sql,
                schema: compiled.schema,
            }))
        }
        Err(err) => {
            state
                .metrics
                .record_compile(dialect, Outcome::Rejected(err.kind()), elapsed);
            tracing::warn!(%request_id, %dialect, kind = err.kind(), error = %err, "compile rejected");
            Err(ApiError::compile(&err, request_id))
        }
    }
}

async fn render_ddl(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DdlRequest>,
) -> Result<Json<DdlResponse>, ApiError> {
    let request_id = Uuid::new_v4();
    let dialect = state
        .dialect(req.dialect.as_deref())
        .map_err(|e| ApiError::dialect(e, request_id))?;

    let result = req
        .statement
        .build(&state.catalog)
        .map_err(CompileError::from)
        .and_then(|statement| relc_sql::render_ddl(&statement, dialect, &state.rules));

    match result {
        Ok(sql) => {
            state.metrics.record_ddl(dialect, Outcome::Ok);
            tracing::info!(%request_id, %dialect, "rendered ddl");
            Ok(Json(DdlResponse {
                request_id,
                dialect,
                sql,
            }))
        }
        Err(err) => {
            state.metrics.record_ddl(dialect, Outcome::Rejected(err.kind()));
            tracing::warn!(%request_id, %dialect, kind = err.kind(), error = %err, "ddl rejected");
            Err(ApiError::compile(&err, request_id))
        }
    }
}

#[derive(Debug, Serialize)]
struct DialectInfo {
    dialect: Dialect,
    is_default: bool,
    #[serde(flatten)]
    descriptor: &'static DialectDescriptor,
}

async fn list_dialects(State(state): State<Arc<AppState>>) -> Json<Vec<DialectInfo>> {
    Json(
        state
            .rules
            .dialects()
            .into_iter()
            .map(|dialect| DialectInfo {
                dialect,
                is_default: dialect == state.default_dialect,
                descriptor: dialect.descriptor(),
            })
            .collect(),
    )
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn metrics_handler(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let (content_type, body) = state
        .metrics
        .render()
        .map_err(|e| ApiError::internal(format!("failed to encode metrics: {}", e)))?;
    Ok(([(header::CONTENT_TYPE, content_type)], body).into_response())
}
