//! HTTP transport for the query service
//!
//! REST surface under `/mcp`, plus `/health`. `POST /mcp/query` is only
//! mounted when the service has the `nl_query` capability.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use nlsql_core::{
    Capabilities, CoreError, NlQueryRequest, QueryResult, QueryService, SampleResult,
    TableDescriptor, TableSchema,
};
use serde::{Deserialize, Serialize};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Error body: stable kind plus the sanitized message
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub kind: String,
    pub message: String,
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub name: String,
    pub version: String,
    pub database: bool,
    pub capabilities: Capabilities,
}

/// Query parameters for the sample route
#[derive(Debug, Deserialize)]
pub struct SampleQuery {
    pub limit: Option<usize>,
}

pub enum ApiError {
    Core(CoreError),
    /// The request could not be decoded into the route's inputs
    BadInput { status: StatusCode, message: String },
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        Self::Core(err)
    }
}

macro_rules! bad_input_from {
    ($($rejection:ty),*) => {
        $(impl From<$rejection> for ApiError {
            fn from(rejection: $rejection) -> Self {
                Self::BadInput {
                    status: rejection.status(),
                    message: rejection.body_text(),
                }
            }
        })*
    };
}

bad_input_from!(JsonRejection, PathRejection, QueryRejection);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match self {
            ApiError::Core(err) => {
                let status = match &err {
                    CoreError::TableNotFound(_) => StatusCode::NOT_FOUND,
                    _ if err.is_rejection() => StatusCode::BAD_REQUEST,
                    _ => {
                        tracing::error!(kind = err.kind(), "Request failed: {}", err);
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                };
                (status, err.kind(), err.to_string())
            }
            ApiError::BadInput { status, message } => (status, "invalid_request", message),
        };
        let body = ErrorResponse {
            kind: kind.to_string(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

/// Create the router with all routes
pub fn router(service: QueryService) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut api_routes = Router::new()
        .route("/list_tables", get(list_tables))
        .route("/describe/:table_name", get(describe_table))
        .route("/tables/:table_name/sample", get(sample_table));
    if service.capabilities().nl_query {
        api_routes = api_routes.route("/query", post(nl_query));
    }

    Router::new()
        .route("/health", get(health))
        .nest("/mcp", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(service)
}

/// Bind and serve until the process is stopped
pub async fn serve(service: QueryService, host: &str, port: u16) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", host, port))?;
    let app = router(service);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("HTTP server listening on http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health(State(service): State<QueryService>) -> Json<HealthResponse> {
    let database = service.list_tables().await.is_ok();
    Json(HealthResponse {
        status: if database { "healthy" } else { "unhealthy" }.to_string(),
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database,
        capabilities: service.capabilities(),
    })
}

async fn list_tables(
    State(service): State<QueryService>,
) -> Result<Json<Vec<TableDescriptor>>, ApiError> {
    Ok(Json(service.list_tables().await?))
}

async fn describe_table(
    State(service): State<QueryService>,
    table_name: Result<Path<String>, PathRejection>,
) -> Result<Json<TableSchema>, ApiError> {
    let Path(table_name) = table_name?;
    Ok(Json(service.describe_table(&table_name).await?))
}

async fn sample_table(
    State(service): State<QueryService>,
    table_name: Result<Path<String>, PathRejection>,
    query: Result<Query<SampleQuery>, QueryRejection>,
) -> Result<Json<SampleResult>, ApiError> {
    let Path(table_name) = table_name?;
    let Query(query) = query?;
    Ok(Json(service.sample_table(&table_name, query.limit).await?))
}

async fn nl_query(
    State(service): State<QueryService>,
    request: Result<Json<NlQueryRequest>, JsonRejection>,
) -> Result<Json<QueryResult>, ApiError> {
    let Json(request) = request?;
    Ok(Json(service.answer_nl_query(&request).await?))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use nlsql_core::{HeuristicSynthesizer, SqliteDatabase};
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tower::ServiceExt;

    use super::*;

    fn service(nl_query: bool) -> (TempDir, QueryService) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shop.db");
        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE products (id INTEGER PRIMARY KEY, title TEXT NOT NULL, price REAL);
             CREATE TABLE \"order items\" (id INTEGER PRIMARY KEY, qty INTEGER);",
        )
        .unwrap();
        for i in 1..=80 {
            conn.execute(
                "INSERT INTO products (id, title, price) VALUES (?1, ?2, ?3)",
                rusqlite::params![i, format!("item {}", i), i as f64 * 1.5],
            )
            .unwrap();
        }
        drop(conn);

        let db = SqliteDatabase::open(&path, Duration::from_secs(5)).unwrap();
        let mut service = QueryService::new(Arc::new(db));
        if nl_query {
            service = service.with_synthesizer(Arc::new(HeuristicSynthesizer::new()));
        }
        (dir, service)
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (_dir, svc) = service(true);
        let (status, body) = send(router(svc), get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], json!("healthy"));
        assert_eq!(body["name"], json!("nlsql-mcp"));
        assert_eq!(body["database"], json!(true));
        assert_eq!(body["capabilities"], json!({"nl_query": true}));
    }

    #[tokio::test]
    async fn test_list_tables() {
        let (_dir, svc) = service(true);
        let (status, body) = send(router(svc), get("/mcp/list_tables")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!([
                {"table_name": "order items", "column_count": 2},
                {"table_name": "products", "column_count": 3}
            ])
        );
    }

    #[tokio::test]
    async fn test_describe_table() {
        let (_dir, svc) = service(true);
        let (status, body) = send(router(svc.clone()), get("/mcp/describe/products")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["table_name"], json!("products"));
        assert_eq!(body["columns"][2]["data_type"], json!("real"));

        let (status, body) = send(router(svc), get("/mcp/describe/ghost")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["kind"], json!("table_not_found"));
    }

    #[tokio::test]
    async fn test_sample_table() {
        let (_dir, svc) = service(true);
        let (status, body) = send(router(svc.clone()), get("/mcp/tables/products/sample")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["row_count"], json!(5));

        let (_, body) = send(
            router(svc.clone()),
            get("/mcp/tables/products/sample?limit=500"),
        )
        .await;
        assert_eq!(body["row_count"], json!(50));

        let (status, body) = send(router(svc.clone()), get("/mcp/tables/order%20items/sample")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["table_name"], json!("order items"));

        let (status, body) = send(router(svc), get("/mcp/tables/products%3B/sample")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], json!("invalid_identifier"));
    }

    #[tokio::test]
    async fn test_nl_query() {
        let (_dir, svc) = service(true);
        let (status, body) = send(
            router(svc.clone()),
            post_json(
                "/mcp/query",
                json!({"nl_query": "top 2 products by price", "limit": 10}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body["sql_query"],
            json!("SELECT * FROM products ORDER BY price DESC LIMIT 2")
        );
        assert_eq!(body["row_count"], json!(2));
        assert_eq!(body["results"][0]["id"], json!(80));

        let (status, body) = send(
            router(svc),
            post_json("/mcp/query", json!({"nl_query": "list products"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["row_count"], json!(50));
    }

    #[tokio::test]
    async fn test_nl_query_rejections() {
        let (_dir, svc) = service(true);
        let (status, body) = send(
            router(svc.clone()),
            post_json("/mcp/query", json!({"nl_query": "delete all products"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], json!("unsupported_intent"));

        let (status, body) = send(
            router(svc),
            post_json("/mcp/query", json!({"nl_query": "   "})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], json!("synthesis_error"));
    }

    #[tokio::test]
    async fn test_undecodable_input_gets_error_body() {
        let (_dir, svc) = service(true);

        let (status, body) = send(
            router(svc.clone()),
            get("/mcp/tables/products/sample?limit=-1"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], json!("invalid_request"));
        assert!(body["message"].is_string());

        let request = Request::builder()
            .method("POST")
            .uri("/mcp/query")
            .header("content-type", "application/json")
            .body(Body::from("{\"nl_query\": "))
            .unwrap();
        let (status, body) = send(router(svc.clone()), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], json!("invalid_request"));

        let (status, body) = send(
            router(svc.clone()),
            post_json("/mcp/query", json!({"question": "list products"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["kind"], json!("invalid_request"));

        let request = Request::builder()
            .method("POST")
            .uri("/mcp/query")
            .body(Body::from("list products"))
            .unwrap();
        let (status, body) = send(router(svc), request).await;
        assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(body["kind"], json!("invalid_request"));
    }

    #[tokio::test]
    async fn test_query_route_requires_capability() {
        let (_dir, svc) = service(false);
        let app = router(svc);
        let (status, _) = send(
            app.clone(),
            post_json("/mcp/query", json!({"nl_query": "list products"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, body) = send(app, get("/health")).await;
        assert_eq!(body["capabilities"], json!({"nl_query": false}));
    }
}
