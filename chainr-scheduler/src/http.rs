//! The Scheduler's HTTP surface (spec §6): a thin front controller over
//! [`crate::scheduler::Scheduler`]. Every response is compact JSON with
//! `Content-Type: application/json`, including errors and 405s, so routes
//! are dispatched manually with [`axum::routing::any`] rather than relying
//! on axum's built-in method-not-allowed handling (which doesn't carry a
//! JSON body).

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;
use tower_http::trace::TraceLayer;

use chainr_pipeline::validate;

use crate::error::SchedulerError;
use crate::scheduler::Scheduler;
use crate::status::{RunStatus, StatusListItem};

pub fn router(scheduler: Arc<Scheduler>) -> Router {
    Router::new()
        .route("/api", any(api_root))
        .route("/api/runs", any(runs_collection))
        .route("/api/runs/:uid", any(run_item))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(scheduler)
}

fn json_response(status: StatusCode, body: impl Serialize) -> Response {
    let mut response = (status, Json(body)).into_response();
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

fn method_not_allowed(allow: &str) -> Response {
    let mut response = json_response(
        StatusCode::METHOD_NOT_ALLOWED,
        json!({"kind": "Error", "error": "method not allowed"}),
    );
    response
        .headers_mut()
        .insert(header::ALLOW, HeaderValue::from_str(allow).unwrap());
    response
}

fn error_response(err: SchedulerError) -> Response {
    let (status, message) = match &err {
        SchedulerError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
        SchedulerError::NotFound => (StatusCode::NOT_FOUND, "run not found".to_string()),
        SchedulerError::Store(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };
    json_response(status, json!({"kind": "Error", "error": message}))
}

async fn api_root(method: Method) -> Response {
    if method != Method::GET {
        return method_not_allowed("GET");
    }
    json_response(
        StatusCode::OK,
        json!({
            "kind": "APIResourceList",
            "metadata": {"selfLink": "/api"},
            "resources": {
                "runs": {
                    "url": "/api/runs",
                    "description": "submitted pipeline runs",
                }
            }
        }),
    )
}

async fn runs_collection(
    method: Method,
    State(scheduler): State<Arc<Scheduler>>,
    body: String,
) -> Response {
    match method {
        Method::GET => match scheduler.status_list().await {
            Ok(items) => json_response(StatusCode::OK, run_list_body(items)),
            Err(err) => error_response(err),
        },
        Method::POST => create_run(scheduler, body).await,
        _ => method_not_allowed("GET, POST"),
    }
}

fn run_list_body(items: Vec<StatusListItem>) -> serde_json::Value {
    json!({
        "kind": "RunList",
        "metadata": {"selfLink": "/api/runs"},
        "items": items,
    })
}

async fn create_run(scheduler: Arc<Scheduler>, body: String) -> Response {
    let pipeline = match validate(&body) {
        Ok(pipeline) => pipeline,
        Err(err) => return error_response(err.into()),
    };

    match scheduler.schedule(pipeline).await {
        Ok(status) => json_response(StatusCode::ACCEPTED, run_body(&status)),
        Err(err) => error_response(err),
    }
}

async fn run_item(method: Method, State(scheduler): State<Arc<Scheduler>>, Path(uid): Path<String>) -> Response {
    if method != Method::GET {
        return method_not_allowed("GET");
    }
    match scheduler.status(&uid).await {
        Ok(status) => json_response(StatusCode::OK, run_body(&status)),
        Err(err) => error_response(err),
    }
}

fn run_body(status: &RunStatus) -> serde_json::Value {
    json!({
        "kind": "Run",
        "metadata": {"selfLink": format!("/api/runs/{}", status.uid), "uid": status.uid},
        "status": status.run,
        "jobs": status.jobs,
    })
}

async fn not_found() -> Response {
    json_response(
        StatusCode::NOT_FOUND,
        json!({"kind": "Error", "error": "Resource not found"}),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use chainr_store::MemoryStore;
    use tower::ServiceExt;

    fn app() -> Router {
        router(Arc::new(Scheduler::new(Arc::new(MemoryStore::new()))))
    }

    #[tokio::test]
    async fn get_api_describes_the_runs_resource() {
        let response = app()
            .oneshot(Request::builder().uri("/api").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
    }

    #[tokio::test]
    async fn post_to_api_root_is_method_not_allowed() {
        let response = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers().get(header::ALLOW).unwrap(), "GET");
    }

    #[tokio::test]
    async fn post_valid_pipeline_returns_202_with_uid() {
        let response = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/runs")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        r#"{"kind":"Pipeline","jobs":{"a":{"image":"busybox","run":"exit 0"}}}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn post_malformed_pipeline_returns_400() {
        let response = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/runs")
                    .body(Body::from(r#"{"kind":"Bogus","jobs":{}}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn get_unknown_run_returns_404() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/api/runs/does-not-exist")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_path_returns_404_with_resource_not_found() {
        let response = app()
            .oneshot(Request::builder().uri("/bogus").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
