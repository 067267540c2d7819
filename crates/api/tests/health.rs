mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{build_test_app, get};
use pinrelay_core::types::new_id;
use sqlx::PgPool;
use tower::ServiceExt;

#[sqlx::test(migrations = "../../db/migrations")]
async fn health_reports_database_and_channels(pool: PgPool) {
    let app = build_test_app(pool);

    let (status, body) = get(&app.router, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["db_healthy"], true);
    assert_eq!(body["active_channels"], 0);

    let job_id = new_id();
    let _rx = app.fanout().connect(job_id, "probe").await.unwrap();
    let (_, body) = get(&app.router, "/health").await;
    assert_eq!(body["active_channels"], 1);

    app.fanout().disconnect(job_id, "probe").await;
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn responses_carry_request_id(pool: PgPool) {
    let app = build_test_app(pool);

    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert!(response.headers().contains_key("x-request-id"));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn unknown_route_is_not_found(pool: PgPool) {
    let app = build_test_app(pool);

    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
