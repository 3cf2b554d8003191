use crate::helpers::spawn_app;
use serde_json::Value;

#[sqlx::test]
async fn health_check_works(pool: sqlx::PgPool) {
    let app = spawn_app(pool).await;

    let response = app.get_anonymous("/health_check").await;

    assert!(response.status().is_success());
    assert_eq!(Some(0), response.content_length());
}

#[sqlx::test]
async fn api_health_reports_the_database(pool: sqlx::PgPool) {
    let app = spawn_app(pool).await;

    let response = app.get_anonymous("/api/health").await;
    assert_eq!(200, response.status().as_u16());

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database"], "ok");
    assert!(body["timestamp"].is_string());
}

#[sqlx::test]
async fn api_health_is_degraded_without_a_database(pool: sqlx::PgPool) {
    let app = spawn_app(pool).await;
    app.pool.close().await;

    let response = app.get_anonymous("/api/health").await;
    assert_eq!(503, response.status().as_u16());

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["database"], "unavailable");
}

#[sqlx::test]
async fn unknown_paths_return_a_json_404(pool: sqlx::PgPool) {
    let app = spawn_app(pool).await;

    let response = app.get_anonymous("/does/not/exist").await;
    assert_eq!(404, response.status().as_u16());

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "The requested resource was not found");
}
