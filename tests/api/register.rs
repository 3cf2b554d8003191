use crate::helpers::{spawn_app, spawn_app_with, TestUser};
use serde_json::Value;

#[sqlx::test]
async fn register_returns_the_profile_and_a_token(pool: sqlx::PgPool) {
    let app = spawn_app(pool).await;
    let user = TestUser::generate();

    let response = app.post_register(&user).await;
    assert_eq!(201, response.status().as_u16());

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["user"]["email"], user.email.as_str());
    assert_eq!(body["user"]["name"], user.name.as_str());
    assert_eq!(body["user"]["storage_used"], 0);
    assert!(body["token"].as_str().map_or(false, |t| !t.is_empty()));
    assert!(body["expires_at"].is_string());
}

#[sqlx::test]
async fn register_persists_a_hashed_password(pool: sqlx::PgPool) {
    let app = spawn_app(pool).await;
    let user = app.register_user().await;

    let (email, password_hash): (String, String) =
        sqlx::query_as("SELECT email, password_hash FROM users WHERE user_id = $1")
            .bind(user.id)
            .fetch_one(&app.pool)
            .await
            .expect("Failed to fetch the saved user");

    assert_eq!(email, user.email);
    assert_ne!(password_hash, user.password);
    assert!(password_hash.starts_with("$argon2id$"));
}

#[sqlx::test]
async fn new_users_get_the_configured_quota(pool: sqlx::PgPool) {
    let app = spawn_app_with(pool, |c| c.storage.default_quota_bytes = 1234).await;
    let user = app.register_user().await;

    let body: Value = app.get("/api/auth/me", user.bearer()).await.json().await.unwrap();
    assert_eq!(body["user"]["storage_limit"], 1234);
}

#[sqlx::test]
async fn registering_an_existing_email_is_a_conflict(pool: sqlx::PgPool) {
    let app = spawn_app(pool).await;
    let user = app.register_user().await;

    let mut duplicate = TestUser::generate();
    duplicate.email = user.email.to_uppercase();

    let response = app.post_register(&duplicate).await;
    assert_eq!(409, response.status().as_u16());
}

#[sqlx::test]
async fn register_rejects_invalid_fields(pool: sqlx::PgPool) {
    let app = spawn_app(pool).await;

    let test_cases = vec![
        (
            serde_json::json!({"email": "not-an-email", "password": "long enough", "name": "Ursula"}),
            "invalid email",
        ),
        (
            serde_json::json!({"email": "ursula@tauos.org", "password": "short", "name": "Ursula"}),
            "short password",
        ),
        (
            serde_json::json!({"email": "ursula@tauos.org", "password": "long enough", "name": "  "}),
            "blank name",
        ),
        (
            serde_json::json!({"email": "ursula@tauos.org", "password": "long enough"}),
            "missing name",
        ),
    ];

    for (body, description) in test_cases {
        let response = app.post_anonymous("/api/auth/register", &body).await;

        assert_eq!(
            400,
            response.status().as_u16(),
            "The API did not return a 400 when the payload had an {}",
            description
        );
        let body: Value = response.json().await.unwrap();
        assert!(body["error"].is_string());
    }
}
