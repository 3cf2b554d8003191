use crate::helpers::spawn_app;
use serde_json::Value;

#[sqlx::test]
async fn login_with_valid_credentials_returns_a_working_token(pool: sqlx::PgPool) {
    let app = spawn_app(pool).await;
    let user = app.register_user().await;

    let response = app.post_login(&user.email, &user.password).await;
    assert_eq!(200, response.status().as_u16());

    let body: Value = response.json().await.unwrap();
    let token = body["token"].as_str().unwrap();
    assert_eq!(body["user"]["email"], user.email.as_str());

    let response = app.get("/api/auth/me", token).await;
    assert_eq!(200, response.status().as_u16());
}

#[sqlx::test]
async fn login_ignores_the_case_of_the_email(pool: sqlx::PgPool) {
    let app = spawn_app(pool).await;
    let user = app.register_user().await;

    let response = app
        .post_login(&user.email.to_uppercase(), &user.password)
        .await;
    assert_eq!(200, response.status().as_u16());
}

#[sqlx::test]
async fn login_with_a_wrong_password_is_rejected(pool: sqlx::PgPool) {
    let app = spawn_app(pool).await;
    let user = app.register_user().await;

    let response = app.post_login(&user.email, "definitely wrong").await;
    assert_eq!(401, response.status().as_u16());

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Invalid credentials");
}

#[sqlx::test]
async fn login_with_an_unknown_email_is_rejected(pool: sqlx::PgPool) {
    let app = spawn_app(pool).await;

    let response = app.post_login("nobody@tauos.org", "whatever123").await;
    assert_eq!(401, response.status().as_u16());
}

#[sqlx::test]
async fn protected_routes_require_a_valid_token(pool: sqlx::PgPool) {
    let app = spawn_app(pool).await;

    let response = app.get_anonymous("/api/auth/me").await;
    assert_eq!(401, response.status().as_u16());
    assert_eq!(
        Some("Bearer"),
        response
            .headers()
            .get("WWW-Authenticate")
            .and_then(|v| v.to_str().ok())
    );

    let response = app.get("/api/emails", "not.a.token").await;
    assert_eq!(401, response.status().as_u16());
}
