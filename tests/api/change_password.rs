use crate::helpers::spawn_app;
use uuid::Uuid;

#[sqlx::test]
async fn changing_the_password_works(pool: sqlx::PgPool) {
    let app = spawn_app(pool).await;
    let user = app.register_user().await;
    let new_password = Uuid::new_v4().to_string();

    let response = app
        .put_json(
            "/api/auth/password",
            user.bearer(),
            &serde_json::json!({
                "current_password": user.password,
                "new_password": new_password,
                "new_password_check": new_password,
            }),
        )
        .await;
    assert_eq!(200, response.status().as_u16());

    let response = app.post_login(&user.email, &user.password).await;
    assert_eq!(401, response.status().as_u16());

    let response = app.post_login(&user.email, &new_password).await;
    assert_eq!(200, response.status().as_u16());
}

#[sqlx::test]
async fn the_current_password_must_be_valid(pool: sqlx::PgPool) {
    let app = spawn_app(pool).await;
    let user = app.register_user().await;
    let new_password = Uuid::new_v4().to_string();

    let response = app
        .put_json(
            "/api/auth/password",
            user.bearer(),
            &serde_json::json!({
                "current_password": "wrong password",
                "new_password": new_password,
                "new_password_check": new_password,
            }),
        )
        .await;
    assert_eq!(401, response.status().as_u16());
}

#[sqlx::test]
async fn new_passwords_must_match(pool: sqlx::PgPool) {
    let app = spawn_app(pool).await;
    let user = app.register_user().await;

    let response = app
        .put_json(
            "/api/auth/password",
            user.bearer(),
            &serde_json::json!({
                "current_password": user.password,
                "new_password": Uuid::new_v4().to_string(),
                "new_password_check": Uuid::new_v4().to_string(),
            }),
        )
        .await;
    assert_eq!(400, response.status().as_u16());
}

#[sqlx::test]
async fn a_too_short_password_is_rejected(pool: sqlx::PgPool) {
    let app = spawn_app(pool).await;
    let user = app.register_user().await;

    let response = app
        .put_json(
            "/api/auth/password",
            user.bearer(),
            &serde_json::json!({
                "current_password": user.password,
                "new_password": "short",
                "new_password_check": "short",
            }),
        )
        .await;
    assert_eq!(400, response.status().as_u16());
}
