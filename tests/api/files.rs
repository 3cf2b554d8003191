use crate::helpers::{spawn_app, spawn_app_with, TestApp, TestUser};
use serde_json::Value;

async fn upload(app: &TestApp, owner: &TestUser, name: &str, content: &'static [u8]) -> Value {
    let response = app.upload_file(owner, name, content).await;
    assert_eq!(201, response.status().as_u16());
    response.json().await.unwrap()
}

async fn usage(app: &TestApp, owner: &TestUser) -> Value {
    app.get("/api/cloud/usage", owner.bearer())
        .await
        .json()
        .await
        .unwrap()
}

#[sqlx::test]
async fn an_uploaded_file_can_be_downloaded(pool: sqlx::PgPool) {
    let app = spawn_app(pool).await;
    let user = app.register_user().await;

    let file = upload(&app, &user, "report.pdf", b"%PDF-1.4 content").await;
    assert_eq!(file["name"], "report.pdf");
    assert_eq!(file["mime_type"], "application/pdf");
    assert_eq!(file["size"], 16);
    assert!(file["deleted_at"].is_null());

    let response = app
        .get(
            &format!("/api/files/{}/content", file["id"].as_str().unwrap()),
            user.bearer(),
        )
        .await;
    assert_eq!(200, response.status().as_u16());
    assert_eq!(
        Some("application/pdf"),
        response
            .headers()
            .get("Content-Type")
            .and_then(|v| v.to_str().ok())
    );
    let disposition = response
        .headers()
        .get("Content-Disposition")
        .and_then(|v| v.to_str().ok())
        .unwrap()
        .to_string();
    assert!(disposition.starts_with("attachment"));
    assert!(disposition.contains("report.pdf"));
    assert_eq!(&response.bytes().await.unwrap()[..], b"%PDF-1.4 content");
}

#[sqlx::test]
async fn uploads_count_against_the_quota(pool: sqlx::PgPool) {
    let app = spawn_app_with(pool, |c| c.storage.default_quota_bytes = 10).await;
    let user = app.register_user().await;

    upload(&app, &user, "a.txt", b"123456").await;

    let response = app.upload_file(&user, "b.txt", b"123456").await;
    assert_eq!(413, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Storage quota exceeded");

    let usage = usage(&app, &user).await;
    assert_eq!(usage["used"], 6);
    assert_eq!(usage["limit"], 10);
    assert_eq!(usage["files"], 1);
}

#[sqlx::test]
async fn oversized_uploads_are_rejected(pool: sqlx::PgPool) {
    let app = spawn_app_with(pool, |c| c.storage.max_upload_bytes = 4).await;
    let user = app.register_user().await;

    let response = app.upload_file(&user, "big.bin", b"0123456789").await;
    assert_eq!(413, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "The file is too large");

    let usage = usage(&app, &user).await;
    assert_eq!(usage["used"], 0);
    assert_eq!(usage["files"], 0);

    let response = app.upload_file(&user, "small.bin", b"0123").await;
    assert_eq!(201, response.status().as_u16());
}

#[sqlx::test]
async fn invalid_uploads_are_rejected(pool: sqlx::PgPool) {
    let app = spawn_app(pool).await;
    let user = app.register_user().await;

    let response = app.upload_file(&user, "empty.txt", b"").await;
    assert_eq!(400, response.status().as_u16());

    let response = app.upload_file(&user, "../etc/passwd", b"x").await;
    assert_eq!(400, response.status().as_u16());

    let unknown_folder = uuid::Uuid::new_v4().to_string();
    let response = app
        .api_client
        .post(&format!("{}/api/files", app.address))
        .query(&[("name", "a.txt"), ("folder_id", unknown_folder.as_str())])
        .bearer_auth(user.bearer())
        .body(&b"x"[..])
        .send()
        .await
        .unwrap();
    assert_eq!(400, response.status().as_u16());
}

#[sqlx::test]
async fn a_page_far_past_the_end_is_rejected(pool: sqlx::PgPool) {
    let app = spawn_app(pool).await;
    let user = app.register_user().await;

    let response = app
        .get("/api/files?page=9223372036854775807", user.bearer())
        .await;
    assert_eq!(400, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "The page is out of range");
}

#[sqlx::test]
async fn files_of_other_users_are_not_found(pool: sqlx::PgPool) {
    let app = spawn_app(pool).await;
    let alice = app.register_user().await;
    let eve = app.register_user().await;

    let file = upload(&app, &alice, "secret.txt", b"secret").await;
    let path = format!("/api/files/{}", file["id"].as_str().unwrap());

    assert_eq!(404, app.get(&path, eve.bearer()).await.status().as_u16());
    assert_eq!(
        404,
        app.get(&format!("{}/content", path), eve.bearer())
            .await
            .status()
            .as_u16()
    );
    assert_eq!(404, app.delete(&path, eve.bearer()).await.status().as_u16());

    let listed: Value = app.get("/api/files", eve.bearer()).await.json().await.unwrap();
    assert_eq!(listed["pagination"]["total"], 0);
}

#[sqlx::test]
async fn files_can_be_renamed_and_starred(pool: sqlx::PgPool) {
    let app = spawn_app(pool).await;
    let user = app.register_user().await;
    let file = upload(&app, &user, "draft.txt", b"text").await;
    let path = format!("/api/files/{}", file["id"].as_str().unwrap());

    let updated: Value = app
        .put_json(
            &path,
            user.bearer(),
            &serde_json::json!({"name": "final.txt", "starred": true}),
        )
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(updated["name"], "final.txt");
    assert_eq!(updated["is_starred"], true);

    let response = app
        .put_json(&path, user.bearer(), &serde_json::json!({"name": "a/b"}))
        .await;
    assert_eq!(400, response.status().as_u16());
}

#[sqlx::test]
async fn listing_filters_by_name(pool: sqlx::PgPool) {
    let app = spawn_app(pool).await;
    let user = app.register_user().await;

    upload(&app, &user, "holiday.jpg", b"jpg").await;
    upload(&app, &user, "taxes.pdf", b"pdf").await;

    let listed: Value = app
        .get("/api/files?q=HOLI", user.bearer())
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(listed["pagination"]["total"], 1);
    assert_eq!(listed["files"][0]["name"], "holiday.jpg");
}

#[sqlx::test]
async fn deleting_trashes_then_purges_and_reclaims_storage(pool: sqlx::PgPool) {
    let app = spawn_app(pool).await;
    let user = app.register_user().await;
    let file = upload(&app, &user, "old.txt", b"12345").await;
    let path = format!("/api/files/{}", file["id"].as_str().unwrap());

    let response = app.delete(&path, user.bearer()).await;
    assert_eq!(200, response.status().as_u16());
    let trashed: Value = response.json().await.unwrap();
    assert!(trashed["deleted_at"].is_string());

    let live: Value = app.get("/api/files", user.bearer()).await.json().await.unwrap();
    assert_eq!(live["pagination"]["total"], 0);
    let trash: Value = app
        .get("/api/files?trashed=true", user.bearer())
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(trash["pagination"]["total"], 1);

    let response = app
        .get(&format!("{}/content", path), user.bearer())
        .await;
    assert_eq!(404, response.status().as_u16());
    assert_eq!(usage(&app, &user).await["used"], 5);

    let response = app.delete(&path, user.bearer()).await;
    assert_eq!(204, response.status().as_u16());
    assert_eq!(usage(&app, &user).await["used"], 0);
    assert_eq!(404, app.get(&path, user.bearer()).await.status().as_u16());
}

#[sqlx::test]
async fn trashed_files_can_be_restored(pool: sqlx::PgPool) {
    let app = spawn_app(pool).await;
    let user = app.register_user().await;
    let file = upload(&app, &user, "keep.txt", b"keep").await;
    let path = format!("/api/files/{}", file["id"].as_str().unwrap());
    let restore = format!("{}/restore", path);
    let empty = serde_json::json!({});

    let response = app.post_json(&restore, user.bearer(), &empty).await;
    assert_eq!(400, response.status().as_u16());

    app.delete(&path, user.bearer()).await;

    let response = app
        .put_json(&path, user.bearer(), &serde_json::json!({"starred": true}))
        .await;
    assert_eq!(400, response.status().as_u16());

    let response = app.post_json(&restore, user.bearer(), &empty).await;
    assert_eq!(200, response.status().as_u16());
    let restored: Value = response.json().await.unwrap();
    assert!(restored["deleted_at"].is_null());
}
