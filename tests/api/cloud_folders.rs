use crate::helpers::{spawn_app, TestApp, TestUser};
use serde_json::Value;

async fn create_folder(
    app: &TestApp,
    owner: &TestUser,
    name: &str,
    parent_id: Option<&str>,
) -> reqwest::Response {
    app.post_json(
        "/api/cloud/folders",
        owner.bearer(),
        &serde_json::json!({ "name": name, "parent_id": parent_id }),
    )
    .await
}

async fn folder_id(response: reqwest::Response) -> String {
    assert_eq!(201, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    body["id"].as_str().unwrap().to_string()
}

#[sqlx::test]
async fn folders_nest_under_their_parent(pool: sqlx::PgPool) {
    let app = spawn_app(pool).await;
    let user = app.register_user().await;

    let photos = folder_id(create_folder(&app, &user, "Photos", None).await).await;
    folder_id(create_folder(&app, &user, "2022", Some(&photos)).await).await;

    let root: Value = app
        .get("/api/cloud/folders", user.bearer())
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(root["folders"].as_array().unwrap().len(), 1);
    assert_eq!(root["folders"][0]["name"], "Photos");

    let children: Value = app
        .get(&format!("/api/cloud/folders?parent_id={}", photos), user.bearer())
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(children["folders"].as_array().unwrap().len(), 1);
    assert_eq!(children["folders"][0]["name"], "2022");
    assert_eq!(children["folders"][0]["parent_id"], photos.as_str());
}

#[sqlx::test]
async fn duplicate_names_under_the_same_parent_conflict(pool: sqlx::PgPool) {
    let app = spawn_app(pool).await;
    let user = app.register_user().await;

    let docs = folder_id(create_folder(&app, &user, "Docs", None).await).await;
    let response = create_folder(&app, &user, "Docs", None).await;
    assert_eq!(409, response.status().as_u16());

    folder_id(create_folder(&app, &user, "Docs", Some(&docs)).await).await;
}

#[sqlx::test]
async fn an_unknown_parent_is_rejected(pool: sqlx::PgPool) {
    let app = spawn_app(pool).await;
    let alice = app.register_user().await;
    let eve = app.register_user().await;

    let private = folder_id(create_folder(&app, &alice, "Private", None).await).await;

    let response = create_folder(&app, &eve, "Inside", Some(&private)).await;
    assert_eq!(400, response.status().as_u16());
}

#[sqlx::test]
async fn only_empty_folders_can_be_deleted(pool: sqlx::PgPool) {
    let app = spawn_app(pool).await;
    let user = app.register_user().await;

    let folder = folder_id(create_folder(&app, &user, "Music", None).await).await;
    let path = format!("/api/cloud/folders/{}", folder);

    let response = app
        .api_client
        .post(&format!("{}/api/files", app.address))
        .query(&[("name", "song.mp3"), ("folder_id", folder.as_str())])
        .bearer_auth(user.bearer())
        .body(&b"ID3"[..])
        .send()
        .await
        .unwrap();
    assert_eq!(201, response.status().as_u16());
    let file: Value = response.json().await.unwrap();
    let file_path = format!("/api/files/{}", file["id"].as_str().unwrap());

    let response = app.delete(&path, user.bearer()).await;
    assert_eq!(409, response.status().as_u16());

    app.delete(&file_path, user.bearer()).await;

    let response = app.delete(&path, user.bearer()).await;
    assert_eq!(204, response.status().as_u16());

    let trashed: Value = app.get(&file_path, user.bearer()).await.json().await.unwrap();
    assert!(trashed["folder_id"].is_null());

    let response = app.delete(&path, user.bearer()).await;
    assert_eq!(404, response.status().as_u16());
}

#[sqlx::test]
async fn files_can_move_between_folders(pool: sqlx::PgPool) {
    let app = spawn_app(pool).await;
    let user = app.register_user().await;

    let folder = folder_id(create_folder(&app, &user, "Inbox scans", None).await).await;
    let response = app.upload_file(&user, "scan.png", b"png").await;
    let file: Value = response.json().await.unwrap();
    let file_path = format!("/api/files/{}", file["id"].as_str().unwrap());

    let moved: Value = app
        .put_json(&file_path, user.bearer(), &serde_json::json!({ "folder_id": folder }))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(moved["folder_id"], folder.as_str());

    let in_folder: Value = app
        .get(&format!("/api/files?folder_id={}", folder), user.bearer())
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(in_folder["pagination"]["total"], 1);

    let moved: Value = app
        .put_json(&file_path, user.bearer(), &serde_json::json!({ "folder_id": null }))
        .await
        .json()
        .await
        .unwrap();
    assert!(moved["folder_id"].is_null());
}
