use fake::faker::name::en::Name;
use fake::Fake;
use once_cell::sync::Lazy;
use serde_json::Value;
use sqlx::PgPool;
use tau::configuration::{get_configuration, Settings};
use tau::delivery_worker::{try_execute_task, ExecutionOutcome};
use tau::relay;
use tau::startup::Application;
use tau::telemetry;
use uuid::Uuid;
use wiremock::MockServer;

static TRACING: Lazy<()> = Lazy::new(|| {
    let default_filter_level = "info".into();
    let subscriber_name = "test".into();

    if std::env::var("TEST_LOG").is_ok() {
        let subscriber =
            telemetry::get_subscriber(subscriber_name, default_filter_level, std::io::stdout);
        telemetry::init_subscriber(subscriber);
    } else {
        let subscriber =
            telemetry::get_subscriber(subscriber_name, default_filter_level, std::io::sink);
        telemetry::init_subscriber(subscriber);
    }
});

pub struct TestUser {
    pub id: Uuid,
    pub email: String,
    pub password: String,
    pub name: String,
    pub token: String,
}

impl TestUser {
    pub fn generate() -> Self {
        Self {
            id: Uuid::nil(),
            email: format!("{}@tauos.org", Uuid::new_v4()),
            password: Uuid::new_v4().to_string(),
            name: Name().fake(),
            token: String::new(),
        }
    }

    pub fn bearer(&self) -> &str {
        &self.token
    }
}

pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub pool: PgPool,
    pub relay_server: MockServer,
    pub relay_client: relay::Client,
    pub api_client: reqwest::Client,
}

impl TestApp {
    fn url(&self, path: &str) -> String {
        format!("{}{}", &self.address, path)
    }

    pub async fn get(&self, path: &str, token: &str) -> reqwest::Response {
        self.api_client
            .get(&self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn get_anonymous(&self, path: &str) -> reqwest::Response {
        self.api_client
            .get(&self.url(path))
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn post_json<Body>(&self, path: &str, token: &str, body: &Body) -> reqwest::Response
    where
        Body: serde::Serialize,
    {
        self.api_client
            .post(&self.url(path))
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn post_anonymous<Body>(&self, path: &str, body: &Body) -> reqwest::Response
    where
        Body: serde::Serialize,
    {
        self.api_client
            .post(&self.url(path))
            .json(body)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn put_json<Body>(&self, path: &str, token: &str, body: &Body) -> reqwest::Response
    where
        Body: serde::Serialize,
    {
        self.api_client
            .put(&self.url(path))
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn patch_json<Body>(&self, path: &str, token: &str, body: &Body) -> reqwest::Response
    where
        Body: serde::Serialize,
    {
        self.api_client
            .patch(&self.url(path))
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn delete(&self, path: &str, token: &str) -> reqwest::Response {
        self.api_client
            .delete(&self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn post_register(&self, user: &TestUser) -> reqwest::Response {
        self.post_anonymous(
            "/api/auth/register",
            &serde_json::json!({
                "email": user.email,
                "password": user.password,
                "name": user.name,
            }),
        )
        .await
    }

    pub async fn post_login(&self, email: &str, password: &str) -> reqwest::Response {
        self.post_anonymous(
            "/api/auth/login",
            &serde_json::json!({
                "email": email,
                "password": password,
            }),
        )
        .await
    }

    /// Registers a fresh user and keeps the token handed back.
    pub async fn register_user(&self) -> TestUser {
        let mut user = TestUser::generate();

        let response = self.post_register(&user).await;
        assert_eq!(201, response.status().as_u16());

        let body: Value = response.json().await.expect("Invalid register response");
        user.token = body["token"].as_str().expect("No token").to_string();
        user.id = body["user"]["id"]
            .as_str()
            .and_then(|id| id.parse().ok())
            .expect("No user id");

        user
    }

    pub async fn send_email(&self, sender: &TestUser, to: &str, subject: &str) -> Value {
        let response = self
            .post_json(
                "/api/emails",
                sender.bearer(),
                &serde_json::json!({
                    "to": to,
                    "subject": subject,
                    "body": "Hello there",
                }),
            )
            .await;
        assert_eq!(201, response.status().as_u16());

        response.json().await.expect("Invalid send response")
    }

    pub async fn upload_file(
        &self,
        owner: &TestUser,
        name: &str,
        content: &'static [u8],
    ) -> reqwest::Response {
        self.api_client
            .post(&self.url("/api/files"))
            .query(&[("name", name)])
            .bearer_auth(owner.bearer())
            .header("Content-Type", "application/octet-stream")
            .body(content)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn dispatch_all_pending_emails(&self) {
        loop {
            if let ExecutionOutcome::EmptyQueue = try_execute_task(&self.pool, &self.relay_client)
                .await
                .expect("Failed to execute delivery task")
            {
                break;
            }
        }
    }
}

pub async fn spawn_app(pool: PgPool) -> TestApp {
    spawn_app_with(pool, |_| {}).await
}

pub async fn spawn_app_with<F>(pool: PgPool, customise: F) -> TestApp
where
    F: FnOnce(&mut Settings),
{
    Lazy::force(&TRACING);

    let relay_server = MockServer::start().await;

    let configuration = {
        let mut c = get_configuration().expect("Failed to read configuration");
        c.application.port = 0;
        c.relay.base_url = relay_server.uri();
        c.tokens.cleanup_enabled = false;
        customise(&mut c);
        c
    };

    let relay_client = configuration
        .relay
        .client()
        .expect("Failed to build the relay client");

    let app = Application::build_with_pool(configuration, pool)
        .await
        .expect("Failed to build application");

    let port = app.port();
    let address = format!("http://127.0.0.1:{}", port);
    let pool = app.pool.clone();

    let _ = tokio::spawn(app.run_until_stopped());

    TestApp {
        address,
        port,
        pool,
        relay_server,
        relay_client,
        api_client: reqwest::Client::new(),
    }
}
