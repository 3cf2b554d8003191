use crate::authentication::{reject_anonymous_users, JwtKeys};
use crate::configuration::{DatabaseSettings, Settings};
use crate::revocation::{self, CleanupConfig};
use crate::routes::{self, json_error};
use actix_web::dev::Server;
use actix_web::error::InternalError;
use actix_web::http::StatusCode;
use actix_web::{web, App, HttpServer};
use actix_web_lab::middleware::from_fn;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::net::TcpListener;
use std::time::Duration;
use tracing_actix_web::TracingLogger;

/// Storage limit given to newly registered users, in bytes.
#[derive(Debug, Clone, Copy)]
pub struct DefaultQuota(pub i64);

/// Largest accepted upload body, in bytes.
#[derive(Debug, Clone, Copy)]
pub struct UploadLimit(pub usize);

pub struct Application {
    port: u16,
    pub pool: PgPool,
    server: Server,
}

impl Application {
    pub async fn build(configuration: Settings) -> Result<Self, anyhow::Error> {
        let pool = get_connection_pool(&configuration.database);

        Application::build_with_pool(configuration, pool).await
    }

    pub async fn build_with_pool(
        configuration: Settings,
        pool: PgPool,
    ) -> Result<Self, anyhow::Error> {
        let jwt_keys = JwtKeys::new(
            &configuration.application.jwt_secret,
            configuration.application.token_ttl(),
        );

        revocation::spawn_cleanup(
            pool.clone(),
            CleanupConfig::new(
                configuration.tokens.cleanup_enabled,
                configuration.tokens.cleanup_interval(),
            ),
        );

        let listener = TcpListener::bind(&format!(
            "{}:{}",
            configuration.application.host, configuration.application.port
        ))?;
        let port = listener.local_addr()?.port();

        let server = run(
            listener,
            pool.clone(),
            jwt_keys,
            DefaultQuota(configuration.storage.default_quota_bytes),
            UploadLimit(configuration.storage.max_upload_bytes),
        )?;

        Ok(Self { port, pool, server })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped(self) -> Result<(), std::io::Error> {
        self.server.await
    }
}

pub fn get_connection_pool(configuration: &DatabaseSettings) -> PgPool {
    PgPoolOptions::new()
        .acquire_timeout(Duration::from_secs(2))
        .connect_lazy_with(configuration.with_db())
}

fn bad_request<E>(err: E) -> actix_web::Error
where
    E: std::fmt::Debug + std::fmt::Display + 'static,
{
    let response = json_error(StatusCode::BAD_REQUEST, &err.to_string());
    InternalError::from_response(err, response).into()
}

fn run(
    listener: TcpListener,
    pool: PgPool,
    jwt_keys: JwtKeys,
    default_quota: DefaultQuota,
    upload_limit: UploadLimit,
) -> Result<Server, std::io::Error> {
    let pool = web::Data::new(pool);
    let jwt_keys = web::Data::new(jwt_keys);
    let default_quota = web::Data::new(default_quota);
    let upload_limit = web::Data::new(upload_limit);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .app_data(web::JsonConfig::default().error_handler(|err, _req| bad_request(err)))
            .app_data(web::QueryConfig::default().error_handler(|err, _req| bad_request(err)))
            .app_data(web::PathConfig::default().error_handler(|err, _req| {
                let response =
                    json_error(StatusCode::NOT_FOUND, "The requested resource was not found");
                InternalError::from_response(err, response).into()
            }))
            .route("/health_check", web::get().to(routes::health_check))
            .service(
                web::scope("/api")
                    .route("/health", web::get().to(routes::api_health))
                    .route("/auth/register", web::post().to(routes::register))
                    .route("/auth/login", web::post().to(routes::login))
                    .service(
                        web::scope("")
                            .wrap(from_fn(reject_anonymous_users))
                            .route("/auth/logout", web::post().to(routes::logout))
                            .route("/auth/me", web::get().to(routes::profile))
                            .route("/auth/password", web::put().to(routes::change_password))
                            .service(
                                web::resource("/emails")
                                    .route(web::get().to(routes::list_emails))
                                    .route(web::post().to(routes::send_email)),
                            )
                            .route("/emails/stats", web::get().to(routes::email_stats))
                            .service(
                                web::resource("/emails/{id}")
                                    .route(web::get().to(routes::get_email))
                                    .route(web::patch().to(routes::update_email))
                                    .route(web::delete().to(routes::delete_email)),
                            )
                            .service(
                                web::resource("/mail/folders")
                                    .route(web::get().to(routes::list_mail_folders))
                                    .route(web::post().to(routes::create_mail_folder)),
                            )
                            .route(
                                "/mail/folders/{name}",
                                web::delete().to(routes::delete_mail_folder),
                            )
                            .service(
                                web::resource("/files")
                                    .route(web::get().to(routes::list_files))
                                    .route(web::post().to(routes::upload_file)),
                            )
                            .service(
                                web::resource("/files/{id}")
                                    .route(web::get().to(routes::get_file))
                                    .route(web::put().to(routes::update_file))
                                    .route(web::delete().to(routes::delete_file)),
                            )
                            .route("/files/{id}/content", web::get().to(routes::download_file))
                            .route("/files/{id}/restore", web::post().to(routes::restore_file))
                            .route("/cloud/usage", web::get().to(routes::cloud_usage))
                            .service(
                                web::resource("/cloud/folders")
                                    .route(web::get().to(routes::list_cloud_folders))
                                    .route(web::post().to(routes::create_cloud_folder)),
                            )
                            .route(
                                "/cloud/folders/{id}",
                                web::delete().to(routes::delete_cloud_folder),
                            ),
                    ),
            )
            .default_service(web::route().to(routes::not_found))
            .app_data(pool.clone())
            .app_data(jwt_keys.clone())
            .app_data(default_quota.clone())
            .app_data(upload_limit.clone())
    })
    .listen(listener)?
    .run();

    Ok(server)
}
