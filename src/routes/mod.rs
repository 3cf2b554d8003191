use actix_web::error::InternalError;
use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use serde::{Deserialize, Deserializer};
use std::fmt;

pub use change_password::*;
pub use cloud_folders::*;
pub use email_send::*;
pub use emails::*;
pub use files::*;
pub use health::*;
pub use login::*;
pub use logout::*;
pub use mail_folders::*;
pub use profile::*;
pub use register::*;

mod change_password;
mod cloud_folders;
mod email_send;
mod emails;
mod files;
mod health;
mod login;
mod logout;
mod mail_folders;
mod profile;
mod register;

pub fn error_chain_fmt(err: &impl std::error::Error, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(f, "{}\n", err)?;
    let mut current = err.source();
    while let Some(cause) = current {
        writeln!(f, "Caused by:\n\t{}", cause)?;
        current = cause.source();
    }
    Ok(())
}

/// Every error leaving the API has the same `{"error": "..."}` shape.
pub fn json_error(status: StatusCode, message: &str) -> HttpResponse {
    HttpResponse::build(status).json(serde_json::json!({ "error": message }))
}

pub fn e500<T>(err: T) -> actix_web::Error
where
    T: fmt::Debug + fmt::Display + 'static,
{
    let response = json_error(StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong");
    InternalError::from_response(err, response).into()
}

pub async fn not_found() -> HttpResponse {
    json_error(
        StatusCode::NOT_FOUND,
        "The requested resource was not found",
    )
}

/// Turns user input into an `ILIKE` substring pattern.
pub fn contains_pattern(s: &str) -> String {
    let mut pattern = String::with_capacity(s.len() + 2);
    pattern.push('%');
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Lets a body tell an absent field apart from an explicit `null`.
pub fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}
