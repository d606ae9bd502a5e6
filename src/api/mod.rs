pub mod admin;
pub mod records;
pub mod session;

pub use admin::*;
pub use records::*;
pub use session::*;

use rocket::http::Header;
use rocket::serde::{Deserialize, Serialize};

use crate::auth::{Role, User};

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IdResponse {
    pub id: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub is_setup: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub message: String,
    pub role: Role,
    pub has_pin: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CheckAuthResponse {
    pub authenticated: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InviteTokenResponse {
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InviteStatusResponse {
    pub role: Role,
    pub valid: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: i64,
    pub email: String,
    pub role: Role,
}

impl From<User> for UserSummary {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            role: user.role,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProfileResponse {
    pub email: String,
    pub role: Role,
    pub full_name: String,
    pub school_name: String,
}

impl From<User> for ProfileResponse {
    fn from(user: User) -> Self {
        Self {
            email: user.email,
            role: user.role,
            full_name: user.full_name,
            school_name: user.school_name,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PinStatusResponse {
    pub has_pin: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PinVerifyResponse {
    pub valid: bool,
}

/// Keeps a download name to characters that are safe inside a quoted
/// `Content-Disposition` value.
pub fn sanitize_filename(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
            _ => '_',
        })
        .collect()
}

fn attachment_header(filename: &str) -> Header<'static> {
    Header::new(
        "Content-Disposition",
        format!("attachment; filename=\"{}\"", sanitize_filename(filename)),
    )
}

#[derive(Responder)]
#[response(content_type = "json")]
pub struct JsonAttachment {
    body: String,
    disposition: Header<'static>,
}

impl JsonAttachment {
    pub fn new(body: String, filename: &str) -> Self {
        Self {
            body,
            disposition: attachment_header(filename),
        }
    }
}

#[derive(Responder)]
#[response(content_type = "text/csv")]
pub struct CsvAttachment {
    body: Vec<u8>,
    disposition: Header<'static>,
}

impl CsvAttachment {
    pub fn new(body: Vec<u8>, filename: &str) -> Self {
        Self {
            body,
            disposition: attachment_header(filename),
        }
    }
}

#[get("/health")]
pub fn health() -> &'static str {
    "OK"
}
