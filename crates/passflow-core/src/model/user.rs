//! Usuario tal como lo ven los stages y las políticas.
//!
//! El core no es dueño del modelo de usuarios: lo obtiene de un
//! `UserDirectory`. Aquí sólo vive la forma neutral intercambiada.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserField {
    Username,
    Email,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OtpAlgorithm {
    Sha1,
    Sha256,
    Sha512,
}

impl OtpAlgorithm {
    pub fn uri_name(self) -> &'static str {
        match self {
            OtpAlgorithm::Sha1 => "SHA1",
            OtpAlgorithm::Sha256 => "SHA256",
            OtpAlgorithm::Sha512 => "SHA512",
        }
    }
}

/// Device TOTP confirmado de un usuario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TotpDevice {
    /// Secreto en hex.
    pub secret: String,
    pub digits: u32,
    pub period: u64,
    pub algorithm: OtpAlgorithm,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub name: String,
    pub is_active: bool,
    /// Hash bcrypt; `None` si el usuario no tiene contraseña utilizable.
    pub password_hash: Option<String>,
    pub password_changed: DateTime<Utc>,
    pub groups: Vec<String>,
    pub totp_device: Option<TotpDevice>,
    pub static_tokens: Vec<String>,
}

impl User {
    pub fn new(username: impl Into<String>, email: impl Into<String>) -> Self {
        Self { id: Uuid::new_v4(),
               username: username.into(),
               email: email.into(),
               name: String::new(),
               is_active: true,
               password_hash: None,
               password_changed: Utc::now(),
               groups: Vec::new(),
               totp_device: None,
               static_tokens: Vec::new() }
    }

    pub fn field(&self, field: UserField) -> &str {
        match field {
            UserField::Username => &self.username,
            UserField::Email => &self.email,
        }
    }

    pub fn has_otp_device(&self) -> bool {
        self.totp_device.is_some() || !self.static_tokens.is_empty()
    }
}
