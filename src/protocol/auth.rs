//! Sign-in and sign-up types.
//!
//! # Example Exchange
//!
//! `POST /auth/signin`:
//!
//! ```json
//! { "email": "jane@x.com", "password": "secret" }
//! ```
//!
//! Response:
//!
//! ```json
//! {
//!     "accessToken": "eyJhbGciOi...",
//!     "refreshToken": "eyJhbGciOi...",
//!     "username": "jane@x.com"
//! }
//! ```
//!
//! `POST /auth/signup` takes a [`Registration`] and answers with an empty
//! 2xx response.

use serde::{Deserialize, Serialize};
use veil::Redact;

/// Login credentials.
///
/// Both fields are expected to be validated as non-empty before they get
/// here; the API rejects anything else.
#[derive(Clone, Eq, PartialEq, Serialize, Redact, Hash)]
pub struct Credentials {
    pub email: String,

    #[redact]
    pub password: String,
}

impl Credentials {
    #[must_use]
    pub fn new(email: &str, password: &str) -> Self {
        Self {
            email: email.trim().to_owned(),
            password: password.to_owned(),
        }
    }
}

/// Customer sign-up payload.
#[derive(Clone, Eq, PartialEq, Serialize, Redact, Hash)]
pub struct Registration {
    #[serde(rename = "nome")]
    pub name: String,

    pub email: String,

    #[serde(rename = "senha")]
    #[redact]
    pub password: String,

    /// Digits only.
    #[redact(partial)]
    pub cpf: String,

    /// Digits only.
    #[serde(rename = "telefone")]
    #[redact(partial)]
    pub phone: String,
}

impl Registration {
    /// Creates a sign-up payload. Punctuation in `cpf` and `phone`, as
    /// typed in masks like `000.000.000-00` and `(00) 00000-0000`, is
    /// stripped.
    #[must_use]
    pub fn new(name: &str, email: &str, password: &str, cpf: &str, phone: &str) -> Self {
        let digits = |s: &str| s.chars().filter(char::is_ascii_digit).collect::<String>();

        Self {
            name: name.trim().to_owned(),
            email: email.trim().to_owned(),
            password: password.to_owned(),
            cpf: digits(cpf),
            phone: digits(phone),
        }
    }
}

/// Tokens issued on successful sign-in.
#[derive(Clone, Eq, PartialEq, Deserialize, Redact, Hash)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    #[redact]
    pub access_token: String,

    #[redact]
    pub refresh_token: String,

    pub username: String,
}
