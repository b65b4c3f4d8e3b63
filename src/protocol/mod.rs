//! Wire types of the storefront REST API.
//!
//! The API owns these formats; this crate only consumes them.
//!
//! # Submodules
//!
//! * [`auth`] - sign-in and sign-up requests and the token response
//! * [`profile`] - the "who am I" customer profile
//!
//! Field names follow the API, which mixes English (`accessToken`) and
//! Portuguese (`nome`, `telefone`) names.

pub mod auth;
pub mod profile;

pub use auth::{Credentials, Registration, TokenResponse};
pub use profile::Profile;

use crate::error::Result;
use serde::Deserialize;
use std::fmt::Debug;

/// Parses and logs JSON responses from the storefront API.
///
/// # Arguments
///
/// * `body` - Response body text to parse
/// * `origin` - Description of API endpoint for logging
///
/// # Errors
///
/// Returns error if:
/// * Response body is not valid JSON
/// * JSON structure doesn't match type `T`
///
/// # Logging
///
/// * Success: Logs parsed structure at TRACE level
/// * Parse Error: Logs raw JSON at TRACE level if valid JSON
/// * Invalid JSON: Logs error at ERROR level
pub fn json<T>(body: &str, origin: &str) -> Result<T>
where
    T: for<'de> Deserialize<'de> + Debug,
{
    match serde_json::from_str(body) {
        Ok(result) => {
            trace!("{origin}: {result:#?}");
            Ok(result)
        }
        Err(e) => {
            if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
                trace!("{origin}: {json:#?}");
            } else {
                error!("{origin}: failed parsing response ({e:?})");
            }
            Err(e.into())
        }
    }
}
