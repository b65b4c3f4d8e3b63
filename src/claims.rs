//! Bearer token claim decoding.
//!
//! Access tokens are JWTs: three period-separated segments of which the
//! second is the base64url-encoded JSON claim set. The signature is not
//! verified here; the server does that on every request. The client only
//! reads the claims to know who it is talking as.
//!
//! # Claim Set
//!
//! ```json
//! {
//!     "sub": "jane@x.com",
//!     "id": 42,
//!     "name": "Jane",
//!     "roles": ["ROLE_USER", "ROLE_ADMIN"],
//!     "exp": 1767225600
//! }
//! ```
//!
//! `name` and `roles` are optional. Unknown claims are ignored.

use base64::{
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    Engine,
};
use serde::Deserialize;
use serde_with::{serde_as, DefaultOnNull, DisplayFromStr, PickFirst};
use thiserror::Error;

use crate::{
    error::Error,
    user::{local_part, User, UserId},
};

/// Base64url with optional padding, as issued by the common JWT libraries.
const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Error, Debug)]
pub enum MalformedTokenError {
    #[error("token should have 3 segments but has {0}")]
    Segments(usize),

    #[error("token payload is not base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("token payload is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("token claims are invalid: {0}")]
    Claims(#[from] serde_json::Error),

    #[error("token has an empty subject")]
    EmptySubject,
}

/// A malformed token is as good as no credentials at all.
impl From<MalformedTokenError> for Error {
    fn from(e: MalformedTokenError) -> Self {
        Self::unauthenticated(e)
    }
}

#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Claims {
    /// Subject: the user's e-mail address.
    pub sub: String,

    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub id: UserId,

    #[serde(default)]
    pub name: Option<String>,

    /// Missing and `null` both mean no roles.
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Decodes the claims of `token`.
///
/// # Errors
///
/// Returns [`MalformedTokenError`] if the token does not have three
/// segments, if the payload is not base64url, not UTF-8 or not a claim set
/// with at least a subject and an id.
pub fn decode(token: &str) -> Result<Claims, MalformedTokenError> {
    let segments: Vec<&str> = token.trim().split('.').collect();
    let &[_, payload, _] = segments.as_slice() else {
        return Err(MalformedTokenError::Segments(segments.len()));
    };

    // Tolerate tokens that were re-encoded with the standard alphabet.
    let payload = payload.replace('+', "-").replace('/', "_");
    let bytes = PAYLOAD_ENGINE.decode(payload)?;

    // Validate as UTF-8 before parsing so that non-ASCII claims survive
    // intact and invalid sequences are reported as such.
    let text = String::from_utf8(bytes)?;
    let claims: Claims = serde_json::from_str(&text)?;

    if claims.sub.trim().is_empty() {
        return Err(MalformedTokenError::EmptySubject);
    }

    Ok(claims)
}

impl Claims {
    /// Builds the provisional user these claims describe.
    #[must_use]
    pub fn into_user(self) -> User {
        let name = self
            .name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| local_part(&self.sub).to_owned());

        User {
            id: self.id,
            name,
            email: self.sub,
            roles: self.roles.into_iter().collect(),
            cpf: None,
            phone: None,
            avatar: None,
        }
    }
}

/// Decodes `token` straight into a provisional [`User`].
///
/// # Errors
///
/// See [`decode`].
pub fn user_from_token(token: &str) -> Result<User, MalformedTokenError> {
    decode(token).map(Claims::into_user)
}
