//! Customer profile returned by `GET /clientes/me`.
//!
//! # Example Response
//!
//! ```json
//! {
//!     "id": 42,
//!     "nome": "Jane Doe",
//!     "email": "jane@x.com",
//!     "cpf": "12345678909",
//!     "telefone": "11987654321",
//!     "fotoUrl": "a1b2c3.png",
//!     "roles": ["ROLE_USER"]
//! }
//! ```
//!
//! Every field is optional: older DTOs send the photo as `avatar`, newer
//! ones as `fotoUrl`, and `roles` is only present on some deployments.

use serde::Deserialize;
use serde_with::{serde_as, DisplayFromStr, PickFirst};
use veil::Redact;

use crate::user::UserId;

#[serde_as]
#[derive(Clone, Default, Eq, PartialEq, Deserialize, Redact)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub id: Option<UserId>,

    pub email: Option<String>,

    #[serde(rename = "nome")]
    pub name: Option<String>,

    #[redact(partial)]
    pub cpf: Option<String>,

    #[serde(rename = "telefone")]
    #[redact(partial)]
    pub phone: Option<String>,

    pub avatar: Option<String>,

    pub foto_url: Option<String>,

    pub roles: Option<Vec<String>>,
}

impl Profile {
    /// The photo reference, preferring `avatar` over `fotoUrl`.
    ///
    /// Empty strings count as absent.
    #[must_use]
    pub fn photo(&self) -> Option<&str> {
        [&self.avatar, &self.foto_url]
            .into_iter()
            .filter_map(Option::as_deref)
            .find(|photo| !photo.is_empty())
    }
}
