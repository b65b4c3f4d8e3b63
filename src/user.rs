//! The authenticated identity as known to the client.
//!
//! A [`User`] starts out provisional, built from bearer token claims, and
//! is later enriched by the profile endpoint. Both enrichment and local
//! edits go through [`UserUpdate`], a partial record whose
//! [`User::merge`] rule is the same for every field: a value that is
//! present wins, an absent value keeps what is there.

use std::{collections::BTreeSet, fmt, num::ParseIntError, str::FromStr};

use serde::Deserialize;
use url::Url;

use crate::protocol::Profile;

/// Path, relative to the API base, under which uploaded files are served.
const DOWNLOAD_PATH: &str = "arquivos/download";

/// Numeric customer identifier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl FromStr for UserId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub email: String,

    /// Display name; the local part of `email` when nothing better is
    /// known.
    pub name: String,

    /// Authorization tags such as `ROLE_ADMIN`.
    pub roles: BTreeSet<String>,

    pub cpf: Option<String>,
    pub phone: Option<String>,

    /// Absolute URL of the profile photo.
    pub avatar: Option<String>,
}

/// Partial [`User`] record.
///
/// `roles` can only be set by [`UserUpdate::from_profile`]: the server is
/// the only authority for authorization tags.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UserUpdate {
    pub id: Option<UserId>,
    pub email: Option<String>,
    pub name: Option<String>,
    pub cpf: Option<String>,
    pub phone: Option<String>,
    pub avatar: Option<String>,
    roles: Option<BTreeSet<String>>,
}

/// Returns the part of an e-mail address before the `@`.
#[must_use]
pub fn local_part(email: &str) -> &str {
    email.split('@').next().unwrap_or(email)
}

impl User {
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    #[must_use]
    pub fn has_any_role<I, S>(&self, roles: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        roles.into_iter().any(|role| self.has_role(role.as_ref()))
    }

    /// Applies `update` on top of this user.
    ///
    /// Every field present in `update` replaces the current value; every
    /// absent field is kept.
    #[must_use]
    pub fn merge(self, update: UserUpdate) -> Self {
        Self {
            id: update.id.unwrap_or(self.id),
            email: update.email.unwrap_or(self.email),
            name: update.name.unwrap_or(self.name),
            roles: update.roles.unwrap_or(self.roles),
            cpf: update.cpf.or(self.cpf),
            phone: update.phone.or(self.phone),
            avatar: update.avatar.or(self.avatar),
        }
    }
}

impl UserUpdate {
    /// Maps a profile response onto a partial user.
    ///
    /// Photo references that are bare file names are turned into download
    /// URLs under `api_url`; absolute `http(s)` URLs are kept as they are.
    #[must_use]
    pub fn from_profile(profile: Profile, api_url: &Url) -> Self {
        let avatar = profile.photo().map(|photo| avatar_url(photo, api_url));

        Self {
            id: profile.id,
            email: profile.email,
            name: profile.name,
            cpf: profile.cpf,
            phone: profile.phone,
            avatar,
            roles: profile.roles.map(|roles| roles.into_iter().collect()),
        }
    }

    /// Whether this update would change nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    #[must_use]
    pub fn with_avatar(mut self, avatar: impl Into<String>) -> Self {
        self.avatar = Some(avatar.into());
        self
    }

    #[must_use]
    pub fn roles(&self) -> Option<&BTreeSet<String>> {
        self.roles.as_ref()
    }
}

fn avatar_url(photo: &str, api_url: &Url) -> String {
    if photo.starts_with("http") {
        return photo.to_owned();
    }

    format!(
        "{}/{DOWNLOAD_PATH}/{photo}",
        api_url.as_str().trim_end_matches('/')
    )
}
