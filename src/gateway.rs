//! Remote authentication and profile API.
//!
//! [`AuthApi`] is the seam between the session and the network: the
//! [`Gateway`] talks to the storefront REST API, tests substitute their
//! own implementation.
//!
//! # Endpoints
//!
//! * `POST /auth/signin` - exchange [`Credentials`] for a [`TokenResponse`]
//! * `POST /auth/signup` - create a customer from a [`Registration`]
//! * `GET /clientes/me` - the [`Profile`] of the bearer of a token
//!
//! Non-2xx responses become [`Error`]s whose kind follows the status
//! code, so that `401` and `403` surface as rejections.

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::{
    config::Config,
    error::{Error, Result},
    http::Client as HttpClient,
    protocol::{self, Credentials, Profile, Registration, TokenResponse},
};

/// Authentication and profile calls consumed by the session.
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Signs in with `credentials`.
    async fn sign_in(&self, credentials: &Credentials) -> Result<TokenResponse>;

    /// Creates a new customer. Does not sign in.
    async fn sign_up(&self, registration: &Registration) -> Result<()>;

    /// Fetches the profile of the bearer of `token`.
    async fn me(&self, token: &str) -> Result<Profile>;
}

pub struct Gateway {
    http_client: HttpClient,
    sign_in_url: Url,
    sign_up_url: Url,
    me_url: Url,
}

/// Error body sent by the API along with non-2xx statuses.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

impl Gateway {
    const SIGN_IN_PATH: &'static str = "auth/signin";
    const SIGN_UP_PATH: &'static str = "auth/signup";
    const ME_PATH: &'static str = "clientes/me";

    /// Creates a gateway for the API configured in `config`.
    ///
    /// # Errors
    ///
    /// Will return `Err` if:
    /// - the HTTP client cannot be built
    /// - the endpoint URLs cannot be derived from the API URL
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            http_client: HttpClient::new(config)?,
            sign_in_url: config.endpoint(Self::SIGN_IN_PATH)?,
            sign_up_url: config.endpoint(Self::SIGN_UP_PATH)?,
            me_url: config.endpoint(Self::ME_PATH)?,
        })
    }

    /// Sends `request` and returns the response body of a 2xx response.
    async fn send(&self, request: reqwest::Request, origin: &str) -> Result<String> {
        let response = self.http_client.execute(request).await?;
        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            debug!("{origin}: {status}");
            return Ok(body);
        }

        let message = Self::error_message(&body);
        warn!("{origin}: {status} {message}");
        Err(Error::from_status(status, message))
    }

    /// Extracts the `message` of an error body, if it has one.
    fn error_message(body: &str) -> String {
        serde_json::from_str::<ErrorBody>(body)
            .map(|body| body.message)
            .unwrap_or_default()
    }
}

#[async_trait]
impl AuthApi for Gateway {
    async fn sign_in(&self, credentials: &Credentials) -> Result<TokenResponse> {
        let body = serde_json::to_string(credentials)?;
        let request = self
            .http_client
            .post(self.sign_in_url.clone(), body, None)?;

        let body = self.send(request, Self::SIGN_IN_PATH).await?;
        serde_json::from_str(&body).map_err(|e| {
            // Never log the body: it contains the tokens.
            error!("{}: failed parsing response ({e})", Self::SIGN_IN_PATH);
            e.into()
        })
    }

    async fn sign_up(&self, registration: &Registration) -> Result<()> {
        let body = serde_json::to_string(registration)?;
        let request = self
            .http_client
            .post(self.sign_up_url.clone(), body, None)?;

        self.send(request, Self::SIGN_UP_PATH).await.map(|_| ())
    }

    async fn me(&self, token: &str) -> Result<Profile> {
        let request = self.http_client.get(self.me_url.clone(), Some(token))?;

        let body = self.send(request, Self::ME_PATH).await?;
        if body.trim().is_empty() {
            return Err(Error::data_loss("empty profile response"));
        }
        protocol::json(&body, Self::ME_PATH)
    }
}
