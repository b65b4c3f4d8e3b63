//! HTTP client with rate limiting for the storefront API.
//!
//! This module provides a wrapper around `reqwest::Client` that adds:
//! * Request rate limiting so a misbehaving caller cannot flood the API
//! * Bearer token attachment for authenticated endpoints
//! * Consistent timeouts and headers
//!
//! # Rate Limiting
//!
//! * 20 calls per 1-second interval
//! * Allows bursts up to the maximum calls per interval
//! * Requests that would exceed the limit are delayed
//!
//! # Example
//!
//! ```rust
//! use storefront_session::http::Client;
//!
//! let client = Client::new(&config)?;
//!
//! let request = client.get(url, Some(&token));
//! let response = client.execute(request).await?;
//! ```

use std::{future::Future, num::NonZeroU32, time::Duration};

use futures_util::{FutureExt, TryFutureExt};
use governor::{DefaultDirectRateLimiter, Quota};
use reqwest::{
    self,
    header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, AUTHORIZATION, CONTENT_TYPE},
    Body, Method, Url,
};

use crate::{config::Config, error::Result};

/// HTTP client with built-in rate limiting.
pub struct Client {
    /// Direct access to the underlying client without rate limiting.
    pub unlimited: reqwest::Client,

    rate_limiter: DefaultDirectRateLimiter,
}

impl Client {
    /// Rolling window in which at most `RATE_LIMIT_CALLS_PER_INTERVAL`
    /// requests are sent.
    const RATE_LIMIT_INTERVAL: Duration = Duration::from_secs(1);

    const RATE_LIMIT_CALLS_PER_INTERVAL: u8 = 20;

    /// Duration to keep idle connections alive.
    const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(60);

    /// Upper bound for a complete request, including the response body.
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    /// `Content-Type` of every request body sent to the API.
    const JSON_CONTENT: &'static str = "application/json";

    /// Creates a new client.
    ///
    /// # Errors
    ///
    /// Returns error if HTTP client creation fails.
    ///
    /// # Panics
    ///
    /// Panics if rate limit parameters are zero.
    pub fn new(config: &Config) -> Result<Self> {
        // Not having `Accept-Language` set is non-fatal.
        let mut headers = HeaderMap::new();
        if let Ok(lang) = HeaderValue::from_str(&config.app_lang) {
            headers.insert(ACCEPT_LANGUAGE, lang);
        }
        headers.insert(ACCEPT, HeaderValue::from_static(Self::JSON_CONTENT));

        let http_client = reqwest::Client::builder()
            .tcp_keepalive(Self::KEEPALIVE_TIMEOUT)
            .timeout(Self::REQUEST_TIMEOUT)
            .default_headers(headers)
            .user_agent(&config.user_agent);

        let replenish_interval =
            Self::RATE_LIMIT_INTERVAL / u32::from(Self::RATE_LIMIT_CALLS_PER_INTERVAL);
        let quota = Quota::with_period(replenish_interval)
            .expect("quota time interval is zero")
            .allow_burst(
                NonZeroU32::new(Self::RATE_LIMIT_CALLS_PER_INTERVAL.into())
                    .expect("calls per interval is zero"),
            );

        Ok(Self {
            unlimited: http_client.build()?,
            rate_limiter: governor::RateLimiter::direct(quota),
        })
    }

    /// Builds a request with specified method, URL and optional JSON body.
    ///
    /// When `token` is set, it is attached as a bearer `Authorization`
    /// header.
    ///
    /// # Errors
    ///
    /// Returns error if the token is not a valid header value.
    pub fn request<U>(
        &self,
        method: Method,
        url: U,
        body: Option<String>,
        token: Option<&str>,
    ) -> Result<reqwest::Request>
    where
        U: Into<Url>,
    {
        let mut request = reqwest::Request::new(method, url.into());

        if let Some(body) = body {
            request
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static(Self::JSON_CONTENT));
            *request.body_mut() = Some(Body::from(body));
        }

        if let Some(token) = token {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))?;
            value.set_sensitive(true);
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        Ok(request)
    }

    /// Builds a POST request with a JSON body.
    ///
    /// # Errors
    ///
    /// See [`Client::request`].
    pub fn post<U>(&self, url: U, body: String, token: Option<&str>) -> Result<reqwest::Request>
    where
        U: Into<Url>,
    {
        self.request(Method::POST, url, Some(body), token)
    }

    /// Builds a GET request.
    ///
    /// # Errors
    ///
    /// See [`Client::request`].
    pub fn get<U>(&self, url: U, token: Option<&str>) -> Result<reqwest::Request>
    where
        U: Into<Url>,
    {
        self.request(Method::GET, url, None, token)
    }

    /// Executes a request with rate limiting.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// * Request execution fails
    /// * Network error occurs
    pub fn execute(
        &self,
        request: reqwest::Request,
    ) -> impl Future<Output = Result<reqwest::Response>> + '_ {
        // No need to await with jitter because the level of concurrency is low.
        let throttle = self.rate_limiter.until_ready();
        throttle.then(|()| self.unlimited.execute(request).map_err(Into::into))
    }
}
