//! Session and authentication state for storefront clients.
//!
//! The [`session::Session`] owns the bearer token of the signed-in
//! customer, decodes its [`claims`] into a provisional [`user::User`],
//! hydrates that user from the profile endpoint and ends the session when
//! the server stops accepting the token.
//!
//! Its collaborators are traits so they can be swapped out:
//! * [`gateway::AuthApi`] - the remote sign-in, sign-up and profile API
//! * [`storage::Storage`] - where tokens survive restarts
//! * [`navigation::Navigator`] - where to go when the session ends
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

#[macro_use]
extern crate log;

pub mod claims;
pub mod config;
pub mod error;
pub mod gateway;
pub mod http;
pub mod navigation;
pub mod protocol;
pub mod session;
pub mod storage;
pub mod user;
