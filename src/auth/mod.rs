//! Authentication for the Urgify embedded app.
//!
//! This module spans both sides of the session-token pipeline:
//!
//! - **Client side**: [`token`] (cache, acquisition fallback chain, refresh
//!   scheduler) and [`fetch`] (the authenticated request wrapper).
//! - **Server side**: [`validator`] (syntactic bearer pre-check), [`jwt`]
//!   (session-token claims), and [`exchange`] (RFC 8693 token exchange for
//!   an Admin access token).
//! - [`hmac`]: HMAC-SHA256 helpers shared with webhook verification.

pub mod exchange;
pub mod fetch;
pub mod hmac;
pub mod jwt;
pub mod token;
pub mod validator;

mod session;

pub use session::Session;
