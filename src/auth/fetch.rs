//! The authenticated request wrapper.
//!
//! Every request the embedded admin UI sends back to the app goes through
//! [`AuthenticatedClient::fetch`], which resolves a session token (explicit
//! override, then cache, then the full acquisition chain), attaches it as
//! `Authorization: Bearer <token>`, and serializes the body with the
//! matching `Content-Type`. A request is never sent without a token.

use crate::auth::token::{AcquireError, SessionToken, TokenAcquirer};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Method;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Errors produced by [`AuthenticatedClient::fetch`].
#[derive(Debug, Error)]
pub enum FetchError {
    /// No session token could be resolved; the request was not sent.
    #[error("Session token unavailable; request was not sent")]
    SessionTokenUnavailable,

    /// A header name or value was not valid HTTP.
    #[error("Invalid header '{name}'")]
    InvalidHeader {
        /// The offending header name.
        name: String,
    },

    /// The underlying transport failed.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

/// A single part of a multipart form body.
#[derive(Debug, Clone)]
pub enum FormPart {
    /// A plain text field.
    Text {
        /// Field name.
        name: String,
        /// Field value.
        value: String,
    },
    /// A file field.
    File {
        /// Field name.
        name: String,
        /// File name reported to the server.
        file_name: String,
        /// MIME type of the file.
        content_type: String,
        /// Raw file bytes.
        data: Vec<u8>,
    },
}

/// Request body variants, each serialized with its matching `Content-Type`.
#[derive(Debug, Clone, Default)]
pub enum FetchBody {
    /// No body.
    #[default]
    None,
    /// JSON body (`application/json`).
    Json(serde_json::Value),
    /// Form-encoded body (`application/x-www-form-urlencoded`).
    Form(Vec<(String, String)>),
    /// Multipart form body (`multipart/form-data`).
    Multipart(Vec<FormPart>),
    /// Raw bytes passed through unmodified, with an optional content type.
    Bytes {
        /// Content type to send, if any.
        content_type: Option<String>,
        /// The raw body.
        data: Vec<u8>,
    },
}

/// Options for a single authenticated fetch.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// HTTP method; defaults to GET.
    pub method: Method,
    /// Extra headers merged into the request.
    pub headers: HashMap<String, String>,
    /// The request body.
    pub body: FetchBody,
    /// Caller-supplied token override, freshest possible value.
    pub session_token: Option<SessionToken>,
}

impl FetchOptions {
    /// Options for a GET request with no body.
    #[must_use]
    pub fn get() -> Self {
        Self::default()
    }

    /// Options for a POST request with the given body.
    #[must_use]
    pub fn post(body: FetchBody) -> Self {
        Self {
            method: Method::POST,
            body,
            ..Self::default()
        }
    }

    /// Sets an explicit session token for this request only.
    #[must_use]
    pub fn with_session_token(mut self, token: SessionToken) -> Self {
        self.session_token = Some(token);
        self
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// HTTP client that guarantees every outbound request carries a bearer
/// session token.
///
/// # Token Resolution
///
/// 1. the explicit `session_token` in [`FetchOptions`],
/// 2. the acquirer's cache,
/// 3. the acquirer's full fallback chain (a success here is persisted back
///    to the cache so sibling requests benefit).
///
/// Exhaustion fails fast with [`FetchError::SessionTokenUnavailable`]
/// before any network I/O.
pub struct AuthenticatedClient {
    client: reqwest::Client,
    acquirer: Arc<TokenAcquirer>,
}

impl AuthenticatedClient {
    /// Creates a client around the given acquirer.
    #[must_use]
    pub fn new(acquirer: Arc<TokenAcquirer>) -> Self {
        Self {
            client: reqwest::Client::new(),
            acquirer,
        }
    }

    /// Sends an authenticated request.
    ///
    /// # Errors
    ///
    /// - [`FetchError::SessionTokenUnavailable`] if no token could be
    ///   resolved (the request is not sent)
    /// - [`FetchError::InvalidHeader`] for malformed caller headers
    /// - [`FetchError::Network`] for transport failures
    pub async fn fetch(
        &self,
        url: &str,
        options: FetchOptions,
    ) -> Result<reqwest::Response, FetchError> {
        let token = self.resolve_token(options.session_token).await?;

        let mut headers = HeaderMap::new();
        for (name, value) in &options.headers {
            let header_name =
                HeaderName::try_from(name.as_str()).map_err(|_| FetchError::InvalidHeader {
                    name: name.clone(),
                })?;
            let header_value =
                HeaderValue::try_from(value.as_str()).map_err(|_| FetchError::InvalidHeader {
                    name: name.clone(),
                })?;
            headers.insert(header_name, header_value);
        }

        let bearer = format!("Bearer {}", token.as_ref());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::try_from(bearer).map_err(|_| FetchError::InvalidHeader {
                name: "Authorization".to_string(),
            })?,
        );

        let mut request = self.client.request(options.method, url).headers(headers);
        request = match options.body {
            FetchBody::None => request,
            FetchBody::Json(value) => request.json(&value),
            FetchBody::Form(fields) => {
                let encoded = encode_form(&fields);
                request
                    .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(encoded)
            }
            FetchBody::Multipart(parts) => request.multipart(build_multipart(parts)?),
            FetchBody::Bytes { content_type, data } => {
                if let Some(content_type) = content_type {
                    request = request.header(CONTENT_TYPE, content_type);
                }
                request.body(data)
            }
        };

        debug!(url, "sending authenticated request");
        Ok(request.send().await?)
    }

    async fn resolve_token(
        &self,
        explicit: Option<SessionToken>,
    ) -> Result<SessionToken, FetchError> {
        if let Some(token) = explicit {
            return Ok(token);
        }
        if let Some(token) = self.acquirer.cache().get() {
            return Ok(token);
        }
        // Full chain; a success here also lands in the cache
        match self.acquirer.acquire(true).await {
            Ok(token) => Ok(token),
            Err(AcquireError::NoTokenAvailable) => Err(FetchError::SessionTokenUnavailable),
        }
    }
}

/// Percent-encodes form fields into `a=1&b=2` form.
fn encode_form(fields: &[(String, String)]) -> String {
    fields
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn build_multipart(parts: Vec<FormPart>) -> Result<reqwest::multipart::Form, FetchError> {
    let mut form = reqwest::multipart::Form::new();
    for part in parts {
        form = match part {
            FormPart::Text { name, value } => form.text(name, value),
            FormPart::File {
                name,
                file_name,
                content_type,
                data,
            } => {
                let file_part = reqwest::multipart::Part::bytes(data)
                    .file_name(file_name)
                    .mime_str(&content_type)
                    .map_err(|_| FetchError::InvalidHeader {
                        name: "Content-Type".to_string(),
                    })?;
                form.part(name, file_part)
            }
        };
    }
    Ok(form)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_form_escapes_reserved_characters() {
        let encoded = encode_form(&[
            ("plain".to_string(), "value".to_string()),
            ("needs escape".to_string(), "a&b=c".to_string()),
        ]);
        assert_eq!(encoded, "plain=value&needs%20escape=a%26b%3Dc");
    }

    #[test]
    fn test_fetch_options_builders() {
        let options = FetchOptions::post(FetchBody::Json(serde_json::json!({"a": 1})))
            .with_header("X-Custom", "yes")
            .with_session_token(SessionToken::new("override"));
        assert_eq!(options.method, Method::POST);
        assert_eq!(options.headers.get("X-Custom").unwrap(), "yes");
        assert!(options.session_token.is_some());
    }
}
