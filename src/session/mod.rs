//! Cookie-backed sessions.
//!
//! The whole session is carried by the client as an HS256-signed token, so
//! nothing is stored server side. A missing, tampered or expired cookie
//! simply yields a fresh, empty session.

use std::collections::HashMap;

use axum::http::{header, HeaderMap, HeaderValue};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::config::SessionConfig;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session signing key is not configured")]
    MissingSecret,

    #[error("Failed to encode session: {0}")]
    Encode(#[from] jsonwebtoken::errors::Error),

    #[error("Session cookie is not a valid header value")]
    InvalidHeader(#[from] axum::http::header::InvalidHeaderValue),
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionClaims {
    values: HashMap<String, Value>,
    iat: i64,
    exp: i64,
}

/// Values of one client's session, loaded at request start
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    values: HashMap<String, Value>,
    is_new: bool,
}

impl Session {
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
            is_new: true,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    pub fn values(&self) -> &HashMap<String, Value> {
        &self.values
    }

    /// True when no valid cookie was presented
    pub fn is_new(&self) -> bool {
        self.is_new
    }
}

/// Signs and verifies session cookies
pub struct SessionStore {
    cookie_name: String,
    max_age_secs: i64,
    secure: bool,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("cookie_name", &self.cookie_name)
            .field("max_age_secs", &self.max_age_secs)
            .field("secure", &self.secure)
            .finish_non_exhaustive()
    }
}

impl SessionStore {
    pub fn new(config: &SessionConfig) -> Result<Self, SessionError> {
        if config.secret.is_empty() {
            return Err(SessionError::MissingSecret);
        }

        Ok(Self {
            cookie_name: config.cookie_name.clone(),
            max_age_secs: i64::try_from(config.max_age_secs).unwrap_or(i64::MAX),
            secure: config.secure,
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
        })
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Load the session named by this store from the request cookies
    pub fn load(&self, headers: &HeaderMap) -> Session {
        let Some(token) = find_cookie(headers, &self.cookie_name) else {
            return Session::new();
        };

        let validation = Validation::new(Algorithm::HS256);
        match decode::<SessionClaims>(token, &self.decoding_key, &validation) {
            Ok(data) => Session {
                values: data.claims.values,
                is_new: false,
            },
            Err(e) => {
                tracing::warn!("Rejected session cookie '{}': {}", self.cookie_name, e);
                Session::new()
            }
        }
    }

    /// Encode the session into a `Set-Cookie` header value
    pub fn save(&self, session: &Session) -> Result<HeaderValue, SessionError> {
        let now = Utc::now();
        let claims = SessionClaims {
            values: session.values.clone(),
            iat: now.timestamp(),
            exp: now.timestamp().saturating_add(self.max_age_secs),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?;

        let mut cookie = format!(
            "{}={}; Path=/; Max-Age={}; HttpOnly; SameSite=Lax",
            self.cookie_name,
            token,
            self.max_age_secs
        );
        if self.secure {
            cookie.push_str("; Secure");
        }

        Ok(HeaderValue::from_str(&cookie)?)
    }
}

/// Find a cookie value by name across every `Cookie` header
fn find_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim_matches('"'))
}
