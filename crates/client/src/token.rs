//! Access-token cookie inspection
//!
//! The access token is a JWT whose signature is checked by the services that
//! receive it, not here. The client only needs its claims to know when the
//! token expires and who it belongs to, so only the payload segment is
//! decoded. The header, including its `alg`, is never looked at, and any
//! failure simply means "no usable token".

use crate::cookies::CookieStore;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Claims read from the access token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Expiration time (as UTC timestamp). Fractional values round up.
    #[serde(deserialize_with = "deserialize_exp")]
    pub exp: i64,
    /// User's email address
    #[serde(default)]
    pub email: Option<String>,
    /// Username
    #[serde(default)]
    pub preferred_username: Option<String>,
}

impl AccessTokenClaims {
    /// A token is expired from the second named by `exp` onwards
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.exp <= now
    }
}

#[allow(clippy::cast_possible_truncation)]
fn deserialize_exp<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    let exp = serde_json::Number::deserialize(deserializer)?;
    if let Some(exp) = exp.as_i64() {
        return Ok(exp);
    }
    match exp.as_f64() {
        Some(exp) if exp.is_finite() => Ok(exp.ceil() as i64),
        _ => Err(serde::de::Error::custom("exp out of range")),
    }
}

/// Identity of the signed-in user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authentication {
    pub email: Option<String>,
    pub username: Option<String>,
}

/// Authentication state as seen by the application
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticationState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<Authentication>,
}

/// Decode the claims of a JWT without verifying it
pub fn decode_access_token(token: &str) -> Option<AccessTokenClaims> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Token state derived from the cookie store on every call
#[derive(Clone)]
pub struct TokenState {
    cookies: Arc<dyn CookieStore>,
    cookie_name: String,
}

impl TokenState {
    pub fn new(cookies: Arc<dyn CookieStore>, cookie_name: impl Into<String>) -> Self {
        Self {
            cookies,
            cookie_name: cookie_name.into(),
        }
    }

    /// Raw access token, if the cookie is set and non-empty
    pub fn access_token(&self) -> Option<String> {
        self.cookies
            .get(&self.cookie_name)
            .filter(|token| !token.is_empty())
    }

    /// Whether an access-token cookie exists. Expiry is not checked.
    pub fn is_authenticated(&self) -> bool {
        self.access_token().is_some()
    }

    /// Decoded claims, or `None` if the cookie is missing or malformed
    pub fn decode(&self) -> Option<AccessTokenClaims> {
        self.access_token()
            .and_then(|token| decode_access_token(&token))
    }

    /// Whether the token needs refreshing before the next request
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now().timestamp())
    }

    /// [`is_expired`](Self::is_expired) against a fixed clock.
    ///
    /// No cookie is not expiry. A cookie that cannot be decoded counts as
    /// expired so that a refresh replaces it.
    pub fn is_expired_at(&self, now: i64) -> bool {
        let Some(token) = self.access_token() else {
            return false;
        };

        match decode_access_token(&token) {
            Some(claims) => claims.is_expired_at(now),
            None => {
                debug!(cookie = %self.cookie_name, "Access token cookie is malformed, treating as expired");
                true
            }
        }
    }

    /// Identity projection of the current token
    pub fn authentication_state(&self) -> AuthenticationState {
        AuthenticationState {
            authentication: self.decode().map(|claims| Authentication {
                email: claims.email,
                username: claims.preferred_username,
            }),
        }
    }
}
