//! Cookie access for the token and CSRF cookies
//!
//! The client only ever reads cookies. Writing them is the auth service's
//! job, via `Set-Cookie` on its responses, which land in the reqwest [`Jar`]
//! shared with the transport.

use reqwest::cookie::Jar;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use url::Url;

/// Read-only view of a cookie store
pub trait CookieStore: Send + Sync {
    /// Value of the cookie called `name`, if set
    fn get(&self, name: &str) -> Option<String>;
}

/// Cookies visible to `url` in a reqwest cookie jar
#[derive(Debug, Clone)]
pub struct JarCookies {
    jar: Arc<Jar>,
    url: Url,
}

impl JarCookies {
    /// View the cookies `jar` would send to `url`
    pub fn new(jar: Arc<Jar>, url: Url) -> Self {
        Self { jar, url }
    }

    /// The underlying jar
    pub fn jar(&self) -> &Arc<Jar> {
        &self.jar
    }
}

impl CookieStore for JarCookies {
    fn get(&self, name: &str) -> Option<String> {
        use reqwest::cookie::CookieStore as _;

        let header = self.jar.cookies(&self.url)?;
        let header = header.to_str().ok()?;
        find_cookie(header, name)
    }
}

/// Find `name` in a `Cookie:` header value (`a=1; b=2`)
fn find_cookie(header: &str, name: &str) -> Option<String> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

/// In-memory cookie store, for embedding without a jar and for tests
#[derive(Debug, Clone, Default)]
pub struct MemoryCookies {
    cookies: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryCookies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a cookie
    pub fn set(&self, name: impl Into<String>, value: impl Into<String>) {
        self.cookies
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), value.into());
    }

    /// Remove a cookie
    pub fn remove(&self, name: &str) {
        self.cookies
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
    }
}

impl CookieStore for MemoryCookies {
    fn get(&self, name: &str) -> Option<String> {
        self.cookies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }
}
