//! Login and logout navigation

use crate::config::AuthConfig;
use std::sync::Arc;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use tracing::info;

/// Characters escaped in a redirect target: everything but `A-Za-z0-9-_.!~*'()`
const REDIRECT_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Where control leaves the HTTP client: a browser redirect, a printed link,
/// a UI callback.
#[cfg_attr(test, mockall::automock)]
pub trait Navigator: Send + Sync {
    fn navigate(&self, url: &str);
}

/// Navigator that only records the request in the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNavigator;

impl Navigator for LogNavigator {
    fn navigate(&self, url: &str) {
        info!(%url, "Navigation requested");
    }
}

/// Login/logout entry points of the auth service
#[derive(Clone)]
pub struct SessionActions {
    config: Arc<AuthConfig>,
    navigator: Arc<dyn Navigator>,
}

impl SessionActions {
    pub fn new(config: Arc<AuthConfig>, navigator: Arc<dyn Navigator>) -> Self {
        Self { config, navigator }
    }

    /// Login page that returns to `redirect_url` (default: the app) afterwards
    pub fn login_url(&self, redirect_url: Option<&str>) -> String {
        self.with_redirect(&self.config.login_url(), "next", redirect_url)
    }

    /// Logout page that returns to `redirect_url` (default: the app) afterwards
    pub fn logout_url(&self, redirect_url: Option<&str>) -> String {
        self.with_redirect(&self.config.logout_url(), "redirect_url", redirect_url)
    }

    /// Navigate to the login page
    pub fn login(&self, redirect_url: Option<&str>) {
        let url = self.login_url(redirect_url);
        info!("Redirecting to login");
        self.navigator.navigate(&url);
    }

    /// Navigate to the logout page
    pub fn logout(&self, redirect_url: Option<&str>) {
        let url = self.logout_url(redirect_url);
        info!("Redirecting to logout");
        self.navigator.navigate(&url);
    }

    fn with_redirect(&self, base: &str, param: &str, redirect_url: Option<&str>) -> String {
        let redirect_url = redirect_url.unwrap_or(&self.config.app_base_url);
        let encoded = utf8_percent_encode(redirect_url, REDIRECT_ENCODE_SET);
        format!("{base}?{param}={encoded}")
    }
}
