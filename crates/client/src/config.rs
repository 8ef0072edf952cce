//! Authentication configuration

use crate::error::{ClientError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Header carrying the CSRF cookie value on every request
pub const CSRF_HEADER_NAME: &str = "X-CSRFToken";

const LOGIN_PATH: &str = "/login";
const LOGOUT_PATH: &str = "/logout";
const REFRESH_ACCESS_TOKEN_PATH: &str = "/user_api/v1/account/refresh_access_token/";

/// Client-side authentication configuration.
///
/// All four URL/cookie fields are required. Endpoints on the auth service are
/// derived from `auth_service_url` by appending fixed paths.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Where the application lives; default redirect target for login/logout
    pub app_base_url: String,
    /// Root of the auth service
    pub auth_service_url: String,
    /// Cookie holding the JWT access token
    pub access_token_cookie_name: String,
    /// Cookie holding the CSRF token
    pub csrf_cookie_name: String,
    /// Upper bound on a single refresh call. Unset means wait indefinitely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_timeout_secs: Option<u64>,
}

impl AuthConfig {
    /// Build and validate a configuration
    pub fn new(
        app_base_url: impl Into<String>,
        auth_service_url: impl Into<String>,
        access_token_cookie_name: impl Into<String>,
        csrf_cookie_name: impl Into<String>,
    ) -> Result<Self> {
        let config = Self {
            app_base_url: app_base_url.into(),
            auth_service_url: auth_service_url.into(),
            access_token_cookie_name: access_token_cookie_name.into(),
            csrf_cookie_name: csrf_cookie_name.into(),
            refresh_timeout_secs: None,
        };
        config.validate()?;
        Ok(config)
    }

    /// Load from `APP_BASE_URL`, `AUTH_SERVICE_URL`, `ACCESS_TOKEN_COOKIE_NAME`,
    /// `CSRF_COOKIE_NAME` and the optional `REFRESH_TIMEOUT_SECS`.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or invalid
    pub fn from_env() -> Result<Self> {
        Self::from_environment(config::Environment::default())
    }

    /// Load from a configuration file, with environment variables taking precedence
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or the result is invalid
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(config::Environment::default())
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn from_environment(environment: config::Environment) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(environment.try_parsing(true))
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every required field is present and both URLs parse
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("app_base_url", &self.app_base_url),
            ("auth_service_url", &self.auth_service_url),
            ("access_token_cookie_name", &self.access_token_cookie_name),
            ("csrf_cookie_name", &self.csrf_cookie_name),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ClientError::Configuration(format!("{field} is required")));
            }
        }

        for (field, value) in [
            ("app_base_url", &self.app_base_url),
            ("auth_service_url", &self.auth_service_url),
        ] {
            Url::parse(value).map_err(|e| {
                ClientError::Configuration(format!("{field} is not a valid URL: {e}"))
            })?;
        }

        Ok(())
    }

    /// `path` appended to the auth service URL, in the normalized form
    /// reqwest sends (lowercase host, default port dropped)
    fn auth_service_endpoint(&self, path: &str) -> String {
        let raw = format!("{}{path}", self.auth_service_url.trim_end_matches('/'));
        Url::parse(&raw).map_or(raw, String::from)
    }

    /// Login page on the auth service
    pub fn login_url(&self) -> String {
        self.auth_service_endpoint(LOGIN_PATH)
    }

    /// Logout page on the auth service
    pub fn logout_url(&self) -> String {
        self.auth_service_endpoint(LOGOUT_PATH)
    }

    /// Endpoint that rotates the access-token cookie
    pub fn refresh_access_token_endpoint(&self) -> String {
        self.auth_service_endpoint(REFRESH_ACCESS_TOKEN_PATH)
    }

    /// URLs that never wait for a token refresh
    pub fn auth_urls(&self) -> Vec<String> {
        vec![self.refresh_access_token_endpoint()]
    }

    /// Whether `url` is exempt from the refresh gate
    pub fn is_auth_url(&self, url: &str) -> bool {
        let Ok(url) = Url::parse(url) else {
            return false;
        };
        self.auth_urls()
            .iter()
            .filter_map(|exempt| Url::parse(exempt).ok())
            .any(|exempt| exempt == url)
    }

    /// Refresh timeout, if configured
    pub fn refresh_timeout(&self) -> Option<Duration> {
        self.refresh_timeout_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn test_config() -> AuthConfig {
        AuthConfig::new(
            "http://app.example.com",
            "http://auth.example.com",
            "edx-jwt-cookie",
            "csrftoken",
        )
        .unwrap()
    }

    fn env_source(pairs: &[(&str, &str)]) -> config::Environment {
        let map: config::Map<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        config::Environment::default().source(Some(map))
    }

    #[test]
    fn test_derived_urls() {
        let config = test_config();
        assert_eq!(config.login_url(), "http://auth.example.com/login");
        assert_eq!(config.logout_url(), "http://auth.example.com/logout");
        assert_eq!(
            config.refresh_access_token_endpoint(),
            "http://auth.example.com/user_api/v1/account/refresh_access_token/"
        );
        assert_eq!(
            config.auth_urls(),
            vec![config.refresh_access_token_endpoint()]
        );
    }

    #[test]
    fn test_trailing_slash_on_auth_service_is_ignored() {
        let config = AuthConfig::new(
            "http://app.example.com",
            "http://auth.example.com/",
            "jwt",
            "csrftoken",
        )
        .unwrap();
        assert_eq!(config.login_url(), "http://auth.example.com/login");
    }

    #[test]
    fn test_is_auth_url() {
        let config = test_config();
        assert!(config.is_auth_url(
            "http://auth.example.com/user_api/v1/account/refresh_access_token/"
        ));
        assert!(!config.is_auth_url("http://auth.example.com/login"));
        assert!(!config.is_auth_url("http://app.example.com/api/courses"));
    }

    #[test]
    fn test_derived_urls_are_normalized() {
        let config = AuthConfig::new(
            "http://app.example.com",
            "http://AUTH.example.com:80",
            "jwt",
            "csrftoken",
        )
        .unwrap();
        assert_eq!(
            config.refresh_access_token_endpoint(),
            "http://auth.example.com/user_api/v1/account/refresh_access_token/"
        );
        assert_eq!(config.logout_url(), "http://auth.example.com/logout");
    }

    #[test]
    fn test_is_auth_url_compares_parsed_urls() {
        let config = AuthConfig::new(
            "http://app.example.com",
            "http://AUTH.example.com:80/",
            "jwt",
            "csrftoken",
        )
        .unwrap();
        assert!(config.is_auth_url(
            "http://auth.example.com/user_api/v1/account/refresh_access_token/"
        ));
        assert!(config.is_auth_url(
            "HTTP://Auth.Example.com:80/user_api/v1/account/refresh_access_token/"
        ));
        assert!(!config.is_auth_url("/user_api/v1/account/refresh_access_token/"));
        assert!(!config.is_auth_url("http://auth.example.com:8080/user_api/v1/account/refresh_access_token/"));
    }

    #[test]
    fn test_missing_field_is_rejected() {
        let result = AuthConfig::new("http://app.example.com", "", "jwt", "csrftoken");
        assert!(matches!(result, Err(ClientError::Configuration(msg)) if msg.contains("auth_service_url")));

        let result = AuthConfig::new("http://app.example.com", "http://auth", "  ", "csrf");
        assert!(matches!(result, Err(ClientError::Configuration(_))));
    }

    #[test]
    fn test_invalid_url_is_rejected() {
        let result = AuthConfig::new("not a url", "http://auth.example.com", "jwt", "csrf");
        assert!(matches!(result, Err(ClientError::Configuration(msg)) if msg.contains("app_base_url")));
    }

    #[test]
    fn test_from_environment() {
        let config = AuthConfig::from_environment(env_source(&[
            ("APP_BASE_URL", "http://app.example.com"),
            ("AUTH_SERVICE_URL", "http://auth.example.com"),
            ("ACCESS_TOKEN_COOKIE_NAME", "edx-jwt-cookie"),
            ("CSRF_COOKIE_NAME", "csrftoken"),
            ("REFRESH_TIMEOUT_SECS", "15"),
        ]))
        .unwrap();

        assert_eq!(config.access_token_cookie_name, "edx-jwt-cookie");
        assert_eq!(config.refresh_timeout(), Some(Duration::from_secs(15)));
    }

    #[test]
    fn test_from_environment_requires_all_fields() {
        let result = AuthConfig::from_environment(env_source(&[
            ("APP_BASE_URL", "http://app.example.com"),
            ("AUTH_SERVICE_URL", "http://auth.example.com"),
        ]));
        assert!(matches!(result, Err(ClientError::Configuration(_))));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
app_base_url = "http://app.example.com"
auth_service_url = "http://auth.example.com"
access_token_cookie_name = "edx-jwt-cookie"
csrf_cookie_name = "csrftoken"
"#
        )
        .unwrap();

        let config = AuthConfig::from_file(file.path()).unwrap();
        assert_eq!(config.csrf_cookie_name, "csrftoken");
        assert_eq!(config.refresh_timeout(), None);
    }
}
