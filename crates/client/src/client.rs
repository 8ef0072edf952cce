//! HTTP client that keeps the cookie session alive

use crate::config::AuthConfig;
use crate::cookies::{CookieStore, JarCookies};
use crate::error::{ClientError, Result};
use crate::gate::{RequestGate, ResponseGate};
use crate::refresh::RefreshCoordinator;
use crate::session::{LogNavigator, Navigator, SessionActions};
use crate::token::{AccessTokenClaims, AuthenticationState, TokenState};
use crate::transport::HttpTransport;
use async_trait::async_trait;
use reqwest::ClientBuilder;
use reqwest::cookie::Jar;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

const DEFAULT_USER_AGENT: &str = concat!("authgate-client/", env!("CARGO_PKG_VERSION"));

/// A transport whose requests are held while the access token is refreshed
/// and whose 401/403 responses end the session
#[async_trait]
pub trait AuthenticatedTransport: Send + Sync {
    async fn send(&self, request: reqwest::Request) -> Result<reqwest::Response>;
}

/// Cookie-session HTTP client.
///
/// Clones share one refresh coordinator, so concurrent requests from any
/// clone trigger at most one refresh.
#[derive(Clone)]
pub struct AuthenticatedClient {
    config: Arc<AuthConfig>,
    http: HttpTransport,
    tokens: TokenState,
    session: SessionActions,
    coordinator: RefreshCoordinator,
    request_gate: RequestGate,
    response_gate: ResponseGate,
}

impl AuthenticatedClient {
    /// Create a new client with default settings
    pub fn new(config: AuthConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    /// Create a client configured from the environment
    pub fn from_env() -> Result<Self> {
        Self::new(AuthConfig::from_env()?)
    }

    /// Create a new client builder
    pub fn builder(config: AuthConfig) -> AuthenticatedClientBuilder {
        AuthenticatedClientBuilder::new(config)
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn session(&self) -> &SessionActions {
        &self.session
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    /// Absolute URLs are used as-is; anything else is appended to the app base URL
    fn resolve_url(&self, url: &str) -> String {
        if Url::parse(url).is_ok() {
            url.to_string()
        } else {
            format!("{}{}", self.config.app_base_url.trim_end_matches('/'), url)
        }
    }

    /// Create a request builder
    pub fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.http.client().request(method, self.resolve_url(url))
    }

    pub fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.request(reqwest::Method::GET, url)
    }

    pub fn post(&self, url: &str) -> reqwest::RequestBuilder {
        self.request(reqwest::Method::POST, url)
    }

    /// Send a request through the auth gates and decode the JSON body
    pub async fn execute<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T> {
        let request = request.build()?;
        let response = AuthenticatedTransport::send(self, request).await?;
        Ok(response.json().await?)
    }

    /// Whether an access-token cookie is present
    pub fn is_authenticated(&self) -> bool {
        self.tokens.is_authenticated()
    }

    pub fn is_access_token_expired(&self) -> bool {
        self.tokens.is_expired()
    }

    pub fn decoded_access_token(&self) -> Option<AccessTokenClaims> {
        self.tokens.decode()
    }

    pub fn authentication_state(&self) -> AuthenticationState {
        self.tokens.authentication_state()
    }

    /// Whether `url` skips the refresh gate
    pub fn is_auth_url(&self, url: &str) -> bool {
        self.config.is_auth_url(url)
    }

    pub fn login(&self, redirect_url: Option<&str>) {
        self.session.login(redirect_url);
    }

    pub fn logout(&self, redirect_url: Option<&str>) {
        self.session.logout(redirect_url);
    }

    /// Refresh the access-token cookie, joining a refresh already in flight
    pub async fn refresh_access_token(&self) -> Result<()> {
        self.coordinator.request_access_token().await
    }
}

#[async_trait]
impl AuthenticatedTransport for AuthenticatedClient {
    async fn send(&self, request: reqwest::Request) -> Result<reqwest::Response> {
        let request = self.request_gate.admit(request).await?;
        self.response_gate.inspect(self.http.execute(request).await)
    }
}

/// Builder for [`AuthenticatedClient`]
pub struct AuthenticatedClientBuilder {
    config: AuthConfig,
    jar: Option<Arc<Jar>>,
    cookies: Option<Arc<dyn CookieStore>>,
    navigator: Option<Arc<dyn Navigator>>,
    timeout: Option<Duration>,
    refresh_timeout: Option<Duration>,
    user_agent: Option<String>,
}

impl AuthenticatedClientBuilder {
    pub fn new(config: AuthConfig) -> Self {
        Self {
            config,
            jar: None,
            cookies: None,
            navigator: None,
            timeout: None,
            refresh_timeout: None,
            user_agent: None,
        }
    }

    /// Share a cookie jar with the client. Cookies set by the auth service
    /// land here.
    pub fn cookie_jar(mut self, jar: Arc<Jar>) -> Self {
        self.jar = Some(jar);
        self
    }

    /// Read the token and CSRF cookies from somewhere other than the jar
    pub fn cookie_store(mut self, cookies: Arc<dyn CookieStore>) -> Self {
        self.cookies = Some(cookies);
        self
    }

    /// Where login/logout redirects go. Defaults to [`LogNavigator`].
    pub fn navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    /// Set the per-request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Bound the refresh call; overrides `refresh_timeout_secs` in the config
    pub fn refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = Some(timeout);
        self
    }

    /// Set the user agent
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Build the client
    pub fn build(self) -> Result<AuthenticatedClient> {
        self.config.validate()?;
        let refresh_timeout = self.refresh_timeout.or_else(|| self.config.refresh_timeout());
        let config = Arc::new(self.config);

        let jar = self.jar.unwrap_or_default();
        let cookies = match self.cookies {
            Some(cookies) => cookies,
            None => {
                let app_url = Url::parse(&config.app_base_url)
                    .map_err(|e| ClientError::Configuration(format!("app_base_url: {e}")))?;
                Arc::new(JarCookies::new(Arc::clone(&jar), app_url))
            }
        };

        let mut client_builder = ClientBuilder::new()
            .cookie_provider(jar)
            .user_agent(self.user_agent.unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()));
        if let Some(timeout) = self.timeout {
            client_builder = client_builder.timeout(timeout);
        }

        let http = HttpTransport::new(
            client_builder.build()?,
            Arc::clone(&cookies),
            config.csrf_cookie_name.clone(),
        );

        let navigator = self.navigator.unwrap_or_else(|| Arc::new(LogNavigator));
        let session = SessionActions::new(Arc::clone(&config), navigator);
        let tokens = TokenState::new(cookies, config.access_token_cookie_name.clone());
        let coordinator = RefreshCoordinator::new(
            config.refresh_access_token_endpoint(),
            Arc::new(http.clone()),
            session.clone(),
            refresh_timeout,
        );

        Ok(AuthenticatedClient {
            request_gate: RequestGate::new(
                Arc::clone(&config),
                tokens.clone(),
                coordinator.clone(),
            ),
            response_gate: ResponseGate::new(session.clone()),
            config,
            http,
            tokens,
            session,
            coordinator,
        })
    }
}
