//! Outgoing request hook: hold requests while the access token is refreshed

use crate::config::AuthConfig;
use crate::error::Result;
use crate::refresh::{RefreshCoordinator, RefreshWaiter};
use crate::token::TokenState;
use std::sync::Arc;
use tracing::debug;

/// What to do with an outgoing request
#[derive(Debug)]
pub enum Admission {
    /// Send it now
    Ready,
    /// Send it once the refresh behind this waiter succeeds
    Parked(RefreshWaiter),
}

/// Decides, per outgoing request, whether it may be sent yet
#[derive(Clone)]
pub struct RequestGate {
    config: Arc<AuthConfig>,
    tokens: TokenState,
    coordinator: RefreshCoordinator,
}

impl RequestGate {
    pub fn new(config: Arc<AuthConfig>, tokens: TokenState, coordinator: RefreshCoordinator) -> Self {
        Self {
            config,
            tokens,
            coordinator,
        }
    }

    /// Synchronous part of the decision. Parking subscribes to the
    /// coordinator, starting a refresh if none is running.
    ///
    /// The expiry check and the subscription happen under the coordinator's
    /// lock, so a request that sees the old cookie always queues behind the
    /// refresh that replaces it.
    pub fn check(&self, url: &str) -> Admission {
        if self.config.is_auth_url(url) {
            return Admission::Ready;
        }

        match self.coordinator.subscribe_if(|| self.tokens.is_expired()) {
            Some(waiter) => {
                debug!(%url, "Access token expired, holding request for refresh");
                Admission::Parked(waiter)
            }
            None => Admission::Ready,
        }
    }

    /// Release `request` once it may be sent.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::RefreshFailed`](crate::ClientError::RefreshFailed)
    /// if the request was held for a refresh that failed
    pub async fn admit(&self, request: reqwest::Request) -> Result<reqwest::Request> {
        match self.check(request.url().as_str()) {
            Admission::Ready => Ok(request),
            Admission::Parked(waiter) => {
                waiter.wait().await?;
                debug!(url = %request.url(), "Releasing held request");
                Ok(request)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ClientError;
    use crate::cookies::MemoryCookies;
    use crate::refresh::MockRefreshTransport;
    use crate::session::{MockNavigator, SessionActions};
    use chrono::Utc;
    use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
    use reqwest::{Method, Request, Url};
    use serde_json::json;

    const COOKIE: &str = "edx-jwt-cookie";

    fn mint(exp: i64) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            &json!({ "exp": exp }),
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap()
    }

    struct Fixture {
        gate: RequestGate,
        coordinator: RefreshCoordinator,
        config: Arc<AuthConfig>,
    }

    fn fixture(token: Option<String>, transport: MockRefreshTransport, navigator: MockNavigator) -> Fixture {
        fixture_for("http://auth.example.com", token, transport, navigator)
    }

    fn fixture_for(
        auth_service_url: &str,
        token: Option<String>,
        transport: MockRefreshTransport,
        navigator: MockNavigator,
    ) -> Fixture {
        let config = Arc::new(
            AuthConfig::new(
                "http://app.example.com",
                auth_service_url,
                COOKIE,
                "csrftoken",
            )
            .unwrap(),
        );
        let cookies = MemoryCookies::new();
        if let Some(token) = token {
            cookies.set(COOKIE, token);
        }
        let session = SessionActions::new(config.clone(), Arc::new(navigator));
        let coordinator = RefreshCoordinator::new(
            config.refresh_access_token_endpoint(),
            Arc::new(transport),
            session,
            None,
        );
        let gate = RequestGate::new(
            config.clone(),
            TokenState::new(Arc::new(cookies), COOKIE),
            coordinator.clone(),
        );
        Fixture {
            gate,
            coordinator,
            config,
        }
    }

    fn get(url: &str) -> Request {
        Request::new(Method::GET, Url::parse(url).unwrap())
    }

    fn untouched_transport() -> MockRefreshTransport {
        let mut transport = MockRefreshTransport::new();
        transport.expect_post().never();
        transport
    }

    fn quiet_navigator() -> MockNavigator {
        let mut navigator = MockNavigator::new();
        navigator.expect_navigate().never();
        navigator
    }

    #[tokio::test]
    async fn test_valid_token_passes_through() {
        let token = mint(Utc::now().timestamp() + 3600);
        let fx = fixture(Some(token), untouched_transport(), quiet_navigator());

        assert!(matches!(fx.gate.check("http://app.example.com/api/x"), Admission::Ready));
        let request = fx.gate.admit(get("http://app.example.com/api/x")).await.unwrap();
        assert_eq!(request.url().path(), "/api/x");
        assert!(!fx.coordinator.is_refreshing());
    }

    #[tokio::test]
    async fn test_missing_token_passes_through() {
        let fx = fixture(None, untouched_transport(), quiet_navigator());
        assert!(fx.gate.admit(get("http://app.example.com/api/x")).await.is_ok());
    }

    #[tokio::test]
    async fn test_refresh_endpoint_is_never_held() {
        let token = mint(Utc::now().timestamp() - 60);
        let fx = fixture(Some(token), untouched_transport(), quiet_navigator());

        let endpoint = fx.config.refresh_access_token_endpoint();
        assert!(matches!(fx.gate.check(&endpoint), Admission::Ready));
        assert!(fx.gate.admit(get(&endpoint)).await.is_ok());
        assert!(!fx.coordinator.is_refreshing());
    }

    #[tokio::test]
    async fn test_refresh_endpoint_matches_despite_unnormalized_config() {
        let token = mint(Utc::now().timestamp() - 60);
        let fx = fixture_for(
            "http://AUTH.example.com:80",
            Some(token),
            untouched_transport(),
            quiet_navigator(),
        );

        let endpoint = Url::parse("http://AUTH.example.com:80")
            .unwrap()
            .join("/user_api/v1/account/refresh_access_token/")
            .unwrap();
        let request = Request::new(Method::POST, endpoint);
        assert_eq!(
            request.url().as_str(),
            "http://auth.example.com/user_api/v1/account/refresh_access_token/"
        );

        assert!(matches!(fx.gate.check(request.url().as_str()), Admission::Ready));
        assert!(fx.gate.admit(request).await.is_ok());
        assert!(!fx.coordinator.is_refreshing());
    }

    #[tokio::test]
    async fn test_expired_token_holds_request_until_refresh() {
        let token = mint(Utc::now().timestamp() - 60);
        let mut transport = MockRefreshTransport::new();
        transport
            .expect_post()
            .withf(|url| url.ends_with("/user_api/v1/account/refresh_access_token/"))
            .times(1)
            .returning(|_| Ok(()));
        let fx = fixture(Some(token), transport, quiet_navigator());

        let (a, b) = tokio::join!(
            fx.gate.admit(get("http://app.example.com/api/a")),
            fx.gate.admit(get("http://app.example.com/api/b")),
        );
        assert_eq!(a.unwrap().url().path(), "/api/a");
        assert_eq!(b.unwrap().url().path(), "/api/b");
        assert!(!fx.coordinator.is_refreshing());
    }

    #[tokio::test]
    async fn test_failed_refresh_rejects_held_request() {
        let token = mint(Utc::now().timestamp() - 60);
        let mut transport = MockRefreshTransport::new();
        transport
            .expect_post()
            .times(1)
            .returning(|_| Err(ClientError::RefreshFailed));
        let mut navigator = MockNavigator::new();
        navigator.expect_navigate().times(1).return_const(());
        let fx = fixture(Some(token), transport, navigator);

        let result = fx.gate.admit(get("http://app.example.com/api/a")).await;
        assert!(matches!(result, Err(ClientError::RefreshFailed)));
    }
}
