//! Cookie-carrying HTTP transport, without any auth gating

use crate::cookies::CookieStore;
use crate::error::{ClientError, Result};
use crate::refresh::RefreshTransport;
use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue};
use std::sync::Arc;

/// Lowercase form of [`CSRF_HEADER_NAME`](crate::config::CSRF_HEADER_NAME)
const CSRF_HEADER: HeaderName = HeaderName::from_static("x-csrftoken");

/// Sends requests with credentials and the CSRF header, mapping error
/// statuses to [`ClientError`]
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    cookies: Arc<dyn CookieStore>,
    csrf_cookie_name: String,
}

impl HttpTransport {
    /// `client` should share its cookie jar with `cookies`
    pub fn new(
        client: reqwest::Client,
        cookies: Arc<dyn CookieStore>,
        csrf_cookie_name: impl Into<String>,
    ) -> Self {
        Self {
            client,
            cookies,
            csrf_cookie_name: csrf_cookie_name.into(),
        }
    }

    /// The underlying reqwest client
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    fn attach_csrf(&self, request: &mut reqwest::Request) {
        let Some(token) = self.cookies.get(&self.csrf_cookie_name) else {
            return;
        };
        if let Ok(value) = HeaderValue::from_str(&token) {
            request.headers_mut().insert(CSRF_HEADER, value);
        }
    }

    /// Execute a request and handle common errors
    pub async fn execute(&self, mut request: reqwest::Request) -> Result<reqwest::Response> {
        self.attach_csrf(&mut request);

        let response = self.client.execute(request).await?;
        let status = response.status();

        if status.is_success() {
            Ok(response)
        } else {
            let message = response.text().await.unwrap_or_else(|_| status.to_string());
            Err(ClientError::from_status(status, message))
        }
    }
}

#[async_trait]
impl RefreshTransport for HttpTransport {
    async fn post(&self, url: &str) -> Result<()> {
        let request = self.client.post(url).build()?;
        self.execute(request).await.map(|_| ())
    }
}
