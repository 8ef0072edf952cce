//! Cookie-based JWT session handling for HTTP clients
//!
//! The access token lives in a cookie set by the auth service. Before each
//! request the client checks its expiry; expired tokens trigger a single
//! refresh call that every concurrent request waits on. Responses with 401 or
//! 403 log the user out.

pub mod client;
pub mod config;
pub mod cookies;
pub mod error;
pub mod gate;
pub mod refresh;
pub mod session;
pub mod token;
pub mod transport;

pub use client::{AuthenticatedClient, AuthenticatedClientBuilder, AuthenticatedTransport};
pub use config::{AuthConfig, CSRF_HEADER_NAME};
pub use cookies::{CookieStore, JarCookies, MemoryCookies};
pub use error::{ClientError, Result};
pub use gate::{Admission, RequestGate, ResponseGate};
pub use refresh::{RefreshCoordinator, RefreshTransport, RefreshWaiter};
pub use session::{LogNavigator, Navigator, SessionActions};
pub use token::{AccessTokenClaims, Authentication, AuthenticationState, TokenState};
pub use transport::HttpTransport;

// Re-export commonly used types
pub use reqwest::cookie::Jar;
