//! CLI commands

use anyhow::Result;
use authgate_client::{AuthenticatedClient, Navigator};
use clap::Subcommand;
use serde_json::{Value, json};
use tracing::info;

/// Prints navigation targets to stdout for the user to open
pub struct PrintNavigator;

impl Navigator for PrintNavigator {
    fn navigate(&self, url: &str) {
        println!("{url}");
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the authentication state derived from the access-token cookie
    Status,

    /// Print the login URL
    LoginUrl {
        /// Where to return after login (defaults to the app base URL)
        #[arg(long)]
        next: Option<String>,
    },

    /// Print the logout URL
    LogoutUrl {
        /// Where to return after logout (defaults to the app base URL)
        #[arg(long)]
        redirect: Option<String>,
    },

    /// Refresh the access-token cookie
    Refresh,

    /// Authenticated GET; prints the JSON body
    Get {
        /// Absolute URL or path relative to the app base URL
        url: String,
    },
}

impl Commands {
    pub async fn execute(self, client: &AuthenticatedClient) -> Result<()> {
        match self {
            Commands::Status => print_json(&status(client)),
            Commands::LoginUrl { next } => {
                println!("{}", client.session().login_url(next.as_deref()));
                Ok(())
            }
            Commands::LogoutUrl { redirect } => {
                println!("{}", client.session().logout_url(redirect.as_deref()));
                Ok(())
            }
            Commands::Refresh => {
                client.refresh_access_token().await?;
                info!("Access token refreshed");
                print_json(&status(client))
            }
            Commands::Get { url } => {
                let body: Value = client.execute(client.get(&url)).await?;
                print_json(&body)
            }
        }
    }
}

fn status(client: &AuthenticatedClient) -> Value {
    let claims = client.decoded_access_token();
    json!({
        "authenticated": client.is_authenticated(),
        "expired": client.is_access_token_expired(),
        "expires_at": claims.map(|claims| claims.exp),
        "state": client.authentication_state(),
    })
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
