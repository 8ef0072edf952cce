//! authgate CLI - talk to a cookie-authenticated API from the terminal

mod commands;
mod logging;

use anyhow::{Context, Result};
use authgate_client::{AuthConfig, AuthenticatedClient, Jar};
use clap::{Parser, ValueEnum};
use commands::{Commands, PrintNavigator};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Level, error, info};
use url::Url;

#[derive(Parser)]
#[command(name = "authgate")]
#[command(about = "Call a cookie-authenticated API, refreshing the access token as needed")]
#[command(version)]
struct Cli {
    /// Set logging level
    #[arg(short = 'l', long, global = true, default_value = "info")]
    log_level: LogLevel,

    /// Configuration file (TOML, YAML or JSON); environment variables are used otherwise
    #[arg(short = 'c', long, global = true, env = "AUTHGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Seed the cookie jar, e.g. `--cookie edx-jwt-cookie=<token>`
    #[arg(long = "cookie", value_name = "NAME=VALUE", global = true, value_parser = parse_cookie)]
    cookies: Vec<(String, String)>,

    /// Timeout for operations in seconds (0 = no timeout)
    #[arg(short = 't', long, global = true, default_value = "30")]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

fn parse_cookie(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected NAME=VALUE, got `{raw}`")),
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<AuthConfig> {
    match path {
        Some(path) => AuthConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => AuthConfig::from_env().context("Failed to load configuration from environment"),
    }
}

/// Cookies are seeded for both the app and the auth service so the refresh
/// call carries them too
fn seed_jar(config: &AuthConfig, cookies: &[(String, String)]) -> Result<Arc<Jar>> {
    let jar = Arc::new(Jar::default());
    let urls = [
        Url::parse(&config.app_base_url)?,
        Url::parse(&config.auth_service_url)?,
    ];
    for (name, value) in cookies {
        for url in &urls {
            jar.add_cookie_str(&format!("{name}={value}; Path=/"), url);
        }
    }
    Ok(jar)
}

fn build_client(cli: &Cli) -> Result<AuthenticatedClient> {
    let config = load_config(cli.config.as_ref())?;
    let jar = seed_jar(&config, &cli.cookies)?;

    let mut builder = AuthenticatedClient::builder(config)
        .cookie_jar(jar)
        .navigator(Arc::new(PrintNavigator));
    if cli.timeout > 0 {
        let timeout = Duration::from_secs(cli.timeout);
        builder = builder.timeout(timeout).refresh_timeout(timeout);
    }

    Ok(builder.build()?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::init_logging(cli.log_level.clone().into())?;

    let client = match build_client(&cli) {
        Ok(client) => client,
        Err(e) => {
            error!("{e:#}");
            std::process::exit(1);
        }
    };
    info!(app = %client.config().app_base_url, "Client ready");

    match cli.command.execute(&client).await {
        Ok(()) => {
            info!("Command completed successfully");
        }
        Err(e) => {
            error!("Command failed: {e}");
            std::process::exit(1);
        }
    }

    Ok(())
}

#[derive(Clone, Debug, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for Level {
    fn from(log_level: LogLevel) -> Self {
        match log_level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}
