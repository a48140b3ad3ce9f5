//! TableHop CLI entry point
//!
//! A thin developer utility over the auth facade; the desktop app embeds the
//! library directly.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use anyhow::Result;
use colored::Colorize;
use std::sync::Arc;
use tablehop::auth::{AuthGateway, SessionHandle};
use tablehop::profile::FileProfileStore;

#[derive(Parser)]
#[command(name = "tablehop")]
#[command(about = "🍽️ TableHop - restaurant discovery companion")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize TableHop configuration
    Setup,

    /// Sign in with email and password
    Login,

    /// Sign in with Google through the browser
    LoginGoogle,

    /// Create a new account
    Register,

    /// Sign out of the current session
    Logout,

    /// Show configuration status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Setup => {
            println!("🍽️ Setting up TableHop...");
            tablehop::config::setup()?;
            println!("{}", "✓ TableHop is configured".green());
            println!("\nNext steps:");
            println!("  1. Sign in: tablehop login (or tablehop login-google)");
            println!("  2. Check things look right: tablehop status");
        }

        Commands::Login => run_login().await?,

        Commands::LoginGoogle => run_login_google().await?,

        Commands::Register => run_register().await?,

        Commands::Logout => {
            let gateway = build_gateway()?;
            gateway.logout();
            println!("Signed out. Sessions live only as long as the app runs.");
        }

        Commands::Status => run_status()?,
    }

    Ok(())
}

fn build_gateway() -> Result<AuthGateway> {
    let config = tablehop::config::load()?;
    let store = Arc::new(FileProfileStore::new(config.data_dir.join("profiles")));
    let session = SessionHandle::new();
    Ok(AuthGateway::new(&config, store, session))
}

async fn run_login() -> Result<()> {
    let email = inquire::Text::new("Email:").prompt()?;
    let password = inquire::Password::new("Password:")
        .without_confirmation()
        .prompt()?;

    let gateway = build_gateway()?;
    let uid = gateway.login_with_email_and_password(&email, &password).await?;

    println!("{} (uid {})", "✓ Signed in".green(), uid);
    Ok(())
}

async fn run_login_google() -> Result<()> {
    let gateway = build_gateway()?;

    println!("\n🔐 Opening browser for Google sign-in...");
    println!("⏳ Waiting for authorization...\n");

    let profile = gateway.login_with_google().await?;
    println!(
        "{} {} ({})",
        "✓ Welcome,".green(),
        profile.nickname,
        profile.email
    );
    Ok(())
}

async fn run_register() -> Result<()> {
    let email = inquire::Text::new("Email:").prompt()?;
    let password = inquire::Password::new("Password:").prompt()?;
    let nickname = inquire::Text::new("Nickname:").prompt()?;

    let gateway = build_gateway()?;
    let profile = gateway
        .register_with_email_and_password(&email, &password, &nickname)
        .await?;

    println!(
        "{} {} (uid {})",
        "✓ Account created for".green(),
        profile.nickname,
        profile.uid
    );
    Ok(())
}

fn run_status() -> Result<()> {
    match tablehop::config::load() {
        Ok(config) => {
            let oauth = if config.oauth.client_id.is_empty() {
                "not configured".red()
            } else {
                "configured".green()
            };
            let api_key = if config.api_key.is_empty() {
                "not configured".red()
            } else {
                "configured".green()
            };

            println!("OAuth client:     {}", oauth);
            println!("Identity API key: {}", api_key);
            println!("Callback port:    {}", config.callback_port);
            println!("Data directory:   {:?}", config.data_dir);
        }
        Err(e) => {
            println!("{} ({})", "Not configured".yellow(), e);
        }
    }
    Ok(())
}
