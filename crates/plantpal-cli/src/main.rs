//! PlantPal CLI - a terminal front-end for the PlantPal session core.
//!
//! Logs in against the PlantPal backend, keeps the session between runs,
//! and issues authenticated requests that transparently refresh an expired
//! access token.

use std::io::{self, Write};

use anyhow::{bail, Context, Result};
use plantpal_core::api::Method;
use plantpal_core::auth::store_for;
use plantpal_core::{ApiClient, ApiError, Config, Platform, SessionContext};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const USAGE: &str = "\
Usage: plantpal <command> [args]

Commands:
  login <email>                     Log in (password is prompted)
  signup <email> [user_name]        Create an account (admin if user_name given on web)
  logout                            Forget the stored session
  whoami                            Show the signed-in principal
  plants                            List the plant catalogue
  get <path>                        Authenticated GET, prints the body
  delete-plant <id>                 Delete a plant (admin)
  users                             List registered users (admin)
  delete-user <id>                  Delete a user (admin)
  feedbacks                         List user feedback (admin)

Environment:
  PLANTPAL_API_URL, PLANTPAL_PLATFORM (mobile|web),
  PLANTPAL_STORAGE (file|keyring), PLANTPAL_TIMEOUT_SECS, RUST_LOG";

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        eprintln!("{}", USAGE);
        return Ok(());
    };

    let mut config = Config::load().context("Failed to load config")?;
    config.apply_env_overrides();
    info!(api = %config.api_base_url, platform = config.platform.as_str(), "PlantPal CLI starting");

    let session = SessionContext::init_shared(store_for(&config)?.into());
    let client = ApiClient::new(&config, session.clone())?;
    session.wait_until_loaded().await;

    let result = run(&client, command, &args[1..]).await;
    session.teardown();

    match result {
        Err(e) => {
            if let Some(api_err) = e.downcast_ref::<ApiError>() {
                eprintln!("{}", user_message(api_err));
                std::process::exit(1);
            }
            Err(e)
        }
        ok => ok,
    }
}

async fn run(client: &ApiClient, command: &str, args: &[String]) -> Result<()> {
    match command {
        "login" => {
            let email = arg(args, 0, "email")?;
            let password = rpassword::prompt_password("Password: ")?;
            let principal = client.login(email, &password).await?;
            println!("Welcome {}!", principal);
        }
        "signup" => {
            let email = arg(args, 0, "email")?;
            let password = rpassword::prompt_password("Password: ")?;
            match (client.config().platform, args.get(1)) {
                (Platform::Web, Some(user_name)) => {
                    let admin = client.admin_signup(email, &password, user_name).await?;
                    println!("Admin {} created. Log in to continue.", admin.display_name());
                }
                (Platform::Web, None) => bail!("Admin signup needs a user name"),
                (Platform::Mobile, _) => {
                    let user = client.signup(email, &password).await?;
                    println!("Account {} created. Log in to continue.", user.email);
                }
            }
        }
        "logout" => {
            client.logout()?;
            println!("Logged out.");
        }
        "whoami" => match client.session().principal() {
            Some(principal) => println!("{} <{}>", principal, principal.email()),
            None => println!("Not logged in."),
        },
        "plants" => {
            let plants = client.fetch_plants().await?;
            let stdout = io::stdout();
            let mut out = stdout.lock();
            for plant in &plants {
                writeln!(out, "{}\t{}\t{} ailments", plant.id, plant.display_name(), plant.ailment_count())?;
            }
        }
        "get" => {
            let path = arg(args, 0, "path")?;
            let response = client.request(Method::GET, path, None).await?;
            let status = response.status();
            match serde_json::from_str::<serde_json::Value>(response.body()) {
                Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
                Err(_) => println!("{}", response.body()),
            }
            if !status.is_success() {
                bail!("Request failed with status {}", status);
            }
        }
        "delete-plant" => {
            let id = arg(args, 0, "plant id")?;
            client.delete_plant(id).await?;
            println!("Deleted {}.", id);
        }
        "users" => {
            let users = client.fetch_users().await?;
            let stdout = io::stdout();
            let mut out = stdout.lock();
            for user in &users {
                let premium = if user.is_premium { "premium" } else { "free" };
                writeln!(out, "{}\t{}\t{}\t{}", user.id, user.display_name(), user.user_email, premium)?;
            }
        }
        "delete-user" => {
            let id = arg(args, 0, "user id")?;
            client.delete_user(id).await?;
            println!("Deleted user {}.", id);
        }
        "feedbacks" => {
            for feedback in client.fetch_feedbacks().await? {
                println!("{} <{}> {}\n  {}", feedback.date_submitted, feedback.email, feedback.user_name, feedback.message);
            }
        }
        "help" | "--help" | "-h" => println!("{}", USAGE),
        other => bail!("Unknown command: {}\n\n{}", other, USAGE),
    }
    Ok(())
}

fn arg<'a>(args: &'a [String], index: usize, name: &str) -> Result<&'a str> {
    args.get(index)
        .map(String::as_str)
        .with_context(|| format!("Missing argument: {}", name))
}

/// What the user should see for each class of failure.
fn user_message(err: &ApiError) -> String {
    match err {
        ApiError::Connectivity(_) => "Could not reach the server. Check your connection and try again.".to_string(),
        ApiError::SessionExpired => "Your session has expired. Please log in again.".to_string(),
        ApiError::Unauthorized(message) | ApiError::Validation { message, .. } => message.clone(),
        other => other.to_string(),
    }
}
