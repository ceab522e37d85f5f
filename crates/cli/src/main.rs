//! Marketplace CLI - Database migrations and role management.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! mp-cli migrate
//!
//! # Grant a user the SELLER role and push it to the identity provider
//! mp-cli user set-role --id user_2abc --role SELLER
//!
//! # Show a user's local record
//! mp-cli user show --id user_2abc
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `user set-role` - Change a user's role (the only way roles change)
//! - `user show` - Print a user's local record

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "mp-cli")]
#[command(author, version, about = "Marketplace admin CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Manage marketplace users
    User {
        #[command(subcommand)]
        action: UserAction,
    },
}

#[derive(Subcommand)]
enum UserAction {
    /// Set a user's role locally, then propagate it to the identity provider
    SetRole {
        /// Identity provider user id
        #[arg(long)]
        id: String,

        /// New role (`USER`, `ADMIN`, `SELLER`)
        #[arg(short, long)]
        role: String,
    },
    /// Show a user's local record
    Show {
        /// Identity provider user id
        #[arg(long)]
        id: String,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::User { action } => match action {
            UserAction::SetRole { id, role } => commands::user::set_role(&id, &role).await?,
            UserAction::Show { id } => commands::user::show(&id).await?,
        },
    }
    Ok(())
}
