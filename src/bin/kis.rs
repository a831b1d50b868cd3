//! kis CLI - Keep it Secret
//!
//! Command-line interface for storing key/value secrets locally, encrypted
//! with a key derived from the master password.

use clap::{Args, Parser, Subcommand};
use std::error::Error as StdError;
use std::io;
use std::path::PathBuf;
use std::process;

use kis::config::{Config, HOME_ENV};
use kis::prompt::{Prompt, ReaderPrompt, TerminalPrompt};
use kis::vault::{Payload, Vault};

#[derive(Parser)]
#[command(name = "kis")]
#[command(version)]
#[command(about = "Keep it Secret: store your secrets locally, encrypted.", long_about = None)]
struct Cli {
    /// Vault directory (defaults to ~/.kis)
    #[arg(long, global = true, env = HOME_ENV, value_name = "DIR")]
    home: Option<PathBuf>,

    /// Read all answers, passwords included, line by line from stdin
    /// instead of prompting on the terminal
    #[arg(long, global = true)]
    stdin: bool,

    /// Log more (repeat for trace output); RUST_LOG overrides
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the user account for this device
    Register,

    /// Add a structured secret (one or more key/value pairs)
    Add {
        /// Name to store the secret under
        name: String,
    },

    /// Retrieve and decrypt a stored secret
    Get {
        /// Name of the secret
        name: String,
    },

    /// List the names of all stored secrets
    #[command(alias = "ls")]
    List,

    /// Delete a user or a secret
    #[command(subcommand)]
    Delete(DeleteCommands),
}

#[derive(Subcommand)]
enum DeleteCommands {
    /// Delete the registered user
    User(DeleteTarget),

    /// Delete a stored secret
    Secret(DeleteTarget),
}

#[derive(Args)]
struct DeleteTarget {
    /// Username or secret name
    name: Option<String>,

    /// Delete all of them
    #[arg(long, conflicts_with = "name")]
    all: bool,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", error_chain(&e));
        process::exit(1);
    }
}

fn run(cli: Cli) -> kis::Result<()> {
    let config = Config::resolve(cli.home)?;
    let vault = Vault::open(&config)?;
    let mut prompt = get_prompt(cli.stdin);

    match cli.command {
        Commands::Register => {
            let username = vault.register(&mut *prompt)?;
            println!("User {} registered successfully.", username);
        }
        Commands::Add { name } => {
            eprintln!("Creating secret: {}", name);
            eprintln!("Enter your key/value pairs (press Enter on an empty key to finish):");
            let count = vault.add_secret(&name, &mut *prompt)?;
            println!("Secret {} saved ({} fields).", name, count);
        }
        Commands::Get { name } => match vault.get_secret(&name, &mut *prompt)? {
            Payload::Fields(fields) => {
                println!("{}:", name);
                for (key, value) in &fields {
                    println!("  {}: {}", key, value);
                }
            }
            Payload::Raw(text) => println!("{}: {}", name, text),
        },
        Commands::List => {
            let names = vault.list()?;
            if names.is_empty() {
                println!("(no secrets found)");
            }
            for name in names {
                println!("- {}", name);
            }
        }
        Commands::Delete(DeleteCommands::User(target)) => {
            if target.all {
                vault.delete_all_users(&mut *prompt)?;
                println!("All users deleted.");
            } else {
                let username = required_name(target.name, "username")?;
                vault.delete_user(&username, &mut *prompt)?;
                println!("User {} deleted.", username);
            }
        }
        Commands::Delete(DeleteCommands::Secret(target)) => {
            if target.all {
                vault.clear_secrets()?;
                println!("All secrets deleted.");
            } else {
                let name = required_name(target.name, "secret name")?;
                vault.delete_secret(&name)?;
                println!("Secret {} deleted.", name);
            }
        }
    }

    Ok(())
}

fn required_name(name: Option<String>, what: &str) -> kis::Result<String> {
    name.ok_or_else(|| {
        kis::KisError::with_kind(
            kis::ErrorCategory::User,
            kis::ErrorKind::InvalidInput,
            format!("{} is required (or pass --all)", what),
        )
    })
}

fn get_prompt(use_stdin: bool) -> Box<dyn Prompt> {
    if use_stdin {
        Box::new(ReaderPrompt::new(Box::new(io::stdin().lock())))
    } else {
        Box::new(TerminalPrompt::new())
    }
}

/// Installs a stderr tracing subscriber; `RUST_LOG` takes precedence.
fn init_tracing(verbose: u8) {
    use tracing_subscriber::EnvFilter;

    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("kis={level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}
