//! Intel - command-line front end for the AI inbox
//!
//! Every command runs against the local cache and the signed-in Gmail
//! account. Run `intel login` first.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::error;
use std::process::ExitCode;

use mail::{InboxError, InboxSettings, MailContext, Session, ThreadId};

mod output;
mod session;

#[derive(Parser)]
#[command(author, version, about = "AI-assisted Gmail inbox", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show whether you are signed in, and as whom
    Status,
    /// Sign in with Google in the browser
    Login,
    /// Forget stored credentials (cached mail is kept)
    Logout,
    /// Show cached messages without contacting Gmail
    Inbox,
    /// Fetch the most recent threads and show the refreshed inbox
    Sync {
        /// Number of threads to fetch (1-20)
        max: Option<u32>,
    },
    /// Search Gmail directly (results are not cached)
    Search {
        /// Gmail search query, e.g. "from:alice has:attachment"
        query: String,
        /// Number of threads to fetch (1-20)
        max: Option<u32>,
    },
    /// Send an HTML message, optionally as a reply within a thread
    Send {
        to: String,
        subject: String,
        body: String,
        thread: Option<String>,
    },
    /// Analyze cached threads with Gemini
    Analyze {
        /// Re-analyze threads that already have an analysis
        #[arg(long)]
        force: bool,
    },
    /// Draft a reply to a cached message
    Draft { message_id: String },
    /// List cached threads, most urgent first
    Threads,
    /// Delete cached mail for the signed-in account
    Clear,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    if let Err(e) = config::init() {
        error!("Failed to initialize config directory: {}", e);
    }

    let cli = Cli::parse();
    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if let Some(InboxError::Unauthenticated) = e.downcast_ref::<InboxError>() {
                eprintln!("Not signed in. Run `intel login` first.");
            } else {
                eprintln!("Error: {:#}", e);
            }
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<()> {
    let settings = InboxSettings::load().context("Failed to load settings.json")?;
    let context = MailContext::open(settings)?;
    let mut session = session::load();

    let result = dispatch(&context, &mut session, command);

    if let Err(e) = session::save(&session) {
        error!("Failed to save session: {:#}", e);
    }
    result
}

fn dispatch(context: &MailContext, session: &mut Session, command: Commands) -> Result<()> {
    let orchestrator = context.orchestrator();

    match command {
        Commands::Status => {
            let status = context.credentials().status(session, orchestrator.api());
            if !status.is_configured {
                println!("OAuth client not configured (set GOOGLE_CLIENT_ID/GOOGLE_CLIENT_SECRET).");
            }
            match (status.is_authenticated, status.user_email) {
                (true, Some(email)) => println!("Signed in as {}", email),
                (true, None) => println!("Signed in (account could not be identified)"),
                (false, _) => println!("Not signed in"),
            }
        }
        Commands::Login => {
            let email = context.login(session)?;
            println!("Signed in as {}", email);
        }
        Commands::Logout => {
            context.credentials().logout(session);
            println!("Signed out");
        }
        Commands::Inbox => {
            let messages = orchestrator.cached_inbox(session)?;
            output::print_messages(&messages);
        }
        Commands::Sync { max } => {
            let outcome = orchestrator.sync_inbox(session, max)?;
            output::print_messages(&outcome.messages);
            output::print_sync_stats(&outcome.stats);
        }
        Commands::Search { query, max } => {
            let messages = orchestrator.search_inbox(session, &query, max)?;
            output::print_messages(&messages);
        }
        Commands::Send {
            to,
            subject,
            body,
            thread,
        } => {
            let thread = thread.map(ThreadId::from);
            let id = orchestrator.send_reply(session, &to, &subject, &body, thread.as_ref())?;
            println!("Sent message {}", id);
        }
        Commands::Analyze { force } => {
            let count = context.analyze_inbox(session, force)?;
            println!("Analyzed {} threads", count);
            output::print_threads(&context.list_threads(session)?);
        }
        Commands::Draft { message_id } => {
            println!("{}", context.draft_reply(session, &message_id)?);
        }
        Commands::Threads => {
            output::print_threads(&context.list_threads(session)?);
        }
        Commands::Clear => {
            let count = orchestrator.clear_cache(session)?;
            println!("Deleted {} cached messages", count);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from(["intel", "sync", "5"]).unwrap();
        assert!(matches!(cli.command, Commands::Sync { max: Some(5) }));

        let cli = Cli::try_parse_from(["intel", "search", "from:alice"]).unwrap();
        assert!(matches!(cli.command, Commands::Search { max: None, .. }));

        let cli = Cli::try_parse_from(["intel", "send", "a@b.com", "Hi", "<p>Hello</p>", "t1"])
            .unwrap();
        assert!(matches!(cli.command, Commands::Send { thread: Some(_), .. }));

        assert!(Cli::try_parse_from(["intel", "sync", "many"]).is_err());
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
