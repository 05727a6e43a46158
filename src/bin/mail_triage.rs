use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chrono::{Local, NaiveDate, Utc};
use clap::{Parser, Subcommand};

use mail_triage::auth::{token_manager, token_store};
use mail_triage::config::{Config, load_config, resolve_db_path};
use mail_triage::llm::MessagesClient;
use mail_triage::mail::imap_client::ImapReader;
use mail_triage::store::repo::SnapshotStore;
use mail_triage::store::sqlite::SqliteStore;
use mail_triage::triage::classify::Classifier;
use mail_triage::triage::ingest::Ingestor;
use mail_triage::triage::persist::Persister;
use mail_triage::triage::{run_date_in, run_once};

const API_KEY_ENV: &str = "MAIL_TRIAGE_API_KEY";
const STORE_BUSY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "mail_triage")]
#[command(about = "Classify recent mail and keep a daily snapshot of what matters", long_about = None)]
struct Cli {
    /// Config file (defaults to the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Without a subcommand, one triage cycle runs
    #[command(subcommand)]
    cmd: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Print the stored snapshot for a date
    Show {
        /// YYYY-MM-DD, today when omitted
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Store a secret in the OS keyring (e.g. api-key, imap-password:<user>)
    SetSecret { name: String },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.cmd {
        None => {
            let cfg = load_config(cli.config.as_deref())
                .map_err(|e| anyhow!("Configuration error: {e}"))?;
            run(&cfg)
        }

        Some(Command::Show { date }) => {
            let cfg = load_config(cli.config.as_deref())
                .map_err(|e| anyhow!("Configuration error: {e}"))?;
            let store = SqliteStore::open(&resolve_db_path(&cfg)?, STORE_BUSY_TIMEOUT)?;
            let date = date.unwrap_or_else(|| Local::now().date_naive());
            let rows = store.list_date(date)?;
            println!("{} important messages for {date}", rows.len());
            for r in rows {
                let action = if r.requires_action { "action" } else { "fyi" };
                println!(
                    "[{:<6}] [{action:<6}] {}  {}  ({})",
                    r.priority.as_str(),
                    r.received_at.format("%Y-%m-%d %H:%M"),
                    r.subject,
                    r.sender
                );
            }
            Ok(())
        }

        Some(Command::SetSecret { name }) => {
            eprintln!("Paste secret for '{name}' (end with Ctrl-D):");
            let mut secret = String::new();
            std::io::Read::read_to_string(&mut std::io::stdin(), &mut secret)?;
            token_store::save_secret(&name, secret.trim())?;
            println!("Saved secret '{name}'");
            Ok(())
        }
    }
}

/// One full cycle. Partial failures are reported in the summary, not as an
/// error; only setup problems make this return `Err`.
fn run(cfg: &Config) -> Result<()> {
    let store = SqliteStore::open(&resolve_db_path(cfg)?, STORE_BUSY_TIMEOUT)
        .context("opening snapshot store")?;

    let api_key = token_store::lookup_secret(API_KEY_ENV, token_store::API_KEY)?
        .ok_or_else(|| anyhow!("no API key: set {API_KEY_ENV} or run `set-secret api-key`"))?;
    let endpoint = MessagesClient::new(&cfg.inference, api_key)?;

    let credential = token_manager::resolve_credential(&cfg.mailbox)?;
    let reader = ImapReader::new(
        cfg.mailbox.imap_server.clone(),
        cfg.mailbox.port,
        cfg.mailbox.user.clone(),
        credential,
        cfg.mailbox.timeout(),
    );

    let ingestor = Ingestor::new(
        &reader,
        cfg.mailbox.folders.clone(),
        cfg.mailbox.page_size,
        cfg.mailbox.user.clone(),
        cfg.triage.window(),
    );
    let classifier = Classifier::new(
        &endpoint,
        cfg.triage.batch_size,
        cfg.triage.preview_chars,
        cfg.triage.owner.clone(),
    );
    let persister = Persister::new(&store, cfg.mailbox.user.clone());

    // One clock read: the window and the snapshot date agree.
    let now = Utc::now();
    let run_date = run_date_in(now, &Local);

    println!("starting triage for {}", cfg.mailbox.user);
    let summary = run_once(&ingestor, &classifier, &persister, now, run_date);
    println!("{summary}");
    Ok(())
}
