mod app;
mod config;
mod kv;
mod local;
mod mirror;
mod models;
mod prompt;
mod remote;
mod sort;
mod store;
mod tui;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use app::App;
use config::{Backend, Config};
use mirror::RemoteMirror;
use models::{AddOutcome, CompanyEntry, Field, FieldUpdate, NewEntry, SortKey, SortOrder, STAGES};
use prompt::TerminalPrompt;
use remote::DocumentStore;

#[derive(Parser)]
#[command(name = "shortlist")]
#[command(about = "Track job applications - companies, selection stages, notes and interview dates")]
struct Cli {
    /// Where entries are kept (overrides SHORTLIST_BACKEND)
    #[arg(short, long, global = true, value_enum)]
    backend: Option<Backend>,

    /// Local database path (overrides SHORTLIST_DB)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// More log output (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a company
    Add {
        /// Company name
        name: String,

        /// Free-form note
        #[arg(short, long, default_value = "")]
        note: String,

        /// Interview date (YYYY-MM-DD)
        #[arg(short, long, default_value = "")]
        date: String,
    },

    /// List companies
    List {
        /// Sort key (local backend only)
        #[arg(short, long, value_enum, default_value = "name")]
        sort: SortKey,

        /// Sort direction
        #[arg(short, long, value_enum, default_value = "asc")]
        order: SortOrder,
    },

    /// Show one company
    Show {
        /// Entry ID
        id: String,
    },

    /// Change one field of a company
    Set {
        /// Entry ID
        id: String,

        /// Field to change
        #[arg(value_enum)]
        field: Field,

        /// New value (status: label, slug or stage number 1-6)
        value: String,
    },

    /// Delete a company
    Delete {
        /// Entry ID
        id: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// List the selection stages in order
    Stages,

    /// Browse and edit interactively
    Browse,

    /// Print the remote collection every time it changes
    Watch,
}

#[derive(Debug, PartialEq)]
enum LogTarget {
    Stderr,
    File(PathBuf),
}

/// Browse owns the terminal, so its log lines go to a file instead.
fn log_target(command: &Commands) -> LogTarget {
    match command {
        Commands::Browse => LogTarget::File(kv::data_dir().join("shortlist.log")),
        _ => LogTarget::Stderr,
    }
}

fn init_logging(verbose: u8, target: &LogTarget) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        _ => EnvFilter::new("debug"),
    };
    let builder = fmt().with_env_filter(filter);
    match target {
        LogTarget::Stderr => builder.with_writer(std::io::stderr).init(),
        LogTarget::File(path) => match open_log(path) {
            Ok(file) => builder.with_ansi(false).with_writer(Mutex::new(file)).init(),
            Err(_) => builder.with_writer(std::io::sink).init(),
        },
    }
}

fn open_log(path: &Path) -> std::io::Result<std::fs::File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    OpenOptions::new().create(true).append(true).open(path)
}

fn print_entries(entries: &[CompanyEntry]) {
    if entries.is_empty() {
        println!("No companies found.");
        return;
    }
    println!("{:<36} {:<24} {:<24} {:<10} {}", "ID", "STATUS", "NAME", "DATE", "NOTE");
    println!("{}", "-".repeat(110));
    for entry in entries {
        println!(
            "{:<36} {:<24} {:<24} {:<10} {}",
            entry.id,
            truncate(entry.status.display_name(), 22),
            truncate(&entry.name, 22),
            entry.interview_date,
            truncate(entry.note.lines().next().unwrap_or(""), 30)
        );
    }
}

fn print_entry(entry: &CompanyEntry) {
    println!("Company: {}", entry.name);
    println!("ID: {}", entry.id);
    match entry.status.position() {
        Some(i) => println!("Status: {} ({}/{})", entry.status, i + 1, STAGES.len()),
        None => println!("Status: {} (unknown stage)", entry.status),
    }
    if !entry.interview_date.is_empty() {
        println!("Interview: {}", entry.interview_date);
    }
    if let Some(created) = entry.created_at {
        println!("Created: {}", created.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S"));
    }
    if !entry.note.is_empty() {
        println!("\n--- Note ---\n{}", entry.note);
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, &log_target(&cli.command));

    let mut config = Config::from_env()?;
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }
    if let Some(db) = cli.db {
        config.db_path = Some(db);
    }

    match cli.command {
        Commands::Add { name, note, date } => {
            let mut app = open_app(&config)?;
            app.draft = NewEntry::new(name)
                .with_note(note)
                .with_interview_date(models::parse_date(&date)?);
            let mut prompt = TerminalPrompt::new(false);
            match app.submit_draft(&mut prompt)? {
                AddOutcome::Added(id) => println!("Added entry {}", id),
                AddOutcome::Blank | AddOutcome::Duplicate => println!("Nothing added."),
            }
        }

        Commands::List { sort, order } => {
            let mut app = open_app(&config)?;
            if !app.sorts_view() {
                info!("{} backend lists in creation order; ignoring sort options", app.backend_name());
            }
            app.set_sort(sort, order);
            print_entries(&app.rows()?);
        }

        Commands::Show { id } => {
            let mut app = open_app(&config)?;
            match app.find(&id)? {
                Some(entry) => print_entry(&entry),
                None => println!("Entry {} not found.", id),
            }
        }

        Commands::Set { id, field, value } => {
            let update = FieldUpdate::parse(field, &value)?;
            let mut app = open_app(&config)?;
            if app.update_field(&id, update)? {
                println!("Updated {} of {}", field.key(), id);
            } else {
                println!("Entry {} not found.", id);
            }
        }

        Commands::Delete { id, yes } => {
            let mut app = open_app(&config)?;
            let mut prompt = TerminalPrompt::new(yes);
            if app.delete(&id, &mut prompt)? {
                println!("Deleted {}", id);
            }
        }

        Commands::Stages => {
            for (i, stage) in STAGES.iter().enumerate() {
                println!("{}. {:<24} {:<24} {}", i + 1, stage.display_name(), stage.slug(), stage.label());
            }
        }

        Commands::Browse => {
            let mut app = open_app(&config)?;
            tui::run_browse(&mut app)?;
        }

        Commands::Watch => {
            if config.backend != Backend::Remote {
                return Err(anyhow!("watch follows the remote collection; use --backend remote"));
            }
            let mut mirror = RemoteMirror::connect(DocumentStore::new(&config.remote)?)?;
            info!("watching remote collection, press Ctrl-C to stop");
            loop {
                if mirror.wait_for_snapshot(Duration::from_secs(60)) {
                    println!("\n[{}]", chrono::Local::now().format("%H:%M:%S"));
                    print_entries(mirror.entries());
                }
            }
        }
    }

    Ok(())
}

fn open_app(config: &Config) -> Result<App> {
    Ok(App::new(store::open(config)?))
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
