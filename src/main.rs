use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use jobtrack::{
    build_router,
    client::ApiClient,
    config::{self, DEFAULT_API, ServerConfig},
    db::Database,
    mailer::{LogMailer, Mailer, SmtpMailer},
    models::{ContactMessage, Status},
    session::{Session, SubmitError},
    state::AppState,
    store::{EntityStore, SqliteStore, StoreError},
    tui,
    view::{DEFAULT_PAGE_SIZE, SortColumn, SortDirection},
};
use std::fs::{self, OpenOptions};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const SERVER_LOG_FILTER: &str = "jobtrack=info,tower_http=info";
const CLIENT_LOG_FILTER: &str = "jobtrack=warn";

#[derive(Parser)]
#[command(name = "jobtrack")]
#[command(about = "Track job applications - serve the API, list, edit, and browse")]
struct Cli {
    /// Base URL of a running `jobtrack serve`
    #[arg(long, global = true, env = "JOBTRACK_API", default_value = DEFAULT_API)]
    api: String,

    /// Seconds to wait for the server before giving up
    #[arg(long, global = true, env = "JOBTRACK_TIMEOUT_SECS", default_value = "10")]
    timeout: u64,

    /// Rows per page
    #[arg(long, global = true, default_value_t = DEFAULT_PAGE_SIZE)]
    page_size: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init {
        /// Database file (defaults to JOBTRACK_DB or the data directory)
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Run the REST server
    Serve {
        /// Address to listen on (overrides JOBTRACK_BIND)
        #[arg(short, long)]
        bind: Option<SocketAddr>,

        /// Database file (overrides JOBTRACK_DB)
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// List one page of job applications
    List {
        /// Case-insensitive text matched against company and title
        #[arg(short, long)]
        filter: Option<String>,

        /// Only show this status (applied, got interview, interviewed, rejected, got offer)
        #[arg(short, long)]
        status: Option<String>,

        /// Sort column
        #[arg(long, value_enum)]
        sort: Option<SortArg>,

        /// Sort descending
        #[arg(long)]
        desc: bool,

        /// Page number, starting at 1
        #[arg(short, long, default_value = "1")]
        page: usize,
    },

    /// Show one job application
    Show {
        /// Job application ID
        id: i64,
    },

    /// Add a job application
    Add {
        /// Company name
        #[arg(short, long)]
        company: String,

        /// Job title
        #[arg(short = 't', long)]
        title: String,

        /// Status
        #[arg(short, long, default_value = "applied")]
        status: String,

        /// Applied date as YYYY-MM-DD (defaults to today)
        #[arg(short, long)]
        date: Option<String>,

        /// Free-form notes
        #[arg(short, long)]
        notes: Option<String>,
    },

    /// Change fields of a job application
    Edit {
        /// Job application ID
        id: i64,

        #[arg(short, long)]
        company: Option<String>,

        #[arg(short = 't', long)]
        title: Option<String>,

        #[arg(short, long)]
        status: Option<String>,

        #[arg(short, long)]
        date: Option<String>,

        /// New notes (pass an empty string to clear)
        #[arg(short, long)]
        notes: Option<String>,
    },

    /// Delete a job application
    Delete {
        /// Job application ID
        id: i64,
    },

    /// Send a message through the contact form
    Contact {
        #[arg(short, long)]
        name: String,

        #[arg(short, long)]
        email: String,

        /// Message body
        message: String,
    },

    /// Show stored contact messages, newest first
    Messages {
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Interactive browser
    Browse,
}

#[derive(Clone, Copy, ValueEnum)]
enum SortArg {
    Company,
    Title,
    Status,
    Date,
}

impl From<SortArg> for SortColumn {
    fn from(arg: SortArg) -> Self {
        match arg {
            SortArg::Company => SortColumn::CompanyName,
            SortArg::Title => SortColumn::JobTitle,
            SortArg::Status => SortColumn::Status,
            SortArg::Date => SortColumn::AppliedDate,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Serve { .. } => init_tracing(SERVER_LOG_FILTER, None)?,
        Commands::Browse => init_tracing("jobtrack=info", Some(&config::log_path()))?,
        _ => init_tracing(CLIENT_LOG_FILTER, None)?,
    }

    let timeout = Duration::from_secs(cli.timeout.max(1));
    let page_size = cli.page_size.max(1);

    match cli.command {
        Commands::Init { db } => {
            let path = db.unwrap_or_else(config::db_path_from_env);
            let db = Database::open(&path)?;
            db.init()?;
            println!("Database initialized at {}", db.path().display());
        }

        Commands::Serve { bind, db } => serve(bind, db).await?,

        Commands::List {
            filter,
            status,
            sort,
            desc,
            page,
        } => {
            let client = ApiClient::new(&cli.api, timeout)?;
            let mut session = Session::load(&client, page_size, timeout)
                .await
                .with_context(|| format!("Failed to load job applications from {}", client.base_url()))?;

            if let Some(text) = filter {
                session.set_filter_text(text);
            }
            if let Some(status) = status {
                session.set_filter_status(Some(Status::from(status)));
            }
            let direction = if desc {
                SortDirection::Descending
            } else {
                SortDirection::Ascending
            };
            session.set_sort(sort.map(SortColumn::from), direction);
            if page != 1 && !session.request_page(page) {
                println!("Page {} is out of range; showing page 1.", page);
            }

            let view = session.view();
            if view.page.is_empty() {
                println!("No job applications found.");
            } else {
                println!(
                    "{:<6} {:<24} {:<28} {:<14} {:<10}",
                    "ID", "COMPANY", "TITLE", "STATUS", "APPLIED"
                );
                println!("{}", "-".repeat(86));
                for job in &view.page {
                    println!(
                        "{:<6} {:<24} {:<28} {:<14} {:<10}",
                        job.id.unwrap_or_default(),
                        truncate(&job.company_name, 22),
                        truncate(&job.job_title, 26),
                        job.status.as_str(),
                        job.applied_date.format("%Y-%m-%d").to_string()
                    );
                }
                println!(
                    "\nPage {} of {} ({} matching)",
                    session.view_state().current_page(),
                    view.page_count,
                    view.total_count
                );
            }
        }

        Commands::Show { id } => {
            let client = ApiClient::new(&cli.api, timeout)?;
            match client.get(id).await {
                Ok(job) => {
                    println!("Job application #{}", id);
                    println!("Company: {}", job.company_name);
                    println!("Title: {}", job.job_title);
                    println!("Status: {}", job.status);
                    println!("Applied: {}", job.applied_date.format("%Y-%m-%d"));
                    if let Some(notes) = &job.notes {
                        println!("\n--- Notes ---");
                        for line in textwrap::fill(notes, 78).lines() {
                            println!("{}", line);
                        }
                    }
                }
                Err(StoreError::NotFound(_)) => {
                    println!("Job application #{} not found.", id);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Commands::Add {
            company,
            title,
            status,
            date,
            notes,
        } => {
            let client = ApiClient::new(&cli.api, timeout)?;
            let mut session = Session::new(Vec::new(), page_size, timeout);
            session.begin_create();
            let draft = session.draft_mut();
            draft.company_name = company;
            draft.job_title = title;
            draft.status = Status::from(status);
            draft.applied_date =
                date.unwrap_or_else(|| chrono::Local::now().format("%Y-%m-%d").to_string());
            draft.notes = notes.unwrap_or_default();

            let job = session.submit(&client).await?;
            println!(
                "Added job application #{} ({} - {})",
                job.id.unwrap_or_default(),
                job.company_name,
                job.job_title
            );
        }

        Commands::Edit {
            id,
            company,
            title,
            status,
            date,
            notes,
        } => {
            if company.is_none()
                && title.is_none()
                && status.is_none()
                && date.is_none()
                && notes.is_none()
            {
                println!("Nothing to change. Pass at least one of --company, --title, --status, --date, --notes.");
                return Ok(());
            }

            let client = ApiClient::new(&cli.api, timeout)?;
            let mut session = Session::load(&client, page_size, timeout).await?;
            if let Err(SubmitError::UnknownId(_)) = session.begin_edit(id) {
                println!("Job application #{} not found.", id);
                return Ok(());
            }

            let draft = session.draft_mut();
            if let Some(company) = company {
                draft.company_name = company;
            }
            if let Some(title) = title {
                draft.job_title = title;
            }
            if let Some(status) = status {
                draft.status = Status::from(status);
            }
            if let Some(date) = date {
                draft.applied_date = date;
            }
            if let Some(notes) = notes {
                draft.notes = notes;
            }

            let job = session.submit(&client).await?;
            println!("Updated job application #{} ({})", id, job.status);
        }

        Commands::Delete { id } => {
            let client = ApiClient::new(&cli.api, timeout)?;
            let mut session = Session::new(Vec::new(), page_size, timeout);
            match session.delete(&client, id).await {
                Ok(()) => println!("Deleted job application #{}", id),
                Err(SubmitError::Store(StoreError::NotFound(_))) => {
                    println!("Job application #{} not found.", id);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Commands::Contact {
            name,
            email,
            message,
        } => {
            let msg = ContactMessage {
                name,
                email,
                message,
            };
            msg.validate()?;

            let client = ApiClient::new(&cli.api, timeout)?;
            let receipt = client.send_contact(&msg).await?;
            if !receipt.success {
                bail!("{}", receipt.message);
            }
            println!("{}", receipt.message);
        }

        Commands::Messages { limit } => {
            let client = ApiClient::new(&cli.api, timeout)?;
            let messages = client.recent_contacts(limit).await?;
            if messages.is_empty() {
                println!("No contact messages.");
            } else {
                println!(
                    "{:<6} {:<17} {:<20} {:<28} {:<5}",
                    "ID", "SUBMITTED", "NAME", "EMAIL", "SENT"
                );
                println!("{}", "-".repeat(80));
                for msg in &messages {
                    println!(
                        "{:<6} {:<17} {:<20} {:<28} {:<5}",
                        msg.id,
                        msg.submitted_at.format("%Y-%m-%d %H:%M").to_string(),
                        truncate(&msg.name, 18),
                        truncate(&msg.email, 26),
                        if msg.delivered { "yes" } else { "no" }
                    );
                    for line in textwrap::fill(&msg.message, 72).lines() {
                        println!("       {}", line);
                    }
                }
            }
        }

        Commands::Browse => {
            let client = ApiClient::new(&cli.api, timeout)?;
            let session = Session::load(&client, page_size, timeout)
                .await
                .with_context(|| format!("Failed to load job applications from {}", client.base_url()))?;
            let handle = tokio::runtime::Handle::current();
            tokio::task::spawn_blocking(move || tui::run_browse(session, client, handle))
                .await
                .context("browser task failed")??;
        }
    }

    Ok(())
}

async fn serve(bind: Option<SocketAddr>, db: Option<PathBuf>) -> Result<()> {
    let mut config = ServerConfig::from_env().context("failed to load server configuration")?;
    if let Some(bind) = bind {
        config.bind_addr = bind;
    }
    if let Some(db) = db {
        config.db_path = db;
    }

    let store = SqliteStore::open(&config.db_path)?;
    let mailer: Arc<dyn Mailer> = match &config.smtp {
        Some(smtp) => Arc::new(SmtpMailer::new(smtp)?),
        None => {
            info!("JOBTRACK_SMTP_HOST not set; contact messages are stored and logged only");
            Arc::new(LogMailer)
        }
    };
    let state = AppState::new(store, mailer).with_contact_retention(config.contact_retention);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.bind_addr))?;

    info!(address = %config.bind_addr, db = %config.db_path.display(), "jobtrack server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("jobtrack server stopped");
    Ok(())
}

fn init_tracing(default_filter: &str, log_file: Option<&Path>) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let registry = tracing_subscriber::registry().with(filter);

    match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            registry
                .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
                .init();
        }
        None => registry.with(fmt::layer().with_writer(std::io::stderr)).init(),
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "unable to install Ctrl+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "unable to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
