//! Exam attendance scanner - QR check-in for assessment centers
//!
//! Supervisors scan examinee badges; each scan resolves the badge code,
//! records attendance at most once per exam session, and shows the result.
//!
//! Module structure:
//! - `domain/` - Core types (Examinee, AttendanceRecord, ScanOutcome)
//! - `io/` - External interfaces (camera, decoder, record stores, feedback)
//! - `services/` - Scan pipeline (processor, presenter, controller)
//! - `infra/` - Infrastructure (Config, Metrics)

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use exam_attendance::domain::types::new_attendance_code;
use exam_attendance::domain::{CenterId, LookupScope, RecentScanEntry};
use exam_attendance::infra::{Config, Metrics};
use exam_attendance::io::{
    create_feedback_channel, ChannelCamera, FeedbackMessage, RecordStore, SqliteStore,
};
use exam_attendance::services::{ScanProcessor, ScannerCommand, SessionController, StopReason};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Exam attendance scanner
#[derive(Parser, Debug)]
#[command(name = "exam-attendance", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, env = "CONFIG_FILE", default_value = "config/dev.toml", global = true)]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the scanner; badge payloads are read line by line from stdin
    Scan {
        /// Supervisor to sign in as (overrides [operator] user_id)
        #[arg(long)]
        operator: Option<String>,
        /// Exam session label applied to scans
        #[arg(long)]
        session: Option<String>,
        /// Print feedback as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// Register an assessment center
    AddCenter {
        name: String,
        #[arg(long)]
        location: Option<String>,
    },
    /// Register a supervisor for a center
    AddSupervisor {
        user_id: String,
        full_name: String,
        #[arg(long)]
        center: i64,
        #[arg(long)]
        admin: bool,
    },
    /// Register an examinee; a badge code is generated when none is given
    AddExaminee {
        full_name: String,
        #[arg(long)]
        center: i64,
        #[arg(long)]
        code: Option<String>,
        #[arg(long)]
        national_id: Option<String>,
        #[arg(long)]
        session: Option<String>,
    },
    /// List recorded attendance, newest first
    Attendance {
        /// Limit to one center
        #[arg(long)]
        center: Option<i64>,
    },
}

/// One line of scanner input
#[derive(Debug, PartialEq)]
enum Input {
    Command(ScannerCommand),
    SignIn(String),
    Payload(String),
    Unknown(String),
}

/// Lines starting with ':' are operator commands, anything else is a badge payload
fn parse_line(line: &str) -> Input {
    let Some(rest) = line.trim().strip_prefix(':') else {
        return Input::Payload(line.to_string());
    };

    let (verb, arg) = match rest.split_once(char::is_whitespace) {
        Some((verb, arg)) => (verb, Some(arg.trim())),
        None => (rest, None),
    };

    match (verb, arg) {
        ("start", _) => Input::Command(ScannerCommand::Start),
        ("stop", _) => Input::Command(ScannerCommand::Stop(StopReason::Operator)),
        ("leave", _) => Input::Command(ScannerCommand::Stop(StopReason::LeftScanView)),
        ("session", label) => {
            Input::Command(ScannerCommand::SetExamSession(label.map(str::to_string)))
        }
        ("signout", _) => Input::Command(ScannerCommand::SignOut),
        ("signin", Some(user)) if !user.is_empty() => Input::SignIn(user.to_string()),
        ("quit", _) | ("exit", _) => Input::Command(ScannerCommand::Shutdown),
        _ => Input::Unknown(rest.to_string()),
    }
}

fn print_recent(entries: &[RecentScanEntry]) {
    if entries.is_empty() {
        println!("Recent scans: none");
        return;
    }
    println!("Recent scans:");
    for entry in entries {
        match &entry.session {
            Some(session) => println!("  {}  {}  [{}]", entry.time, entry.name, session),
            None => println!("  {}  {}", entry.time, entry.name),
        }
    }
}

fn print_feedback(message: &FeedbackMessage, json: bool) {
    if json {
        match serde_json::to_string(message) {
            Ok(line) => println!("{}", line),
            Err(e) => warn!(error = %e, "feedback_serialize_failed"),
        }
        return;
    }

    match message {
        FeedbackMessage::StateChanged(state) => println!("[scanner] {}", state.as_str()),
        FeedbackMessage::Processing => println!("Processing..."),
        FeedbackMessage::Outcome(p) => {
            println!("[{}] {}: {}", p.color, p.title, p.body);
            if let Some(detail) = &p.detail {
                println!("    {}", detail);
            }
        }
        FeedbackMessage::RecentScans(entries) => print_recent(entries),
        FeedbackMessage::CameraError(e) => println!("Camera error: {}", e),
        FeedbackMessage::Notice(text) => println!("{}", text),
    }
}

async fn sign_in(
    store: &SqliteStore,
    commands: &mpsc::Sender<ScannerCommand>,
    user_id: &str,
) -> anyhow::Result<bool> {
    match store.load_operator(user_id).await? {
        Some(context) => {
            commands.send(ScannerCommand::SignIn(context)).await?;
            Ok(true)
        }
        None => {
            warn!(operator = %user_id, "unknown_operator");
            println!("No supervisor profile for '{}'", user_id);
            Ok(false)
        }
    }
}

async fn run_scanner(
    config: Config,
    operator: Option<String>,
    session: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    let store = Arc::new(SqliteStore::open(config.store_path())?);
    let metrics = Arc::new(Metrics::new());
    let (feedback, mut feedback_rx) = create_feedback_channel(config.feedback_buffer(), metrics.clone());
    let (feed, camera) = ChannelCamera::channel(config.decode_buffer());
    let (commands_tx, commands_rx) = mpsc::channel(16);

    let mut controller = SessionController::new(
        ScanProcessor::new(store.clone()),
        camera,
        &config,
        feedback,
        metrics.clone(),
    );

    // Feedback printer
    tokio::spawn(async move {
        while let Some(message) = feedback_rx.recv().await {
            print_feedback(&message, json);
        }
    });

    // Metrics reporter (lock-free reads, 0 disables)
    let metrics_interval = config.metrics_interval_secs();
    if metrics_interval > 0 {
        let metrics_clone = metrics.clone();
        tokio::spawn(async move {
            let period = std::time::Duration::from_secs(metrics_interval);
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                interval.tick().await;
                metrics_clone.report().log();
            }
        });
    }

    // Initial sign-in and start
    let user_id = operator.or_else(|| config.operator_user_id().map(str::to_string));
    if let Some(user_id) = user_id {
        if sign_in(&store, &commands_tx, &user_id).await? {
            if session.is_some() {
                commands_tx.send(ScannerCommand::SetExamSession(session)).await?;
            }
            commands_tx.send(ScannerCommand::Start).await?;
        }
    } else {
        println!("Not signed in; use ':signin <user_id>'");
    }

    // Stdin reader: commands and badge payloads
    let stdin_commands = commands_tx.clone();
    let stdin_store = store.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "stdin_read_failed");
                    break;
                }
            };

            let delivered = match parse_line(&line) {
                Input::Command(command) => stdin_commands.send(command).await.is_ok(),
                Input::SignIn(user) => match sign_in(&stdin_store, &stdin_commands, &user).await {
                    Ok(_) => true,
                    Err(e) => {
                        warn!(error = %e, "sign_in_failed");
                        true
                    }
                },
                Input::Payload(text) => {
                    // Anything queued while stopped is discarded on the next start
                    if feed.try_send(text).is_err() {
                        info!("payload_dropped: scanner not listening");
                    }
                    true
                }
                Input::Unknown(verb) => {
                    println!("Unknown command ':{}'", verb);
                    true
                }
            };
            if !delivered {
                break;
            }
        }
        let _ = stdin_commands.send(ScannerCommand::Shutdown).await;
    });

    // Handle shutdown on Ctrl+C
    let signal_commands = commands_tx;
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = signal_commands.send(ScannerCommand::Shutdown).await;
    });

    controller.run(commands_rx).await;
    metrics.report().log();
    Ok(())
}

async fn list_attendance(config: &Config, center: Option<i64>) -> anyhow::Result<()> {
    let store = SqliteStore::open(config.store_path())?;
    let scope = match center {
        Some(id) => LookupScope::Center(CenterId(id)),
        None => LookupScope::AllCenters,
    };

    let records = store.list_attendance(&scope).await.context("failed to list attendance")?;
    if records.is_empty() {
        println!("No attendance recorded");
    }
    for record in records {
        println!(
            "{}  examinee={}  center={}  session={}  by={}",
            record.scanned_at.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S"),
            record.examinee_id,
            record.center_id,
            record.exam_session.as_deref().unwrap_or("-"),
            record.scanned_by,
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = Config::load_from_path(&args.config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        git = env!("GIT_HASH"),
        config_file = %config.config_file(),
        store = %config.store_path(),
        "exam-attendance starting"
    );

    match args.command.unwrap_or(Command::Scan { operator: None, session: None, json: false }) {
        Command::Scan { operator, session, json } => {
            run_scanner(config, operator, session, json).await?;
        }
        Command::AddCenter { name, location } => {
            let store = SqliteStore::open(config.store_path())?;
            let center = store.insert_center(&name, location.as_deref()).await?;
            println!("center {} created: {}", center.id, center.name);
        }
        Command::AddSupervisor { user_id, full_name, center, admin } => {
            let store = SqliteStore::open(config.store_path())?;
            store.insert_supervisor(&user_id, &full_name, CenterId(center), admin).await?;
            println!("supervisor {} created for center {}", user_id.trim(), center);
        }
        Command::AddExaminee { full_name, center, code, national_id, session } => {
            let code = code.unwrap_or_else(new_attendance_code);
            if code.trim().is_empty() {
                bail!("attendance code must not be blank");
            }
            let store = SqliteStore::open(config.store_path())?;
            let examinee = store
                .insert_examinee(
                    &code,
                    &full_name,
                    national_id.as_deref(),
                    CenterId(center),
                    session.as_deref(),
                )
                .await?;
            println!(
                "examinee {} created: {} (code {})",
                examinee.id, examinee.full_name, examinee.attendance_code
            );
        }
        Command::Attendance { center } => list_attendance(&config, center).await?,
    }

    info!("exam-attendance shutdown complete");
    Ok(())
}
