use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use services::requests::{RecordAnswerRequest, StartSessionRequest};
use services::{Clock, TrainingServices};
use storage::repository::Storage;
use storage::sqlite::SqliteRepository;
use study_core::model::{SessionId, SubjectId, UserId};
use tracing_subscriber::{EnvFilter, fmt as log_fmt, prelude::*};

mod seed;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingArg { flag: &'static str },
    UnknownArg(String),
    UnknownCommand(String),
    InvalidNumber { flag: &'static str, raw: String },
    InvalidId { flag: &'static str, raw: i64 },
    InvalidDbUrl { raw: String },
    InvalidNow { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingArg { flag } => write!(f, "this command requires {flag}"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::UnknownCommand(cmd) => write!(f, "unknown subcommand: {cmd}"),
            ArgsError::InvalidNumber { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
            ArgsError::InvalidId { flag, raw } => {
                write!(f, "invalid {flag} value: {raw} (expected a positive id)")
            }
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidNow { raw } => {
                write!(f, "invalid --now value (expected RFC3339): {raw}")
            }
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn number(args: &mut impl Iterator<Item = String>, flag: &'static str) -> Result<i64, ArgsError> {
    let value = require_value(args, flag)?;
    value
        .trim()
        .parse()
        .map_err(|_| ArgsError::InvalidNumber { flag, raw: value })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  app <command> [options]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  migrate                          Create or upgrade the schema");
    eprintln!("  seed                             Insert demo user, subjects and questions");
    eprintln!("  start --user <id> --kind <kind> [--subject <id>] [--target <n>]");
    eprintln!("  answer --session <id> --question <id> --choice <n> [--seconds <n>]");
    eprintln!("  finalize --session <id>");
    eprintln!("  session --session <id>           One session with its live score");
    eprintln!("  sessions --user <id>             All sessions of a user");
    eprintln!("  metrics --user <id>              Per-subject metrics and rollups");
    eprintln!("  subject --user <id> --subject <id>");
    eprintln!("  dashboard --user <id>            Chart data for the last two weeks");
    eprintln!("  insights --user <id>             Ranked study recommendations");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>   SQLite URL (default: sqlite://study.sqlite3)");
    eprintln!("  --now <rfc3339>     Fixed current time");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  STUDY_DB_URL, STUDY_USER_ID, RUST_LOG");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Migrate,
    Seed,
    Start,
    Answer,
    Finalize,
    Session,
    Sessions,
    Metrics,
    Subject,
    Dashboard,
    Insights,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "migrate" => Some(Self::Migrate),
            "seed" => Some(Self::Seed),
            "start" => Some(Self::Start),
            "answer" => Some(Self::Answer),
            "finalize" => Some(Self::Finalize),
            "session" => Some(Self::Session),
            "sessions" => Some(Self::Sessions),
            "metrics" => Some(Self::Metrics),
            "subject" => Some(Self::Subject),
            "dashboard" => Some(Self::Dashboard),
            "insights" => Some(Self::Insights),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct Args {
    db_url: String,
    now: Option<DateTime<Utc>>,
    user: Option<i64>,
    subject: Option<i64>,
    session: Option<i64>,
    question: Option<i64>,
    choice: Option<i64>,
    seconds: Option<i64>,
    target: Option<i64>,
    kind: Option<String>,
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut parsed = Self {
            db_url: std::env::var("STUDY_DB_URL")
                .ok()
                .map_or_else(|| normalize_sqlite_url("study.sqlite3".into()), normalize_sqlite_url),
            user: std::env::var("STUDY_USER_ID")
                .ok()
                .and_then(|value| value.trim().parse::<i64>().ok()),
            ..Self::default()
        };

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    parsed.db_url = normalize_sqlite_url(value);
                }
                "--now" => {
                    let value = require_value(args, "--now")?;
                    let now = DateTime::parse_from_rfc3339(&value)
                        .map_err(|_| ArgsError::InvalidNow { raw: value.clone() })?
                        .with_timezone(&Utc);
                    parsed.now = Some(now);
                }
                "--user" => parsed.user = Some(number(args, "--user")?),
                "--subject" => parsed.subject = Some(number(args, "--subject")?),
                "--session" => parsed.session = Some(number(args, "--session")?),
                "--question" => parsed.question = Some(number(args, "--question")?),
                "--choice" => parsed.choice = Some(number(args, "--choice")?),
                "--seconds" => parsed.seconds = Some(number(args, "--seconds")?),
                "--target" => parsed.target = Some(number(args, "--target")?),
                "--kind" => parsed.kind = Some(require_value(args, "--kind")?),
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(parsed)
    }

    fn clock(&self) -> Clock {
        self.now.map_or_else(Clock::default, Clock::fixed)
    }

    fn user_id(&self) -> Result<UserId, ArgsError> {
        positive_id("--user", self.user).map(UserId::new)
    }

    fn subject_id(&self) -> Result<SubjectId, ArgsError> {
        positive_id("--subject", self.subject).map(SubjectId::new)
    }

    fn session_id(&self) -> Result<SessionId, ArgsError> {
        positive_id("--session", self.session).map(SessionId::new)
    }
}

fn positive_id(flag: &'static str, raw: Option<i64>) -> Result<u64, ArgsError> {
    let raw = raw.ok_or(ArgsError::MissingArg { flag })?;
    u64::try_from(raw)
        .ok()
        .filter(|id| *id > 0)
        .ok_or(ArgsError::InvalidId { flag, raw })
}

/// Turn bare paths into absolute `sqlite://` URLs that create the file on first use.
fn normalize_sqlite_url(raw: String) -> String {
    let trimmed = raw.trim().to_string();
    if trimmed == "sqlite::memory:" {
        return trimmed;
    }

    let (base, query) = match trimmed.split_once('?') {
        Some((base, query)) => (base.to_string(), Some(query.to_string())),
        None => (trimmed.clone(), None),
    };

    let url = if base.starts_with("sqlite://") {
        base
    } else {
        let path_str = base.strip_prefix("sqlite:").unwrap_or(base.as_str());
        let path = std::path::Path::new(path_str);
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .unwrap_or_else(|_| std::path::PathBuf::from("."))
                .join(path)
        };
        format!("sqlite://{}", absolute.display())
    };

    match query {
        Some(query) => format!("{url}?{query}"),
        None => format!("{url}?mode=rwc"),
    }
}

fn prepare_sqlite_dir(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    if let Some(parent) = std::path::Path::new(path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    // Logs go to stderr so stdout stays machine-readable.
    tracing_subscriber::registry()
        .with(log_fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}

fn emit<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv = std::env::args().skip(1);

    let cmd = match argv.next() {
        None => {
            print_usage();
            return Ok(());
        }
        Some(first) if first == "--help" || first == "-h" => {
            print_usage();
            return Ok(());
        }
        Some(first) => Command::from_arg(&first).ok_or(ArgsError::UnknownCommand(first))?,
    };

    let args = Args::parse(&mut argv)?;

    prepare_sqlite_dir(&args.db_url)?;
    let repo = SqliteRepository::connect(&args.db_url).await?;
    repo.migrate().await?;
    tracing::debug!(db = %args.db_url, command = ?cmd, "storage ready");

    let clock = args.clock();
    let services = TrainingServices::new(Storage::from_backend(repo.clone()), clock);

    match cmd {
        Command::Migrate => {
            tracing::info!(db = %args.db_url, "schema is up to date");
            Ok(())
        }
        Command::Seed => emit(&seed::run(&repo, clock.now()).await?),
        Command::Start => {
            let request = StartSessionRequest {
                user_id: args.user,
                kind: args.kind.clone(),
                subject_id: args.subject,
                target_count: args.target,
            };
            let session = services.sessions().start(request.validate()?).await?;
            emit(&session)
        }
        Command::Answer => {
            let request = RecordAnswerRequest {
                session_id: args.session,
                question_id: args.question,
                chosen_index: args.choice,
                response_seconds: args.seconds,
            };
            let feedback = services.answers().record(request.validate()?).await?;
            emit(&feedback)
        }
        Command::Finalize => emit(&services.sessions().finalize(args.session_id()?).await?),
        Command::Session => emit(&services.sessions().get(args.session_id()?).await?),
        Command::Sessions => emit(&services.sessions().list_for_user(args.user_id()?).await?),
        Command::Metrics => emit(&services.metrics().user_metrics(args.user_id()?).await?),
        Command::Subject => emit(
            &services
                .metrics()
                .subject_metric(args.user_id()?, args.subject_id()?)
                .await?,
        ),
        Command::Dashboard => emit(&services.metrics().dashboard(args.user_id()?).await?),
        Command::Insights => emit(&services.insights().generate(args.user_id()?).await?),
    }
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}
