//! `fitwell` command-line front end.
//!
//! Keeps the session in a JSON file (`FITWELL_SESSION_FILE`, default
//! `~/.fitwell/session.json`) and talks to the REST API through the same
//! session manager and route guard the web client uses.


use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use fitwell::config::{ClientConfig, normalize_api_url};
use fitwell::net::api::{ApiClient, AuthApi};
use fitwell::net::types::Registration;
use fitwell::routes::{self, Page};
use fitwell::state::store::FileStore;
use fitwell::{AuthError, GuardDecision, Role, SessionManager, TokenStore};
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("{}", .0.user_message())]
    Auth(#[from] AuthError),
    #[error("not signed in; run `fitwell login`")]
    NotSignedIn,
    #[error("Access denied. Admin access required.")]
    AdminRequired,
    #[error("output failed: {0}")]
    Io(#[from] io::Error),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "fitwell", about = "FitWell account and session CLI")]
struct Cli {
    #[arg(long, env = "FITWELL_API_URL")]
    api_url: Option<String>,

    #[arg(long, env = "FITWELL_SESSION_FILE")]
    session_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in and store the session.
    Login(LoginArgs),
    /// Create an account; signs in when the server returns credentials.
    Register(RegisterArgs),
    /// Print the stored user without contacting the server.
    Whoami,
    /// Verify the stored session with the server.
    Status,
    /// Forget the stored session.
    Logout,
    /// Show what the web client would do when navigating to a path.
    Open { path: String },
}

#[derive(Args, Debug)]
struct LoginArgs {
    #[arg(long)]
    email: String,

    #[arg(long, env = "FITWELL_PASSWORD", hide_env_values = true)]
    password: String,

    #[arg(long, value_parser = parse_role)]
    role: Option<Role>,

    /// Sign in through the admin portal: non-admin accounts are refused.
    #[arg(long, default_value_t = false)]
    admin: bool,
}

#[derive(Args, Debug)]
struct RegisterArgs {
    #[arg(long)]
    name: String,

    #[arg(long)]
    email: String,

    #[arg(long, env = "FITWELL_PASSWORD", hide_env_values = true)]
    password: String,

    #[arg(long, value_parser = parse_role, default_value = "student")]
    role: Role,

    #[arg(long)]
    gender: Option<String>,

    #[arg(long)]
    blood_group: Option<String>,

    /// Height in centimetres.
    #[arg(long)]
    height: Option<f64>,

    /// Weight in kilograms.
    #[arg(long)]
    weight: Option<f64>,

    #[arg(long)]
    payment_method: Option<String>,
}

impl From<RegisterArgs> for Registration {
    fn from(args: RegisterArgs) -> Self {
        Self {
            name: args.name,
            email: args.email,
            password: args.password,
            role: args.role,
            gender: args.gender,
            blood_group: args.blood_group,
            height: args.height,
            weight: args.weight,
            payment_method: args.payment_method,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let mut stdout = io::stdout().lock();
    match run(cli, &mut stdout).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

async fn run(cli: Cli, out: &mut impl Write) -> Result<(), CliError> {
    let mut config = ClientConfig::from_env()?;
    if let Some(api_url) = cli.api_url {
        config.api_url = normalize_api_url(&api_url)?;
    }
    if let Some(session_file) = cli.session_file {
        config.session_file = session_file;
    }
    tracing::debug!(api_url = %config.api_url, session_file = %config.session_file.display(), "cli config");

    let api = ApiClient::new(&config)?;
    let manager = SessionManager::new(api, FileStore::new(&config.session_file));
    run_command(&manager, cli.command, out).await
}

async fn run_command<A: AuthApi, S: TokenStore>(
    manager: &SessionManager<A, S>,
    command: Command,
    out: &mut impl Write,
) -> Result<(), CliError> {
    manager.hydrate();
    match command {
        Command::Login(args) => run_login(manager, args, out).await,
        Command::Register(args) => run_register(manager, args, out).await,
        Command::Whoami => run_whoami(manager, out),
        Command::Status => run_status(manager, out).await,
        Command::Logout => {
            manager.logout();
            writeln!(out, "Signed out")?;
            Ok(())
        }
        Command::Open { path } => run_open(manager, &path, out).await,
    }
}

async fn run_login<A: AuthApi, S: TokenStore>(
    manager: &SessionManager<A, S>,
    args: LoginArgs,
    out: &mut impl Write,
) -> Result<(), CliError> {
    let role = if args.admin { Some(Role::Admin) } else { args.role };
    let user = manager.sign_in(&args.email, &args.password, role).await?;

    if args.admin && user.role != Role::Admin {
        tracing::warn!(user_id = user.id, role = %user.role, "non-admin account refused at admin sign-in");
        manager.logout();
        return Err(CliError::AdminRequired);
    }

    writeln!(out, "Signed in as {} ({})", user.name, user.role)?;
    writeln!(out, "Dashboard: {}", user.role.dashboard_path())?;
    Ok(())
}

async fn run_register<A: AuthApi, S: TokenStore>(
    manager: &SessionManager<A, S>,
    args: RegisterArgs,
    out: &mut impl Write,
) -> Result<(), CliError> {
    manager.register(args.into()).await?;

    match manager.snapshot().user {
        Some(user) => writeln!(out, "Registered and signed in as {} ({})", user.name, user.role)?,
        None => writeln!(out, "Registration successful. Sign in with `fitwell login`.")?,
    }
    Ok(())
}

fn run_whoami<A: AuthApi, S: TokenStore>(manager: &SessionManager<A, S>, out: &mut impl Write) -> Result<(), CliError> {
    let user = manager.snapshot().user.ok_or(CliError::NotSignedIn)?;
    writeln!(out, "{}", serde_json::to_string_pretty(&user)?)?;
    Ok(())
}

async fn run_status<A: AuthApi, S: TokenStore>(
    manager: &SessionManager<A, S>,
    out: &mut impl Write,
) -> Result<(), CliError> {
    if !manager.snapshot().is_authenticated() {
        writeln!(out, "Not signed in")?;
        return Ok(());
    }

    match manager.check_auth().await {
        Ok(user) => {
            writeln!(out, "Verified: {} <{}> ({})", user.name, user.email, user.role)?;
            Ok(())
        }
        Err(e) => {
            writeln!(out, "Session expired; signed out")?;
            Err(e.into())
        }
    }
}

async fn run_open<A: AuthApi, S: TokenStore>(
    manager: &SessionManager<A, S>,
    path: &str,
    out: &mut impl Write,
) -> Result<(), CliError> {
    let page = routes::resolve(path);
    let decision = match page.guard() {
        Some(guard) => guard.authorize(manager, path).await,
        None => GuardDecision::Render,
    };
    writeln!(out, "{}", describe(page, &decision))?;
    Ok(())
}

/// One-line summary of a navigation outcome.
fn describe(page: Page, decision: &GuardDecision) -> String {
    match (decision, decision.target()) {
        (GuardDecision::Pending, _) => "pending".to_owned(),
        (_, Some(target)) => format!("redirect {target}"),
        (_, None) => format!("render {}", page.title()),
    }
}

fn parse_role(raw: &str) -> Result<Role, String> {
    match Role::parse(raw) {
        Some(role) if role.is_known() => Ok(role),
        _ => Err(format!("unknown role '{raw}'; expected one of student, staff, trainer, admin")),
    }
}
