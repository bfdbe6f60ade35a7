// Command-line surface and command handlers.
//
// `run` owns the login-retry policy: a command that fails with
// `InvalidLogin` is re-run once with freshly prompted credentials.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use crossterm::tty::IsTty;
use tracing::debug;

use crate::api::ScanClient;
use crate::archive::zip_directory;
use crate::cancel::CancelToken;
use crate::config::ConfigStore;
use crate::credentials::{CredentialStore, Credentials};
use crate::error::ClientError;
use crate::logging::LogFormat;
use crate::models::ScanResult;
use crate::poll::PollLoop;
use crate::session::Session;
use crate::transport::{Transport, TransportOptions};
use crate::ui;

/// Runs of a command allowed when the service rejects the login.
pub const LOGIN_ATTEMPTS: u32 = 2;

#[derive(Debug, Parser)]
#[command(
    name = "protecodesc",
    version,
    about = "Protecode SC commandline tools. To use this tool you need to have an account on the service."
)]
pub struct Cli {
    /// Do not verify TLS certificate for HTTPS
    #[arg(long, global = true)]
    pub insecure: bool,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(long, value_enum, default_value_t = LogFormat::Compact, global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List groups
    Groups,
    /// List apps
    List {
        /// Show applications in GROUP
        #[arg(long, value_name = "GROUP")]
        group: Option<String>,
    },
    /// Get scan result
    Result {
        /// Analysis ID or file SHA1 hash
        id_or_sha1: String,
        /// Output the result document as JSON
        #[arg(long)]
        json: bool,
    },
    /// Request rescan of existing result
    Rescan {
        /// Analysis ID or file SHA1 hash
        id_or_sha1: String,
        /// Scan in background; default: wait for results
        #[arg(long)]
        background: bool,
    },
    /// Analyze a file or directory. Directories are compressed to a ZIP
    /// archive before upload.
    Scan {
        /// Files or directories to analyze
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Upload to group id GROUP (see `groups`); defaults to the
        /// configured default group
        #[arg(long, value_name = "GROUP")]
        group: Option<u64>,
        /// Scan in background; default: wait for results
        #[arg(long)]
        background: bool,
    },
    /// Delete scan result
    Delete {
        /// Analysis ID or file SHA1 hash
        id_or_sha1: String,
        /// Do not ask for confirmation
        #[arg(long, short)]
        yes: bool,
    },
    /// Save username/password and configure server address
    Login,
    /// Forget saved username and password
    Logout,
    /// Show or set the group used by `scan` when --group is not given
    DefaultGroup {
        group: Option<u64>,
        /// Remove the default group
        #[arg(long, conflicts_with = "group")]
        clear: bool,
    },
}

/// Execute `cli` against the settings in the default config directory.
pub fn run(cli: Cli, cancel: CancelToken) -> Result<()> {
    let dir = ConfigStore::default_dir()?;
    let mut session = Session::open_in(&dir)
        .with_context(|| format!("Failed to load settings from {}", dir.display()))?;
    run_with_session(cli, &mut session, cancel)
}

pub fn run_with_session<S: CredentialStore>(
    cli: Cli,
    session: &mut Session<S>,
    cancel: CancelToken,
) -> Result<()> {
    match &cli.command {
        Commands::Login => return login(session),
        Commands::Logout => {
            session.forget_credentials()?;
            println!("Forgot saved login details.");
            return Ok(());
        }
        Commands::DefaultGroup { group, clear } => {
            return default_group(session, *group, *clear);
        }
        _ => {}
    }

    if cli.insecure {
        println!("Warning: Not verifying TLS certificates.");
    }
    let options = TransportOptions {
        insecure: cli.insecure,
        ..TransportOptions::default()
    };

    let credentials = match session.stored_credentials()? {
        Some(credentials) => credentials,
        None => {
            println!("Login required.");
            ui::update_login_credentials(session)?
        }
    };

    run_with_login_retry(
        session,
        &cli.command,
        credentials,
        |session, credentials| Ok(session.connect(credentials, &options, cancel.clone())?),
        ui::update_login_credentials,
    )
}

/// Run `command`, asking for new credentials after each `InvalidLogin`.
/// At most `LOGIN_ATTEMPTS` runs are made.
fn run_with_login_retry<S, T, C, P>(
    session: &mut Session<S>,
    command: &Commands,
    mut credentials: Credentials,
    mut connect: C,
    mut prompt: P,
) -> Result<()>
where
    S: CredentialStore,
    T: Transport,
    C: FnMut(&Session<S>, Credentials) -> Result<ScanClient<T>>,
    P: FnMut(&mut Session<S>) -> Result<Credentials>,
{
    let mut attempt = 1;
    loop {
        let client = connect(&*session, credentials.clone())?;
        match dispatch(&client, session.config(), command) {
            Err(e) if is_client_error(&e, |c| matches!(c, ClientError::InvalidLogin)) => {
                debug!(attempt, "Login rejected by the service");
                if attempt >= LOGIN_ATTEMPTS {
                    bail!("Login failed. Out of login attempts, aborting.");
                }
                attempt += 1;
                println!("Login failed. Please log in again.");
                credentials = prompt(session)?;
            }
            other => return other,
        }
    }
}

/// True if any error in the chain is a `ClientError` matching `pred`.
pub fn is_client_error(err: &anyhow::Error, pred: impl Fn(&ClientError) -> bool) -> bool {
    err.chain()
        .filter_map(|e| e.downcast_ref::<ClientError>())
        .any(pred)
}

fn dispatch<T: Transport>(client: &ScanClient<T>, config: &ConfigStore, command: &Commands) -> Result<()> {
    match command {
        Commands::Groups => {
            let groups = client.list_groups().context("Failed to list groups")?;
            println!("{}", ui::render_groups(&groups));
        }
        Commands::List { group } => {
            let apps = client
                .list_apps(group.as_deref())
                .context("Failed to list apps")?;
            println!("{}", ui::render_apps(&apps));
        }
        Commands::Result { id_or_sha1, json } => {
            print_result(client, id_or_sha1, *json)?;
        }
        Commands::Rescan {
            id_or_sha1,
            background,
        } => {
            client
                .rescan(id_or_sha1)
                .with_context(|| format!("Failed to request rescan of {}", id_or_sha1))?;
            println!("Requested rescan of {}", id_or_sha1);
            if !background {
                print_result(client, id_or_sha1, false)?;
            }
        }
        Commands::Scan {
            files,
            group,
            background,
        } => {
            let group = group.or(config.get_default_group());
            scan(client, files, group, *background)?;
        }
        Commands::Delete { id_or_sha1, yes } => {
            if !yes && !ui::confirm("Really delete all data for result?")? {
                println!("Aborted!");
                return Ok(());
            }
            match client.delete(id_or_sha1) {
                Ok(_) => println!("Deleted {}", id_or_sha1),
                Err(ClientError::ResultNotFound) => println!("Result was not found"),
                Err(e) => return Err(e).with_context(|| format!("Failed to delete {}", id_or_sha1)),
            }
        }
        Commands::Login | Commands::Logout | Commands::DefaultGroup { .. } => {}
    }
    Ok(())
}

/// Wait for a result and print it. A missing result is reported, not an error.
fn print_result<T: Transport>(client: &ScanClient<T>, id_or_sha1: &str, json: bool) -> Result<()> {
    let mut spinner = None;
    let waited = PollLoop::default().wait(client, id_or_sha1, |_| {
        if spinner.is_none() {
            spinner = Some(ui::wait_spinner(id_or_sha1));
        }
    });
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    let response = match waited {
        Ok(response) => response,
        Err(ClientError::ResultNotFound) => {
            println!("Result not found");
            return Ok(());
        }
        Err(e) => return Err(e).with_context(|| format!("Failed to get result for {}", id_or_sha1)),
    };

    if json {
        println!("{}", serde_json::to_string(&response)?);
    } else {
        let color = std::io::stdout().is_tty();
        println!("{}", ui::render_result(&response.results, color));
    }
    Ok(())
}

fn scan<T: Transport>(
    client: &ScanClient<T>,
    files: &[PathBuf],
    group: Option<u64>,
    background: bool,
) -> Result<()> {
    println!("Uploading {} objects...", files.len());
    let mut uploaded = Vec::new();
    let mut failures = 0usize;

    for path in files {
        println!("{}", path.display());
        match upload_one(client, path, group) {
            Ok(result) => {
                println!("{}", ui::render_upload(&result));
                if let Some(sha1) = result.sha1sum {
                    uploaded.push(sha1);
                }
            }
            Err(e) if aborts_workflow(&e) => return Err(e),
            Err(e) => {
                failures += 1;
                eprintln!(" - Failed: {:#}", e);
            }
        }
    }

    if !background {
        println!();
        println!("{}", ui::RULE);
        for sha1 in &uploaded {
            match print_result(client, sha1, false) {
                Ok(()) => {}
                Err(e) if aborts_workflow(&e) => return Err(e),
                Err(e) => {
                    failures += 1;
                    eprintln!("{:#}", e);
                }
            }
            println!("{}", ui::RULE);
        }
    }

    if failures > 0 {
        bail!("{} of {} objects failed", failures, files.len());
    }
    Ok(())
}

/// Errors that end the whole command instead of just the current file.
fn aborts_workflow(err: &anyhow::Error) -> bool {
    is_client_error(err, |c| {
        matches!(c, ClientError::InvalidLogin | ClientError::Cancelled)
    })
}

fn upload_one<T: Transport>(client: &ScanClient<T>, path: &Path, group: Option<u64>) -> Result<ScanResult> {
    if path.is_dir() {
        let archive = zip_directory(path)
            .with_context(|| format!("Failed to archive directory {}", path.display()))?;
        tracing::info!(
            dir = %path.display(),
            files = archive.entries(),
            "Uploading directory as {}",
            archive.display_name()
        );
        client
            .upload(archive.path(), Some(archive.display_name()), group)
            .with_context(|| format!("Failed to upload {}", path.display()))
    } else {
        client
            .upload(path, None, group)
            .with_context(|| format!("Failed to upload {}", path.display()))
    }
}

fn login<S: CredentialStore>(session: &mut Session<S>) -> Result<()> {
    let host = ui::prompt_host()?;
    session.config_mut().set_host(&host)?;
    ui::update_login_credentials(session)?;
    Ok(())
}

fn default_group<S: CredentialStore>(session: &mut Session<S>, group: Option<u64>, clear: bool) -> Result<()> {
    if clear {
        session.config_mut().set_default_group(None)?;
        println!("Default group cleared.");
    } else if let Some(group) = group {
        session.config_mut().set_default_group(Some(group))?;
        println!("Default group set to {}.", group);
    } else {
        match session.config().get_default_group() {
            Some(group) => println!("Default group: {}", group),
            None => println!("No default group set."),
        }
    }
    Ok(())
}
