//! securecred demo
//!
//! Drives the vault, session and document flows from the command line against
//! one of the store backends:
//!
//! - `memory`: simulated phone keystore, lost when the process exits
//! - `keyring`: the OS keyring (software tier only)
//! - `file`: passphrase-encrypted file under `--data-dir`
//!
//! `walkthrough` runs the whole login / MPIN / biometric / document story on a
//! simulated device and needs no setup.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use securecred_vault::{
    load_config, DocumentKind, DocumentService, EncryptedFileStore, MemoryStore, MpinCheck,
    PromptResponse, SecureStore, SecureVault, SessionService, VaultConfig,
};
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Secure credential vault demo
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Store backend
    #[arg(long, value_enum, default_value = "memory")]
    backend: Backend,

    /// Directory of the encrypted file store
    #[arg(long, default_value = "securecred-data")]
    data_dir: PathBuf,

    /// Passphrase of the encrypted file store
    #[arg(long, env = "SECURECRED_PASSPHRASE", hide_env_values = true)]
    passphrase: Option<String>,

    /// Namespace prefix, overrides the config file
    #[arg(long)]
    service_name: Option<String>,

    /// JSON vault configuration (defaults when missing)
    #[arg(long, default_value = "securecred.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Backend {
    Memory,
    Keyring,
    File,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log in and remember the credentials
    Login { username: String, password: String },
    /// Restore the previous session with biometrics
    Restore,
    /// End the session
    Logout {
        /// Also forget credentials, token and MPIN
        #[arg(long)]
        clear: bool,
    },
    #[command(subcommand)]
    Mpin(MpinCommand),
    #[command(subcommand)]
    Biometrics(BiometricsCommand),
    /// Sensitive key-value data
    #[command(subcommand)]
    Secret(SecretCommand),
    /// Server-keyed credentials
    #[command(subcommand)]
    Internet(InternetCommand),
    /// Encrypted documents
    #[command(subcommand)]
    Doc(DocCommand),
    /// Show the biometry the platform supports
    Biometry,
    /// Scripted tour on a simulated device
    Walkthrough,
}

#[derive(Subcommand, Debug)]
enum MpinCommand {
    Set { pin: String, confirm: String },
    Verify { pin: String },
    Forgot,
}

#[derive(Subcommand, Debug)]
enum BiometricsCommand {
    /// Save credentials for biometric quick-login
    Enable { username: String, password: String },
    Disable,
    SignIn {
        #[arg(long)]
        prompt: Option<String>,
    },
    Status,
}

#[derive(Subcommand, Debug)]
enum SecretCommand {
    Set {
        key: String,
        value: String,
        #[arg(long)]
        bio: bool,
    },
    Get {
        key: String,
        #[arg(long)]
        bio: bool,
        #[arg(long)]
        prompt: Option<String>,
    },
    Delete {
        key: String,
        #[arg(long)]
        bio: bool,
    },
}

#[derive(Subcommand, Debug)]
enum InternetCommand {
    Set {
        username: String,
        password: String,
        #[arg(long)]
        server: Option<String>,
    },
    Get {
        #[arg(long)]
        server: Option<String>,
    },
    Delete {
        #[arg(long)]
        server: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum DocCommand {
    Save {
        id: String,
        name: String,
        /// statement, invoice, report or other
        #[arg(long, default_value = "other")]
        kind: DocumentKind,
        /// Read the content from a file instead of `--text`
        #[arg(long, conflicts_with = "text")]
        file: Option<PathBuf>,
        #[arg(long)]
        text: Option<String>,
    },
    Read { id: String },
    Delete { id: String },
    List,
    Clear,
}

/// The services the commands run against.
struct App {
    vault: Arc<SecureVault>,
    session: SessionService,
    documents: DocumentService,
}

impl App {
    fn new(store: Arc<dyn SecureStore>, config: VaultConfig) -> Self {
        let vault = Arc::new(SecureVault::new(store, config));
        Self {
            session: SessionService::new(Arc::clone(&vault)),
            documents: DocumentService::new(Arc::clone(&vault)),
            vault,
        }
    }
}

fn load_vault_config(args: &Args) -> Result<VaultConfig> {
    let mut config = load_config(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;
    if let Some(service_name) = &args.service_name {
        config = config.with_service_name(service_name.clone());
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

async fn open_store(args: &Args, config: &VaultConfig) -> Result<Arc<dyn SecureStore>> {
    let store: Arc<dyn SecureStore> = match args.backend {
        Backend::Memory => Arc::new(MemoryStore::new()),
        Backend::Keyring => keyring_store()?,
        Backend::File => {
            let passphrase = args
                .passphrase
                .as_deref()
                .context("The file backend needs --passphrase or SECURECRED_PASSPHRASE")?;
            let store = EncryptedFileStore::open(&args.data_dir, passphrase, config.kdf)
                .await
                .with_context(|| format!("Failed to open vault in {:?}", args.data_dir))?;
            Arc::new(store)
        }
    };
    info!("Using {:?} store", store.method());
    Ok(store)
}

#[cfg(any(target_os = "macos", target_os = "windows", target_os = "linux"))]
fn keyring_store() -> Result<Arc<dyn SecureStore>> {
    Ok(Arc::new(securecred_vault::KeyringStore::new()))
}

#[cfg(not(any(target_os = "macos", target_os = "windows", target_os = "linux")))]
fn keyring_store() -> Result<Arc<dyn SecureStore>> {
    bail!("No OS keyring on this platform")
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn report(ok: bool, what: &str) -> Result<()> {
    if ok {
        println!("{}: ok", what);
        Ok(())
    } else {
        bail!("{} failed", what)
    }
}

async fn run(app: &App, command: Command) -> Result<()> {
    match command {
        Command::Login { username, password } => {
            let token = app.session.login(&username, &password).await?;
            print_json(&json!({ "user": username, "expiresAt": token.expires_at }))
        }
        Command::Restore => match app.session.restore_session().await {
            Some(user) => print_json(&user),
            None => {
                println!("No session to restore");
                Ok(())
            }
        },
        Command::Logout { clear } => report(app.session.sign_out(clear).await, "Sign out"),
        Command::Mpin(cmd) => match cmd {
            MpinCommand::Set { pin, confirm } => {
                app.session.set_mpin(&pin, &confirm).await?;
                println!("MPIN set");
                Ok(())
            }
            MpinCommand::Verify { pin } => {
                match app.session.verify_mpin(&pin).await {
                    MpinCheck::Verified => println!("MPIN verified"),
                    MpinCheck::Incorrect { remaining } => {
                        println!("Incorrect MPIN. {} attempts remaining.", remaining)
                    }
                    MpinCheck::LockedOut => println!("Too many attempts. Please login again."),
                    MpinCheck::Invalid(e) => println!("{}", e),
                }
                Ok(())
            }
            MpinCommand::Forgot => report(app.session.forgot_mpin().await, "MPIN reset"),
        },
        Command::Biometrics(cmd) => match cmd {
            BiometricsCommand::Enable { username, password } => {
                match app.session.enable_biometric_login(&username, &password).await {
                    securecred_vault::VaultOutcome::Success(Some(tier)) => {
                        println!("Credentials saved with biometric protection ({} tier)", tier)
                    }
                    securecred_vault::VaultOutcome::Success(None) => {
                        println!("Biometry unavailable, credentials saved without biometric protection")
                    }
                    failed => bail!("Failed to save credentials ({})", failed.kind()),
                }
                Ok(())
            }
            BiometricsCommand::Disable => {
                report(app.session.disable_biometric_login().await, "Disable biometric login")
            }
            BiometricsCommand::SignIn { prompt } => {
                match app.session.sign_in_with_biometrics(prompt.as_deref()).await {
                    Some(user) => print_json(&user),
                    None => bail!("Biometric sign-in failed"),
                }
            }
            BiometricsCommand::Status => print_json(&json!({
                "enabled": app.vault.is_biometric_enabled().await,
                "quickLogin": app.session.quick_login_available().await,
                "hasCredentials": app.vault.has_biometric_credentials().await,
                "tier": app.vault.stored_credentials_tier(None).await,
            })),
        },
        Command::Secret(cmd) => match cmd {
            SecretCommand::Set { key, value, bio } => {
                let outcome = app.vault.try_save_sensitive_data(&key, &value, bio).await;
                match outcome {
                    securecred_vault::VaultOutcome::Success(tier) => {
                        print_json(&json!({ "saved": key, "tier": tier }))
                    }
                    failed => bail!("Failed to save {} ({})", key, failed.kind()),
                }
            }
            SecretCommand::Get { key, bio, prompt } => {
                match app.vault.get_sensitive_data(&key, bio, prompt.as_deref()).await {
                    Some(value) => {
                        println!("{}", value);
                        Ok(())
                    }
                    None => bail!("Nothing stored under {}", key),
                }
            }
            SecretCommand::Delete { key, bio } => {
                report(app.vault.delete_sensitive_data(&key, bio).await, "Delete")
            }
        },
        Command::Internet(cmd) => match cmd {
            InternetCommand::Set { username, password, server } => report(
                app.vault
                    .save_internet_credentials(server.as_deref(), &username, &password)
                    .await,
                "Save internet credentials",
            ),
            InternetCommand::Get { server } => {
                match app.vault.get_internet_credentials(server.as_deref()).await {
                    Some(cred) => print_json(&json!({ "username": cred.username })),
                    None => bail!("No internet credentials stored"),
                }
            }
            InternetCommand::Delete { server } => report(
                app.vault.delete_internet_credentials(server.as_deref()).await,
                "Delete internet credentials",
            ),
        },
        Command::Doc(cmd) => match cmd {
            DocCommand::Save { id, name, kind, file, text } => {
                let data = match (file, text) {
                    (Some(path), _) => std::fs::read_to_string(&path)
                        .with_context(|| format!("Failed to read {:?}", path))?,
                    (None, Some(text)) => text,
                    (None, None) => bail!("Pass --file or --text"),
                };
                report(
                    app.documents
                        .save_encrypted_document(&id, &name, kind, &data, None)
                        .await,
                    "Save document",
                )
            }
            DocCommand::Read { id } => match app.documents.get_decrypted_document(&id, None).await {
                Some(text) => {
                    println!("{}", text);
                    Ok(())
                }
                None => bail!("Document {} unavailable", id),
            },
            DocCommand::Delete { id } => report(app.documents.delete_document(&id).await, "Delete document"),
            DocCommand::List => print_json(&app.documents.document_list().await),
            DocCommand::Clear => report(app.documents.clear_all_documents().await, "Clear documents"),
        },
        Command::Biometry => print_json(&app.vault.get_supported_biometry_type().await),
        Command::Walkthrough => walkthrough(app.vault.config().clone()).await,
    }
}

/// The full story on a simulated phone.
async fn walkthrough(config: VaultConfig) -> Result<()> {
    let device = Arc::new(MemoryStore::new());
    let app = App::new(device.clone(), config);

    let support = app.vault.get_supported_biometry_type().await;
    println!("Device biometry: {}", support.display_name());

    app.session.login("alice", "p@ss1").await?;
    println!("Logged in; autofill suggests {:?}", app.session.saved_credentials().await);

    app.session.set_mpin("1234", "1234").await?;
    for pin in ["0000", "1111", "1234"] {
        println!("MPIN {} -> {:?}", pin, app.session.verify_mpin(pin).await);
    }

    let tier = app.session.enable_biometric_login("alice", "p@ss1").await;
    println!("Biometric login enabled: {:?}", tier);
    println!("Session restored as {:?}", app.session.restore_session().await);

    device.set_prompt_response(PromptResponse::Cancel).await;
    println!(
        "Cancelled prompt returns {:?}",
        app.vault.get_credentials_with_biometrics(None, None).await
    );
    device.set_prompt_response(PromptResponse::Approve).await;

    app.documents
        .save_encrypted_document("1", "March statement", DocumentKind::Statement, "balance: 42", None)
        .await;
    println!("Documents: {}", serde_json::to_string(&app.documents.document_list().await)?);
    println!(
        "Document 1 reads {:?}",
        app.documents.get_decrypted_document("1", None).await
    );

    device.change_enrollment().await;
    if app.session.restore_session().await.is_none() {
        warn!("Biometric enrollment changed; biometric credentials must be saved again");
    }

    app.session.sign_out(true).await;
    println!("Signed out; auth state is {}", app.vault.get_auth_state().await);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "securecred_vault=debug,securecred_demo=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = load_vault_config(&args)?;
    let store = open_store(&args, &config).await?;
    let app = App::new(store, config);

    run(&app, args.command).await
}
