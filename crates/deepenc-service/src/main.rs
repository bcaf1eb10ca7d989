use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use deepenc_core::{Engine, MessageInput, ServiceConfig};
use deepenc_store::SqliteStore;
use serde_json::json;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use zeroize::Zeroizing;

mod paths;

const DEFAULT_LOG_FILTER: &str = "deepenc=info,deepenc_core=info,deepenc_store=info";

#[derive(Parser)]
#[command(author, version, about = "deepenc message service", long_about = None)]
struct Cli {
    /// Config file; defaults to deepenc.toml in the user config directory
    #[arg(long, global = true, env = "DEEPENC_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and validate the configuration, then print a summary
    CheckConfig,
    /// Stage a new account; prints the confirmation token
    Signup {
        #[arg(long)]
        username: String,
    },
    /// Confirm a staged account
    Verify { token: String },
    /// Sign in; prints a session token
    Signin {
        #[arg(long)]
        username: String,
    },
    /// Create a message
    Post {
        #[command(flatten)]
        session: SessionArgs,
        #[command(flatten)]
        message: MessageArgs,
    },
    /// Read a private message
    Read {
        id: String,
        #[command(flatten)]
        secret: SecretArgs,
    },
    /// Read a public message
    ReadPublic { id: String },
    /// Read one of your own messages, including owner-only ones
    ReadOwn {
        #[command(flatten)]
        session: SessionArgs,
        id: String,
        #[command(flatten)]
        secret: SecretArgs,
    },
    /// List recent public messages
    Public {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// List your messages as stored
    Mine {
        #[command(flatten)]
        session: SessionArgs,
    },
    /// Replace one of your messages
    Update {
        #[command(flatten)]
        session: SessionArgs,
        id: String,
        #[command(flatten)]
        message: MessageArgs,
    },
    /// Delete one of your messages
    Delete {
        #[command(flatten)]
        session: SessionArgs,
        id: String,
    },
}

#[derive(Args)]
struct SessionArgs {
    /// Session token from `signin`
    #[arg(long, env = "DEEPENC_SESSION", hide_env_values = true)]
    session: String,
}

#[derive(Args)]
struct SecretArgs {
    /// Message password (`password`) or key (`aes`)
    #[arg(long, env = "DEEPENC_MESSAGE_SECRET", hide_env_values = true)]
    secret: Option<String>,
    /// Prompt for the secret instead of passing it
    #[arg(long, conflicts_with = "secret")]
    ask_secret: bool,
}

impl SecretArgs {
    fn resolve(self) -> Result<Option<Zeroizing<String>>> {
        if self.ask_secret {
            let secret = rpassword::prompt_password("Message secret: ")
                .map_err(|e| anyhow!("secret prompt: {e}"))?;
            return Ok(Some(Zeroizing::new(secret)));
        }
        Ok(self.secret.map(Zeroizing::new))
    }
}

#[derive(Args)]
struct MessageArgs {
    /// plaintext, password, internal or aes
    #[arg(long, default_value = "plaintext")]
    encoding: String,
    /// Message content; read from stdin when omitted
    #[arg(long)]
    content: Option<String>,
    #[command(flatten)]
    secret: SecretArgs,
    #[arg(long)]
    one_time: bool,
    #[arg(long)]
    anon: bool,
    #[arg(long)]
    owner_only: bool,
}

impl MessageArgs {
    fn into_input(self) -> Result<MessageInput> {
        let content = match self.content {
            Some(content) => content,
            None => {
                let mut buf = String::new();
                std::io::stdin()
                    .read_to_string(&mut buf)
                    .context("reading content from stdin")?;
                buf.trim_end_matches(['\r', '\n']).to_string()
            }
        };
        let mut input = MessageInput::new(content, self.encoding);
        if let Some(secret) = self.secret.resolve()? {
            input = input.with_password(secret.as_str());
        }
        if self.one_time {
            input = input.one_time();
        }
        if self.anon {
            input = input.anonymous();
        }
        if self.owner_only {
            input = input.owner_only();
        }
        Ok(input)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_path = match cli.config {
        Some(path) => path,
        None => paths::default_config_path()?,
    };
    let config = ServiceConfig::load(&config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;

    if let Commands::CheckConfig = cli.command {
        return print_json(&json!({
            "config_path": config_path.display().to_string(),
            "database_url": config.database_url,
            "store_timeout_ms": config.store_timeout_ms,
            "signup_ttl_secs": config.signup_ttl_secs,
            "session_ttl_secs": config.session_ttl_secs,
            "public_list_limit": config.public_list_limit,
            "hashing": {
                "memory_kib": config.hashing.memory_kib,
                "iterations": config.hashing.iterations,
                "parallelism": config.hashing.parallelism,
            },
        }));
    }

    let store = SqliteStore::connect(&config.database_url)
        .await
        .with_context(|| format!("opening {}", config.database_url))?;
    let cache = store.staging_cache();
    let purged = cache.purge_expired().await?;
    if purged > 0 {
        debug!("purged {purged} expired pending signups");
    }
    let engine = Engine::new(config, Arc::new(store), Arc::new(cache))?;

    let outcome = run_command(&engine, cli.command).await;
    engine.shutdown().await?;
    outcome
}

async fn run_command(engine: &Engine, command: Commands) -> Result<()> {
    match command {
        Commands::CheckConfig => Ok(()),
        Commands::Signup { username } => {
            let password = prompt_password_twice("Account password: ")?;
            let token = engine.begin_signup(&username, &password).await?;
            info!("signup staged for {username}");
            print_json(&json!({ "token": token }))
        }
        Commands::Verify { token } => {
            let user_id = engine.complete_signup(&token).await?;
            print_json(&json!({ "user_id": user_id }))
        }
        Commands::Signin { username } => {
            let password = prompt_password_once("Account password: ")?;
            let signed_in = engine.sign_in(&username, &password).await?;
            print_json(&signed_in)
        }
        Commands::Post { session, message } => {
            let owner = engine.authenticate(&session.session)?;
            let input = message.into_input()?;
            let id = engine.create_message(&owner, &input).await?;
            print_json(&json!({ "id": id }))
        }
        Commands::Read { id, secret } => {
            let secret = secret.resolve()?;
            let view = engine
                .read_private_message(&id, secret.as_deref().map(String::as_str))
                .await?;
            print_json(&view)
        }
        Commands::ReadPublic { id } => print_json(&engine.read_public_message(&id).await?),
        Commands::ReadOwn {
            session,
            id,
            secret,
        } => {
            let owner = engine.authenticate(&session.session)?;
            let secret = secret.resolve()?;
            let view = engine
                .read_own_message(&owner, &id, secret.as_deref().map(String::as_str))
                .await?;
            print_json(&view)
        }
        Commands::Public { limit } => print_json(&engine.list_public_messages(limit).await?),
        Commands::Mine { session } => {
            let owner = engine.authenticate(&session.session)?;
            print_json(&engine.list_owner_messages(&owner).await?)
        }
        Commands::Update {
            session,
            id,
            message,
        } => {
            let owner = engine.authenticate(&session.session)?;
            let input = message.into_input()?;
            engine.update_message(&owner, &id, &input).await?;
            print_json(&json!({ "updated": id }))
        }
        Commands::Delete { session, id } => {
            let owner = engine.authenticate(&session.session)?;
            engine.delete_message(&owner, &id).await?;
            print_json(&json!({ "deleted": id }))
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn prompt_password_once(prompt: &str) -> Result<Zeroizing<String>> {
    if let Ok(pw) = std::env::var("DEEPENC_PASSWORD") {
        if !pw.is_empty() {
            return Ok(Zeroizing::new(pw));
        }
    }
    let pw = rpassword::prompt_password(prompt).map_err(|e| anyhow!("password prompt: {e}"))?;
    Ok(Zeroizing::new(pw))
}

fn prompt_password_twice(prompt: &str) -> Result<Zeroizing<String>> {
    if let Ok(pw) = std::env::var("DEEPENC_PASSWORD") {
        if !pw.is_empty() {
            return Ok(Zeroizing::new(pw));
        }
    }
    let first = prompt_password_once(prompt)?;
    let second = Zeroizing::new(
        rpassword::prompt_password("Confirm password: ")
            .map_err(|e| anyhow!("password prompt: {e}"))?,
    );
    if *first != *second {
        return Err(anyhow!("passwords do not match"));
    }
    Ok(first)
}
