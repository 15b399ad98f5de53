//! Frami server binary.
//!
//! Reads `frami.toml` (or the path given with `--config`), opens the SQLite
//! store and serves the portal API over HTTP. Administrative subcommands
//! provision the default groups and create accounts.
//!
//! # First run
//!
//! ```text
//! frami create-groups
//! frami create-user --username admin --staff --group admin
//! frami serve
//! ```

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use chrono::Utc;
use clap::{Parser, Subcommand};
use frami_api::{AppState, hash_password};
use frami_core::{
  groups::GroupTable,
  store::PortalStore,
  user::{User, validate_password},
};
use frami_store_sqlite::SqliteStore;
use serde::Deserialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Frami patient portal server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "frami.toml", global = true)]
  config: PathBuf,

  #[command(subcommand)]
  command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
  /// Serve the API (the default).
  Serve,
  /// Create the default groups and reset their permissions.
  CreateGroups,
  /// Create an account. The password is read from stdin.
  CreateUser {
    #[arg(long)]
    username: String,
    #[arg(long, default_value = "")]
    email:    String,
    /// Group to join; may be repeated.
    #[arg(long = "group")]
    groups:   Vec<String>,
    #[arg(long)]
    staff:    bool,
  },
  /// Print the argon2 hash for a password entered on stdin and exit.
  HashPassword,
}

/// Runtime server configuration, deserialised from `frami.toml` and
/// `FRAMI_*` environment variables.
#[derive(Deserialize, Clone)]
struct ServerConfig {
  #[serde(default = "default_host")]
  host:       String,
  #[serde(default = "default_port")]
  port:       u16,
  #[serde(default = "default_store_path")]
  store_path: PathBuf,
}

fn default_host() -> String { "127.0.0.1".to_owned() }

fn default_port() -> u16 { 8000 }

fn default_store_path() -> PathBuf { PathBuf::from("~/.local/share/frami/frami.db") }

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let command = cli.command.unwrap_or(Command::Serve);

  // Helper mode: hash a password and exit.
  if let Command::HashPassword = command {
    let password = rpassword_or_stdin()?;
    let hash = hash_password(&argon2::Argon2::default(), &password)?;
    println!("{hash}");
    return Ok(());
  }

  // Load configuration.
  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("FRAMI"))
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  let store = open_store(&server_cfg.store_path).await?;

  match command {
    Command::Serve => serve(store, &server_cfg).await,
    Command::CreateGroups => {
      let table = GroupTable::standard()?;
      let groups = table.len();
      store.provision_groups(table).await?;
      tracing::info!(groups, "provisioned groups");
      Ok(())
    }
    Command::CreateUser { username, email, groups, staff } => {
      let mut user = User::new(username, Utc::now());
      user.email = email;
      user.groups = groups;
      user.is_staff = staff;

      let password = rpassword_or_stdin()?;
      validate_password(&password, &user)?;
      user.password = hash_password(&argon2::Argon2::default(), &password)?;

      let user = store.create_user(user).await?;
      tracing::info!(id = user.id, username = %user.username, "created user");
      Ok(())
    }
    Command::HashPassword => Ok(()),
  }
}

async fn open_store(path: &Path) -> anyhow::Result<SqliteStore> {
  // Expand `~` in store path.
  let store_path = expand_tilde(path);
  if let Some(parent) = store_path.parent()
    && !parent.as_os_str().is_empty()
  {
    std::fs::create_dir_all(parent)
      .with_context(|| format!("failed to create {parent:?}"))?;
  }

  SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))
}

async fn serve(store: SqliteStore, cfg: &ServerConfig) -> anyhow::Result<()> {
  let state = AppState::new(Arc::new(store));
  let app = frami_api::router(state).layer(TraceLayer::new_for_http());
  let address = format!("{}:{}", cfg.host, cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

/// Read a password from stdin (no echo).
fn rpassword_or_stdin() -> anyhow::Result<String> {
  use std::io::{self, BufRead, Write};
  let stdin = io::stdin();
  eprint!("Password: ");
  io::stderr().flush().ok();
  let mut line = String::new();
  stdin.lock().read_line(&mut line)?;
  Ok(
    line
      .trim_end_matches('\n')
      .trim_end_matches('\r')
      .to_string(),
  )
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn tilde_expands_to_home() {
    let Ok(home) = std::env::var("HOME") else { return };
    assert_eq!(
      expand_tilde(Path::new("~/frami.db")),
      PathBuf::from(home).join("frami.db")
    );
    assert_eq!(expand_tilde(Path::new("/tmp/frami.db")), PathBuf::from("/tmp/frami.db"));
  }

  #[test]
  fn subcommand_defaults_to_serve() {
    let cli = Cli::parse_from(["frami"]);
    assert!(cli.command.is_none());
    assert_eq!(cli.config, PathBuf::from("frami.toml"));

    let cli = Cli::parse_from([
      "frami",
      "create-user",
      "--username",
      "alice",
      "--group",
      "patient",
      "--group",
      "admin",
    ]);
    let Some(Command::CreateUser { username, groups, staff, .. }) = cli.command
    else {
      panic!("expected create-user");
    };
    assert_eq!(username, "alice");
    assert_eq!(groups, ["patient", "admin"]);
    assert!(!staff);
  }
}
