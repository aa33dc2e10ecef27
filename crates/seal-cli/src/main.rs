use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use seal_core::identity::{auth_cookie_name, enc_cookie_name};
use seal_core::{
    load_settings, KeyCookie, KeyManager, KeyPair, MemoryKeyStore, SecureSessionHandler,
    SessionBackend, SessionSettings,
};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;
use zeroize::Zeroizing;

#[derive(Parser, Debug)]
#[command(name = "seal-cli")]
#[command(author, version, about = "Inspect and maintain encrypted session records", long_about = None)]
struct Cli {
    /// JSON settings file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Overrides storage_dir from settings
    #[arg(long, global = true)]
    storage_dir: Option<PathBuf>,

    /// Overrides session_name from settings
    #[arg(long, global = true)]
    session_name: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args, Debug)]
struct KeyArgs {
    /// Base64 encryption key (the KEY_<name> cookie value)
    #[arg(long, env = "SEAL_ENC_KEY", hide_env_values = true)]
    enc_key: String,

    /// Base64 authentication key (the AUTH_<name> cookie value)
    #[arg(long, env = "SEAL_AUTH_KEY", hide_env_values = true)]
    auth_key: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Issue a fresh key pair and print the cookies as JSON
    Keygen,

    /// Encrypt stdin into the record for a session id
    Write {
        #[arg(long)]
        id: String,
        #[command(flatten)]
        keys: KeyArgs,
    },

    /// Decrypt a session record to stdout
    Read {
        #[arg(long)]
        id: String,
        #[command(flatten)]
        keys: KeyArgs,
    },

    /// Remove a session record and print the expiring cookies
    Destroy {
        #[arg(long)]
        id: String,
    },

    /// Remove records older than the max age
    Gc {
        /// Seconds; defaults to gc_max_age_secs from settings
        #[arg(long)]
        max_age: Option<u64>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = resolve_settings(&cli)?;

    match cli.command {
        Commands::Keygen => keygen_command(&settings),
        Commands::Write { id, keys } => write_command(&settings, &id, &keys),
        Commands::Read { id, keys } => read_command(&settings, &id, &keys),
        Commands::Destroy { id } => destroy_command(&settings, &id),
        Commands::Gc { max_age } => gc_command(&settings, max_age),
    }
}

fn resolve_settings(cli: &Cli) -> Result<SessionSettings> {
    let mut settings = load_settings(cli.config.as_deref()).context("load settings")?;
    if let Some(dir) = &cli.storage_dir {
        settings.storage_dir = dir.clone();
    }
    if let Some(name) = &cli.session_name {
        settings.session_name = name.clone();
    }
    settings.validate().context("invalid settings")?;
    Ok(settings)
}

fn open_handler(
    settings: &SessionSettings,
    jar: MemoryKeyStore,
) -> Result<SecureSessionHandler<MemoryKeyStore>> {
    let mut handler = SecureSessionHandler::new(jar, settings);
    handler
        .open(&settings.storage_dir, &settings.session_name)
        .with_context(|| format!("open {}", settings.storage_dir.display()))?;
    Ok(handler)
}

/// Build the jar a request carrying these keys would have. Keys are checked
/// first so a typo never silently issues (and writes under) a fresh pair.
fn jar_from_keys(settings: &SessionSettings, keys: &KeyArgs) -> Result<MemoryKeyStore> {
    KeyPair::from_encoded(&keys.enc_key, &keys.auth_key).context("supplied keys")?;
    Ok(MemoryKeyStore::with_cookies([
        (enc_cookie_name(&settings.session_name), keys.enc_key.clone()),
        (auth_cookie_name(&settings.session_name), keys.auth_key.clone()),
    ]))
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn issue_cookies(settings: &SessionSettings) -> Result<Vec<KeyCookie>> {
    let mut jar = MemoryKeyStore::new();
    KeyManager::new()
        .issue(&settings.session_name, &mut jar, &settings.cookie)
        .context("issue key pair")?;
    Ok(jar.take_emitted())
}

fn keygen_command(settings: &SessionSettings) -> Result<()> {
    print_json(&issue_cookies(settings)?)
}

fn write_command(settings: &SessionSettings, id: &str, keys: &KeyArgs) -> Result<()> {
    let mut data = Zeroizing::new(Vec::new());
    std::io::stdin()
        .read_to_end(&mut data)
        .context("read payload from stdin")?;
    let mut handler = open_handler(settings, jar_from_keys(settings, keys)?)?;
    handler.write(id, &data).context("write session")?;
    info!(id, bytes = data.len(), "session written");
    Ok(())
}

fn read_command(settings: &SessionSettings, id: &str, keys: &KeyArgs) -> Result<()> {
    let mut handler = open_handler(settings, jar_from_keys(settings, keys)?)?;
    let data = handler.read(id).context("read session")?;
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&data)?;
    stdout.flush()?;
    Ok(())
}

fn destroy_command(settings: &SessionSettings, id: &str) -> Result<()> {
    let mut handler = open_handler(settings, MemoryKeyStore::new())?;
    handler.destroy(id).context("destroy session")?;
    // Open issued a pair for the empty jar; only the expiry cookies matter.
    let expired: Vec<KeyCookie> = handler
        .into_key_store()
        .take_emitted()
        .into_iter()
        .filter(KeyCookie::is_expired)
        .collect();
    print_json(&expired)
}

fn gc_command(settings: &SessionSettings, max_age: Option<u64>) -> Result<()> {
    let max_age = max_age
        .map(Duration::from_secs)
        .unwrap_or_else(|| settings.gc_max_age());
    let mut handler = open_handler(settings, MemoryKeyStore::new())?;
    let removed = handler.gc(max_age).context("gc sweep")?;
    println!("{removed}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use seal_core::KeyStore;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn flags_override_settings() {
        let cli = Cli::parse_from([
            "seal-cli",
            "--storage-dir",
            "/tmp/seal-test",
            "--session-name",
            "APPSESS",
            "gc",
            "--max-age",
            "60",
        ]);
        let settings = resolve_settings(&cli).unwrap();
        assert_eq!(settings.storage_dir, PathBuf::from("/tmp/seal-test"));
        assert_eq!(settings.session_name, "APPSESS");
        assert!(matches!(cli.command, Commands::Gc { max_age: Some(60) }));
    }

    #[test]
    fn bad_session_name_flag_is_rejected() {
        let cli = Cli::parse_from(["seal-cli", "--session-name", "../x", "gc"]);
        assert!(resolve_settings(&cli).is_err());
    }

    #[test]
    fn key_args_fill_named_cookies() {
        let settings = SessionSettings {
            session_name: "APPSESS".into(),
            ..SessionSettings::default()
        };
        let pair = KeyPair::from_bytes([1u8; 32], [2u8; 32]);
        let keys = KeyArgs {
            enc_key: pair.encoded_enc_key().to_string(),
            auth_key: pair.encoded_auth_key().to_string(),
        };
        let jar = jar_from_keys(&settings, &keys).unwrap();
        assert_eq!(jar.get("KEY_APPSESS"), Some(keys.enc_key.clone()));
        assert_eq!(jar.get("AUTH_APPSESS"), Some(keys.auth_key.clone()));
    }

    #[test]
    fn keygen_issues_pair_without_touching_storage() {
        let dir = std::env::temp_dir().join("seal-cli-keygen-never-created");
        let settings = SessionSettings {
            storage_dir: dir.clone(),
            session_name: "APPSESS".into(),
            ..SessionSettings::default()
        };
        let cookies = issue_cookies(&settings).unwrap();
        let names: Vec<_> = cookies.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["KEY_APPSESS", "AUTH_APPSESS"]);
        KeyPair::from_encoded(&cookies[0].value, &cookies[1].value).unwrap();
        assert!(!dir.exists());
    }

    #[test]
    fn malformed_key_args_are_refused() {
        let keys = KeyArgs {
            enc_key: "ZW5j".into(),
            auth_key: "YXV0aA==".into(),
        };
        assert!(jar_from_keys(&SessionSettings::default(), &keys).is_err());
    }
}
