//! Connection configuration.
//!
//! Loadable from environment variables via `dotenvy` (`ImapConfig::from_env`)
//! or built programmatically. Every field corresponds to a row of the
//! configuration table in spec.md §6.

use std::time::Duration;

use crate::error::{Error, Result};

/// How the client authenticates once connected.
#[derive(Debug, Clone)]
pub enum AuthConfig {
    /// Plaintext `LOGIN user pass`.
    Login { user: String, pass: String },
    /// `AUTHENTICATE XOAUTH2`, RFC 7628 style.
    XOAuth2 { user: String, access_token: String, authzid: Option<String> },
}

/// Full connection configuration.
#[derive(Debug, Clone)]
pub struct ImapConfig {
    pub host: String,
    pub port: u16,
    pub secure: bool,
    pub servername: Option<String>,
    pub auth: AuthConfig,

    /// Values sent in the bring-up `ID` command.
    pub client_info: Vec<(String, String)>,

    pub connect_timeout: Duration,
    pub greeting_timeout: Duration,
    pub upgrade_timeout: Duration,
    pub socket_timeout: Duration,

    pub disable_compression: bool,
    pub max_idle_time: Option<Duration>,
    pub missing_idle_command: String,
    pub disable_auto_enable: bool,
    /// Skip `BINARY`/`LITERAL8` fetches; a [`crate::fetch::FetchStream`]
    /// whose query mentions `BINARY`/`BINARY.PEEK` fails fast with
    /// [`Error::Config`] instead of sending the command.
    pub disable_binary: bool,
    pub qresync: bool,

    /// Accept self-signed/invalid TLS certificates (matches the teacher's
    /// `DangerousVerifier`, used against Proton Bridge and local test
    /// servers). Off by default; real servers verify normally.
    pub danger_accept_invalid_certs: bool,

    pub emit_logs: bool,
}

impl ImapConfig {
    /// Load configuration from environment variables, reading a `.env` file
    /// if present.
    ///
    /// Required: `IMAP_USERNAME` and either `IMAP_PASSWORD` or
    /// `IMAP_ACCESS_TOKEN`. Everything else has the default documented on
    /// the corresponding field.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a required variable is missing or a
    /// numeric/boolean variable fails to parse.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let host = env_or("IMAP_HOST", "127.0.0.1");
        let port = env_parse_or("IMAP_PORT", 993)?;
        let user = env_required("IMAP_USERNAME")?;

        let auth = if let Ok(token) = std::env::var("IMAP_ACCESS_TOKEN") {
            AuthConfig::XOAuth2 { user, access_token: token, authzid: std::env::var("IMAP_AUTHZID").ok() }
        } else {
            AuthConfig::Login { user, pass: env_required("IMAP_PASSWORD")? }
        };

        Ok(Self {
            host,
            port,
            secure: env_parse_or("IMAP_SECURE", true)?,
            servername: std::env::var("IMAP_SERVERNAME").ok(),
            auth,
            client_info: Vec::new(),
            connect_timeout: Duration::from_secs(env_parse_or("IMAP_CONNECT_TIMEOUT_SECS", 90)?),
            greeting_timeout: Duration::from_secs(env_parse_or("IMAP_GREETING_TIMEOUT_SECS", 16)?),
            upgrade_timeout: Duration::from_secs(env_parse_or("IMAP_UPGRADE_TIMEOUT_SECS", 10)?),
            socket_timeout: Duration::from_secs(env_parse_or("IMAP_SOCKET_TIMEOUT_SECS", 300)?),
            disable_compression: env_parse_or("IMAP_DISABLE_COMPRESSION", false)?,
            max_idle_time: None,
            missing_idle_command: env_or("IMAP_MISSING_IDLE_COMMAND", "NOOP"),
            disable_auto_enable: env_parse_or("IMAP_DISABLE_AUTO_ENABLE", false)?,
            disable_binary: env_parse_or("IMAP_DISABLE_BINARY", false)?,
            qresync: env_parse_or("IMAP_QRESYNC", false)?,
            danger_accept_invalid_certs: env_parse_or("IMAP_DANGER_ACCEPT_INVALID_CERTS", false)?,
            emit_logs: env_parse_or("IMAP_EMIT_LOGS", false)?,
        })
    }

    /// Build a minimal config for connecting to `host:port` with password
    /// authentication; every other field takes its documented default.
    #[must_use]
    pub fn login(host: impl Into<String>, port: u16, user: impl Into<String>, pass: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            secure: true,
            servername: None,
            auth: AuthConfig::Login { user: user.into(), pass: pass.into() },
            client_info: Vec::new(),
            connect_timeout: Duration::from_secs(90),
            greeting_timeout: Duration::from_secs(16),
            upgrade_timeout: Duration::from_secs(10),
            socket_timeout: Duration::from_secs(300),
            disable_compression: false,
            max_idle_time: None,
            missing_idle_command: "NOOP".to_string(),
            disable_auto_enable: false,
            disable_binary: false,
            qresync: false,
            danger_accept_invalid_certs: false,
            emit_logs: false,
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_required(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| Error::Config(format!("{key} not set")))
}

fn env_parse_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Err(_) => Ok(default),
        Ok(v) => v.parse().map_err(|_| Error::Config(format!("invalid value for {key}"))),
    }
}
