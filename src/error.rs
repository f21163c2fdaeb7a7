//! Error types for the IMAP engine.

use std::time::Duration;

use thiserror::Error;

/// Error kinds produced by the framer, parser, compiler, and connection
/// engine. Each variant carries the fields spec.md §7 names for it.
#[derive(Error, Debug)]
pub enum Error {
    /// A declared literal length exceeded the 1 GiB cap.
    #[error("literal too large: {literal_size} bytes (max {max_size})")]
    LiteralTooLarge { literal_size: u64, max_size: u64 },

    /// The token parser or response parser rejected a frame.
    #[error("parser error {code} at position {pos} in {input:?} (byte {chr:?})")]
    Parser {
        code: u32,
        input: Vec<u8>,
        pos: usize,
        chr: Option<u8>,
    },

    /// List/section nesting exceeded 25 levels.
    #[error("max nesting reached while parsing {input:?}")]
    MaxNestingReached { input: Vec<u8> },

    /// A tagged command completed with `NO` or `BAD`.
    #[error("command failed: {response_status} {response_text}")]
    CommandFailed {
        response: String,
        response_status: ResponseStatus,
        response_text: String,
        /// Set on a `SELECT`/`EXAMINE` `NO` once a `LIST ""` probe confirms
        /// the mailbox doesn't exist (spec.md §4.8).
        mailbox_missing: bool,
    },

    /// A tagged reply used an unexpected command name.
    #[error("invalid response: {response}")]
    InvalidResponse { response: String },

    /// MS365-style throttling response; the caller's future is rejected
    /// after the engine has already slept for (at most) 5 minutes.
    #[error("throttled, reset after {throttle_reset:?}")]
    Throttle { throttle_reset: Duration },

    /// LOGIN/AUTHENTICATE/NAMESPACE denial during bring-up.
    #[error("authentication failure: {}", response.as_deref().unwrap_or("no response"))]
    AuthenticationFailure { response: Option<String> },

    /// Transport closed or connection logged out; rejects all pendings.
    #[error("no connection: {}", reason.as_deref().unwrap_or("closed"))]
    NoConnection { reason: Option<String> },

    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("greeting timed out after {0:?}")]
    GreetingTimeout(Duration),

    #[error("STARTTLS/COMPRESS upgrade timed out after {0:?}")]
    UpgradeTimeout(Duration),

    /// Connection closed while a fetch stream was still being consumed.
    #[error("connection closed during fetch")]
    ConnectionClosed,

    #[error("proxy error: {0}")]
    Proxy(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("configuration error: {0}")]
    Config(String),
}

/// The status word of a tagged `NO`/`BAD` completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    No,
    Bad,
}

impl std::fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::No => "NO",
            Self::Bad => "BAD",
        })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
