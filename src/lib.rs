#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! Asynchronous IMAP4rev1 client engine.
//!
//! Layered bottom-up: a byte-stream framer splits the transport into
//! logical response lines and literals (`framer`), a token parser turns
//! each line into an attribute tree (`tokenizer`/`node`), the response
//! parser pulls out the tag and command (`response`), and the compiler
//! turns outgoing attribute trees back into wire bytes, including
//! synchronizing-literal segmentation (`compiler`). `engine` drives the
//! connection state machine on top of those: bring-up (STARTTLS, auth,
//! COMPRESS, ID/ENABLE), the tag-multiplexing request engine, and untagged
//! response dispatch. `fetch` adds a pull-driven streaming reader for
//! `FETCH`/`UID FETCH` on top of the engine.

pub mod auth;
pub mod capability;
pub mod command;
pub mod compiler;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod fetch;
pub mod flag;
pub mod framer;
pub mod mailbox;
pub mod node;
pub mod range;
pub mod response;
pub mod syntax;
pub mod tokenizer;
pub mod transport;

pub use auth::{AuthMethod, Login, XOAuth2};
pub use config::{AuthConfig, ImapConfig};
pub use engine::{ConnectionHandle, ConnectionState, SelectedMailbox};
pub use error::{Error, Result};
pub use events::{ConnectionEvent, EventReceiver, EventSender};
pub use fetch::{FetchItem, FetchStream};
pub use flag::Flag;
pub use mailbox::{LockOptions, LockTicket, Mailbox, MailboxPath};
pub use range::{Range, ResolvedRange};
