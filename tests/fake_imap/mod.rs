//! In-memory fake IMAP server for integration testing, built on
//! `tokio::io::duplex` so it can drive the engine's full bring-up over
//! `ConnectionHandle::connect_with_transport` without a real socket or a
//! TLS handshake.
//!
//! Unlike a fixed byte-sequence replay, this server runs a real read/dispatch
//! loop and can respond dynamically to whatever the engine actually sends --
//! continuations, `IDLE`/`DONE`, multiple `FETCH`es in a session.

mod script;
mod server;

pub use script::{FixtureMessage, Script};
pub use server::FakeImapServer;
