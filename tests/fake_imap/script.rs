//! Canned mailbox fixture the fake server answers `SELECT`/`FETCH` from.

/// One message's fixture data, reported by `FETCH`/`UID FETCH`.
#[derive(Debug, Clone)]
pub struct FixtureMessage {
    pub seq: u32,
    pub uid: u32,
    pub flags: Vec<String>,
}

/// What the fake server knows about a single mailbox.
#[derive(Debug, Clone)]
pub struct Script {
    pub mailbox_name: String,
    pub uid_validity: u64,
    pub messages: Vec<FixtureMessage>,
}

impl Script {
    #[must_use]
    pub fn new(mailbox_name: impl Into<String>) -> Self {
        Self { mailbox_name: mailbox_name.into(), uid_validity: 1, messages: Vec::new() }
    }

    #[must_use]
    pub fn with_message(mut self, seq: u32, uid: u32, flags: &[&str]) -> Self {
        self.messages.push(FixtureMessage { seq, uid, flags: flags.iter().map(|f| (*f).to_string()).collect() });
        self
    }
}
