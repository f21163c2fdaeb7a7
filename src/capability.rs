//! Server capabilities, learned from the greeting or a `CAPABILITY`
//! response and kept read-only for callers (spec.md §3 `[FULL]`).

use std::collections::HashMap;

use crate::node::Node;

/// A single capability's value: either a bare flag (`IDLE`) or a
/// `NAME=VALUE` pair (`AUTH=PLAIN`). Multiple `AUTH=` entries for the same
/// name are kept by storing the whole capability string as the key, matching
/// how the wire actually presents them (`AUTH=PLAIN`, `AUTH=XOAUTH2`, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilityValue {
    Present,
    Valued(String),
}

/// The set of capabilities currently known for a connection.
#[derive(Debug, Clone, Default)]
pub struct Capabilities {
    entries: HashMap<String, CapabilityValue>,
}

impl Capabilities {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the entire set from a parsed `CAPABILITY` attribute list
    /// (or the trailing tokens of a `* OK [CAPABILITY ...]` greeting).
    pub fn update(&mut self, attributes: &[Node]) {
        self.entries.clear();
        for node in attributes {
            let Some(text) = node.as_text() else { continue };
            self.insert_token(&text);
        }
    }

    fn insert_token(&mut self, token: &str) {
        let upper = token.to_ascii_uppercase();
        match upper.split_once('=') {
            Some((name, value)) => {
                self.entries.insert(upper.clone(), CapabilityValue::Valued(value.to_string()));
                let _ = name;
            }
            None => {
                self.entries.insert(upper, CapabilityValue::Present);
            }
        }
    }

    /// True if the exact capability token (e.g. `"IDLE"`, `"AUTH=PLAIN"`)
    /// is present.
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_ascii_uppercase())
    }

    /// True if any `AUTH=...` or bare capability whose name matches `prefix`
    /// is present, e.g. `has_prefix("AUTH=")`.
    #[must_use]
    pub fn has_prefix(&self, prefix: &str) -> bool {
        let prefix = prefix.to_ascii_uppercase();
        self.entries.keys().any(|k| k.starts_with(&prefix))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the server supports non-synchronizing literals at all
    /// (`LITERAL+` full support, or `LITERAL-` for literals up to 4096
    /// bytes per spec.md §4.6 `trySend`).
    #[must_use]
    pub fn literal_minus(&self) -> bool {
        self.has("LITERAL-") || self.has("LITERAL+")
    }

    #[must_use]
    pub fn literal_plus(&self) -> bool {
        self.has("LITERAL+")
    }
}
