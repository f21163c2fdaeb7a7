//! Attribute-tree builders for IMAP commands.
//!
//! Each function returns `(command_name, attributes)`, ready to hand to
//! the request engine's `exec` (spec.md §4.6), which compiles them via C5.
//! Mailbox names and search strings are emitted as `Node::atom` so the
//! compiler's existing ATOM-CHAR check (§4.5) quotes them automatically
//! when they contain spaces or other specials — no separate astring
//! encoder is needed here.

use crate::flag::Flag;
use crate::mailbox::MailboxPath;
use crate::node::Node;

fn mailbox_node(path: &MailboxPath) -> Node {
    Node::atom(path.as_str())
}

#[must_use]
pub fn noop() -> (&'static str, Vec<Node>) {
    ("NOOP", Vec::new())
}

#[must_use]
pub fn capability() -> (&'static str, Vec<Node>) {
    ("CAPABILITY", Vec::new())
}

#[must_use]
pub fn starttls() -> (&'static str, Vec<Node>) {
    ("STARTTLS", Vec::new())
}

#[must_use]
pub fn compress_deflate() -> (&'static str, Vec<Node>) {
    ("COMPRESS", vec![Node::atom("DEFLATE")])
}

#[must_use]
pub fn namespace() -> (&'static str, Vec<Node>) {
    ("NAMESPACE", Vec::new())
}

#[must_use]
pub fn id(client_info: &[(String, String)]) -> (&'static str, Vec<Node>) {
    if client_info.is_empty() {
        return ("ID", vec![Node::Nil]);
    }
    let mut pairs = Vec::with_capacity(client_info.len() * 2);
    for (k, v) in client_info {
        pairs.push(Node::string(k.clone().into_bytes()));
        pairs.push(Node::string(v.clone().into_bytes()));
    }
    ("ID", vec![Node::List(pairs)])
}

#[must_use]
pub fn enable(capabilities: &[&str]) -> (&'static str, Vec<Node>) {
    ("ENABLE", capabilities.iter().map(|c| Node::atom(*c)).collect())
}

#[must_use]
pub fn select(path: &MailboxPath) -> (&'static str, Vec<Node>) {
    ("SELECT", vec![mailbox_node(path)])
}

#[must_use]
pub fn examine(path: &MailboxPath) -> (&'static str, Vec<Node>) {
    ("EXAMINE", vec![mailbox_node(path)])
}

#[must_use]
pub fn close() -> (&'static str, Vec<Node>) {
    ("CLOSE", Vec::new())
}

#[must_use]
pub fn logout() -> (&'static str, Vec<Node>) {
    ("LOGOUT", Vec::new())
}

#[must_use]
pub fn list(reference: &str, pattern: &str) -> (&'static str, Vec<Node>) {
    ("LIST", vec![Node::string(reference.as_bytes().to_vec()), Node::string(pattern.as_bytes().to_vec())])
}

#[must_use]
pub fn status(path: &MailboxPath, items: &[&str]) -> (&'static str, Vec<Node>) {
    ("STATUS", vec![mailbox_node(path), Node::List(items.iter().map(|i| Node::atom(*i)).collect())])
}

/// `FETCH`/`UID FETCH range query`. `query` is a pre-built attribute (an
/// atom like `FULL`, or a `Node::List` of `BODY[...]`/`UID`/`FLAGS`/...).
#[must_use]
pub fn fetch(range: &str, query: Node, uid: bool) -> (&'static str, Vec<Node>) {
    let command = if uid { "UID FETCH" } else { "FETCH" };
    (command, vec![Node::Sequence(range.to_string()), query])
}

/// Whether STORE adds, removes, or replaces the flag list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    Add,
    Remove,
    Replace,
}

#[must_use]
pub fn store(range: &str, mode: StoreMode, flags: &[Flag], silent: bool, uid: bool) -> (&'static str, Vec<Node>) {
    let command = if uid { "UID STORE" } else { "STORE" };
    let mut item = match mode {
        StoreMode::Add => "+FLAGS".to_string(),
        StoreMode::Remove => "-FLAGS".to_string(),
        StoreMode::Replace => "FLAGS".to_string(),
    };
    if silent {
        item.push_str(".SILENT");
    }
    let flag_list = Node::List(flags.iter().map(Flag::to_node).collect());
    (command, vec![Node::Sequence(range.to_string()), Node::atom(item), flag_list])
}

#[must_use]
pub fn search(criteria: &str, uid: bool) -> (&'static str, Vec<Node>) {
    let command = if uid { "UID SEARCH" } else { "SEARCH" };
    (command, vec![Node::atom(criteria)])
}

#[must_use]
pub fn copy(range: &str, destination: &MailboxPath, uid: bool) -> (&'static str, Vec<Node>) {
    let command = if uid { "UID COPY" } else { "COPY" };
    (command, vec![Node::Sequence(range.to_string()), mailbox_node(destination)])
}

#[must_use]
pub fn expunge() -> (&'static str, Vec<Node>) {
    ("EXPUNGE", Vec::new())
}

#[must_use]
pub fn uid_expunge(range: &str) -> (&'static str, Vec<Node>) {
    ("UID EXPUNGE", vec![Node::Sequence(range.to_string())])
}

#[must_use]
pub fn idle() -> (&'static str, Vec<Node>) {
    ("IDLE", Vec::new())
}

/// `APPEND mailbox (flags) message-literal`.
#[must_use]
pub fn append(path: &MailboxPath, flags: &[Flag], message: Vec<u8>) -> (&'static str, Vec<Node>) {
    let flag_list = Node::List(flags.iter().map(Flag::to_node).collect());
    let literal = Node::Literal {
        value: message,
        literal_type: crate::node::LiteralType::Literal,
        literal_plus: false,
        sensitive: false,
    };
    ("APPEND", vec![mailbox_node(path), flag_list, literal])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{self, CompileOptions};

    #[test]
    fn select_quotes_mailbox_names_with_spaces() {
        let (cmd, attrs) = select(&MailboxPath::new("My Projects"));
        let compiled = compiler::compile("A1", cmd, &attrs, CompileOptions::default());
        assert_eq!(compiled.flatten(), b"A1 SELECT \"My Projects\"\r\n");
    }

    #[test]
    fn store_adds_silent_suffix() {
        let (cmd, attrs) = store("1:5", StoreMode::Add, &[Flag::Seen], true, true);
        assert_eq!(cmd, "UID STORE");
        let compiled = compiler::compile("A2", cmd, &attrs, CompileOptions::default());
        assert_eq!(compiled.flatten(), b"A2 UID STORE 1:5 +FLAGS.SILENT (\\Seen)\r\n");
    }

    #[test]
    fn id_with_no_client_info_sends_nil() {
        let (cmd, attrs) = id(&[]);
        let compiled = compiler::compile("A3", cmd, &attrs, CompileOptions::default());
        assert_eq!(compiled.flatten(), b"A3 ID NIL\r\n");
    }
}
