//! IMAP message flags
//!
//! Provides a strongly-typed enum for IMAP flags instead of raw
//! strings. Standard system flags have dedicated variants; arbitrary
//! keyword flags use the `Keyword` variant.

use std::fmt;

use crate::node::Node;

/// An IMAP message flag.
///
/// System flags (prefixed with `\` in the IMAP protocol) have
/// dedicated variants. User-defined keyword flags use [`Flag::Keyword`].
///
/// # Examples
///
/// ```
/// use imap_engine::Flag;
///
/// let seen = Flag::Seen;
/// assert_eq!(seen.as_imap_str(), "\\Seen");
///
/// let kw = Flag::Keyword("$Important".to_string());
/// assert_eq!(kw.as_imap_str(), "$Important");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Flag {
    /// Message has been read (`\Seen`).
    Seen,
    /// Message has been answered (`\Answered`).
    Answered,
    /// Message is flagged for attention (`\Flagged`).
    Flagged,
    /// Message is marked for deletion (`\Deleted`).
    Deleted,
    /// Message is a draft (`\Draft`).
    Draft,
    /// Message session is newly arrived (`\Recent`); server-assigned,
    /// never settable by STORE.
    Recent,
    /// A user-defined keyword flag (no `\` prefix).
    Keyword(String),
}

impl Flag {
    /// The IMAP wire representation of this flag.
    ///
    /// System flags include the leading backslash (e.g. `\Seen`).
    /// Keyword flags are returned as-is.
    #[must_use]
    pub fn as_imap_str(&self) -> &str {
        match self {
            Self::Seen => "\\Seen",
            Self::Answered => "\\Answered",
            Self::Flagged => "\\Flagged",
            Self::Deleted => "\\Deleted",
            Self::Draft => "\\Draft",
            Self::Recent => "\\Recent",
            Self::Keyword(kw) => kw,
        }
    }

    /// Parses a flag atom's textual value as it arrives in a FETCH/SELECT
    /// response (e.g. `"\Seen"`, `"$Important"`).
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value {
            "\\Seen" => Self::Seen,
            "\\Answered" => Self::Answered,
            "\\Flagged" => Self::Flagged,
            "\\Deleted" => Self::Deleted,
            "\\Draft" => Self::Draft,
            "\\Recent" => Self::Recent,
            other => Self::Keyword(other.to_string()),
        }
    }

    /// The compiled attribute-tree node for this flag, for use as a STORE
    /// or SEARCH argument.
    #[must_use]
    pub fn to_node(&self) -> Node {
        Node::atom(self.as_imap_str())
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_imap_str())
    }
}
