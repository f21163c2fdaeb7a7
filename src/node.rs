//! The attribute tree: the typed parse result of an IMAP response payload
//! (spec.md §3 "Attribute tree").

/// One element of a parsed IMAP response.
///
/// A [`Section`] never appears as a sibling node — it is only ever attached
/// as `Node::Atom.section`. Likewise a partial range only ever attaches as
/// `Node::Atom.partial`.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Nil,
    Atom(Atom),
    String { value: Vec<u8>, sensitive: bool },
    Literal {
        value: Vec<u8>,
        literal_type: LiteralType,
        literal_plus: bool,
        sensitive: bool,
    },
    Number(u64),
    /// A syntactic sequence set, e.g. `1:*,3,5:7`, kept verbatim.
    Sequence(String),
    /// Human-readable tail text following a response code.
    Text(String),
    List(Vec<Node>),
}

/// Whether a literal was introduced by `{N}` or the binary `~{N}` marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralType {
    Literal,
    Literal8,
}

/// An atom, optionally carrying a bracketed section and/or a partial range.
///
/// `value` may be empty when the atom exists only to carry a `section`
/// (this is how response codes after `OK`/`NO`/`BAD`/`BYE`/`PREAUTH` are
/// represented: a synthesized empty atom owning the `[...]` section).
#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    pub value: String,
    pub section: Option<Vec<Node>>,
    pub partial: Option<Partial>,
}

impl Atom {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            section: None,
            partial: None,
        }
    }

    #[must_use]
    pub fn with_section(mut self, section: Vec<Node>) -> Self {
        self.section = Some(section);
        self
    }

    #[must_use]
    pub fn with_partial(mut self, partial: Partial) -> Self {
        self.partial = Some(partial);
        self
    }
}

/// `<origin.length>` — a byte-range following a section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partial {
    pub origin: u32,
    pub length: Option<u32>,
}

impl Node {
    #[must_use]
    pub fn atom(value: impl Into<String>) -> Self {
        Self::Atom(Atom::new(value))
    }

    #[must_use]
    pub fn string(value: impl Into<Vec<u8>>) -> Self {
        Self::String { value: value.into(), sensitive: false }
    }

    #[must_use]
    pub fn as_atom(&self) -> Option<&Atom> {
        match self {
            Self::Atom(a) => Some(a),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_number(&self) -> Option<u64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Text-like nodes reduced to a UTF-8 string, used by callers that do
    /// not need to distinguish atoms/strings/text at this layer.
    #[must_use]
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Atom(a) => Some(a.value.clone()),
            Self::String { value, .. } => Some(String::from_utf8_lossy(value).into_owned()),
            Self::Text(t) => Some(t.clone()),
            Self::Sequence(s) => Some(s.clone()),
            Self::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&[Node]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }
}
