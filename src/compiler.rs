//! C5 — the command compiler: turns a tag/command/attribute-tree into
//! outgoing bytes, segmenting at synchronizing literals when the caller
//! requests array-mode output. See spec.md §4.5.

use crate::node::{LiteralType, Node};
use crate::syntax::{self, CharClass};

/// Compilation flags. `as_array` requests segmented output (the caller
/// must await a server `+` continuation between adjacent segments);
/// `is_logging` replaces literal payloads with size-only placeholders.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompileOptions {
    pub as_array: bool,
    pub is_logging: bool,
    pub literal_plus: bool,
    pub literal_minus: bool,
}

/// The 4 KiB threshold below which `LITERAL-` allows a non-synchronizing
/// literal even without the full `LITERAL+` capability.
pub const LITERAL_MINUS_THRESHOLD: usize = 4096;

/// The compiled form of a command: either one buffer, or a list of
/// segments whose boundaries are synchronization points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compiled {
    Single(Vec<u8>),
    Segmented(Vec<Vec<u8>>),
}

impl Compiled {
    /// Concatenates every segment, discarding the synchronization
    /// boundaries — used to check invariant 4 (segmentation correctness)
    /// against the non-segmented form.
    #[must_use]
    pub fn flatten(&self) -> Vec<u8> {
        match self {
            Self::Single(buf) => buf.clone(),
            Self::Segmented(segments) => segments.concat(),
        }
    }
}

struct Writer {
    segments: Vec<Vec<u8>>,
    buf: Vec<u8>,
}

impl Writer {
    fn new() -> Self {
        Self { segments: Vec::new(), buf: Vec::new() }
    }

    fn push_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    fn last_byte(&self) -> Option<u8> {
        self.buf.last().copied()
    }

    fn flush_segment(&mut self) {
        self.segments.push(std::mem::take(&mut self.buf));
    }

    fn into_compiled(mut self) -> Compiled {
        self.flush_segment();
        if self.segments.len() == 1 {
            Compiled::Single(self.segments.into_iter().next().unwrap_or_default())
        } else {
            Compiled::Segmented(self.segments)
        }
    }
}

/// Compiles a full tagged command: `TAG SP COMMAND (SP attribute)* CRLF`.
#[must_use]
pub fn compile(tag: &str, command: &str, attributes: &[Node], opts: CompileOptions) -> Compiled {
    let mut writer = Writer::new();
    writer.push_bytes(tag.as_bytes());
    writer.push_bytes(b" ");
    writer.push_bytes(command.as_bytes());
    write_siblings(&mut writer, attributes, &opts, true);
    writer.push_bytes(b"\r\n");
    writer.into_compiled()
}

/// Compiles a bare attribute tree without a tag/command prefix or
/// trailing CRLF — used for nested round-trip tests and for logging
/// previews of arguments in isolation.
#[must_use]
pub fn compile_attributes(attributes: &[Node], opts: CompileOptions) -> Compiled {
    let mut writer = Writer::new();
    write_siblings(&mut writer, attributes, &opts, false);
    writer.into_compiled()
}

fn write_siblings(writer: &mut Writer, nodes: &[Node], opts: &CompileOptions, force_leading_space: bool) {
    let mut prev: Option<&Node> = None;
    for node in nodes {
        match prev {
            None if force_leading_space => writer.push_bytes(b" "),
            None => {}
            Some(p) => maybe_space(writer, p, node),
        }
        write_node(writer, node, opts);
        prev = Some(node);
    }
}

/// Inserts a single SP between two adjacent non-literal emissions unless
/// the previous byte is `(`, `<`, `[`, the previous node was a literal
/// (self-delimiting), or both nodes are sub-lists (no SP between adjacent
/// sub-arrays).
fn maybe_space(writer: &mut Writer, prev: &Node, current: &Node) {
    if matches!((prev, current), (Node::List(_), Node::List(_))) {
        return;
    }
    if matches!(writer.last_byte(), Some(b'(') | Some(b'<') | Some(b'[')) {
        return;
    }
    if matches!(prev, Node::Literal { .. }) {
        return;
    }
    writer.push_bytes(b" ");
}

fn write_node(writer: &mut Writer, node: &Node, opts: &CompileOptions) {
    match node {
        Node::Nil => writer.push_bytes(b"NIL"),
        Node::Number(n) => writer.push_bytes(n.to_string().as_bytes()),
        Node::Sequence(s) => writer.push_bytes(s.as_bytes()),
        Node::Text(s) => writer.push_bytes(s.as_bytes()),
        Node::String { value, sensitive } => write_string(writer, value, *sensitive, opts),
        Node::Literal { value, literal_type, literal_plus, sensitive } => {
            write_literal(writer, value, *literal_type, *literal_plus, *sensitive, opts);
        }
        Node::Atom(atom) => {
            write_atom_value(writer, &atom.value);
            if let Some(section) = &atom.section {
                writer.push_bytes(b"[");
                write_siblings(writer, section, opts, false);
                writer.push_bytes(b"]");
            }
            if let Some(partial) = &atom.partial {
                writer.push_bytes(b"<");
                writer.push_bytes(partial.origin.to_string().as_bytes());
                writer.push_bytes(b".");
                if let Some(len) = partial.length {
                    writer.push_bytes(len.to_string().as_bytes());
                }
                writer.push_bytes(b">");
            }
        }
        Node::List(items) => {
            writer.push_bytes(b"(");
            write_siblings(writer, items, opts, false);
            writer.push_bytes(b")");
        }
    }
}

fn write_atom_value(writer: &mut Writer, value: &str) {
    let bytes = value.as_bytes();
    let check = if bytes.first() == Some(&b'\\') { &bytes[1..] } else { bytes };
    if syntax::verify(check, CharClass::AtomChar).is_some() {
        write_quoted(writer, bytes);
    } else {
        writer.push_bytes(bytes);
    }
}

fn write_string(writer: &mut Writer, value: &[u8], sensitive: bool, opts: &CompileOptions) {
    if opts.is_logging && sensitive {
        writer.push_bytes(b"(* value hidden *)");
        return;
    }
    write_quoted(writer, value);
}

fn write_quoted(writer: &mut Writer, value: &[u8]) {
    writer.push_bytes(b"\"");
    for &b in value {
        if b == b'"' || b == b'\\' {
            writer.push_bytes(&[b'\\']);
        }
        writer.push_bytes(&[b]);
    }
    writer.push_bytes(b"\"");
}

#[allow(clippy::fn_params_excessive_bools)]
fn write_literal(
    writer: &mut Writer,
    value: &[u8],
    literal_type: LiteralType,
    literal_plus: bool,
    sensitive: bool,
    opts: &CompileOptions,
) {
    if opts.is_logging {
        if sensitive {
            writer.push_bytes(b"(* value hidden *)");
        } else {
            writer.push_bytes(format!("(* {} NB literal *)", value.len()).as_bytes());
        }
        return;
    }

    let len = value.len();
    writer.push_bytes(match literal_type {
        LiteralType::Literal => b"{",
        LiteralType::Literal8 => b"~{",
    });
    writer.push_bytes(len.to_string().as_bytes());

    let append_plus = literal_plus || (opts.literal_minus && len <= LITERAL_MINUS_THRESHOLD);
    if append_plus {
        writer.push_bytes(b"+");
    }
    writer.push_bytes(b"}\r\n");

    let can_append = !opts.as_array || literal_plus || (opts.literal_minus && len <= LITERAL_MINUS_THRESHOLD);
    if can_append {
        writer.push_bytes(value);
    } else {
        writer.flush_segment();
        writer.push_bytes(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Atom;
    use crate::tokenizer;

    #[test]
    fn simple_command() {
        let compiled = compile("A1", "NOOP", &[], CompileOptions::default());
        assert_eq!(compiled.flatten(), b"A1 NOOP\r\n");
    }

    #[test]
    fn quotes_atoms_with_invalid_chars() {
        let compiled = compile(
            "A1",
            "LOGIN",
            &[Node::atom("a b"), Node::atom("pass")],
            CompileOptions::default(),
        );
        assert_eq!(compiled.flatten(), b"A1 LOGIN \"a b\" pass\r\n");
    }

    #[test]
    fn string_escapes_quotes_and_backslashes() {
        let compiled = compile_attributes(
            &[Node::string(br#"a"b\c"#.to_vec())],
            CompileOptions::default(),
        );
        assert_eq!(compiled.flatten(), br#""a\"b\\c""#);
    }

    #[test]
    fn list_of_flags() {
        let compiled = compile(
            "A1",
            "STORE",
            &[
                Node::Sequence("1:5".into()),
                Node::atom("+FLAGS"),
                Node::List(vec![Node::atom("\\Seen")]),
            ],
            CompileOptions::default(),
        );
        assert_eq!(compiled.flatten(), b"A1 STORE 1:5 +FLAGS (\\Seen)\r\n");
    }

    #[test]
    fn adjacent_sublists_have_no_separator() {
        let compiled = compile_attributes(
            &[Node::List(vec![Node::Number(1)]), Node::List(vec![Node::Number(2)])],
            CompileOptions::default(),
        );
        assert_eq!(compiled.flatten(), b"(1)(2)");
    }

    #[test]
    fn single_synchronizing_literal_segments() {
        let compiled = compile(
            "A2",
            "LOGIN",
            &[
                Node::Literal { value: b"user".to_vec(), literal_type: LiteralType::Literal, literal_plus: false, sensitive: false },
                Node::Literal { value: b"pass".to_vec(), literal_type: LiteralType::Literal, literal_plus: false, sensitive: true },
            ],
            CompileOptions { as_array: true, ..Default::default() },
        );
        match compiled {
            Compiled::Segmented(segments) => {
                assert_eq!(segments.len(), 3);
                assert_eq!(segments[0], b"A2 LOGIN {4}\r\n");
                assert_eq!(segments[1], b"user {4}\r\n");
                assert_eq!(segments[2], b"pass\r\n");
            }
            Compiled::Single(_) => panic!("expected segmented output"),
        }
    }

    #[test]
    fn literal_plus_is_appended_inline() {
        let compiled = compile(
            "A2",
            "LOGIN",
            &[Node::Literal { value: b"user".to_vec(), literal_type: LiteralType::Literal, literal_plus: true, sensitive: false }],
            CompileOptions { as_array: true, ..Default::default() },
        );
        assert_eq!(compiled.flatten(), b"A2 LOGIN {4+}\r\nuser\r\n");
        assert!(matches!(compiled, Compiled::Single(_)));
    }

    #[test]
    fn literal_minus_threshold_at_4096() {
        let at_cap = vec![b'x'; LITERAL_MINUS_THRESHOLD];
        let compiled = compile(
            "A2",
            "APPEND",
            &[Node::Literal { value: at_cap, literal_type: LiteralType::Literal, literal_plus: false, sensitive: false }],
            CompileOptions { as_array: true, literal_minus: true, ..Default::default() },
        );
        assert!(matches!(compiled, Compiled::Single(_)));

        let over_cap = vec![b'x'; LITERAL_MINUS_THRESHOLD + 1];
        let compiled = compile(
            "A3",
            "APPEND",
            &[Node::Literal { value: over_cap, literal_type: LiteralType::Literal, literal_plus: false, sensitive: false }],
            CompileOptions { as_array: true, literal_minus: true, ..Default::default() },
        );
        assert!(matches!(compiled, Compiled::Segmented(_)));
    }

    #[test]
    fn logging_hides_sensitive_and_sizes_literals() {
        let compiled = compile(
            "A2",
            "LOGIN",
            &[
                Node::atom("user"),
                Node::Literal { value: b"secret".to_vec(), literal_type: LiteralType::Literal, literal_plus: false, sensitive: true },
            ],
            CompileOptions { is_logging: true, ..Default::default() },
        );
        assert_eq!(compiled.flatten(), b"A2 LOGIN user (* value hidden *)\r\n");
    }

    #[test]
    fn section_and_partial_round_trip_through_compiler() {
        let atom = Atom::new("BODY")
            .with_section(vec![
                Node::atom("HEADER.FIELDS"),
                Node::List(vec![Node::atom("Subject"), Node::atom("From")]),
            ])
            .with_partial(crate::node::Partial { origin: 12, length: Some(45) });
        let compiled = compile_attributes(&[Node::Atom(atom)], CompileOptions::default());
        assert_eq!(compiled.flatten(), b"BODY[HEADER.FIELDS (Subject From)]<12.45>");
    }

    #[test]
    fn compiler_parser_round_trip_for_plain_trees() {
        let tree = vec![
            Node::atom("FLAGS"),
            Node::List(vec![Node::atom("\\Seen"), Node::atom("\\Answered")]),
            Node::Number(42),
            Node::Sequence("1:5,7".into()),
            Node::string(b"hello world".to_vec()),
        ];
        let compiled = compile_attributes(&tree, CompileOptions::default());
        let bytes = compiled.flatten();
        let parsed = tokenizer::tokenize(&bytes, Vec::new()).unwrap();
        assert_eq!(parsed, tree);
    }
}
