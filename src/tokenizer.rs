//! C3 — the token parser / grammar walker.
//!
//! A hand-written state machine that turns a response payload (plus the
//! literal buffers the framer already extracted from it) into a flat list
//! of [`Node`]s. The named states from spec.md §4.3 — `Normal`, `Atom`,
//! `String`, `Literal`, `Partial`, `Sequence`, `Text` — show up below as
//! the branches of [`Tokenizer::parse_item`] and its helpers; the parser
//! is structured as recursive descent rather than an explicit state enum
//! because the grammar is naturally nested (lists, sections), but every
//! state the spec names has a corresponding function.

use std::collections::VecDeque;

use crate::error::{Error, Result};
use crate::node::{Atom, LiteralType, Node, Partial};

const MAX_NESTING: usize = 25;

pub struct Tokenizer<'a> {
    input: &'a [u8],
    pos: usize,
    literals: VecDeque<Vec<u8>>,
    nesting: usize,
}

/// Parses every attribute in `payload` (the `Normal` state scanning
/// top-level, space-separated items), consuming literals from `literals`
/// in order as `{N}` markers are encountered.
pub fn tokenize(payload: &[u8], literals: Vec<Vec<u8>>) -> Result<Vec<Node>> {
    let mut tok = Tokenizer::new(payload, literals);
    let items = tok.parse_items(None)?;
    Ok(items)
}

impl<'a> Tokenizer<'a> {
    #[must_use]
    pub fn new(input: &'a [u8], literals: Vec<Vec<u8>>) -> Self {
        Self {
            input,
            pos: 0,
            literals: literals.into(),
            nesting: 0,
        }
    }

    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn err(&self, code: u32) -> Error {
        Error::Parser {
            code,
            input: self.input.to_vec(),
            pos: self.pos,
            chr: self.peek(),
        }
    }

    fn skip_spaces(&mut self) {
        while self.peek() == Some(b' ') {
            self.pos += 1;
        }
    }

    /// `Normal` state: parses space-separated items until end of input, or
    /// until `terminator` is seen (used for lists and sections, which are
    /// closed by `)` / `]` respectively).
    fn parse_items(&mut self, terminator: Option<u8>) -> Result<Vec<Node>> {
        let mut items = Vec::new();
        loop {
            self.skip_spaces();
            match self.peek() {
                None => break,
                Some(b) if Some(b) == terminator => break,
                _ => items.push(self.parse_item()?),
            }
        }
        Ok(items)
    }

    fn parse_item(&mut self) -> Result<Node> {
        match self.peek() {
            Some(b'(') => self.parse_list(),
            Some(b'"') => self.parse_quoted_string(),
            Some(b'{') => self.parse_literal(LiteralType::Literal),
            Some(b'~') if self.input.get(self.pos + 1) == Some(&b'{') => {
                self.pos += 1;
                self.parse_literal(LiteralType::Literal8)
            }
            Some(b'*') => self.parse_sequence_or_atom(),
            Some(b) if b.is_ascii_digit() => self.parse_number_or_sequence(),
            Some(_) => self.parse_atom(),
            None => Err(self.err(1)),
        }
    }

    /// `(` ... `)` — nesting capped at 25 levels.
    fn parse_list(&mut self) -> Result<Node> {
        self.pos += 1; // consume '('
        self.nesting += 1;
        if self.nesting > MAX_NESTING {
            return Err(Error::MaxNestingReached { input: self.input.to_vec() });
        }
        let items = self.parse_items(Some(b')'))?;
        self.nesting -= 1;
        if self.bump() != Some(b')') {
            return Err(self.err(2));
        }
        Ok(Node::List(items))
    }

    /// `String` state: `"` ... unescaped `"`, `\` escapes the next byte.
    fn parse_quoted_string(&mut self) -> Result<Node> {
        self.pos += 1; // consume opening '"'
        let mut value = Vec::new();
        loop {
            match self.bump() {
                None => return Err(self.err(3)),
                Some(b'"') => break,
                Some(b'\\') => match self.bump() {
                    None => return Err(self.err(4)),
                    Some(escaped) => value.push(escaped),
                },
                Some(b) => value.push(b),
            }
        }
        Ok(Node::String { value, sensitive: false })
    }

    /// `Literal` state: `{N}` or `{N+}`, immediately followed by CRLF or
    /// LF, then the literal bytes already extracted by the framer.
    fn parse_literal(&mut self, kind: LiteralType) -> Result<Node> {
        self.pos += 1; // consume '{'
        let digit_start = self.pos;
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.pos == digit_start {
            return Err(self.err(5));
        }
        let n: u64 = std::str::from_utf8(&self.input[digit_start..self.pos])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| self.err(6))?;

        let literal_plus = self.peek() == Some(b'+');
        if literal_plus {
            self.pos += 1;
        }
        if self.bump() != Some(b'}') {
            return Err(self.err(7));
        }
        match self.bump() {
            Some(b'\n') => {}
            Some(b'\r') => {
                if self.bump() != Some(b'\n') {
                    return Err(self.err(8));
                }
            }
            _ => return Err(self.err(9)),
        }

        let value = self.literals.pop_front().ok_or_else(|| self.err(10))?;
        debug_assert_eq!(value.len() as u64, n, "framer/tokenizer literal length mismatch");

        Ok(Node::Literal { value, literal_type: kind, literal_plus, sensitive: false })
    }

    /// `Sequence` state entered from a leading `*`: extends on `:`, `,`,
    /// digits, `*`; a lone `*` (no `:` ever seen) is reclassified as an
    /// atom on close.
    fn parse_sequence_or_atom(&mut self) -> Result<Node> {
        let start = self.pos;
        self.pos += 1; // consume leading '*'
        while self.peek().is_some_and(is_sequence_char) {
            self.pos += 1;
        }
        let text = String::from_utf8_lossy(&self.input[start..self.pos]).into_owned();
        if text == "*" {
            Ok(Node::atom("*"))
        } else {
            Ok(Node::Sequence(text))
        }
    }

    /// Digit-leading item: a plain `Number` unless immediately followed by
    /// `:` or `,`, in which case it extends into a `Sequence`.
    fn parse_number_or_sequence(&mut self) -> Result<Node> {
        let start = self.pos;
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        if matches!(self.peek(), Some(b':') | Some(b',')) {
            while self.peek().is_some_and(is_sequence_char) {
                self.pos += 1;
            }
            let text = String::from_utf8_lossy(&self.input[start..self.pos]).into_owned();
            return Ok(Node::Sequence(text));
        }
        let text = std::str::from_utf8(&self.input[start..self.pos]).map_err(|_| self.err(11))?;
        let n: u64 = text.parse().map_err(|_| self.err(12))?;
        Ok(Node::Number(n))
    }

    /// `Atom` state: `ATOM-CHAR`, a leading `\` for system flags (`\*` is
    /// a valid, complete atom on its own), `%` for LIST wildcards, and any
    /// byte `>= 0x80` (presumed UTF-8).
    fn parse_atom(&mut self) -> Result<Node> {
        let start = self.pos;
        if self.peek() == Some(b'\\') {
            self.pos += 1;
            if self.peek() == Some(b'*') {
                self.pos += 1;
                return self.finish_atom(start);
            }
        }
        while self.peek().is_some_and(is_atom_byte) {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.err(13));
        }
        self.finish_atom(start)
    }

    fn finish_atom(&mut self, start: usize) -> Result<Node> {
        let value = String::from_utf8_lossy(&self.input[start..self.pos]).into_owned();
        if value == "NIL" {
            return Ok(Node::Nil);
        }
        let mut atom = Atom::new(value);

        if self.peek() == Some(b'[') && is_sectioned_atom(&atom.value) {
            let section = self.parse_section()?;
            atom = atom.with_section(section);
            if self.peek() == Some(b'<') {
                atom = atom.with_partial(self.parse_partial()?);
            }
        }
        Ok(Node::Atom(atom))
    }

    /// `[` ... `]` — a section body, recognized only after `BODY`,
    /// `BODY.PEEK`, `BINARY`, or `BINARY.PEEK` at the call site. Handles
    /// the `REFERRAL <imapurl>` special case used inside response codes:
    /// the URL is captured verbatim up to the closing `]`.
    fn parse_section(&mut self) -> Result<Vec<Node>> {
        self.pos += 1; // consume '['
        self.nesting += 1;
        if self.nesting > MAX_NESTING {
            return Err(Error::MaxNestingReached { input: self.input.to_vec() });
        }

        let mut items = Vec::new();
        self.skip_spaces();
        if self.starts_with_ci(b"REFERRAL") {
            let referral_end = self.pos + "REFERRAL".len();
            let after_word = self.input.get(referral_end).copied();
            if after_word.is_none() || after_word == Some(b' ') || after_word == Some(b']') {
                items.push(Node::atom("REFERRAL"));
                self.pos = referral_end;
                self.skip_spaces();
                let url_start = self.pos;
                while self.peek().is_some_and(|b| b != b']') {
                    self.pos += 1;
                }
                if self.pos > url_start {
                    let url = String::from_utf8_lossy(&self.input[url_start..self.pos]).into_owned();
                    items.push(Node::Text(url));
                }
                self.nesting -= 1;
                if self.bump() != Some(b']') {
                    return Err(self.err(14));
                }
                return Ok(items);
            }
        }

        items.extend(self.parse_items(Some(b']'))?);
        self.nesting -= 1;
        if self.bump() != Some(b']') {
            return Err(self.err(15));
        }
        Ok(items)
    }

    /// `Partial` state: `<origin.length>`, digits and `.` only; a leading
    /// `0` is invalid except as the lone digit of a component.
    fn parse_partial(&mut self) -> Result<Partial> {
        self.pos += 1; // consume '<'
        let origin = self.parse_partial_number()?;
        if self.bump() != Some(b'.') {
            return Err(self.err(16));
        }
        let length = self.parse_partial_number()?;
        if self.bump() != Some(b'>') {
            return Err(self.err(17));
        }
        Ok(Partial { origin, length: Some(length) })
    }

    fn parse_partial_number(&mut self) -> Result<u32> {
        let start = self.pos;
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.err(18));
        }
        let digits = &self.input[start..self.pos];
        if digits.len() > 1 && digits[0] == b'0' {
            return Err(self.err(19));
        }
        std::str::from_utf8(digits)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| self.err(20))
    }

    fn starts_with_ci(&self, word: &[u8]) -> bool {
        self.input[self.pos..]
            .get(..word.len())
            .is_some_and(|slice| slice.eq_ignore_ascii_case(word))
    }

    /// Used by the response parser (C4) for `OK`/`NO`/`BAD`/`BYE`/`PREAUTH`
    /// lines: an optional `[...]` response-code section at the current
    /// position.
    pub fn parse_optional_section(&mut self) -> Result<Option<Vec<Node>>> {
        self.skip_spaces();
        if self.peek() == Some(b'[') {
            Ok(Some(self.parse_section()?))
        } else {
            Ok(None)
        }
    }

    /// Consumes and returns every remaining byte as the human-readable
    /// tail text following a response code.
    pub fn remaining_text(&mut self) -> String {
        self.skip_spaces();
        let text = String::from_utf8_lossy(&self.input[self.pos..]).into_owned();
        self.pos = self.input.len();
        text
    }
}

fn is_sequence_char(b: u8) -> bool {
    b == b':' || b == b',' || b == b'*' || b.is_ascii_digit()
}

fn is_atom_byte(b: u8) -> bool {
    crate::syntax::is_atom_char(b) || b == b'%' || b >= 0x80
}

fn is_sectioned_atom(value: &str) -> bool {
    matches!(
        value.to_ascii_uppercase().as_str(),
        "BODY" | "BODY.PEEK" | "BINARY" | "BINARY.PEEK"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &[u8]) -> Vec<Node> {
        tokenize(s, Vec::new()).unwrap()
    }

    #[test]
    fn parses_plain_atoms_and_numbers() {
        let nodes = parse(b"FLAGS 12 NIL");
        assert_eq!(nodes, vec![Node::atom("FLAGS"), Node::Number(12), Node::Nil]);
    }

    #[test]
    fn parses_quoted_string_with_escapes() {
        let nodes = parse(br#""hi \"there\"""#);
        assert_eq!(nodes, vec![Node::String { value: b"hi \"there\"".to_vec(), sensitive: false }]);
    }

    #[test]
    fn parses_nested_list() {
        let nodes = parse(b"(\\Seen \\Answered)");
        assert_eq!(nodes, vec![Node::List(vec![Node::atom("\\Seen"), Node::atom("\\Answered")])]);
    }

    #[test]
    fn list_nesting_cap() {
        let deep = "(".repeat(26) + &")".repeat(26);
        let err = tokenize(deep.as_bytes(), Vec::new()).unwrap_err();
        assert!(matches!(err, Error::MaxNestingReached { .. }));
    }

    #[test]
    fn literal_consumes_from_queue() {
        let nodes = tokenize(b"{5}\r\n", vec![b"hello".to_vec()]).unwrap();
        assert_eq!(
            nodes,
            vec![Node::Literal {
                value: b"hello".to_vec(),
                literal_type: LiteralType::Literal,
                literal_plus: false,
                sensitive: false,
            }]
        );
    }

    #[test]
    fn literal8_marker() {
        let nodes = tokenize(b"~{3}\r\n", vec![b"abc".to_vec()]).unwrap();
        assert_eq!(
            nodes,
            vec![Node::Literal {
                value: b"abc".to_vec(),
                literal_type: LiteralType::Literal8,
                literal_plus: false,
                sensitive: false,
            }]
        );
    }

    #[test]
    fn bare_tilde_decays_to_atom() {
        let nodes = parse(b"~foo");
        assert_eq!(nodes, vec![Node::atom("~foo")]);
    }

    #[test]
    fn sequence_set_extends_past_digits() {
        let nodes = parse(b"1:5,7,9:*");
        assert_eq!(nodes, vec![Node::Sequence("1:5,7,9:*".into())]);
    }

    #[test]
    fn bare_star_reclassified_as_atom() {
        let nodes = parse(b"*");
        assert_eq!(nodes, vec![Node::atom("*")]);
    }

    #[test]
    fn star_sequence_stays_sequence() {
        let nodes = parse(b"*:5");
        assert_eq!(nodes, vec![Node::Sequence("*:5".into())]);
    }

    #[test]
    fn plain_number_not_reclassified() {
        let nodes = parse(b"12 EXISTS");
        assert_eq!(nodes, vec![Node::Number(12), Node::atom("EXISTS")]);
    }

    #[test]
    fn body_section_with_partial() {
        let nodes = parse(b"BODY[HEADER.FIELDS (Subject From)]<12.45>");
        let Node::Atom(atom) = &nodes[0] else { panic!("expected atom") };
        assert_eq!(atom.value, "BODY");
        let section = atom.section.as_ref().unwrap();
        assert_eq!(section[0], Node::atom("HEADER.FIELDS"));
        assert_eq!(section[1], Node::List(vec![Node::atom("Subject"), Node::atom("From")]));
        assert_eq!(atom.partial, Some(Partial { origin: 12, length: Some(45) }));
    }

    #[test]
    fn non_body_atom_does_not_open_section() {
        let nodes = parse(b"FOO[1]");
        assert_eq!(nodes, vec![Node::atom("FOO"), Node::List(vec![Node::Number(1)])]);
    }

    #[test]
    fn referral_payload_captured_verbatim() {
        let mut tok = Tokenizer::new(b"[REFERRAL imap://user@host/INBOX] trailing text", Vec::new());
        let section = tok.parse_optional_section().unwrap().unwrap();
        assert_eq!(
            section,
            vec![Node::atom("REFERRAL"), Node::Text("imap://user@host/INBOX".into())]
        );
        assert_eq!(tok.remaining_text(), "trailing text");
    }

    #[test]
    fn utf8_mailbox_names_parsed_as_atoms() {
        let nodes = parse("\u{e9}clair".as_bytes());
        assert_eq!(nodes.len(), 1);
        assert!(nodes[0].as_atom().is_some());
    }

    #[test]
    fn quote_inside_atom_terminates_atom_scan() {
        // An unescaped quote is not an atom-char; it starts a new string item.
        let nodes = parse(br#"ab"cd""#);
        assert_eq!(nodes, vec![Node::atom("ab"), Node::String { value: b"cd".to_vec(), sensitive: false }]);
    }
}
