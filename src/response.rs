//! C4 — the response parser: extracts tag and command from a frame, then
//! hands the remainder to the token parser (C3). See spec.md §4.4.

use crate::error::{Error, Result};
use crate::framer::Frame;
use crate::node::Node;
use crate::syntax::{self, CharClass};
use crate::tokenizer::{self, Tokenizer};

/// A fully parsed IMAP response line.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseMessage {
    /// `"*"`, `"+"`, or the command tag.
    pub tag: String,
    /// The (possibly two-word, e.g. `"UID FETCH"`) command name. Empty for
    /// continuation (`+`) responses.
    pub command: String,
    pub attributes: Vec<Node>,
    /// Set when the frame began with one or more stray NUL bytes.
    pub null_bytes_removed: Option<u32>,
    /// Populated only for `+` continuations: the human-readable text.
    pub human_readable: Option<String>,
}

const STATUS_COMMANDS: &[&str] = &["OK", "NO", "BAD", "BYE", "PREAUTH"];
const TWO_WORD_COMMANDS: &[&str] = &["UID", "AUTHENTICATE"];

/// Parses one [`Frame`] into a [`ResponseMessage`].
///
/// # Errors
///
/// Returns [`Error::Parser`] if the tag, command, or attributes are
/// malformed.
pub fn parse(frame: &Frame) -> Result<ResponseMessage> {
    let mut payload = frame.payload.as_slice();
    let mut null_bytes_removed = None;

    if payload.first() == Some(&0) {
        let first_non_null = payload.iter().position(|&b| b != 0);
        match first_non_null {
            None => {
                #[allow(clippy::cast_possible_truncation)]
                let removed = payload.len() as u32;
                return Ok(ResponseMessage {
                    tag: "*".to_string(),
                    command: "BAD".to_string(),
                    attributes: Vec::new(),
                    null_bytes_removed: Some(removed),
                    human_readable: None,
                });
            }
            Some(idx) => {
                #[allow(clippy::cast_possible_truncation)]
                let removed = idx as u32;
                null_bytes_removed = Some(removed);
                payload = &payload[idx..];
            }
        }
    }

    let mut pos = 0usize;
    let tag = read_tag(payload, &mut pos)?;

    if tag == "+" {
        let human_readable = std::str::from_utf8(&payload[pos..])
            .unwrap_or_default()
            .trim_start()
            .to_string();
        return Ok(ResponseMessage {
            tag,
            command: String::new(),
            attributes: Vec::new(),
            null_bytes_removed,
            human_readable: Some(human_readable),
        });
    }

    expect_sp(payload, &mut pos)?;
    let mut command = read_command(payload, &mut pos)?;

    if TWO_WORD_COMMANDS.contains(&command.to_ascii_uppercase().as_str()) {
        expect_sp(payload, &mut pos)?;
        let second = read_command(payload, &mut pos)?;
        command = format!("{} {}", command.to_ascii_uppercase(), second.to_ascii_uppercase());
    } else {
        command = command.to_ascii_uppercase();
    }

    if STATUS_COMMANDS.contains(&command.as_str()) {
        let mut tok = Tokenizer::new(&payload[pos..], frame.literals.clone());
        let section = tok.parse_optional_section()?;
        let text = tok.remaining_text();
        let mut attributes = Vec::new();
        if let Some(section) = section {
            attributes.push(Node::Atom(crate::node::Atom::new(String::new()).with_section(section)));
        }
        if !text.is_empty() {
            attributes.push(Node::Text(text));
        }
        return Ok(ResponseMessage { tag, command, attributes, null_bytes_removed, human_readable: None });
    }

    let attributes = tokenizer::tokenize(&payload[pos..], frame.literals.clone())?;
    Ok(ResponseMessage { tag, command, attributes, null_bytes_removed, human_readable: None })
}

fn read_tag(payload: &[u8], pos: &mut usize) -> Result<String> {
    if payload.get(*pos) == Some(&b'*') {
        *pos += 1;
        return Ok("*".to_string());
    }
    if payload.get(*pos) == Some(&b'+') {
        *pos += 1;
        return Ok("+".to_string());
    }
    let start = *pos;
    while payload.get(*pos).is_some_and(|&b| syntax::is_tag_char(b)) {
        *pos += 1;
    }
    if *pos == start {
        return Err(parser_error(101, payload, *pos));
    }
    Ok(String::from_utf8_lossy(&payload[start..*pos]).into_owned())
}

fn expect_sp(payload: &[u8], pos: &mut usize) -> Result<()> {
    if payload.get(*pos) == Some(&b' ') {
        *pos += 1;
        Ok(())
    } else {
        Err(parser_error(102, payload, *pos))
    }
}

fn read_command(payload: &[u8], pos: &mut usize) -> Result<String> {
    let start = *pos;
    while payload.get(*pos).is_some_and(|&b| syntax::CharClass::Command.contains(b)) {
        *pos += 1;
    }
    if *pos == start {
        return Err(parser_error(103, payload, *pos));
    }
    Ok(String::from_utf8_lossy(&payload[start..*pos]).into_owned())
}

fn parser_error(code: u32, input: &[u8], pos: usize) -> Error {
    Error::Parser { code, input: input.to_vec(), pos, chr: input.get(pos).copied() }
}

/// Verifies a raw tag string is well-formed (used by the compiler to
/// sanity-check generated tags in debug builds).
#[must_use]
pub fn is_valid_tag(tag: &str) -> bool {
    !tag.is_empty() && syntax::verify(tag.as_bytes(), CharClass::Tag).is_none()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(payload: &[u8]) -> Frame {
        Frame { payload: payload.to_vec(), literals: Vec::new() }
    }

    #[test]
    fn capability_then_ok() {
        let msg = parse(&frame(b"A1 OK done")).unwrap();
        assert_eq!(msg.tag, "A1");
        assert_eq!(msg.command, "OK");
        assert_eq!(msg.attributes, vec![Node::Text("done".into())]);
    }

    #[test]
    fn untagged_capability_attributes() {
        let msg = parse(&frame(b"* CAPABILITY IMAP4rev1 LITERAL+ IDLE")).unwrap();
        assert_eq!(msg.tag, "*");
        assert_eq!(msg.command, "CAPABILITY");
        assert_eq!(msg.attributes.len(), 3);
    }

    #[test]
    fn uid_fetch_two_word_command() {
        let msg = parse(&frame(b"* 1 UID FETCH (UID 5)")).unwrap();
        assert_eq!(msg.command, "UID FETCH");
    }

    #[test]
    fn authenticate_two_word_command() {
        let msg = parse(&frame(b"A2 AUTHENTICATE PLAIN")).unwrap();
        assert_eq!(msg.command, "AUTHENTICATE PLAIN");
    }

    #[test]
    fn continuation_tag() {
        let msg = parse(&frame(b"+ go ahead")).unwrap();
        assert_eq!(msg.tag, "+");
        assert_eq!(msg.human_readable.as_deref(), Some("go ahead"));
    }

    #[test]
    fn null_prefix_all_null_becomes_bad() {
        let msg = parse(&frame(&[0, 0, 0])).unwrap();
        assert_eq!(msg.tag, "*");
        assert_eq!(msg.command, "BAD");
        assert_eq!(msg.null_bytes_removed, Some(3));
    }

    #[test]
    fn null_prefix_recorded_otherwise() {
        let mut payload = vec![0, 0];
        payload.extend_from_slice(b"* OK hello");
        let msg = parse(&frame(&payload)).unwrap();
        assert_eq!(msg.null_bytes_removed, Some(2));
        assert_eq!(msg.attributes, vec![Node::Text("hello".into())]);
    }

    #[test]
    fn response_code_section_attached_to_synthesized_atom() {
        let msg = parse(&frame(b"* OK [ALERT] system going down")).unwrap();
        let Node::Atom(atom) = &msg.attributes[0] else { panic!() };
        assert_eq!(atom.value, "");
        assert_eq!(atom.section.as_ref().unwrap(), &vec![Node::atom("ALERT")]);
        assert_eq!(msg.attributes[1], Node::Text("system going down".into()));
    }

    #[test]
    fn copyuid_response_code_sequence() {
        let msg = parse(&frame(b"A1 OK [COPYUID 38505 3857529045 3857529045] done")).unwrap();
        let Node::Atom(atom) = &msg.attributes[0] else { panic!() };
        let section = atom.section.as_ref().unwrap();
        assert_eq!(section[0], Node::atom("COPYUID"));
        assert_eq!(section[1], Node::Number(38_505));
        assert_eq!(section[2], Node::Number(3_857_529_045));
        assert_eq!(section[3], Node::Number(3_857_529_045));
    }
}
