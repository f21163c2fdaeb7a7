//! C2 — the line/literal framer.
//!
//! Slices a raw byte stream into logical IMAP responses ([`Frame`]s),
//! detecting synchronizing literal markers (`{N}\r\n`) and binary literal8
//! markers (`~{N}\r\n`) at the end of a line and switching into a
//! byte-count collection mode for exactly `N` bytes before resuming line
//! scanning. See spec.md §4.2.

use crate::error::{Error, Result};

/// 1 GiB — literals larger than this close the connection.
pub const MAX_LITERAL_SIZE: u64 = 1_073_741_824;

/// One logical IMAP response: the bytes of its line(s) with the final
/// CRLF stripped, plus the literal byte buffers extracted from it in
/// order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Frame {
    pub payload: Vec<u8>,
    pub literals: Vec<Vec<u8>>,
}

#[derive(Debug)]
enum State {
    Line,
    Literal { remaining: u64 },
}

/// A resumable byte-stream framer. Feed it arbitrarily-sized chunks via
/// [`Framer::push`]; it buffers partial lines and partial literals across
/// calls, so a chunk may be split at any byte offset without affecting the
/// frames produced.
#[derive(Debug)]
pub struct Framer {
    state: State,
    line_buf: Vec<u8>,
    payload: Vec<u8>,
    literals: Vec<Vec<u8>>,
    current_literal: Vec<u8>,
    max_literal_size: u64,
}

impl Default for Framer {
    fn default() -> Self {
        Self::new()
    }
}

impl Framer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: State::Line,
            line_buf: Vec::new(),
            payload: Vec::new(),
            literals: Vec::new(),
            current_literal: Vec::new(),
            max_literal_size: MAX_LITERAL_SIZE,
        }
    }

    /// Accepts a raw chunk from the transport and returns every frame
    /// completed by it, in order. Partial state is retained for the next
    /// call.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LiteralTooLarge`] if a declared literal exceeds the
    /// 1 GiB cap; the connection must be closed in that case.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Frame>> {
        let mut frames = Vec::new();
        let mut cursor = 0usize;

        while cursor < data.len() {
            match self.state {
                State::Line => {
                    let Some(rel) = data[cursor..].iter().position(|&b| b == b'\n') else {
                        self.line_buf.extend_from_slice(&data[cursor..]);
                        break;
                    };
                    let line_end = cursor + rel + 1;
                    self.line_buf.extend_from_slice(&data[cursor..line_end]);
                    cursor = line_end;

                    let line = std::mem::take(&mut self.line_buf);
                    self.payload.extend_from_slice(&line);

                    match parse_trailing_literal(&line) {
                        Some(n) => {
                            if n > self.max_literal_size {
                                return Err(Error::LiteralTooLarge {
                                    literal_size: n,
                                    max_size: self.max_literal_size,
                                });
                            }
                            if n == 0 {
                                self.literals.push(Vec::new());
                            } else {
                                self.state = State::Literal { remaining: n };
                            }
                        }
                        None => {
                            if let Some(frame) = self.take_frame() {
                                frames.push(frame);
                            }
                        }
                    }
                }
                State::Literal { remaining } => {
                    let available = data.len() - cursor;
                    #[allow(clippy::cast_possible_truncation)]
                    let take = available.min(remaining as usize);
                    self.current_literal.extend_from_slice(&data[cursor..cursor + take]);
                    cursor += take;
                    let remaining = remaining - take as u64;
                    if remaining == 0 {
                        self.literals.push(std::mem::take(&mut self.current_literal));
                        self.state = State::Line;
                    } else {
                        self.state = State::Literal { remaining };
                    }
                }
            }
        }

        Ok(frames)
    }

    /// Strips the frame's trailing CRLF/LF and emits it, suppressing empty
    /// frames (a lone CRLF carries no information).
    fn take_frame(&mut self) -> Option<Frame> {
        let mut payload = std::mem::take(&mut self.payload);
        if payload.last() == Some(&b'\n') {
            payload.pop();
            if payload.last() == Some(&b'\r') {
                payload.pop();
            }
        }
        let literals = std::mem::take(&mut self.literals);
        if payload.is_empty() && literals.is_empty() {
            return None;
        }
        Some(Frame { payload, literals })
    }
}

/// Scans a completed line (including its terminating LF) for a trailing
/// `{N}` or `{N+}` marker and returns the declared literal length.
///
/// The line may also start with `~{N}` (literal8); the leading `~` is not
/// part of the brace group and does not affect this scan.
fn parse_trailing_literal(line: &[u8]) -> Option<u64> {
    let mut end = line.len();
    if end == 0 || line[end - 1] != b'\n' {
        return None;
    }
    end -= 1;
    if end > 0 && line[end - 1] == b'\r' {
        end -= 1;
    }
    let content = &line[..end];

    if !content.ends_with(b"}") {
        return None;
    }
    let mut digit_end = content.len() - 1; // index of the closing '}'
    if digit_end > 0 && content[digit_end - 1] == b'+' {
        digit_end -= 1;
    }

    let mut digit_start = digit_end;
    while digit_start > 0 && content[digit_start - 1].is_ascii_digit() {
        digit_start -= 1;
    }
    if digit_start == digit_end {
        return None;
    }
    if digit_start == 0 || content[digit_start - 1] != b'{' {
        return None;
    }

    let num_str = std::str::from_utf8(&content[digit_start..digit_end]).ok()?;
    num_str.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_all(framer: &mut Framer, chunks: &[&[u8]]) -> Vec<Frame> {
        let mut out = Vec::new();
        for chunk in chunks {
            out.extend(framer.push(chunk).unwrap());
        }
        out
    }

    #[test]
    fn simple_line() {
        let mut framer = Framer::new();
        let frames = framer.push(b"* OK ready\r\n").unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload, b"* OK ready");
        assert!(frames[0].literals.is_empty());
    }

    #[test]
    fn literal_spanning_chunks() {
        let mut framer = Framer::new();
        let frames = push_all(
            &mut framer,
            &[b"* 1 FETCH (BODY[] {5}\r\n", b"hello", b")\r\n"],
        );
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload, b"* 1 FETCH (BODY[] {5}\r\n)");
        assert_eq!(frames[0].literals, vec![b"hello".to_vec()]);
    }

    #[test]
    fn zero_length_literal_closes_immediately() {
        let mut framer = Framer::new();
        let frames = framer.push(b"* 1 FETCH (BODY[] {0}\r\n)\r\n").unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].literals, vec![Vec::<u8>::new()]);
    }

    #[test]
    fn literal8_marker() {
        let mut framer = Framer::new();
        let frames = push_all(&mut framer, &[b"* 1 FETCH (BINARY[] ~{3}\r\n", b"abc)\r\n"]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].literals, vec![b"abc".to_vec()]);
    }

    #[test]
    fn literal_too_large_is_rejected() {
        let mut framer = Framer::new();
        let line = format!("* 1 FETCH (BODY[] {{{}}}\r\n", MAX_LITERAL_SIZE + 1);
        let err = framer.push(line.as_bytes()).unwrap_err();
        match err {
            Error::LiteralTooLarge { literal_size, max_size } => {
                assert_eq!(literal_size, MAX_LITERAL_SIZE + 1);
                assert_eq!(max_size, MAX_LITERAL_SIZE);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn literal_at_exactly_the_cap_is_accepted() {
        let mut framer = Framer::new();
        let line = format!("* {{{MAX_LITERAL_SIZE}}}\r\n");
        framer.push(line.as_bytes()).unwrap();
    }

    #[test]
    fn empty_frame_is_suppressed() {
        let mut framer = Framer::new();
        let frames = framer.push(b"\r\n").unwrap();
        assert!(frames.is_empty());
    }

    #[test]
    fn arbitrary_chunk_splits_reassemble_identically() {
        let wire: &[u8] = b"* CAPABILITY IMAP4rev1 IDLE\r\nA1 OK done\r\n* 2 FETCH (BODY[] {4}\r\ntest)\r\nA2 OK\r\n";

        let mut whole = Framer::new();
        let expected = whole.push(wire).unwrap();

        for split in 1..wire.len() {
            let (a, b) = wire.split_at(split);
            let mut framer = Framer::new();
            let mut got = framer.push(a).unwrap();
            got.extend(framer.push(b).unwrap());
            assert_eq!(got, expected, "mismatch splitting at {split}");
        }
    }

    #[test]
    fn byte_by_byte_splits_reassemble_identically() {
        let wire: &[u8] = b"* 1 FETCH (BODY[] {3}\r\nxyz)\r\nA1 OK\r\n";
        let mut whole = Framer::new();
        let expected = whole.push(wire).unwrap();

        let mut framer = Framer::new();
        let mut got = Vec::new();
        for b in wire {
            got.extend(framer.push(std::slice::from_ref(b)).unwrap());
        }
        assert_eq!(got, expected);
    }
}
