//! Pure helpers backing the untagged-response dispatch in
//! [`super::Connection`] (spec.md §4.7 "Untagged handlers", §4.6 throttle
//! detection). Kept free of any connection state so they can be unit
//! tested directly against attribute trees and response text.

use std::time::Duration;

use crate::node::Node;

/// Walks a `FETCH` data-item list as `(key, value)` pairs, e.g.
/// `(FLAGS (\Seen) UID 5)` yields `[("FLAGS", List), ("UID", Number(5))]`.
pub fn fetch_pairs(items: &[Node]) -> impl Iterator<Item = (&Node, &Node)> {
    items.chunks_exact(2).map(|pair| (&pair[0], &pair[1]))
}

/// Extracts the flag strings out of a `FLAGS (\Seen \Flagged)` data item's
/// value node.
#[must_use]
pub fn flags_from_list(value: &Node) -> Vec<String> {
    value
        .as_list()
        .map(|items| items.iter().filter_map(Node::as_text).collect())
        .unwrap_or_default()
}

/// Whether a `VANISHED` response carries the `(EARLIER)` qualifier, and the
/// sequence-set text that follows it.
#[must_use]
pub fn parse_vanished(attributes: &[Node]) -> Option<(bool, String)> {
    match attributes {
        [Node::List(tags), Node::Sequence(seq)] => {
            let earlier = tags.iter().any(|n| n.as_text().is_some_and(|t| t.eq_ignore_ascii_case("EARLIER")));
            Some((earlier, seq.clone()))
        }
        [Node::Sequence(seq)] => Some((false, seq.clone())),
        _ => None,
    }
}

/// Recognizes Microsoft 365's throttling response text against spec.md
/// §4.6's two patterns, `/Request is throttled/` and
/// `/Backoff Time[:=\s]+(\d+)/`, and extracts the backoff duration.
#[must_use]
pub fn detect_throttle(text: &str) -> Option<Duration> {
    let lower = text.to_ascii_lowercase();
    if !lower.contains("request is throttled") {
        return None;
    }
    let marker = "backoff time";
    let idx = lower.find(marker)?;
    let rest = text[idx + marker.len()..].trim_start_matches([':', '=', ' ', '\t']);
    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    let ms: u64 = digits.parse().ok()?;
    Some(Duration::from_millis(ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;

    #[test]
    fn fetch_pairs_walks_key_value_list() {
        let items = vec![Node::atom("UID"), Node::Number(5), Node::atom("FLAGS"), Node::List(vec![Node::atom("\\Seen")])];
        let pairs: Vec<_> = fetch_pairs(&items).collect();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].0.as_text().as_deref(), Some("UID"));
        assert_eq!(pairs[1].0.as_text().as_deref(), Some("FLAGS"));
    }

    #[test]
    fn flags_from_list_reads_atom_values() {
        let value = Node::List(vec![Node::atom("\\Seen"), Node::atom("\\Flagged")]);
        assert_eq!(flags_from_list(&value), vec!["\\Seen", "\\Flagged"]);
    }

    #[test]
    fn parse_vanished_with_and_without_earlier() {
        let with_earlier = vec![Node::List(vec![Node::atom("EARLIER")]), Node::Sequence("1:3".into())];
        assert_eq!(parse_vanished(&with_earlier), Some((true, "1:3".to_string())));

        let without = vec![Node::Sequence("4,5".into())];
        assert_eq!(parse_vanished(&without), Some((false, "4,5".to_string())));
    }

    #[test]
    fn detect_throttle_reads_backoff_ms() {
        let text = "Request is throttled. Backoff Time: 15000 ms. Try again later.";
        assert_eq!(detect_throttle(text), Some(Duration::from_millis(15000)));
    }

    #[test]
    fn detect_throttle_ignores_ordinary_errors() {
        assert_eq!(detect_throttle("Mailbox does not exist"), None);
    }

    #[test]
    fn detect_throttle_accepts_equals_separator() {
        let text = "Request is throttled. Backoff Time=5000";
        assert_eq!(detect_throttle(text), Some(Duration::from_millis(5000)));
    }

    #[test]
    fn detect_throttle_accepts_bare_whitespace_separator() {
        let text = "Request is throttled. Backoff Time 5000";
        assert_eq!(detect_throttle(text), Some(Duration::from_millis(5000)));
    }
}
