//! Black-box framer tests: invariant 1 (arbitrary chunk splits reassemble
//! identically) against full response sessions, exercised through the
//! public crate API rather than `framer`'s own internal unit tests.

use imap_engine::framer::Framer;

const SESSION: &[u8] = b"* OK IMAP4rev1 ready\r\n\
A1 OK CAPABILITY completed\r\n\
* 2 FETCH (UID 101 BODY[] {11}\r\nhello world)\r\n\
A2 OK FETCH completed\r\n\
* BYE logging out\r\n\
A3 OK LOGOUT completed\r\n";

#[test]
fn whole_session_produces_one_frame_per_response_line() {
    let mut framer = Framer::new();
    let frames = framer.push(SESSION).unwrap();
    assert_eq!(frames.len(), 5);
    assert_eq!(frames[2].literals, vec![b"hello world".to_vec()]);
}

#[test]
fn every_chunk_split_reassembles_to_the_same_frames() {
    let mut whole = Framer::new();
    let expected = whole.push(SESSION).unwrap();

    for split in 1..SESSION.len() {
        let (a, b) = SESSION.split_at(split);
        let mut framer = Framer::new();
        let mut got = framer.push(a).unwrap();
        got.extend(framer.push(b).unwrap());
        assert_eq!(got, expected, "mismatch splitting the session at byte {split}");
    }
}

#[test]
fn three_way_split_also_reassembles() {
    let mut whole = Framer::new();
    let expected = whole.push(SESSION).unwrap();

    let a = &SESSION[..20];
    let b = &SESSION[20..60];
    let c = &SESSION[60..];

    let mut framer = Framer::new();
    let mut got = framer.push(a).unwrap();
    got.extend(framer.push(b).unwrap());
    got.extend(framer.push(c).unwrap());
    assert_eq!(got, expected);
}
