//! Authentication methods (spec.md §4.7 `[FULL]`).
//!
//! Modeled as a small closed trait rather than a hardcoded branch on
//! `auth.loginMethod`, so SASL methods can be added without touching the
//! engine — in the style of the teacher's closed `Folder`/`Flag` enums,
//! generalized into a trait because authentication, unlike a flag set, has
//! per-method wire behavior (LOGIN's two plain arguments vs. AUTHENTICATE's
//! continuation-carried SASL blob).

use base64::Engine as _;

use crate::node::Node;

/// One authentication method: the command it issues, the attributes that
/// go on that command line, and (for SASL methods) the bytes to send after
/// a server `+` continuation.
pub trait AuthMethod: Send + Sync + std::fmt::Debug {
    /// `"LOGIN"` or `"AUTHENTICATE"`.
    fn command(&self) -> &'static str;
    fn attributes(&self) -> Vec<Node>;
    /// The SASL initial response to write after a `+` continuation, if the
    /// mechanism needs one. `None` for `LOGIN`, which has no continuation.
    fn continuation(&self) -> Option<Vec<u8>> {
        None
    }
}

/// Plaintext `LOGIN user pass`.
#[derive(Debug, Clone)]
pub struct Login {
    pub user: String,
    pub pass: String,
}

impl Login {
    #[must_use]
    pub fn new(user: impl Into<String>, pass: impl Into<String>) -> Self {
        Self { user: user.into(), pass: pass.into() }
    }
}

impl AuthMethod for Login {
    fn command(&self) -> &'static str {
        "LOGIN"
    }

    fn attributes(&self) -> Vec<Node> {
        vec![
            Node::String { value: self.user.clone().into_bytes(), sensitive: false },
            Node::String { value: self.pass.clone().into_bytes(), sensitive: true },
        ]
    }
}

/// `AUTHENTICATE XOAUTH2`, RFC 7628-style OAuth2 bearer token.
#[derive(Debug, Clone)]
pub struct XOAuth2 {
    pub user: String,
    pub access_token: String,
    pub authzid: Option<String>,
}

impl XOAuth2 {
    #[must_use]
    pub fn new(user: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self { user: user.into(), access_token: access_token.into(), authzid: None }
    }

    fn sasl_response(&self) -> String {
        let authzid = self.authzid.as_deref().unwrap_or(&self.user);
        format!("user={authzid}\x01auth=Bearer {}\x01\x01", self.access_token)
    }
}

impl AuthMethod for XOAuth2 {
    fn command(&self) -> &'static str {
        "AUTHENTICATE"
    }

    fn attributes(&self) -> Vec<Node> {
        vec![Node::atom("XOAUTH2")]
    }

    fn continuation(&self) -> Option<Vec<u8>> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(self.sasl_response());
        Some(encoded.into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_carries_sensitive_password() {
        let login = Login::new("alice", "hunter2");
        let attrs = login.attributes();
        let Node::String { sensitive, .. } = &attrs[1] else { panic!() };
        assert!(*sensitive);
        assert!(login.continuation().is_none());
    }

    #[test]
    fn xoauth2_continuation_is_base64_sasl_blob() {
        let auth = XOAuth2::new("alice@example.com", "ya29.token");
        let continuation = auth.continuation().unwrap();
        let decoded = base64::engine::general_purpose::STANDARD.decode(&continuation).unwrap();
        let text = String::from_utf8(decoded).unwrap();
        assert_eq!(text, "user=alice@example.com\x01auth=Bearer ya29.token\x01\x01");
    }
}
