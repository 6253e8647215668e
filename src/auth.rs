//! Authentication handshake
//!
//! The backend has no dedicated acknowledgement envelope; success arrives
//! as an ordinary system notice. Recognition is isolated in
//! [`is_auth_ack`] so it can be swapped for a typed ack later.

use crate::codec::Outbound;

/// Whether a system notice acknowledges authentication
pub fn is_auth_ack(notice: &str, marker: &str) -> bool {
    !marker.is_empty() && notice.contains(marker)
}

/// Handshake state for the current connection
#[derive(Debug, Clone)]
pub struct Handshake {
    marker: String,
    identity: Option<String>,
    /// Transport generation of the channel this state belongs to
    connection: Option<u64>,
    /// Identity the auth envelope was sent for on this connection
    attempted_for: Option<String>,
    authenticated: bool,
}

impl Handshake {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
            identity: None,
            connection: None,
            attempted_for: None,
            authenticated: false,
        }
    }

    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Auth envelope sent and not yet acknowledged
    pub fn is_pending(&self) -> bool {
        self.attempted_for.is_some() && !self.authenticated
    }

    /// Whether the handshake state describes the channel of `generation`
    pub fn is_current(&self, generation: u64) -> bool {
        self.connection == Some(generation)
    }

    /// Transport opened the channel of `generation`
    pub fn on_connected(&mut self, generation: u64) {
        self.connection = Some(generation);
        self.attempted_for = None;
        self.authenticated = false;
    }

    /// Transport closed for any reason
    pub fn on_disconnected(&mut self) {
        self.connection = None;
        self.attempted_for = None;
        self.authenticated = false;
    }

    /// Wallet identity changed or went away
    ///
    /// Switching to a different identity invalidates the current session.
    pub fn set_identity(&mut self, identity: Option<String>) {
        if self.identity == identity {
            return;
        }
        self.identity = identity;
        self.attempted_for = None;
        self.authenticated = false;
    }

    /// Auth envelope to send, at most once per connected+identity transition
    pub fn take_auth_request(&mut self) -> Option<Outbound> {
        if self.connection.is_none() || self.attempted_for.is_some() {
            return None;
        }
        let identity = self.identity.clone()?;
        self.attempted_for = Some(identity.clone());
        Some(Outbound::auth(identity))
    }

    /// Inspect a system notice; returns `true` only when it flips the flag
    pub fn on_notice(&mut self, text: &str) -> bool {
        if self.authenticated || self.attempted_for.is_none() {
            return false;
        }
        if is_auth_ack(text, &self.marker) {
            self.authenticated = true;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_AUTH_MARKER;

    fn handshake() -> Handshake {
        Handshake::new(DEFAULT_AUTH_MARKER)
    }

    #[test]
    fn test_is_auth_ack() {
        assert!(is_auth_ack(
            "Authenticated successfully as 0.0.100",
            DEFAULT_AUTH_MARKER
        ));
        assert!(!is_auth_ack("Authentication failed", DEFAULT_AUTH_MARKER));
        assert!(!is_auth_ack("authenticated successfully", DEFAULT_AUTH_MARKER));
        assert!(!is_auth_ack("anything", ""));
    }

    #[test]
    fn test_no_auth_without_identity_or_connection() {
        let mut hs = handshake();
        assert!(hs.take_auth_request().is_none());

        hs.on_connected(1);
        assert!(hs.take_auth_request().is_none());

        let mut hs = handshake();
        hs.set_identity(Some("0.0.100".into()));
        assert!(hs.take_auth_request().is_none());
    }

    #[test]
    fn test_auth_sent_once_per_transition() {
        let mut hs = handshake();
        hs.set_identity(Some("0.0.100".into()));
        hs.on_connected(1);

        match hs.take_auth_request() {
            Some(Outbound::Auth { user_account_id, .. }) => assert_eq!(user_account_id, "0.0.100"),
            other => panic!("expected auth, got {:?}", other),
        }
        assert!(hs.take_auth_request().is_none());
        assert!(hs.is_pending());

        // Same identity reported again is not a transition
        hs.set_identity(Some("0.0.100".into()));
        assert!(hs.take_auth_request().is_none());
    }

    #[test]
    fn test_ack_flips_once() {
        let mut hs = handshake();
        hs.set_identity(Some("0.0.100".into()));
        hs.on_connected(1);
        hs.take_auth_request();

        assert!(!hs.on_notice("Welcome"));
        assert!(!hs.is_authenticated());

        assert!(hs.on_notice("Authenticated successfully"));
        assert!(hs.is_authenticated());
        assert!(!hs.is_pending());

        assert!(!hs.on_notice("Authenticated successfully"));
        assert!(hs.is_authenticated());
    }

    #[test]
    fn test_ack_ignored_before_auth_sent() {
        let mut hs = handshake();
        assert!(!hs.on_notice("Authenticated successfully"));
        assert!(!hs.is_authenticated());
    }

    #[test]
    fn test_disconnect_resets() {
        let mut hs = handshake();
        hs.set_identity(Some("0.0.100".into()));
        hs.on_connected(1);
        hs.take_auth_request();
        hs.on_notice("Authenticated successfully");

        hs.on_disconnected();
        assert!(!hs.is_authenticated());
        assert!(!hs.is_current(1));
        assert!(hs.take_auth_request().is_none());

        hs.on_connected(2);
        assert!(hs.is_current(2));
        assert!(hs.take_auth_request().is_some());
    }

    #[test]
    fn test_reopen_without_close_resets() {
        let mut hs = handshake();
        hs.set_identity(Some("0.0.100".into()));
        hs.on_connected(1);
        hs.take_auth_request();
        hs.on_notice("Authenticated successfully");
        assert!(hs.is_current(1));

        // A newer channel opened before the close of the old one was seen
        hs.on_connected(2);
        assert!(!hs.is_authenticated());
        assert!(hs.is_current(2));
        assert!(hs.take_auth_request().is_some());
    }

    #[test]
    fn test_identity_switch_reauthenticates() {
        let mut hs = handshake();
        hs.set_identity(Some("0.0.100".into()));
        hs.on_connected(1);
        hs.take_auth_request();
        hs.on_notice("Authenticated successfully");

        hs.set_identity(Some("0.0.200".into()));
        assert!(!hs.is_authenticated());
        match hs.take_auth_request() {
            Some(Outbound::Auth { user_account_id, .. }) => assert_eq!(user_account_id, "0.0.200"),
            other => panic!("expected auth, got {:?}", other),
        }

        hs.set_identity(None);
        assert!(!hs.is_authenticated());
        assert!(hs.take_auth_request().is_none());
    }
}
