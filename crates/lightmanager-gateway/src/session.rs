//! Per-connection state.

use std::fmt;

/// State of one client, owned by the task serving it.
#[derive(Debug, Clone)]
pub struct ClientSession {
    peer: String,
    verbose: bool,
    suppress_ok: bool,
    failures: u64,
}

impl ClientSession {
    /// A verbose session for `peer`.
    pub fn new(peer: impl Into<String>) -> Self {
        ClientSession {
            peer: peer.into(),
            verbose: true,
            suppress_ok: false,
            failures: 0,
        }
    }

    /// A session that prints no status lines, for one-shot command runs.
    pub fn one_shot() -> Self {
        ClientSession {
            suppress_ok: true,
            ..ClientSession::new("command line")
        }
    }

    /// Peer label used in log output.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Whether status lines are printed (`VERBOSE` / `QUIET`).
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Switch status lines on or off.
    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    /// Whether status lines are suppressed regardless of verbosity.
    pub fn suppress_ok(&self) -> bool {
        self.suppress_ok
    }

    /// Set or clear status line suppression.
    pub fn set_suppress_ok(&mut self, suppress: bool) {
        self.suppress_ok = suppress;
    }

    /// Whether a status line should follow each command.
    pub fn reports_status(&self) -> bool {
        self.verbose && !self.suppress_ok
    }

    /// Record one failed command.
    pub fn record_failure(&mut self) {
        self.failures += 1;
    }

    /// Number of failed commands so far.
    pub fn failures(&self) -> u64 {
        self.failures
    }
}

impl fmt::Display for ClientSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.peer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_flags() {
        let mut session = ClientSession::new("127.0.0.1:5000");
        assert!(session.reports_status());
        session.set_verbose(false);
        assert!(!session.reports_status());
        session.set_verbose(true);
        session.set_suppress_ok(true);
        assert!(!session.reports_status());

        let one_shot = ClientSession::one_shot();
        assert!(one_shot.is_verbose());
        assert!(one_shot.suppress_ok());
        assert_eq!(one_shot.failures(), 0);
    }
}
