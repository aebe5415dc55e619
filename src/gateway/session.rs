/// Resume state for a gateway session: the session identifier handed out by
/// the ready event and the last event sequence number seen.
#[derive(Debug, Default)]
pub struct SessionState {
    session_id: Option<String>,
    last_sequence: Option<u64>,
}

impl SessionState {
    /// Record a sequence number from an inbound frame. Sequences are
    /// non-decreasing within a session; a stale number never lowers the
    /// stored one.
    pub fn observe_sequence(&mut self, seq: u64) {
        match self.last_sequence {
            Some(current) if current >= seq => {}
            _ => self.last_sequence = Some(seq),
        }
    }

    pub fn last_sequence(&self) -> Option<u64> {
        self.last_sequence
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn set_session_id(&mut self, id: String) {
        self.session_id = Some(id);
    }

    /// What to send in a RESUME, if this session can be resumed at all. Both
    /// the identifier and a sequence are required.
    pub fn resume_target(&self) -> Option<(&str, u64)> {
        match (&self.session_id, self.last_sequence) {
            (Some(id), Some(seq)) => Some((id.as_str(), seq)),
            _ => None,
        }
    }

    /// Forget the session entirely. Used when the gateway declares it no
    /// longer resumable.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_tracks_maximum() {
        let mut session = SessionState::default();
        assert_eq!(session.last_sequence(), None);
        session.observe_sequence(1);
        session.observe_sequence(5);
        session.observe_sequence(3);
        assert_eq!(session.last_sequence(), Some(5));
        session.observe_sequence(6);
        assert_eq!(session.last_sequence(), Some(6));
    }

    #[test]
    fn test_resume_needs_both_id_and_sequence() {
        let mut session = SessionState::default();
        assert!(session.resume_target().is_none());

        session.set_session_id("abc123".to_string());
        assert!(session.resume_target().is_none());

        session.observe_sequence(42);
        assert_eq!(session.resume_target(), Some(("abc123", 42)));
    }

    #[test]
    fn test_clear_forgets_everything() {
        let mut session = SessionState::default();
        session.set_session_id("abc123".to_string());
        session.observe_sequence(42);
        session.clear();
        assert!(session.session_id().is_none());
        assert!(session.last_sequence().is_none());
        assert!(session.resume_target().is_none());
    }
}
