use std::fmt;

/// Lifecycle states of a crawl session
///
/// A session starts `Idle`, moves to `Running` when the fetch loop begins and
/// ends in `Completed` (frontier exhausted) or `Interrupted` (shutdown or
/// error). An interrupted session can be resumed back into `Running` from
/// its checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrawlState {
    /// Frontier holds only the start URL; nothing has been fetched
    Idle,

    /// The fetch loop is processing the frontier
    Running,

    /// The frontier emptied; the checkpoint has been discarded
    Completed,

    /// The loop stopped early; the checkpoint is kept for resumption
    Interrupted,
}

impl CrawlState {
    /// Returns true if moving from `self` to `next` is a legal transition
    pub fn can_transition_to(&self, next: CrawlState) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Running)
                | (Self::Interrupted, Self::Running)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Interrupted)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
        }
    }
}

impl fmt::Display for CrawlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [CrawlState; 4] = [
        CrawlState::Idle,
        CrawlState::Running,
        CrawlState::Completed,
        CrawlState::Interrupted,
    ];

    #[test]
    fn test_legal_transitions() {
        assert!(CrawlState::Idle.can_transition_to(CrawlState::Running));
        assert!(CrawlState::Running.can_transition_to(CrawlState::Completed));
        assert!(CrawlState::Running.can_transition_to(CrawlState::Interrupted));
        assert!(CrawlState::Interrupted.can_transition_to(CrawlState::Running));
    }

    #[test]
    fn test_illegal_transitions() {
        assert!(!CrawlState::Idle.can_transition_to(CrawlState::Completed));
        assert!(!CrawlState::Completed.can_transition_to(CrawlState::Running));
        assert!(!CrawlState::Running.can_transition_to(CrawlState::Idle));
        for state in ALL {
            assert!(!state.can_transition_to(state));
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", CrawlState::Interrupted), "interrupted");
    }
}
