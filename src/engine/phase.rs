// 14.0.1: operation phase tracking. mutating operations run
// validate -> update state -> external call -> commit, strictly in that order.
// the tracker is a debug-build tripwire: advancing out of order panics in tests,
// compiles to nothing in release.

/// Lifecycle of one mutating operation. `ExternalCallIssued` is skipped by
/// operations that never leave the engine (deposit-close, liquidate).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(super) enum Phase {
    Validated,
    StateUpdated,
    ExternalCallIssued,
    Committed,
}

#[derive(Debug)]
pub(super) struct OpPhase {
    current: Option<Phase>,
}

impl OpPhase {
    pub(super) fn start() -> Self {
        Self { current: None }
    }

    /// Move to the next phase. Phases may be skipped but never revisited.
    pub(super) fn advance(&mut self, next: Phase) {
        if let Some(current) = self.current {
            debug_assert!(
                next > current,
                "phase went backwards: {current:?} -> {next:?}"
            );
        }
        self.current = Some(next);
    }

    pub(super) fn is_committed(&self) -> bool {
        self.current == Some(Phase::Committed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_advance_in_order() {
        let mut phase = OpPhase::start();
        phase.advance(Phase::Validated);
        phase.advance(Phase::StateUpdated);
        phase.advance(Phase::ExternalCallIssued);
        phase.advance(Phase::Committed);
        assert!(phase.is_committed());
    }

    #[test]
    fn external_call_can_be_skipped() {
        let mut phase = OpPhase::start();
        phase.advance(Phase::Validated);
        phase.advance(Phase::StateUpdated);
        phase.advance(Phase::Committed);
        assert!(phase.is_committed());
    }

    #[test]
    #[should_panic(expected = "phase went backwards")]
    fn regression_panics_in_debug() {
        let mut phase = OpPhase::start();
        phase.advance(Phase::StateUpdated);
        phase.advance(Phase::Validated);
    }
}
