//! Choices offered when an existing session is picked up again.

use crate::phase::Phase;
use crate::session::invalidation::reset_to_phase;
use crate::session::state::SessionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeChoice {
    /// Pick up at `current_phase`, reusing any step checkpoints.
    Continue,
    /// Discard work of the current phase and everything after it.
    RestartPhase,
    /// Rewind to an earlier phase.
    RewindTo(Phase),
    /// Rewind to the first phase, keeping the session id.
    StartOver,
}

impl ResumeChoice {
    /// Menu entries for `session`, in display order.
    pub fn options_for(session: &SessionState) -> Vec<ResumeChoice> {
        let mut options = vec![ResumeChoice::Continue, ResumeChoice::RestartPhase];
        options.extend(
            session
                .current_phase
                .preceding()
                .iter()
                .copied()
                .map(ResumeChoice::RewindTo),
        );
        if session.current_phase != Phase::first() {
            options.push(ResumeChoice::StartOver);
        }
        options
    }

    pub fn label(&self, session: &SessionState) -> String {
        match self {
            ResumeChoice::Continue => format!("Continue from {}", session.current_phase.title()),
            ResumeChoice::RestartPhase => {
                format!("Restart {} from the beginning", session.current_phase.title())
            }
            ResumeChoice::RewindTo(phase) => format!("Go back to {}", phase.title()),
            ResumeChoice::StartOver => "Start over (keep session id)".to_string(),
        }
    }
}

/// Apply `choice` to `session`. Returns true when the session was modified.
pub fn apply_resume_choice(session: &mut SessionState, choice: ResumeChoice) -> bool {
    match choice {
        ResumeChoice::Continue => false,
        ResumeChoice::RestartPhase => {
            let current = session.current_phase;
            reset_to_phase(session, current);
            true
        }
        ResumeChoice::RewindTo(phase) => {
            reset_to_phase(session, phase);
            true
        }
        ResumeChoice::StartOver => {
            reset_to_phase(session, Phase::first());
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::state::{ApprovalRecord, StepCheckpoint};
    use chrono::Utc;

    fn session_at(phase: Phase) -> SessionState {
        let mut session = SessionState::new();
        for done in phase.preceding() {
            session.mark_completed(*done);
        }
        session.current_phase = phase;
        session
    }

    #[test]
    fn test_options_list_earlier_phases() {
        let session = session_at(Phase::Images);
        let options = ResumeChoice::options_for(&session);
        assert_eq!(
            options,
            vec![
                ResumeChoice::Continue,
                ResumeChoice::RestartPhase,
                ResumeChoice::RewindTo(Phase::Brief),
                ResumeChoice::RewindTo(Phase::Products),
                ResumeChoice::StartOver,
            ]
        );
    }

    #[test]
    fn test_first_phase_has_no_rewind_options() {
        let session = session_at(Phase::Brief);
        assert_eq!(
            ResumeChoice::options_for(&session),
            vec![ResumeChoice::Continue, ResumeChoice::RestartPhase]
        );
    }

    #[test]
    fn test_continue_keeps_checkpoints() {
        let mut session = session_at(Phase::Differentiation);
        session.set_checkpoint(StepCheckpoint {
            phase: Phase::Differentiation,
            step: "header-proposal".into(),
            artifact: serde_json::json!({}),
            skipped: false,
        });
        assert!(!apply_resume_choice(&mut session, ResumeChoice::Continue));
        assert_eq!(session.checkpoints.len(), 1);
    }

    #[test]
    fn test_restart_phase_drops_current_phase_work() {
        let mut session = session_at(Phase::Differentiation);
        session.approval_history.push(ApprovalRecord {
            phase: Phase::Differentiation,
            step: "header-proposal".into(),
            iteration: 1,
            accepted: false,
            feedback: Some("bolder".into()),
            timestamp: Utc::now(),
        });
        assert!(apply_resume_choice(&mut session, ResumeChoice::RestartPhase));
        assert_eq!(session.current_phase, Phase::Differentiation);
        assert!(session.phase_history(Phase::Differentiation).is_empty());
    }

    #[test]
    fn test_rewind_moves_current_phase_back() {
        let mut session = session_at(Phase::Testing);
        apply_resume_choice(&mut session, ResumeChoice::RewindTo(Phase::Products));
        assert_eq!(session.current_phase, Phase::Products);
        assert_eq!(session.completed_phases, vec![Phase::Brief]);
    }
}
