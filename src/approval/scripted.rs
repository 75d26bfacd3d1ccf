//! An operator that replays a fixed queue of answers. Used to drive sessions in tests.

use crate::approval::{ForcedChoice, Reviewer, Round, Verdict};
use crate::errors::ApprovalError;
use crate::operator::Prompter;
use anyhow::Result;
use std::collections::VecDeque;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq)]
pub enum ScriptedAnswer {
    Accept,
    /// Ask for a revision; the text is handed out as the feedback.
    Revise(String),
    Force(ForcedChoice),
    Text(String),
    Confirm(bool),
    Select(usize),
}

impl ScriptedAnswer {
    fn describe(&self) -> String {
        match self {
            ScriptedAnswer::Accept => "Accept".to_string(),
            ScriptedAnswer::Revise(_) => "Revise".to_string(),
            ScriptedAnswer::Force(c) => format!("Force({c:?})"),
            ScriptedAnswer::Text(t) => format!("Text({t:?})"),
            ScriptedAnswer::Confirm(b) => format!("Confirm({b})"),
            ScriptedAnswer::Select(i) => format!("Select({i})"),
        }
    }
}

#[derive(Debug, Default)]
pub struct ScriptedOperator {
    answers: Mutex<VecDeque<ScriptedAnswer>>,
    pending_feedback: Mutex<Option<String>>,
}

impl ScriptedOperator {
    pub fn new(answers: impl IntoIterator<Item = ScriptedAnswer>) -> Self {
        Self {
            answers: Mutex::new(answers.into_iter().collect()),
            pending_feedback: Mutex::new(None),
        }
    }

    pub fn push(&self, answer: ScriptedAnswer) {
        self.lock_answers().push_back(answer);
    }

    pub fn remaining(&self) -> usize {
        self.lock_answers().len()
    }

    pub fn is_drained(&self) -> bool {
        self.remaining() == 0
    }

    fn lock_answers(&self) -> std::sync::MutexGuard<'_, VecDeque<ScriptedAnswer>> {
        self.answers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn next(&self, expected: &'static str) -> Result<ScriptedAnswer, ApprovalError> {
        self.lock_answers()
            .pop_front()
            .ok_or(ApprovalError::ScriptExhausted { expected })
    }
}

fn mismatch(expected: &'static str, found: &ScriptedAnswer) -> anyhow::Error {
    ApprovalError::ScriptMismatch {
        expected,
        found: found.describe(),
    }
    .into()
}

impl Reviewer for ScriptedOperator {
    fn decide(&self, _round: &Round<'_>) -> Result<Verdict> {
        match self.next("a verdict")? {
            ScriptedAnswer::Accept => Ok(Verdict::Accept),
            ScriptedAnswer::Revise(feedback) => {
                *self
                    .pending_feedback
                    .lock()
                    .unwrap_or_else(|p| p.into_inner()) = Some(feedback);
                Ok(Verdict::Revise)
            }
            other => Err(mismatch("a verdict", &other)),
        }
    }

    fn feedback(&self, _round: &Round<'_>) -> Result<String> {
        let pending = self
            .pending_feedback
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        if let Some(feedback) = pending {
            return Ok(feedback);
        }
        match self.next("revision feedback")? {
            ScriptedAnswer::Text(text) => Ok(text),
            other => Err(mismatch("revision feedback", &other)),
        }
    }

    fn force(&self, _round: &Round<'_>) -> Result<ForcedChoice> {
        match self.next("a forced choice")? {
            ScriptedAnswer::Force(choice) => Ok(choice),
            other => Err(mismatch("a forced choice", &other)),
        }
    }
}

impl Prompter for ScriptedOperator {
    fn text(&self, _prompt: &str, _default: Option<&str>) -> Result<String> {
        match self.next("text input")? {
            ScriptedAnswer::Text(text) => Ok(text),
            other => Err(mismatch("text input", &other)),
        }
    }

    fn confirm(&self, _prompt: &str, _default: bool) -> Result<bool> {
        match self.next("a confirmation")? {
            ScriptedAnswer::Confirm(answer) => Ok(answer),
            other => Err(mismatch("a confirmation", &other)),
        }
    }

    fn select(&self, _prompt: &str, items: &[String], _default: usize) -> Result<usize> {
        match self.next("a selection")? {
            ScriptedAnswer::Select(index) if index < items.len() => Ok(index),
            other => Err(mismatch("a selection", &other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::Phase;

    fn round() -> Round<'static> {
        Round {
            phase: Phase::Brief,
            step: "market-analysis",
            iteration: 1,
            max_iterations: 10,
        }
    }

    #[test]
    fn test_revise_hands_out_feedback() {
        let op = ScriptedOperator::new([ScriptedAnswer::Revise("bolder".into())]);
        assert_eq!(op.decide(&round()).unwrap(), Verdict::Revise);
        assert_eq!(op.feedback(&round()).unwrap(), "bolder");
        assert!(op.is_drained());
    }

    #[test]
    fn test_exhausted_script_errors() {
        let op = ScriptedOperator::new([]);
        let err = op.decide(&round()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ApprovalError>(),
            Some(ApprovalError::ScriptExhausted { .. })
        ));
    }

    #[test]
    fn test_mismatched_answer_errors() {
        let op = ScriptedOperator::new([ScriptedAnswer::Confirm(true)]);
        let err = op.text("Industry", None).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ApprovalError>(),
            Some(ApprovalError::ScriptMismatch { .. })
        ));
    }

    #[test]
    fn test_list_collects_until_blank() {
        let op = ScriptedOperator::new([
            ScriptedAnswer::Text("Bloomscape".into()),
            ScriptedAnswer::Text("The Sill".into()),
            ScriptedAnswer::Text(String::new()),
        ]);
        assert_eq!(
            op.list("Competitor").unwrap(),
            vec!["Bloomscape".to_string(), "The Sill".to_string()]
        );
    }

    #[test]
    fn test_select_rejects_out_of_range() {
        let op = ScriptedOperator::new([ScriptedAnswer::Select(5)]);
        let items = vec!["a".to_string()];
        assert!(op.select("Pick", &items, 0).is_err());
    }
}
