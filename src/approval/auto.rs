//! Non-interactive operator enabled by `THEME_BUILDER_AUTO_APPROVE`.

use crate::approval::{ForcedChoice, Reviewer, Round, Verdict};
use crate::operator::Prompter;
use anyhow::Result;

/// Accepts every artifact and answers every prompt with its default.
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoApprove;

impl Reviewer for AutoApprove {
    fn decide(&self, round: &Round<'_>) -> Result<Verdict> {
        tracing::info!(phase = %round.phase, step = round.step, "Auto-approved");
        Ok(Verdict::Accept)
    }

    fn feedback(&self, _round: &Round<'_>) -> Result<String> {
        Ok("Auto-approve mode: keep the current direction".to_string())
    }

    fn force(&self, _round: &Round<'_>) -> Result<ForcedChoice> {
        Ok(ForcedChoice::Accept)
    }
}

impl Prompter for AutoApprove {
    fn text(&self, _prompt: &str, default: Option<&str>) -> Result<String> {
        Ok(default.unwrap_or_default().to_string())
    }

    fn confirm(&self, _prompt: &str, default: bool) -> Result<bool> {
        Ok(default)
    }

    fn select(&self, _prompt: &str, _items: &[String], default: usize) -> Result<usize> {
        Ok(default)
    }

    fn list(&self, _prompt: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::Phase;

    #[test]
    fn test_accepts_and_uses_defaults() {
        let round = Round {
            phase: Phase::Products,
            step: "product-catalog",
            iteration: 1,
            max_iterations: 10,
        };
        assert_eq!(AutoApprove.decide(&round).unwrap(), Verdict::Accept);
        assert_eq!(AutoApprove.force(&round).unwrap(), ForcedChoice::Accept);
        assert!(AutoApprove.confirm("Proceed?", true).unwrap());
        assert_eq!(AutoApprove.text("Name", Some("x")).unwrap(), "x");
        assert_eq!(AutoApprove.select("Pick", &[], 2).unwrap(), 2);
    }
}
