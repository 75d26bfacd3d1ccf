//! The bounded accept/revise loop every generated artifact goes through.
//!
//! A round generates an artifact, shows it, and asks the reviewer for a
//! verdict. Revisions require non-empty feedback which steers the next round.
//! After `max_iterations` rounds without an accept the reviewer is forced to
//! either accept the next artifact as-is or skip it, so the loop always ends.

pub mod auto;
pub mod scripted;

pub use auto::AutoApprove;
pub use scripted::{ScriptedAnswer, ScriptedOperator};

use crate::phase::Phase;
use crate::session::state::ApprovalRecord;
use anyhow::Result;
use chrono::Utc;
use std::future::Future;

pub const DEFAULT_MAX_ITERATIONS: u32 = 10;

/// Feedback recorded on a force-skipped step.
pub const SKIPPED_FEEDBACK: &str = "SKIPPED - max iterations";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Revise,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForcedChoice {
    Accept,
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Accepted,
    ForcedAccept,
    Skipped,
}

/// Where the loop stands when the reviewer is consulted.
#[derive(Debug, Clone, Copy)]
pub struct Round<'a> {
    pub phase: Phase,
    pub step: &'a str,
    pub iteration: u32,
    pub max_iterations: u32,
}

/// The decision-making side of the loop: a person at a terminal, a script, or an auto-approver.
pub trait Reviewer: Send + Sync {
    /// Called before each generation.
    fn round_started(&self, _round: &Round<'_>) {}

    fn decide(&self, round: &Round<'_>) -> Result<Verdict>;

    /// Revision feedback. Blank answers are rejected and asked again.
    fn feedback(&self, round: &Round<'_>) -> Result<String>;

    /// Called when blank feedback was rejected.
    fn feedback_rejected(&self, _round: &Round<'_>, _reason: &str) {}

    /// Final choice once the iteration budget is spent.
    fn force(&self, round: &Round<'_>) -> Result<ForcedChoice>;
}

#[derive(Debug, Clone)]
pub struct ApprovalOutcome<T> {
    pub artifact: T,
    pub resolution: Resolution,
    /// The resolving record: accepted, forced-accepted, or skipped.
    pub record: ApprovalRecord,
    /// Revise rounds of this invocation, in order. Already appended to the
    /// history passed to [`ApprovalEngine::run`].
    pub rejected_rounds: Vec<ApprovalRecord>,
}

impl<T> ApprovalOutcome<T> {
    pub fn is_skipped(&self) -> bool {
        self.resolution == Resolution::Skipped
    }

    /// Every record produced by this invocation, resolving record last.
    pub fn records(&self) -> impl Iterator<Item = &ApprovalRecord> {
        self.rejected_rounds
            .iter()
            .chain(std::iter::once(&self.record))
    }
}

pub struct ApprovalEngine<'a> {
    reviewer: &'a dyn Reviewer,
    max_iterations: u32,
}

impl<'a> ApprovalEngine<'a> {
    pub fn new(reviewer: &'a dyn Reviewer, max_iterations: u32) -> Self {
        Self {
            reviewer,
            max_iterations: max_iterations.max(1),
        }
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    /// Run the loop for one step.
    ///
    /// `history` is the session's approval history. Every round is appended
    /// to it as soon as the operator decides it, so rejected rounds survive a
    /// generator failure later in the loop. Rejected rounds of this step that
    /// are already on record count against the budget and the iteration
    /// numbering continues after them. `generate` receives the latest feedback
    /// on record for this step, `None` when there is none yet.
    pub async fn run<T, G, Fut, D>(
        &self,
        phase: Phase,
        step: &str,
        history: &mut Vec<ApprovalRecord>,
        mut generate: G,
        mut display: D,
    ) -> Result<ApprovalOutcome<T>>
    where
        G: FnMut(Option<String>) -> Fut,
        Fut: Future<Output = Result<T>>,
        D: FnMut(&T),
    {
        let (prior_rounds, prior_feedback) = {
            let prior: Vec<&ApprovalRecord> = history
                .iter()
                .filter(|r| r.phase == phase && r.step == step)
                .collect();
            (
                prior.len() as u32,
                prior.last().and_then(|r| r.feedback.clone()),
            )
        };
        let mut iteration = prior_rounds + 1;
        let mut feedback = prior_feedback;
        let mut rejected_rounds = Vec::new();

        while iteration <= self.max_iterations {
            let round = Round {
                phase,
                step,
                iteration,
                max_iterations: self.max_iterations,
            };
            self.reviewer.round_started(&round);
            tracing::debug!(%phase, step, iteration, "Generating artifact");

            let artifact = generate(feedback.clone()).await?;
            display(&artifact);

            match self.reviewer.decide(&round)? {
                Verdict::Accept => {
                    tracing::info!(%phase, step, iteration, "Artifact accepted");
                    let record = make_record(phase, step, iteration, true, None);
                    history.push(record.clone());
                    return Ok(ApprovalOutcome {
                        artifact,
                        resolution: Resolution::Accepted,
                        record,
                        rejected_rounds,
                    });
                }
                Verdict::Revise => {
                    let text = self.collect_feedback(&round)?;
                    tracing::info!(%phase, step, iteration, "Revision requested");
                    let record = make_record(phase, step, iteration, false, Some(text.clone()));
                    history.push(record.clone());
                    rejected_rounds.push(record);
                    feedback = Some(text);
                    iteration += 1;
                }
            }
        }

        let round = Round {
            phase,
            step,
            iteration,
            max_iterations: self.max_iterations,
        };
        tracing::warn!(%phase, step, iteration, "Iteration budget exhausted, forcing a decision");
        let choice = self.reviewer.force(&round)?;

        let artifact = generate(feedback).await?;

        let (resolution, record) = match choice {
            ForcedChoice::Accept => (
                Resolution::ForcedAccept,
                make_record(phase, step, iteration, true, None),
            ),
            ForcedChoice::Skip => (
                Resolution::Skipped,
                make_record(
                    phase,
                    step,
                    iteration,
                    false,
                    Some(SKIPPED_FEEDBACK.to_string()),
                ),
            ),
        };
        history.push(record.clone());
        tracing::info!(%phase, step, ?resolution, "Forced decision recorded");

        Ok(ApprovalOutcome {
            artifact,
            resolution,
            record,
            rejected_rounds,
        })
    }

    fn collect_feedback(&self, round: &Round<'_>) -> Result<String> {
        loop {
            let text = self.reviewer.feedback(round)?;
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                return Ok(trimmed.to_string());
            }
            self.reviewer
                .feedback_rejected(round, "Please describe what should change");
        }
    }
}

fn make_record(
    phase: Phase,
    step: &str,
    iteration: u32,
    accepted: bool,
    feedback: Option<String>,
) -> ApprovalRecord {
    ApprovalRecord {
        phase,
        step: step.to_string(),
        iteration,
        accepted,
        feedback,
        timestamp: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Generator that returns "draft-N" and records the feedback it saw.
    struct Recorder {
        seen: Mutex<Vec<Option<String>>>,
    }

    impl Recorder {
        fn new() -> Self {
            Self {
                seen: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }

        async fn generate(&self, feedback: Option<String>) -> Result<String> {
            let mut seen = self.seen.lock().unwrap();
            seen.push(feedback);
            Ok(format!("draft-{}", seen.len()))
        }
    }

    async fn run_engine(
        operator: &ScriptedOperator,
        max: u32,
        prior: &[ApprovalRecord],
        recorder: &Recorder,
    ) -> Result<(ApprovalOutcome<String>, usize)> {
        let engine = ApprovalEngine::new(operator, max);
        let mut displayed = 0;
        let mut history = prior.to_vec();
        let outcome = engine
            .run(
                Phase::Brief,
                "market-analysis",
                &mut history,
                |fb| recorder.generate(fb),
                |_: &String| displayed += 1,
            )
            .await?;
        Ok((outcome, displayed))
    }

    #[tokio::test]
    async fn test_accept_on_first_round() {
        let operator = ScriptedOperator::new([ScriptedAnswer::Accept]);
        let recorder = Recorder::new();
        let (outcome, displayed) = run_engine(&operator, 10, &[], &recorder).await.unwrap();

        assert_eq!(outcome.artifact, "draft-1");
        assert_eq!(outcome.resolution, Resolution::Accepted);
        assert!(outcome.rejected_rounds.is_empty());
        assert_eq!(outcome.record.iteration, 1);
        assert!(outcome.record.accepted);
        assert_eq!(displayed, 1);
        assert_eq!(recorder.seen.lock().unwrap()[0], None);
    }

    #[tokio::test]
    async fn test_revise_then_accept_threads_feedback() {
        let operator = ScriptedOperator::new([
            ScriptedAnswer::Revise("more premium".into()),
            ScriptedAnswer::Accept,
        ]);
        let recorder = Recorder::new();
        let (outcome, _) = run_engine(&operator, 10, &[], &recorder).await.unwrap();

        assert_eq!(outcome.artifact, "draft-2");
        let records: Vec<_> = outcome.records().cloned().collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].iteration, 1);
        assert!(!records[0].accepted);
        assert_eq!(records[0].feedback.as_deref(), Some("more premium"));
        assert_eq!(records[1].iteration, 2);
        assert!(records[1].accepted);
        assert_eq!(
            recorder.seen.lock().unwrap()[1].as_deref(),
            Some("more premium")
        );
    }

    #[tokio::test]
    async fn test_blank_feedback_is_asked_again() {
        let operator = ScriptedOperator::new([
            ScriptedAnswer::Revise("   ".into()),
            ScriptedAnswer::Text("warmer tones".into()),
            ScriptedAnswer::Accept,
        ]);
        let recorder = Recorder::new();
        let (outcome, _) = run_engine(&operator, 10, &[], &recorder).await.unwrap();
        assert_eq!(
            outcome.rejected_rounds[0].feedback.as_deref(),
            Some("warmer tones")
        );
        assert_eq!(recorder.calls(), 2);
    }

    #[tokio::test]
    async fn test_forced_skip_after_budget() {
        let operator = ScriptedOperator::new([
            ScriptedAnswer::Revise("a".into()),
            ScriptedAnswer::Revise("b".into()),
            ScriptedAnswer::Force(ForcedChoice::Skip),
        ]);
        let recorder = Recorder::new();
        let (outcome, displayed) = run_engine(&operator, 2, &[], &recorder).await.unwrap();

        assert_eq!(displayed, 2);
        assert_eq!(recorder.calls(), 3);
        assert!(outcome.is_skipped());
        assert!(!outcome.record.accepted);
        assert_eq!(outcome.record.feedback.as_deref(), Some(SKIPPED_FEEDBACK));
        assert_eq!(outcome.rejected_rounds.len(), 2);
        assert_eq!(recorder.seen.lock().unwrap()[2].as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_forced_accept_is_recorded_as_accepted() {
        let operator = ScriptedOperator::new([
            ScriptedAnswer::Revise("a".into()),
            ScriptedAnswer::Force(ForcedChoice::Accept),
        ]);
        let recorder = Recorder::new();
        let (outcome, _) = run_engine(&operator, 1, &[], &recorder).await.unwrap();
        assert_eq!(outcome.resolution, Resolution::ForcedAccept);
        assert!(outcome.record.accepted);
        assert_eq!(outcome.artifact, "draft-2");
    }

    #[tokio::test]
    async fn test_iterations_strictly_increase() {
        let operator = ScriptedOperator::new([
            ScriptedAnswer::Revise("a".into()),
            ScriptedAnswer::Revise("b".into()),
            ScriptedAnswer::Revise("c".into()),
            ScriptedAnswer::Force(ForcedChoice::Accept),
        ]);
        let recorder = Recorder::new();
        let (outcome, _) = run_engine(&operator, 3, &[], &recorder).await.unwrap();
        let iterations: Vec<u32> = outcome.records().map(|r| r.iteration).collect();
        assert_eq!(iterations, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_prior_history_counts_against_budget() {
        let prior: Vec<ApprovalRecord> = (1..=2)
            .map(|i| make_record(Phase::Brief, "market-analysis", i, false, Some(format!("fb{i}"))))
            .collect();
        let operator = ScriptedOperator::new([
            ScriptedAnswer::Revise("c".into()),
            ScriptedAnswer::Force(ForcedChoice::Skip),
        ]);
        let recorder = Recorder::new();
        let (outcome, displayed) = run_engine(&operator, 3, &prior, &recorder).await.unwrap();
        assert_eq!(displayed, 1);
        assert_eq!(outcome.rejected_rounds[0].iteration, 3);
        assert_eq!(outcome.record.iteration, 4);
    }

    #[tokio::test]
    async fn test_exhausted_prior_history_forces_immediately() {
        let prior: Vec<ApprovalRecord> = (1..=2)
            .map(|i| make_record(Phase::Brief, "market-analysis", i, false, Some(format!("fb{i}"))))
            .collect();
        let operator = ScriptedOperator::new([ScriptedAnswer::Force(ForcedChoice::Accept)]);
        let recorder = Recorder::new();
        let (outcome, displayed) = run_engine(&operator, 2, &prior, &recorder).await.unwrap();
        assert_eq!(displayed, 0);
        assert_eq!(recorder.calls(), 1);
        assert_eq!(recorder.seen.lock().unwrap()[0].as_deref(), Some("fb2"));
        assert_eq!(outcome.resolution, Resolution::ForcedAccept);
    }

    #[tokio::test]
    async fn test_never_exceeds_budget_before_forcing() {
        for max in 1..=5u32 {
            let mut answers: Vec<ScriptedAnswer> = (0..max)
                .map(|i| ScriptedAnswer::Revise(format!("round {i}")))
                .collect();
            answers.push(ScriptedAnswer::Force(ForcedChoice::Skip));
            let operator = ScriptedOperator::new(answers);
            let recorder = Recorder::new();
            let (outcome, displayed) = run_engine(&operator, max, &[], &recorder).await.unwrap();
            assert_eq!(displayed as u32, max);
            assert_eq!(recorder.calls() as u32, max + 1);
            assert!(outcome.is_skipped());
            assert!(operator.is_drained());
        }
    }

    #[tokio::test]
    async fn test_generator_error_propagates() {
        let operator = ScriptedOperator::new(Vec::new());
        let engine = ApprovalEngine::new(&operator, 3);
        let result: Result<ApprovalOutcome<String>> = engine
            .run(
                Phase::Products,
                "product-catalog",
                &mut Vec::new(),
                |_| async { Err(anyhow::anyhow!("model unavailable")) },
                |_: &String| {},
            )
            .await;
        assert!(result.unwrap_err().to_string().contains("model unavailable"));
    }

    #[tokio::test]
    async fn test_rejected_rounds_survive_generator_failure() {
        let operator = ScriptedOperator::new([
            ScriptedAnswer::Revise("a".into()),
            ScriptedAnswer::Revise("b".into()),
        ]);
        let engine = ApprovalEngine::new(&operator, 5);
        let mut history = Vec::new();
        let mut calls = 0;
        let result: Result<ApprovalOutcome<String>> = engine
            .run(
                Phase::Brief,
                "market-analysis",
                &mut history,
                |_| {
                    calls += 1;
                    let call = calls;
                    async move {
                        if call == 3 {
                            anyhow::bail!("model unavailable");
                        }
                        Ok::<_, anyhow::Error>(format!("draft-{call}"))
                    }
                },
                |_: &String| {},
            )
            .await;

        assert!(result.is_err());
        let iterations: Vec<u32> = history.iter().map(|r| r.iteration).collect();
        assert_eq!(iterations, vec![1, 2]);
        assert!(history.iter().all(|r| !r.accepted));
        assert_eq!(history[1].feedback.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_history_of_other_steps_is_not_counted() {
        let mut history = vec![
            make_record(Phase::Brief, "theme-names", 1, false, Some("shorter".into())),
            make_record(Phase::Products, "market-analysis", 1, false, Some("x".into())),
        ];
        let operator = ScriptedOperator::new([ScriptedAnswer::Accept]);
        let engine = ApprovalEngine::new(&operator, 3);
        let outcome: ApprovalOutcome<String> = engine
            .run(
                Phase::Brief,
                "market-analysis",
                &mut history,
                |_| async { Ok::<_, anyhow::Error>("analysis".to_string()) },
                |_: &String| {},
            )
            .await
            .unwrap();

        assert_eq!(outcome.record.iteration, 1);
        assert_eq!(history.len(), 3);
        assert_eq!(history.last().map(|r| r.accepted), Some(true));
    }
}
