//! The eight workflow phases and the helpers they share.

pub mod brief;
pub mod code_generation;
pub mod design_system;
pub mod differentiation;
pub mod images;
pub mod products;
pub mod submission;
pub mod testing;

#[cfg(test)]
pub(crate) mod test_support;

use crate::ai::{Message, TaskType};
use crate::context::PhaseContext;
use crate::controller::PhaseHandler;
use crate::generate::{ParseOutcome, parse_json, strip_code_fence};
use crate::phase::Phase;
use crate::session::state::{SessionState, StepCheckpoint};
use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;

pub fn standard_handlers() -> Vec<Box<dyn PhaseHandler>> {
    vec![
        Box::new(brief::BriefPhase),
        Box::new(products::ProductsPhase),
        Box::new(images::ImagesPhase),
        Box::new(differentiation::DifferentiationPhase),
        Box::new(design_system::DesignSystemPhase),
        Box::new(code_generation::CodeGenerationPhase),
        Box::new(testing::TestingPhase),
        Box::new(submission::SubmissionPhase),
    ]
}

/// A step artifact after its approval loop resolved.
#[derive(Debug, Clone)]
pub struct Negotiated<T> {
    pub artifact: T,
    pub skipped: bool,
}

/// Drive one step through the approval loop and record the result on the session.
///
/// A step already resolved in an earlier, interrupted attempt of this phase is
/// answered from its checkpoint. An unresolved step continues its loop with
/// the rejected rounds already on record.
pub async fn negotiate<T, G, Fut, D>(
    ctx: &PhaseContext,
    session: &mut SessionState,
    phase: Phase,
    step: &str,
    generate: G,
    display: D,
) -> Result<Negotiated<T>>
where
    T: Serialize + DeserializeOwned,
    G: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<T>>,
    D: FnMut(&T),
{
    if let Some(checkpoint) = session.checkpoint(phase, step) {
        match serde_json::from_value::<T>(checkpoint.artifact.clone()) {
            Ok(artifact) => {
                tracing::info!(%phase, step, "Reusing resolved step");
                return Ok(Negotiated {
                    artifact,
                    skipped: checkpoint.skipped,
                });
            }
            Err(e) => {
                tracing::warn!(%phase, step, error = %e, "Discarding unreadable checkpoint");
                session.forget_step(phase, step);
            }
        }
    }

    if session.resolved_step(phase, step).is_some() {
        // Resolved without a checkpoint: renegotiate from scratch.
        session.forget_step(phase, step);
    }

    let outcome = ctx
        .approval_engine()
        .run(phase, step, &mut session.approval_history, generate, display)
        .await?;

    let skipped = outcome.is_skipped();
    session.set_checkpoint(StepCheckpoint {
        phase,
        step: step.to_string(),
        artifact: serde_json::to_value(&outcome.artifact)
            .with_context(|| format!("Failed to checkpoint step {step}"))?,
        skipped,
    });
    if skipped {
        ctx.console
            .warning(&format!("Skipped {step}; it will be left out of the theme"));
    }
    Ok(Negotiated {
        artifact: outcome.artifact,
        skipped,
    })
}

/// System prompt from `prompts/<name>` when present, otherwise `default`.
pub fn system_prompt(ctx: &PhaseContext, name: &str, default: &str) -> String {
    ctx.config
        .prompt_template(name)
        .unwrap_or_else(|| default.to_string())
}

fn conversation(system: &str, request: &str, feedback: Option<&str>) -> Vec<Message> {
    let mut messages = vec![Message::system(system), Message::user(request)];
    if let Some(feedback) = feedback {
        messages.push(Message::user(format!(
            "Revise the previous proposal based on this feedback: {feedback}"
        )));
    }
    messages
}

/// Ask for a JSON artifact. Transport failures propagate; unparseable text is
/// returned as `ParseOutcome::Failed` for the caller to handle.
pub async fn ask_json<T: DeserializeOwned>(
    ctx: &PhaseContext,
    task: TaskType,
    system: &str,
    request: &str,
    feedback: Option<&str>,
) -> Result<ParseOutcome<T>> {
    let response = ctx
        .chat
        .chat(&conversation(system, request, feedback), task)
        .await?;
    Ok(parse_json(&response))
}

/// Ask for a source file; fenced responses are unwrapped.
pub async fn ask_code(
    ctx: &PhaseContext,
    system: &str,
    request: &str,
    feedback: Option<&str>,
) -> Result<String> {
    let response = ctx
        .chat
        .chat(&conversation(system, request, feedback), TaskType::Coding)
        .await?;
    Ok(strip_code_fence(&response))
}

/// Render a bullet list, one item per line.
pub(crate) fn bullets(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("- {item}"))
        .collect::<Vec<_>>()
        .join("\n")
}
