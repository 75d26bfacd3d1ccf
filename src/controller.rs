//! Runs phases in workflow order and persists the session after each one.

use crate::context::PhaseContext;
use crate::errors::{PhaseError, RegistryError, SessionError};
use crate::phase::{PHASE_ORDER, Phase};
use crate::session::state::SessionState;
use crate::session::store::{SessionLock, SessionStore};
use anyhow::Result;
use async_trait::async_trait;

/// One stage of the workflow.
///
/// A handler only writes the session fields its phase owns, plus approval
/// records and step checkpoints. Its mutations are committed by the
/// controller's save once `run` returns.
#[async_trait]
pub trait PhaseHandler: Send + Sync {
    fn phase(&self) -> Phase;

    async fn run(&self, ctx: &PhaseContext, session: &mut SessionState) -> Result<()>;
}

/// Exactly one handler per phase, indexed by workflow position.
pub struct PhaseRegistry {
    handlers: Vec<Box<dyn PhaseHandler>>,
}

impl PhaseRegistry {
    pub fn new(handlers: Vec<Box<dyn PhaseHandler>>) -> Result<Self, RegistryError> {
        let mut slots: Vec<Option<Box<dyn PhaseHandler>>> =
            PHASE_ORDER.iter().map(|_| None).collect();
        for handler in handlers {
            let phase = handler.phase();
            let slot = &mut slots[phase.index()];
            if slot.is_some() {
                return Err(RegistryError::DuplicateHandler(phase));
            }
            *slot = Some(handler);
        }
        let handlers = slots
            .into_iter()
            .zip(PHASE_ORDER)
            .map(|(slot, phase)| slot.ok_or(RegistryError::MissingHandler(phase)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { handlers })
    }

    /// The production handlers.
    pub fn standard() -> Result<Self, RegistryError> {
        Self::new(crate::phases::standard_handlers())
    }

    pub fn handler(&self, phase: Phase) -> &dyn PhaseHandler {
        self.handlers[phase.index()].as_ref()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowReport {
    pub session_id: String,
    /// Phases that ran to completion during this call.
    pub phases_run: Vec<Phase>,
    pub complete: bool,
}

pub struct SessionController {
    store: SessionStore,
    registry: PhaseRegistry,
    ctx: PhaseContext,
}

impl SessionController {
    pub fn new(store: SessionStore, registry: PhaseRegistry, ctx: PhaseContext) -> Self {
        Self {
            store,
            registry,
            ctx,
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn context(&self) -> &PhaseContext {
        &self.ctx
    }

    /// Run every phase from `session.current_phase` to the end.
    ///
    /// After each phase commits the session is saved positioned at the next
    /// phase. When a phase fails the session is saved as-is, still positioned
    /// at the failing phase, and the error is returned.
    pub async fn run_generation_flow(
        &self,
        session: &mut SessionState,
    ) -> Result<FlowReport, PhaseError> {
        let lock = self.store.lock(&session.id)?;
        self.run_locked(&lock, session).await
    }

    /// [`Self::run_generation_flow`] for a caller that took the session lock
    /// before loading the session. A copy that is older than the stored one
    /// is refused with [`SessionError::Stale`].
    pub async fn run_locked(
        &self,
        lock: &SessionLock,
        session: &mut SessionState,
    ) -> Result<FlowReport, PhaseError> {
        if lock.id() != session.id {
            return Err(SessionError::Locked {
                id: session.id.clone(),
            }
            .into());
        }
        self.store.ensure_current(session)?;

        let mut report = FlowReport {
            session_id: session.id.clone(),
            phases_run: Vec::new(),
            complete: session.is_complete(),
        };
        if report.complete {
            tracing::info!(session_id = %session.id, "Session already complete");
            return Ok(report);
        }

        let start = session.current_phase;
        tracing::info!(session_id = %session.id, phase = %start, "Starting generation flow");

        for &phase in start.remaining() {
            session.current_phase = phase;
            self.ctx.console.phase_header(phase);
            tracing::info!(session_id = %session.id, %phase, "Running phase");

            if let Err(source) = self.registry.handler(phase).run(&self.ctx, session).await {
                tracing::error!(session_id = %session.id, %phase, error = %source, "Phase failed");
                let source = match self.store.save_session(session) {
                    Ok(()) => source,
                    Err(save_err) => {
                        tracing::error!(session_id = %session.id, error = %save_err, "Could not save failed session");
                        source.context(format!("Saving the session also failed: {save_err}"))
                    }
                };
                return Err(PhaseError::Failed { phase, source });
            }

            session.mark_completed(phase);
            session.clear_checkpoints(phase);
            if let Some(next) = phase.next() {
                session.current_phase = next;
            }
            self.store.save_session(session)?;
            report.phases_run.push(phase);
            tracing::info!(session_id = %session.id, %phase, "Phase committed");
        }

        report.complete = session.is_complete();
        Ok(report)
    }
}
