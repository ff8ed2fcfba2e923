//! Factory orchestrator: drives one build cycle through its phases.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::events::{EventSink, Log};
use crate::fallback::FallbackStore;
use crate::llm::Completion;
use crate::project::{BuildArtifacts, CycleOutcome, Idea, ProjectRecord};
use crate::shutdown::Shutdown;
use crate::store::RecordStore;

use super::agents;

/// Factory configuration.
#[derive(Debug, Clone, Default)]
pub struct FactoryConfig {
    /// Upper bound for ideation, build and review. Persistence is never cut
    /// short. `None` lets a cycle run as long as Scout keeps retrying.
    pub cycle_timeout: Option<Duration>,
}

/// Factory state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Ideating,
    Building,
    Reviewing,
    Closing,
    Done,
    Failed,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Idle => write!(f, "idle"),
            Phase::Ideating => write!(f, "ideating"),
            Phase::Building => write!(f, "building"),
            Phase::Reviewing => write!(f, "reviewing"),
            Phase::Closing => write!(f, "closing"),
            Phase::Done => write!(f, "done"),
            Phase::Failed => write!(f, "failed"),
        }
    }
}

/// The build-cycle engine.
///
/// Holds only its collaborators and the phase of the cycle in flight; every
/// cycle starts from a fresh idea.
pub struct Factory {
    llm: Arc<dyn Completion>,
    store: Arc<dyn RecordStore>,
    fallback: Arc<dyn FallbackStore>,
    log: Log,
    config: FactoryConfig,
    phase: Arc<Mutex<Phase>>,
}

impl Factory {
    pub fn new(
        llm: Arc<dyn Completion>,
        store: Arc<dyn RecordStore>,
        fallback: Arc<dyn FallbackStore>,
        sink: Arc<dyn EventSink>,
        config: FactoryConfig,
    ) -> Self {
        Self {
            llm,
            store,
            fallback,
            log: Log::new(sink),
            config,
            phase: Arc::new(Mutex::new(Phase::Idle)),
        }
    }

    pub async fn phase(&self) -> Phase {
        *self.phase.lock().await
    }

    pub fn log(&self) -> &Log {
        &self.log
    }

    async fn set_phase(&self, phase: Phase) {
        *self.phase.lock().await = phase;
        tracing::debug!(%phase, "Phase changed");
    }

    /// Run one full cycle: ideate, build in parallel, review, persist.
    ///
    /// Failures are logged and returned; retrying a failed cycle is the
    /// driver's decision.
    pub async fn run_cycle(&self, shutdown: &Shutdown) -> Result<CycleOutcome> {
        self.log.system("🚀 STARTING NEW BUILD CYCLE...");

        let result = self.cycle(shutdown).await;

        match &result {
            Ok(outcome) => {
                self.set_phase(Phase::Done).await;
                tracing::info!(
                    project = %outcome.project.name,
                    persisted_to = ?outcome.persisted_to,
                    "Cycle complete"
                );
                self.log.system("✅ BUILD COMPLETE! Ready for next cycle.");
            }
            Err(e) if e.is_cancelled() => {
                self.set_phase(Phase::Failed).await;
                tracing::info!("Cycle cancelled");
                self.log.system("🛑 CYCLE CANCELLED");
            }
            Err(e) => {
                self.set_phase(Phase::Failed).await;
                tracing::error!(error = %e, "Cycle failed");
                self.log.error(format!("❌ CYCLE FAILED: {e}"));
            }
        }
        result
    }

    async fn cycle(&self, shutdown: &Shutdown) -> Result<CycleOutcome> {
        let (idea, artifacts) = match self.config.cycle_timeout {
            Some(limit) => tokio::time::timeout(limit, self.produce(shutdown))
                .await
                .unwrap_or(Err(Error::Timeout(limit)))?,
            None => self.produce(shutdown).await?,
        };

        // Phase 4: package and persist. Outside both the cycle budget and
        // the shutdown race, so a finished record always reaches a store.
        self.set_phase(Phase::Closing).await;
        let record = ProjectRecord::assemble(&idea, &artifacts)?;
        agents::closer(
            self.store.as_ref(),
            self.fallback.as_ref(),
            &self.log,
            record,
        )
        .await
    }

    /// Phases 1 to 3: everything the cycle budget applies to.
    async fn produce(&self, shutdown: &Shutdown) -> Result<(Idea, BuildArtifacts)> {
        shutdown.check()?;

        // Phase 1: ideation, retried until the idea parses
        self.set_phase(Phase::Ideating).await;
        let idea = agents::scout_until_valid(self.llm.as_ref(), &self.log, shutdown).await?;

        // Phase 2: parallel build
        self.set_phase(Phase::Building).await;
        self.log.system("🔄 PHASE 2: Parallel execution...");
        let artifacts = shutdown.guard(self.build(&idea)).await?;

        // Phase 3: advisory review
        self.set_phase(Phase::Reviewing).await;
        let review = shutdown
            .guard(agents::qa(
                self.llm.as_ref(),
                &self.log,
                &artifacts.combined_code(),
            ))
            .await?;
        tracing::info!(approved = review.approved(), "QA review recorded");

        Ok((idea, artifacts))
    }

    /// Fan out the four build roles and join them; the first failure wins.
    async fn build(&self, idea: &Idea) -> Result<BuildArtifacts> {
        let llm = self.llm.as_ref();
        let log = &self.log;
        let (ui_code, logic_code, configs, growth_plan) = tokio::try_join!(
            agents::ui(llm, log, idea),
            agents::logic(llm, log, idea),
            agents::integrator(llm, log, idea),
            agents::growth(llm, log, idea),
        )?;
        Ok(BuildArtifacts {
            ui_code,
            logic_code,
            configs,
            growth_plan,
        })
    }
}
