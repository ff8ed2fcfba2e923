//! Cycle driver: runs the factory back to back until told to stop.
//!
//! The first hard cycle failure ends the loop and is returned to the caller;
//! there is no automatic restart.

use std::time::Duration;

use crate::error::{Error, Result};
use crate::factory::Factory;
use crate::shutdown::Shutdown;

pub const DEFAULT_CYCLE_DELAY: Duration = Duration::from_secs(10);

/// Summary of a driver run that ended through cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DriverReport {
    pub cycles_completed: u64,
}

pub struct CycleDriver {
    factory: Factory,
    delay: Duration,
}

impl CycleDriver {
    pub fn new(factory: Factory) -> Self {
        Self {
            factory,
            delay: DEFAULT_CYCLE_DELAY,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn factory(&self) -> &Factory {
        &self.factory
    }

    /// Loop forever: one cycle, a fixed pause, repeat.
    ///
    /// Returns `Ok` once `shutdown` is cancelled, or the error of the first
    /// failed cycle.
    pub async fn run(&self, shutdown: &Shutdown) -> Result<DriverReport> {
        let log = self.factory.log();
        let mut report = DriverReport::default();

        log.system("🏭 FACTORY STARTED");
        tracing::info!(delay_secs = self.delay.as_secs(), "Cycle driver started");

        while !shutdown.is_cancelled() {
            match self.factory.run_cycle(shutdown).await {
                Ok(_) => report.cycles_completed += 1,
                Err(Error::Cancelled) => break,
                Err(e) => {
                    log.error(format!("💥 FACTORY ERROR: {e}"));
                    tracing::error!(
                        error = %e,
                        cycles_completed = report.cycles_completed,
                        "Cycle driver stopped on failure"
                    );
                    return Err(e);
                }
            }

            log.system(format!(
                "⏳ Waiting {}s before next cycle...",
                self.delay.as_secs()
            ));
            let pause = shutdown
                .guard(async {
                    tokio::time::sleep(self.delay).await;
                    Ok(())
                })
                .await;
            if pause.is_err() {
                break;
            }
        }

        log.system(format!(
            "🛑 FACTORY STOPPED after {} cycle(s)",
            report.cycles_completed
        ));
        tracing::info!(cycles_completed = report.cycles_completed, "Cycle driver stopped");
        Ok(report)
    }
}
