//! Autonomous build-cycle factory.
//!
//! Seven agent roles turn nothing into a persisted project:
//! - Scout: finds an app idea (strict JSON, retried until valid)
//! - UI, Logic, Integrator, Growth: build in parallel from the idea
//! - QA: advisory review of the combined code
//! - Closer: persists the record, falling back to local storage

pub mod agents;
mod orchestrator;

pub use agents::Role;
pub use orchestrator::{Factory, FactoryConfig, Phase};
