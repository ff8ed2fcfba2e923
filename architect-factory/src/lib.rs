//! architect-factory: an autonomous build-cycle factory.
//!
//! Seven LLM-backed agents take a cycle from nothing to a persisted project:
//! - Scout proposes an idea (strict JSON, retried until it parses)
//! - UI, Logic, Integrator and Growth build from it concurrently
//! - QA reviews the code (advisory only)
//! - Closer stores the record remotely, or locally if the remote store fails
//!
//! A cycle driver repeats this forever, pausing between cycles, until it is
//! cancelled or a cycle fails.

pub mod config;
pub mod driver;
pub mod error;
pub mod events;
pub mod factory;
pub mod fallback;
pub mod llm;
pub mod project;
pub mod shutdown;
pub mod store;

pub use error::{Error, Result};
