//! crmflow - an agentic solver for natural-language CRM queries.
//!
//! A query walks a Planner -> Executor -> Verifier -> Memory loop: the
//! planner analyzes intent and picks one tool per step, the executor turns
//! the goal into a sanitized command and runs it, the verifier decides
//! whether the accumulated results are enough to stop, and memory logs every
//! action for final synthesis. Tools cover read-only SQL over the CRM store,
//! precomputed analytics metrics, and generation-backed reasoning.
//!
//! The loop degrades rather than fails: generation outages fall back to
//! canned plans and commands, unverifiable steps continue, and finalization
//! always produces an answer from whatever memory holds.

pub mod api;
pub mod config;
pub mod llm;
pub mod solver;
pub mod store;
pub mod tools;
pub mod util;

#[cfg(test)]
pub mod test_support;

pub use config::{Config, SolverConfig};
pub use solver::{SolveResult, Solver};
