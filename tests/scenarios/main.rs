//! End-to-end scenarios driving the orchestrator against in-memory backends

mod helpers;

mod editor_review;
mod failure_handling;
mod step_ordering;
