//! Core domain models for the podcast pipeline
//!
//! This module defines pipeline definitions, steps, their configuration,
//! the typed run context and per-run execution state.

pub mod config;
pub mod context;
pub mod error;
pub mod pipeline;
pub mod state;
pub mod step;

pub use context::*;
pub use error::*;
pub use pipeline::*;
pub use state::*;
pub use step::*;
