//! Pure functions for verification pipeline logic.
//!
//! These functions hold the deterministic parts of a verification run
//! (environment naming, host discovery queries, status text) so they can be
//! tested apart from the async orchestration code.
//!
//! # Tiger Style
//!
//! - Pure functions with no side effects
//! - Deterministic: same inputs always produce same outputs
//! - Bounded output (status text is truncated to the remote limit)

mod environment;
mod manifest;
mod status;

pub use environment::*;
pub use manifest::*;
pub use status::*;
