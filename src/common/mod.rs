//! Shared types and collaborator interfaces
//!
//! Everything the engine and the outer service layer agree on.

pub mod types;
pub mod traits;
