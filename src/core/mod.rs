//! Core domain models for muster.
//!
//! Correlation tokens and their registry, the tri-state outcome delivered for
//! every token, and the person payloads the team workflow exchanges.

pub mod outcome;
pub mod person;
pub mod token;

pub use outcome::CorrelatedResult;
pub use person::{CreationRequest, Person};
pub use token::{CorrelationRegistry, CorrelationToken};
