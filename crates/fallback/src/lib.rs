//! Provider Fallback
//!
//! Runs an ordered list of interchangeable provider calls until one
//! succeeds, recording every failure along the way and alerting when any
//! provider is down.

mod executor;
mod outcome;

pub use executor::{FallbackExecutor, Service};
pub use outcome::{FailureRecord, FallbackError, FallbackOutcome, OutcomeClass};
