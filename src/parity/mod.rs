//! Visual parity verification between the legacy and migrated sites.

pub mod compare;
pub mod runner;

pub use compare::{compare, pad_to, DiffResult};
pub use runner::{run, ComparisonOutcome, ParityReport};
