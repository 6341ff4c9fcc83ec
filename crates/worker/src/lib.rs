//! Benefactor background worker.
//!
//! Each due-work table gets a [`ClaimAndMark`](benefactor_core::batch::ClaimAndMark)
//! job in [`jobs`], driven by its own
//! [`IntervalBatchRunner`](benefactor_core::batch_runner::IntervalBatchRunner).
//! Several worker processes may run against the same database; the claim
//! UPDATE is the only coordination between them.

pub mod config;
pub mod jobs;
pub mod reports;
