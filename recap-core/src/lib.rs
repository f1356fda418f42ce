//! Recap core library — repository mirror, commit history extraction,
//! summarization agent, and the report job state machine.
//!
//! The main entry point is [`runner::JobRunner`], which drives one report
//! job through sync → extract → summarize over a [`store::JobStore`].

pub mod agent;
pub mod config;
pub mod error;
pub mod history;
pub mod job;
pub mod mirror;
pub mod runner;
pub mod store;
pub mod worker;
