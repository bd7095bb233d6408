//! Shared utilities for rexcan integration tests.
//!
//! - `TestHarness`: a temp database, job store and intake wired to a
//!   scripted extraction service
//! - `ScriptedService`: an in-process stand-in for the extraction service

pub mod harness;
pub mod service;

pub use harness::TestHarness;
pub use service::{invoice, ScriptedService};
