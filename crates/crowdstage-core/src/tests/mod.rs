//! Test module for the coordination pipeline.
//!
//! - `integration.rs`: end-to-end scenarios over a shared in-process
//!   store: election safety and liveness, the session lifecycle, and the
//!   reconciler-driven tick loop
//! - `properties.rs`: property tests for event-order convergence
//! - `helpers.rs`: shared setup utilities

mod helpers;
mod properties;
