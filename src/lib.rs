//! Round lifecycle coordinator.
//!
//! Schedules rounds, collects participants and scores, resolves ranking tags
//! and permission roles from other contexts over a message bus, and publishes
//! each finalized round downstream exactly once.

pub mod bus;
pub mod config;
pub mod dao;
pub mod dto;
pub mod error;
pub mod gateway;
pub mod routes;
pub mod scheduler;
pub mod services;
pub mod state;
